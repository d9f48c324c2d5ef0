use super::error::ApiRejection;
use super::handler::{self, Admission, SessionContext};
use crate::application_impl::SessionRegistry;
use crate::application_port::RateLimiter;
use crate::domain_model::*;
use crate::server::*;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;
use warp::http::HeaderMap;
use warp::{Filter, http, reject};

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let secret = server.client_secret.clone();
    let api_limit = throttle(server.api_limiter.clone(), secret.clone());
    let session = with_session(server.sessions.clone());

    let auth_limit = with_rate_limit(server.auth_limiter.clone(), secret);

    let login = warp::path!("auth" / "login")
        .and(warp::post())
        .and(auth_limit.clone())
        .and(with_locale())
        .and(warp::body::json())
        .and(with(server.auth_backend.clone()))
        .and(with(server.sessions.clone()))
        .and(with(server.auth_limiter.clone()))
        .and_then(handler::login);

    let sign_up = warp::path!("auth" / "signup")
        .and(warp::post())
        .and(auth_limit.clone())
        .and(with_locale())
        .and(warp::body::json())
        .and(with(server.auth_backend.clone()))
        .and_then(handler::sign_up);

    let verify_otp = warp::path!("auth" / "verify-otp")
        .and(warp::post())
        .and(auth_limit.clone())
        .and(with_locale())
        .and(warp::body::json())
        .and(with(server.auth_backend.clone()))
        .and_then(handler::verify_otp);

    let set_password = warp::path!("auth" / "set-password")
        .and(warp::post())
        .and(auth_limit.clone())
        .and(with_locale())
        .and(warp::body::json())
        .and(with(server.auth_backend.clone()))
        .and(with(server.sessions.clone()))
        .and_then(handler::set_password);

    let complete_profile = warp::path!("auth" / "complete-profile")
        .and(warp::post())
        .and(auth_limit)
        .and(session.clone())
        .and(warp::body::json())
        .and(with(server.auth_backend.clone()))
        .and(with(server.auth_limiter.clone()))
        .and_then(handler::complete_profile);

    let logout = warp::path!("auth" / "logout")
        .and(warp::post())
        .and(api_limit.clone())
        .and(session.clone())
        .and(with(server.sessions.clone()))
        .and_then(handler::logout);

    let session_status = warp::path!("auth" / "session")
        .and(warp::get())
        .and(api_limit.clone())
        .and(warp::query::<handler::SessionQuery>())
        .and(session.clone())
        .and_then(handler::session_status);

    let get_cart = warp::path!("cart")
        .and(warp::get())
        .and(api_limit.clone())
        .and(session.clone())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::get_cart);

    let add_to_cart = warp::path!("cart")
        .and(warp::post())
        .and(api_limit.clone())
        .and(session.clone())
        .and(warp::body::json())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::add_to_cart);

    let clear_cart = warp::path!("cart")
        .and(warp::delete())
        .and(api_limit.clone())
        .and(session.clone())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::clear_cart);

    let increment = warp::path!("cart" / "increment" / i64)
        .and(warp::put())
        .and(api_limit.clone())
        .and(session.clone())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::increment_line);

    let decrement = warp::path!("cart" / "decrement" / i64)
        .and(warp::put())
        .and(api_limit.clone())
        .and(session.clone())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::decrement_line);

    let delete_line = warp::path!("cart" / i64)
        .and(warp::delete())
        .and(api_limit.clone())
        .and(session.clone())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::delete_line);

    let batch = warp::path!("cart" / "batch")
        .and(warp::post())
        .and(api_limit.clone())
        .and(session.clone())
        .and(warp::body::json())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::batch_update);

    let checkout = warp::path!("checkout")
        .and(warp::post())
        .and(api_limit.clone())
        .and(session)
        .and(warp::body::json())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::checkout);

    let shipping_offer = warp::path!("shipping-offer")
        .and(warp::get())
        .and(api_limit)
        .and(with_locale())
        .and(with(server.cart_backend.clone()))
        .and_then(handler::shipping_offer);

    login
        .or(sign_up)
        .or(verify_otp)
        .or(set_password)
        .or(complete_profile)
        .or(logout)
        .or(session_status)
        .or(batch)
        .or(increment)
        .or(decrement)
        .or(delete_line)
        .or(get_cart)
        .or(add_to_cart)
        .or(clear_cart)
        .or(checkout)
        .or(shipping_offer)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

/// `langCode` header, Arabic when absent.
fn with_locale() -> impl Filter<Extract = (Locale,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>("langcode")
        .map(|code: Option<String>| code.as_deref().map(Locale::from_lang_code).unwrap_or_default())
}

fn with_session(
    sessions: Arc<SessionRegistry>,
) -> impl Filter<Extract = (SessionContext,), Error = warp::Rejection> + Clone {
    warp::header::optional::<String>(http::header::AUTHORIZATION.as_ref())
        .and(with_locale())
        .and_then(move |header: Option<String>, locale: Locale| {
            let sessions = sessions.clone();
            async move {
                let id = header
                    .as_deref()
                    .and_then(|h| h.strip_prefix("Bearer "))
                    .map(|id| SessionId(id.trim().to_string()));
                match id.and_then(|id| sessions.get(&id).map(|session| (id, session))) {
                    Some((id, session)) => Ok(SessionContext {
                        id,
                        session,
                        locale,
                    }),
                    None => Err(reject::custom(ApiRejection::Unauthorized { locale })),
                }
            }
        })
}

/// [`with_rate_limit`] for routes that do not need the client key.
fn throttle(
    limiter: Arc<dyn RateLimiter>,
    secret: Arc<[u8]>,
) -> impl Filter<Extract = (), Error = warp::Rejection> + Clone {
    with_rate_limit(limiter, secret)
        .map(|_admission: Admission| ())
        .untuple_one()
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// Counts the request against `limiter` and yields the hashed client key
/// with the budget left for it.
fn with_rate_limit(
    limiter: Arc<dyn RateLimiter>,
    secret: Arc<[u8]>,
) -> impl Filter<Extract = (Admission,), Error = warp::Rejection> + Clone {
    warp::header::headers_cloned()
        .and(warp::addr::remote())
        .and(with_locale())
        .and_then(
            move |headers: HeaderMap, peer: Option<SocketAddr>, locale: Locale| {
                let limiter = limiter.clone();
                let secret = secret.clone();
                async move {
                    let peer = peer.map(|addr| addr.ip().to_string());
                    let address = client_address(
                        header_str(&headers, "cf-connecting-ip"),
                        header_str(&headers, "x-forwarded-for"),
                        header_str(&headers, "x-real-ip"),
                        peer.as_deref(),
                    );
                    let key = ClientKey::derive(address, &secret);
                    let decision = limiter.check(&key);
                    if decision.allowed {
                        Ok(Admission {
                            client: key,
                            remaining: decision.remaining,
                        })
                    } else {
                        debug!(client = %key, retry_after = decision.retry_after, "rate limited");
                        Err(reject::custom(ApiRejection::RateLimited {
                            retry_after: decision.retry_after,
                            locale,
                        }))
                    }
                }
            },
        )
}
