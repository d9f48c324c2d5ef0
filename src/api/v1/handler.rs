use super::error::envelope_reply;
use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::future::Future;
use std::sync::Arc;
use warp::http::HeaderValue;
use warp::reply::Response;

type HandlerResult = Result<Response, warp::Rejection>;

/// Proxy session resolved from the `Authorization` header.
#[derive(Clone)]
pub struct SessionContext {
    pub id: SessionId,
    pub session: Arc<SessionManager>,
    pub locale: Locale,
}

/// Runs `call` with a usable token. A 401 from the backend invalidates the
/// session so the stale token is never sent again.
async fn authorized<T, F, Fut>(ctx: &SessionContext, call: F) -> Result<T, UpstreamError>
where
    F: FnOnce(AuthContext) -> Fut,
    Fut: Future<Output = Result<T, UpstreamError>>,
{
    let token = ctx
        .session
        .access_token()
        .await
        .map_err(|e| e.to_upstream(ctx.locale))?;
    let result = call(AuthContext {
        token,
        locale: ctx.locale,
    })
    .await;
    if let Err(error) = &result {
        if error.code == ErrorCode::AuthExpired {
            ctx.session.invalidate(SessionFailure::Revoked);
        }
    }
    result
}

fn respond<T: Serialize>(result: Result<T, UpstreamError>) -> HandlerResult {
    Ok(envelope_reply(&Envelope::from_result(result)))
}

/// Caller admitted by the auth limiter, with what is left of its budget.
#[derive(Debug, Clone)]
pub struct Admission {
    pub client: ClientKey,
    pub remaining: u32,
}

/// [`respond`] plus `X-RateLimit-Remaining`, for replies behind the auth limiter.
fn respond_counted<T: Serialize>(admission: &Admission, result: Result<T, UpstreamError>) -> HandlerResult {
    let mut response = envelope_reply(&Envelope::from_result(result));
    response
        .headers_mut()
        .insert("X-RateLimit-Remaining", HeaderValue::from(admission.remaining));
    Ok(response)
}

/// `langCode` from the body wins over the header.
fn request_locale(lang_code: Option<&str>, header_locale: Locale) -> Locale {
    lang_code.map(Locale::from_lang_code).unwrap_or(header_locale)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub lang_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub session_id: SessionId,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub access_token_expires: Option<DateTime<Utc>>,
    pub user: Option<UserProfile>,
}

pub async fn login(
    admission: Admission,
    header_locale: Locale,
    body: LoginRequest,
    auth_backend: Arc<dyn AuthBackend>,
    sessions: Arc<SessionRegistry>,
    limiter: Arc<dyn RateLimiter>,
) -> HandlerResult {
    let locale = request_locale(body.lang_code.as_deref(), header_locale);
    let client = &admission.client;

    let input = match (validate_mobile(&body.mobile), validate_password(&body.password)) {
        (Ok(mobile), Ok(password)) => LoginInput { mobile, password },
        (Err(e), _) | (_, Err(e)) => return respond_counted::<()>(&admission, Err(e.into())),
    };

    match auth_backend.login(input, locale).await {
        Ok(tokens) => {
            limiter.reset(client);
            let (session_id, session) = sessions.open(tokens);
            info!(%client, "login succeeded");
            let status = session.status();
            respond_counted(
                &admission,
                Ok(LoginResponse {
                    session_id,
                    access_token_expires: status.access_token_expires,
                    user: session.profile(),
                }),
            )
        }
        Err(error) => {
            info!(%client, code = ?error.code, status = error.status, "login rejected");
            respond_counted::<()>(&admission, Err(error))
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignUpRequest {
    #[serde(default)]
    pub mobile: String,
    #[serde(default)]
    pub lang_code: Option<String>,
}

pub async fn sign_up(
    admission: Admission,
    header_locale: Locale,
    body: SignUpRequest,
    auth_backend: Arc<dyn AuthBackend>,
) -> HandlerResult {
    let locale = request_locale(body.lang_code.as_deref(), header_locale);
    let mobile = match validate_mobile(&body.mobile) {
        Ok(mobile) => mobile,
        Err(e) => return respond_counted::<()>(&admission, Err(e.into())),
    };
    let result = auth_backend.sign_up(mobile, locale).await;
    if let Err(error) = &result {
        info!(client = %admission.client, code = ?error.code, "signup rejected");
    }
    respond_counted(&admission, result.map(|user_id| json!({ "userId": user_id })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyOtpRequest {
    pub user_id: Option<Value>,
    pub otp: Option<Value>,
    #[serde(default)]
    pub lang_code: Option<String>,
}

pub async fn verify_otp(
    admission: Admission,
    header_locale: Locale,
    body: VerifyOtpRequest,
    auth_backend: Arc<dyn AuthBackend>,
) -> HandlerResult {
    let locale = request_locale(body.lang_code.as_deref(), header_locale);
    let input = match (validate_user_id(body.user_id.as_ref()), validate_otp(body.otp.as_ref())) {
        (Ok(user_id), Ok(otp)) => VerifyOtpInput { user_id, otp },
        (Err(e), _) | (_, Err(e)) => return respond_counted::<()>(&admission, Err(e.into())),
    };
    let result = auth_backend.verify_otp(input, locale).await;
    respond_counted(&admission, result.map(|verified| json!({ "verified": verified })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPasswordRequest {
    pub user_id: Option<Value>,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub lang_code: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PasswordSetResponse {
    /// Absent when the backend did not sign the account in; the client logs in next.
    pub session_id: Option<SessionId>,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub access_token_expires: Option<DateTime<Utc>>,
    pub user: UserProfile,
}

pub async fn set_password(
    admission: Admission,
    header_locale: Locale,
    body: SetPasswordRequest,
    auth_backend: Arc<dyn AuthBackend>,
    sessions: Arc<SessionRegistry>,
) -> HandlerResult {
    let locale = request_locale(body.lang_code.as_deref(), header_locale);
    let input = match (validate_user_id(body.user_id.as_ref()), validate_new_password(&body.password)) {
        (Ok(user_id), Ok(password)) => SetPasswordInput { user_id, password },
        (Err(e), _) | (_, Err(e)) => return respond_counted::<()>(&admission, Err(e.into())),
    };

    let result = auth_backend.set_password(input, locale).await.map(|done| {
        let opened = done.tokens.map(|tokens| sessions.open(tokens));
        match opened {
            Some((session_id, session)) => PasswordSetResponse {
                session_id: Some(session_id),
                access_token_expires: session.status().access_token_expires,
                user: done.profile,
            },
            None => PasswordSetResponse {
                session_id: None,
                access_token_expires: None,
                user: done.profile,
            },
        }
    });
    if let Ok(response) = &result {
        info!(client = %admission.client, signed_in = response.session_id.is_some(), "password set");
    }
    respond_counted(&admission, result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteProfileRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthdate: Option<String>,
    pub gender: Option<Value>,
}

pub async fn complete_profile(
    admission: Admission,
    ctx: SessionContext,
    body: CompleteProfileRequest,
    auth_backend: Arc<dyn AuthBackend>,
    limiter: Arc<dyn RateLimiter>,
) -> HandlerResult {
    let profile = match ProfileInput::validate(
        body.first_name.as_deref(),
        body.last_name.as_deref(),
        body.birthdate.as_deref(),
        body.gender.as_ref(),
        Utc::now().date_naive(),
    ) {
        Ok(profile) => profile,
        Err(e) => return respond_counted::<()>(&admission, Err(e.into())),
    };

    let result = authorized(&ctx, |auth| async move {
        auth_backend.complete_profile(&auth, &profile).await
    })
    .await;
    if result.is_ok() {
        limiter.reset(&admission.client);
        info!(client = %admission.client, "profile completed");
    }
    respond_counted(&admission, result.map(|user| json!({ "user": user })))
}

pub async fn logout(ctx: SessionContext, sessions: Arc<SessionRegistry>) -> HandlerResult {
    sessions.close(&ctx.id);
    respond(Ok(json!({ "signedOut": true })))
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionEvent {
    Focus,
    Reconnect,
}

#[derive(Debug, Deserialize)]
pub struct SessionQuery {
    pub event: Option<SessionEvent>,
}

pub async fn session_status(query: SessionQuery, ctx: SessionContext) -> HandlerResult {
    if let Some(event) = query.event {
        let trigger = match event {
            SessionEvent::Focus => RefreshTrigger::Focus,
            SessionEvent::Reconnect => RefreshTrigger::Reconnect,
        };
        let outcome = ctx.session.trigger(trigger).await;
        debug!(?trigger, ?outcome, "session event");
    }
    respond(Ok(ctx.session.status()))
}

pub async fn get_cart(ctx: SessionContext, backend: Arc<dyn CartBackend>) -> HandlerResult {
    let result = authorized(&ctx, |auth| async move { backend.fetch_cart(&auth).await }).await;
    respond(result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddToCartRequest {
    pub product_detail_id: Option<i64>,
    pub qty: Option<i64>,
}

pub async fn add_to_cart(
    ctx: SessionContext,
    body: AddToCartRequest,
    backend: Arc<dyn CartBackend>,
) -> HandlerResult {
    let item = match AddToCart::validate(body.product_detail_id, body.qty) {
        Ok(item) => item,
        Err(e) => return respond::<()>(Err(e.into())),
    };
    let result = authorized(&ctx, |auth| async move { backend.add_item(&auth, &item).await }).await;
    respond(result)
}

pub async fn clear_cart(ctx: SessionContext, backend: Arc<dyn CartBackend>) -> HandlerResult {
    let result = authorized(&ctx, |auth| async move { backend.clear(&auth).await }).await;
    respond(result.map(|()| json!({ "cleared": true })))
}

async fn mutate_line(
    ctx: SessionContext,
    backend: Arc<dyn CartBackend>,
    id: CartLineId,
    action: CartAction,
) -> HandlerResult {
    let result = authorized(&ctx, |auth| async move {
        match action {
            CartAction::Increment => backend.increment(&auth, id).await,
            CartAction::Decrement => backend.decrement(&auth, id).await,
            CartAction::Delete => backend.delete(&auth, id).await,
        }
    })
    .await;
    respond(result.map(|()| json!({ "id": id, "action": action })))
}

pub async fn increment_line(id: i64, ctx: SessionContext, backend: Arc<dyn CartBackend>) -> HandlerResult {
    mutate_line(ctx, backend, CartLineId(id), CartAction::Increment).await
}

pub async fn decrement_line(id: i64, ctx: SessionContext, backend: Arc<dyn CartBackend>) -> HandlerResult {
    mutate_line(ctx, backend, CartLineId(id), CartAction::Decrement).await
}

pub async fn delete_line(id: i64, ctx: SessionContext, backend: Arc<dyn CartBackend>) -> HandlerResult {
    mutate_line(ctx, backend, CartLineId(id), CartAction::Delete).await
}

#[derive(Debug, Deserialize)]
pub struct BatchRequest {
    #[serde(default)]
    pub operations: Vec<BatchOperation>,
}

pub async fn batch_update(
    ctx: SessionContext,
    body: BatchRequest,
    backend: Arc<dyn CartBackend>,
) -> HandlerResult {
    if body.operations.is_empty() {
        return respond::<()>(Err(ValidationError::CartIdsMissing.into()));
    }
    let result = authorized(&ctx, |auth| async move {
        Ok(run_batch(backend.as_ref(), &auth, &body.operations).await)
    })
    .await;
    if let Ok(report) = &result {
        if report.auth_expired() {
            ctx.session.invalidate(SessionFailure::Revoked);
        }
    }
    respond(result)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub cart_ids: Option<Vec<CartLineId>>,
    pub address_id: Option<i64>,
    #[serde(rename = "patmentType", alias = "paymentType")]
    pub payment_type: Option<PaymentType>,
}

pub async fn checkout(
    ctx: SessionContext,
    body: CheckoutRequest,
    backend: Arc<dyn CartBackend>,
) -> HandlerResult {
    let order = match CheckoutOrder::validate(body.cart_ids, body.address_id, body.payment_type) {
        Ok(order) => order,
        Err(e) => return respond::<()>(Err(e.into())),
    };
    let result = authorized(&ctx, |auth| async move { backend.checkout(&auth, &order).await }).await;
    if result.is_ok() {
        info!("checkout placed");
    }
    respond(result)
}

pub async fn shipping_offer(locale: Locale, backend: Arc<dyn CartBackend>) -> HandlerResult {
    respond(Ok(backend.shipping_offer(locale).await))
}
