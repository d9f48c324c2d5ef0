use crate::application_impl::{CacheKey, ResponseCache};
use crate::application_port::{ErrorCode, UpstreamError};
use crate::domain_model::*;
use crate::domain_port::*;
use crate::infra_http::{HttpFetcher, RetryPolicy, into_result, read_body};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{Method, Request};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const SHIPPING_OFFER: &str = "api/ShippingOffer";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginPayload {
    token: Option<String>,
    refresh_token: Option<String>,
    user_id: Option<Value>,
    id: Option<Value>,
    #[serde(default)]
    first_name: Option<String>,
    #[serde(default)]
    last_name: Option<String>,
    #[serde(default)]
    user_name: Option<String>,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    last_mobile_digit: Option<String>,
}

impl LoginPayload {
    /// Splits into `(token, refresh_token, profile)`.
    fn into_parts(self, mobile: Option<String>) -> (Option<String>, Option<String>, UserProfile) {
        let profile = UserProfile {
            user_id: id_string(self.user_id).or_else(|| id_string(self.id)),
            mobile: self.last_mobile_digit.or(mobile),
            first_name: self.first_name.unwrap_or_default(),
            last_name: self.last_name.unwrap_or_default(),
            user_name: self.user_name.unwrap_or_default(),
            email: self.email,
        };
        (self.token, self.refresh_token, profile)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshPayload {
    token: Option<String>,
    refresh_token: Option<String>,
}

fn id_string(value: Option<Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decode<T: DeserializeOwned>(body: Value, locale: Locale) -> Result<T, UpstreamError> {
    serde_json::from_value(body).map_err(|e| {
        warn!(error = %e, "unexpected upstream payload");
        UpstreamError::localized(ErrorCode::Unknown, locale).with_detail(e.to_string())
    })
}

/// Storefront backend reached over its REST API.
pub struct HttpStorefrontBackend {
    base_url: String,
    fetcher: HttpFetcher,
    refresh_policy: RetryPolicy,
    cache: Arc<ResponseCache>,
    shipping_offer_ttl: Duration,
}

impl HttpStorefrontBackend {
    pub fn new(base_url: &str, fetcher: HttpFetcher, cache: Arc<ResponseCache>) -> Self {
        let refresh_policy = fetcher.policy().with_timeout(Duration::from_secs(10));
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            fetcher,
            refresh_policy,
            cache,
            shipping_offer_ttl: Duration::from_secs(60 * 60),
        }
    }

    pub fn with_refresh_timeout(mut self, timeout: Duration) -> Self {
        self.refresh_policy = self.fetcher.policy().with_timeout(timeout);
        self
    }

    pub fn with_shipping_offer_ttl(mut self, ttl: Duration) -> Self {
        self.shipping_offer_ttl = ttl;
        self
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
    }

    fn request(
        &self,
        method: Method,
        endpoint: &str,
        locale: Locale,
        token: Option<&AccessToken>,
        body: Option<&Value>,
        query: &[(&str, &str)],
    ) -> Result<Request, UpstreamError> {
        let mut builder = self
            .fetcher
            .client()
            .request(method, self.url(endpoint))
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .header("langCode", locale.lang_code())
            .header("X-Client-Type", "Web")
            .header("webOrMob", "2");
        if !query.is_empty() {
            builder = builder.query(query);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(&token.0);
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        builder.build().map_err(|e| {
            UpstreamError::localized(ErrorCode::Unknown, locale).with_detail(e.to_string())
        })
    }

    async fn execute(
        &self,
        request: Request,
        policy: &RetryPolicy,
        locale: Locale,
        authorized: bool,
    ) -> Result<Value, UpstreamError> {
        let method = request.method().clone();
        let endpoint = request.url().path().to_string();
        let response = self
            .fetcher
            .fetch_with_policy(request, policy)
            .await
            .map_err(|e| {
                warn!(%method, endpoint, error = %e, "upstream call failed");
                e.classify(locale)
            })?;
        let (status, body) = read_body(response).await;
        debug!(%method, endpoint, status = status.as_u16(), "upstream responded");
        into_result(status, body, locale, authorized)
    }

    async fn call(
        &self,
        method: Method,
        endpoint: &str,
        auth: &AuthContext,
        body: Option<&Value>,
    ) -> Result<Value, UpstreamError> {
        let request = self.request(method, endpoint, auth.locale, Some(&auth.token), body, &[])?;
        self.execute(request, self.fetcher.policy(), auth.locale, true)
            .await
    }

    async fn fetch_shipping_offer(&self, locale: Locale) -> Result<ShippingOffer, UpstreamError> {
        let key = CacheKey::get(SHIPPING_OFFER, locale);
        let body = match self.cache.get(&key) {
            Some(body) => body,
            None => {
                let request = self.request(Method::GET, SHIPPING_OFFER, locale, None, None, &[])?;
                let body = self
                    .execute(request, self.fetcher.policy(), locale, false)
                    .await?;
                self.cache
                    .insert_with_ttl(key, body.clone(), self.shipping_offer_ttl);
                body
            }
        };

        let payload = match body {
            Value::Array(entries) => entries.into_iter().next(),
            Value::Object(_) => Some(body),
            _ => None,
        };
        match payload {
            Some(entry) => Ok(decode::<ShippingOfferPayload>(entry, locale)?.into()),
            None => Ok(ShippingOffer::default()),
        }
    }
}

#[async_trait::async_trait]
impl AuthBackend for HttpStorefrontBackend {
    async fn login(&self, input: LoginInput, locale: Locale) -> Result<IssuedTokens, UpstreamError> {
        let body = json!({ "mobile": input.mobile, "password": input.password });
        let request = self.request(Method::POST, "api/Auth/login", locale, None, Some(&body), &[])?;
        let payload: LoginPayload =
            decode(self.execute(request, self.fetcher.policy(), locale, false).await?, locale)?;

        let (Some(token), Some(refresh_token), profile) = payload.into_parts(Some(input.mobile)) else {
            warn!("login response without tokens");
            return Err(UpstreamError::localized(ErrorCode::Unknown, locale));
        };
        Ok(IssuedTokens {
            access_token: AccessToken(token),
            refresh_token: RefreshToken(refresh_token),
            profile,
        })
    }

    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens, UpstreamError> {
        let locale = Locale::default();
        let request = self.request(
            Method::POST,
            "api/Auth/refreshToken",
            locale,
            None,
            None,
            &[("refreshToken", refresh_token.0.as_str())],
        )?;
        let payload: RefreshPayload =
            decode(self.execute(request, &self.refresh_policy, locale, false).await?, locale)?;
        let Some(token) = payload.token.filter(|t| !t.is_empty()) else {
            return Err(UpstreamError::localized(ErrorCode::AuthExpired, locale));
        };
        Ok(RefreshedTokens {
            access_token: AccessToken(token),
            refresh_token: payload.refresh_token.filter(|t| !t.is_empty()).map(RefreshToken),
        })
    }

    async fn sign_up(&self, mobile: String, locale: Locale) -> Result<String, UpstreamError> {
        let body = json!({ "mobile": mobile });
        let request = self.request(Method::POST, "api/Auth/SignUp", locale, None, Some(&body), &[])?;
        let body = self.execute(request, self.fetcher.policy(), locale, false).await?;
        // either `{userId}` or the bare id
        let user_id = match &body {
            Value::Object(fields) => id_string(fields.get("userId").cloned()),
            _ => id_string(Some(body)),
        };
        user_id.ok_or_else(|| {
            warn!("signup response without user id");
            UpstreamError::localized(ErrorCode::Unknown, locale)
        })
    }

    async fn verify_otp(&self, input: VerifyOtpInput, locale: Locale) -> Result<bool, UpstreamError> {
        let request = self.request(
            Method::POST,
            "api/Auth/verifyUser",
            locale,
            None,
            None,
            &[("userId", input.user_id.as_str()), ("otp", input.otp.as_str())],
        )?;
        let body = self.execute(request, self.fetcher.policy(), locale, false).await?;
        Ok(matches!(&body, Value::Bool(true)) || body.as_str() == Some("true"))
    }

    async fn set_password(&self, input: SetPasswordInput, locale: Locale) -> Result<PasswordSet, UpstreamError> {
        let body = json!({ "userId": input.user_id, "password": input.password });
        let request = self.request(Method::POST, "api/Auth/setPassword", locale, None, Some(&body), &[])?;
        let payload: LoginPayload =
            decode(self.execute(request, self.fetcher.policy(), locale, false).await?, locale)?;

        let (token, refresh_token, profile) = payload.into_parts(None);
        let tokens = match (token, refresh_token) {
            (Some(token), Some(refresh_token)) => Some(IssuedTokens {
                access_token: AccessToken(token),
                refresh_token: RefreshToken(refresh_token),
                profile: profile.clone(),
            }),
            _ => {
                debug!("password set without a refresh token, client must log in");
                None
            }
        };
        Ok(PasswordSet { profile, tokens })
    }

    async fn complete_profile(&self, auth: &AuthContext, profile: &ProfileInput) -> Result<Value, UpstreamError> {
        let body = serde_json::to_value(profile).map_err(|e| {
            UpstreamError::localized(ErrorCode::Unknown, auth.locale).with_detail(e.to_string())
        })?;
        self.call(Method::PUT, "api/UserData", auth, Some(&body)).await
    }
}

#[async_trait::async_trait]
impl CartBackend for HttpStorefrontBackend {
    async fn fetch_cart(&self, auth: &AuthContext) -> Result<CartSnapshot, UpstreamError> {
        let body = self.call(Method::GET, "api/Cart", auth, None).await?;
        if body.is_null() {
            return Ok(CartSnapshot::default());
        }
        decode(body, auth.locale)
    }

    async fn add_item(&self, auth: &AuthContext, item: &AddToCart) -> Result<Value, UpstreamError> {
        let body = serde_json::to_value(item).map_err(|e| {
            UpstreamError::localized(ErrorCode::Unknown, auth.locale).with_detail(e.to_string())
        })?;
        self.call(Method::POST, "api/Cart", auth, Some(&body)).await
    }

    async fn increment(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError> {
        self.call(Method::PUT, &format!("api/Cart/increment/{id}"), auth, None)
            .await
            .map(|_| ())
    }

    async fn decrement(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError> {
        self.call(Method::PUT, &format!("api/Cart/decrement/{id}"), auth, None)
            .await
            .map(|_| ())
    }

    async fn delete(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError> {
        self.call(Method::DELETE, &format!("api/Cart/{id}"), auth, None)
            .await
            .map(|_| ())
    }

    async fn clear(&self, auth: &AuthContext) -> Result<(), UpstreamError> {
        self.call(Method::DELETE, "api/Cart/clear", auth, None)
            .await
            .map(|_| ())
    }

    async fn checkout(&self, auth: &AuthContext, order: &CheckoutOrder) -> Result<Value, UpstreamError> {
        let body = serde_json::to_value(order).map_err(|e| {
            UpstreamError::localized(ErrorCode::Unknown, auth.locale).with_detail(e.to_string())
        })?;
        self.call(Method::POST, "api/Checkout", auth, Some(&body)).await
    }

    async fn shipping_offer(&self, locale: Locale) -> ShippingOffer {
        match self.fetch_shipping_offer(locale).await {
            Ok(offer) => offer,
            Err(error) => {
                warn!(code = ?error.code, status = error.status, "shipping offer unavailable, using default");
                ShippingOffer::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn backend(server: &MockServer, max_retries: u32) -> HttpStorefrontBackend {
        let fetcher = HttpFetcher::new(RetryPolicy {
            max_retries,
            base_delay: Duration::from_millis(5),
            timeout: Duration::from_secs(5),
        });
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), 10));
        HttpStorefrontBackend::new(&server.uri(), fetcher, cache)
    }

    fn auth() -> AuthContext {
        AuthContext {
            token: AccessToken("access-1".into()),
            locale: Locale::En,
        }
    }

    #[tokio::test]
    async fn login_sends_client_headers_and_parses_tokens() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/login"))
            .and(header("X-Client-Type", "Web"))
            .and(header("webOrMob", "2"))
            .and(header("langCode", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token": "a1",
                "refreshToken": "r1",
                "userId": 42,
                "firstName": "Mona",
            })))
            .expect(1)
            .mount(&server)
            .await;

        let tokens = backend(&server, 0)
            .login(
                LoginInput {
                    mobile: "01012345678".into(),
                    password: "pw".into(),
                },
                Locale::En,
            )
            .await
            .unwrap();
        assert_eq!(tokens.access_token, AccessToken("a1".into()));
        assert_eq!(tokens.refresh_token, RefreshToken("r1".into()));
        assert_eq!(tokens.profile.user_id.as_deref(), Some("42"));
        assert_eq!(tokens.profile.first_name, "Mona");
    }

    #[tokio::test]
    async fn login_rejection_keeps_backend_message() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/login"))
            .respond_with(
                ResponseTemplate::new(401).set_body_json(json!({"message": "Wrong password"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let err = backend(&server, 2)
            .login(
                LoginInput {
                    mobile: "01012345678".into(),
                    password: "pw".into(),
                },
                Locale::En,
            )
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiError);
        assert_eq!(err.status, 401);
        assert_eq!(err.message, "Wrong password");
    }

    #[tokio::test]
    async fn server_errors_are_retried_until_success() {
        let server = MockServer::start().await;
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        Mock::given(method("GET"))
            .and(path("/api/Cart"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(move |_: &wiremock::Request| {
                if seen.fetch_add(1, Ordering::SeqCst) < 2 {
                    ResponseTemplate::new(503)
                } else {
                    ResponseTemplate::new(200).set_body_json(json!({
                        "cartProduccts": [{"id": 7, "qty": 2, "saleaPrice": 100}]
                    }))
                }
            })
            .mount(&server)
            .await;

        let snapshot = backend(&server, 2).fetch_cart(&auth()).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(snapshot.lines.len(), 1);
        assert_eq!(snapshot.lines[0].id, CartLineId(7));
    }

    #[tokio::test]
    async fn retries_stop_at_budget() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/Cart/increment/7"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        let err = backend(&server, 2)
            .increment(&auth(), CartLineId(7))
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiError);
        assert_eq!(err.status, 502);
    }

    #[tokio::test]
    async fn client_errors_are_not_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Checkout"))
            .respond_with(
                ResponseTemplate::new(400)
                    .set_body_json(json!({"title": "Bad Request", "detail": "Address not found"})),
            )
            .expect(1)
            .mount(&server)
            .await;

        let order = CheckoutOrder {
            cart_ids: vec![CartLineId(1)],
            address_id: 3,
            payment_type: PaymentType::Cash,
        };
        let err = backend(&server, 2).checkout(&auth(), &order).await.unwrap_err();
        assert_eq!(err.status, 400);
        assert_eq!(err.message, "Address not found");
        assert_eq!(err.detail.as_deref(), Some("Address not found"));
    }

    #[tokio::test]
    async fn unauthorized_with_token_is_session_expiry() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/api/Cart/7"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let err = backend(&server, 2).delete(&auth(), CartLineId(7)).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthExpired);
        assert!(err.is_auth());
    }

    #[tokio::test]
    async fn slow_upstream_times_out() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/Cart"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
            .mount(&server)
            .await;

        let fetcher = HttpFetcher::new(RetryPolicy {
            max_retries: 0,
            base_delay: Duration::from_millis(5),
            timeout: Duration::from_millis(50),
        });
        let cache = Arc::new(ResponseCache::new(Duration::from_secs(60), 10));
        let err = HttpStorefrontBackend::new(&server.uri(), fetcher, cache)
            .fetch_cart(&auth())
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::Timeout);
    }

    #[tokio::test]
    async fn refresh_sends_token_as_query() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/refreshToken"))
            .and(query_param("refreshToken", "r1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token": "a2"})))
            .expect(1)
            .mount(&server)
            .await;

        let refreshed = backend(&server, 0)
            .refresh(&RefreshToken("r1".into()))
            .await
            .unwrap();
        assert_eq!(refreshed.access_token, AccessToken("a2".into()));
        assert_eq!(refreshed.refresh_token, None);
    }

    #[tokio::test]
    async fn signup_accepts_bare_or_wrapped_user_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/SignUp"))
            .and(body_json(json!({"mobile": "01112345678"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!(77)))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/SignUp"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"userId": "u-9"})))
            .mount(&server)
            .await;

        let backend = backend(&server, 0);
        let first = backend.sign_up("01112345678".into(), Locale::En).await.unwrap();
        assert_eq!(first, "77");
        let second = backend.sign_up("01112345678".into(), Locale::En).await.unwrap();
        assert_eq!(second, "u-9");
    }

    #[tokio::test]
    async fn verify_otp_reads_plain_text_true() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/verifyUser"))
            .and(query_param("userId", "77"))
            .and(query_param("otp", "123456"))
            .respond_with(ResponseTemplate::new(200).set_body_string("true"))
            .expect(1)
            .mount(&server)
            .await;

        let verified = backend(&server, 0)
            .verify_otp(
                VerifyOtpInput {
                    user_id: "77".into(),
                    otp: "123456".into(),
                },
                Locale::En,
            )
            .await
            .unwrap();
        assert!(verified);
    }

    #[tokio::test]
    async fn set_password_issues_tokens_only_with_refresh_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/Auth/setPassword"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "userId": 77,
                "token": "a1",
                "userName": "mona",
            })))
            .mount(&server)
            .await;

        let done = backend(&server, 0)
            .set_password(
                SetPasswordInput {
                    user_id: "77".into(),
                    password: "Secret123".into(),
                },
                Locale::En,
            )
            .await
            .unwrap();
        assert!(done.tokens.is_none());
        assert_eq!(done.profile.user_id.as_deref(), Some("77"));
        assert_eq!(done.profile.user_name, "mona");
    }

    #[tokio::test]
    async fn complete_profile_is_an_authorized_put() {
        let server = MockServer::start().await;
        Mock::given(method("PUT"))
            .and(path("/api/UserData"))
            .and(header("authorization", "Bearer access-1"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let profile = ProfileInput {
            first_name: "Mona".into(),
            last_name: "Said".into(),
            birthdate: chrono::Utc::now(),
            gender: Gender::Female,
        };
        let err = backend(&server, 0)
            .complete_profile(&auth(), &profile)
            .await
            .unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthExpired);
    }

    #[tokio::test]
    async fn shipping_offer_is_cached_per_locale() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ShippingOffer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"orderMinValue": 1000, "value": 50, "valueText": "50 %"}
            ])))
            .expect(2)
            .mount(&server)
            .await;

        let backend = backend(&server, 0);
        let first = backend.shipping_offer(Locale::En).await;
        let second = backend.shipping_offer(Locale::En).await;
        let arabic = backend.shipping_offer(Locale::Ar).await;
        assert_eq!(first, second);
        assert_eq!(first, arabic);
        assert_eq!(first.order_min_value, rust_decimal::Decimal::from(1000));
        assert_eq!(first.discount_text, "50 %");
    }

    #[tokio::test]
    async fn shipping_offer_falls_back_to_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/ShippingOffer"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let offer = backend(&server, 0).shipping_offer(Locale::Ar).await;
        assert_eq!(offer, ShippingOffer::default());
    }
}
