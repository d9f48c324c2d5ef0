use crate::application_port::{ErrorCode, UpstreamError};
use crate::domain_model::*;
use crate::domain_port::*;
use serde_json::{Value, json};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// OTP accepted by [`MemoryStorefrontBackend`] unless replaced with `with_otp`.
pub const MEMORY_OTP: &str = "123456";

#[derive(Debug, Clone)]
struct Signup {
    mobile: String,
    verified: bool,
}

#[derive(Default)]
struct MemoryState {
    lines: Vec<CartLine>,
    failing: HashSet<CartLineId>,
    credentials: Option<(String, String)>,
    refresh_fails: bool,
    revoked: bool,
    issued: u64,
    refresh_tokens_seen: Vec<RefreshToken>,
    orders: u64,
    offer: ShippingOffer,
    signups: HashMap<String, Signup>,
    otp: Option<String>,
    profile: Option<ProfileInput>,
}

impl MemoryState {
    fn issue(&mut self, mobile: String) -> IssuedTokens {
        self.revoked = false;
        let n = self.issued;
        self.issued += 1;
        IssuedTokens {
            access_token: AccessToken(format!("access-{n}")),
            refresh_token: RefreshToken(format!("refresh-{n}")),
            profile: UserProfile {
                user_id: Some(format!("user-{mobile}")),
                mobile: Some(mobile),
                first_name: "Demo".to_string(),
                last_name: "Shopper".to_string(),
                user_name: "demo".to_string(),
                email: None,
            },
        }
    }
}

/// In-process stand-in for the storefront backend, selected with the `fake`
/// backend setting and used by tests to script failures.
#[derive(Default)]
pub struct MemoryStorefrontBackend {
    state: Mutex<MemoryState>,
    latency: Duration,
    refresh_calls: AtomicUsize,
    mutation_calls: AtomicUsize,
}

impl MemoryStorefrontBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lines(self, lines: Vec<CartLine>) -> Self {
        self.lock().lines = lines;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Only this mobile/password pair may log in. Without it any valid input is accepted.
    pub fn with_credentials(self, mobile: &str, password: &str) -> Self {
        self.lock().credentials = Some((mobile.to_string(), password.to_string()));
        self
    }

    pub fn with_otp(self, otp: &str) -> Self {
        self.lock().otp = Some(otp.to_string());
        self
    }

    pub fn with_offer(self, offer: ShippingOffer) -> Self {
        self.lock().offer = offer;
        self
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_mutations_on(&self, id: CartLineId) {
        self.lock().failing.insert(id);
    }

    pub fn fail_refresh(&self, fail: bool) {
        self.lock().refresh_fails = fail;
    }

    /// Every token issued so far is rejected with 401 from now on.
    pub fn revoke_tokens(&self) {
        self.lock().revoked = true;
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn mutation_calls(&self) -> usize {
        self.mutation_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_tokens_seen(&self) -> Vec<RefreshToken> {
        self.lock().refresh_tokens_seen.clone()
    }

    pub fn cart_lines(&self) -> Vec<CartLine> {
        self.lock().lines.clone()
    }

    /// Last profile stored through `complete_profile`.
    pub fn completed_profile(&self) -> Option<ProfileInput> {
        self.lock().profile.clone()
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }

    fn authorize(&self, auth: &AuthContext) -> Result<(), UpstreamError> {
        if self.lock().revoked || auth.token.0.is_empty() {
            return Err(UpstreamError::localized(ErrorCode::AuthExpired, auth.locale));
        }
        Ok(())
    }

    async fn mutate(
        &self,
        auth: &AuthContext,
        id: CartLineId,
        apply: impl FnOnce(&mut Vec<CartLine>, usize),
    ) -> Result<(), UpstreamError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.authorize(auth)?;

        let mut state = self.lock();
        if state.failing.contains(&id) {
            return Err(UpstreamError::localized(ErrorCode::ApiError, auth.locale));
        }
        let Some(index) = state.lines.iter().position(|line| line.id == id) else {
            return Err(UpstreamError::new(ErrorCode::ApiError, 404, "Cart item not found"));
        };
        apply(&mut state.lines, index);
        Ok(())
    }
}

#[async_trait::async_trait]
impl AuthBackend for MemoryStorefrontBackend {
    async fn login(&self, input: LoginInput, locale: Locale) -> Result<IssuedTokens, UpstreamError> {
        self.delay().await;
        let mut state = self.lock();
        if let Some((mobile, password)) = &state.credentials {
            if *mobile != input.mobile || *password != input.password {
                let message = match locale {
                    Locale::Ar => "رقم الهاتف أو كلمة المرور غير صحيحة",
                    Locale::En => "Invalid mobile number or password",
                };
                return Err(UpstreamError::new(ErrorCode::ApiError, 401, message));
            }
        }
        Ok(state.issue(input.mobile))
    }

    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens, UpstreamError> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        let mut state = self.lock();
        state.refresh_tokens_seen.push(refresh_token.clone());
        if state.refresh_fails || state.revoked {
            return Err(UpstreamError::new(ErrorCode::ApiError, 401, "Invalid refresh token"));
        }
        state.issued += 1;
        let n = state.issued;
        Ok(RefreshedTokens {
            access_token: AccessToken(format!("access-{n}")),
            refresh_token: Some(RefreshToken(format!("refresh-{n}"))),
        })
    }

    async fn sign_up(&self, mobile: String, _locale: Locale) -> Result<String, UpstreamError> {
        self.delay().await;
        let mut state = self.lock();
        let taken = state.credentials.as_ref().is_some_and(|(m, _)| *m == mobile);
        if taken {
            return Err(UpstreamError::new(ErrorCode::ApiError, 409, "Mobile number already registered"));
        }
        let user_id = format!("user-{mobile}");
        state.signups.insert(
            user_id.clone(),
            Signup {
                mobile,
                verified: false,
            },
        );
        Ok(user_id)
    }

    async fn verify_otp(&self, input: VerifyOtpInput, _locale: Locale) -> Result<bool, UpstreamError> {
        self.delay().await;
        let mut state = self.lock();
        let matches = input.otp == state.otp.as_deref().unwrap_or(MEMORY_OTP);
        let Some(signup) = state.signups.get_mut(&input.user_id) else {
            return Err(UpstreamError::new(ErrorCode::ApiError, 404, "User not found"));
        };
        signup.verified |= matches;
        Ok(matches)
    }

    async fn set_password(&self, input: SetPasswordInput, _locale: Locale) -> Result<PasswordSet, UpstreamError> {
        self.delay().await;
        let mut state = self.lock();
        let signup = match state.signups.get(&input.user_id) {
            Some(signup) if signup.verified => signup.clone(),
            Some(_) => return Err(UpstreamError::new(ErrorCode::ApiError, 400, "Mobile number not verified")),
            None => return Err(UpstreamError::new(ErrorCode::ApiError, 404, "User not found")),
        };
        state.credentials = Some((signup.mobile.clone(), input.password));
        let tokens = state.issue(signup.mobile);
        Ok(PasswordSet {
            profile: tokens.profile.clone(),
            tokens: Some(tokens),
        })
    }

    async fn complete_profile(&self, auth: &AuthContext, profile: &ProfileInput) -> Result<Value, UpstreamError> {
        self.delay().await;
        self.authorize(auth)?;
        self.lock().profile = Some(profile.clone());
        Ok(json!({
            "firstName": profile.first_name,
            "lastName": profile.last_name,
            "gender": u8::from(profile.gender),
        }))
    }
}

#[async_trait::async_trait]
impl CartBackend for MemoryStorefrontBackend {
    async fn fetch_cart(&self, auth: &AuthContext) -> Result<CartSnapshot, UpstreamError> {
        self.delay().await;
        self.authorize(auth)?;
        Ok(CartSnapshot::new(self.lock().lines.clone()))
    }

    async fn add_item(&self, auth: &AuthContext, item: &AddToCart) -> Result<serde_json::Value, UpstreamError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.authorize(auth)?;

        let qty = u32::try_from(item.qty).unwrap_or(u32::MAX);
        let mut state = self.lock();
        if let Some(line) = state
            .lines
            .iter_mut()
            .find(|line| line.product_detail_id == Some(item.product_detail_id))
        {
            line.qty = line.qty.saturating_add(qty);
            return Ok(json!({ "id": line.id, "qty": line.qty }));
        }
        let id = CartLineId(state.lines.iter().map(|l| l.id.0).max().unwrap_or(0) + 1);
        state.lines.push(CartLine {
            id,
            product_id: None,
            product_detail_id: Some(item.product_detail_id),
            product_name: format!("product-{}", item.product_detail_id),
            product_image: None,
            color_name: None,
            size_name: None,
            qty,
            sale_price: None,
            discount_price: None,
        });
        Ok(json!({ "id": id, "qty": qty }))
    }

    async fn increment(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError> {
        self.mutate(auth, id, |lines, i| lines[i].qty = lines[i].qty.saturating_add(1))
            .await
    }

    async fn decrement(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError> {
        self.mutate(auth, id, |lines, i| {
            if lines[i].qty > 1 {
                lines[i].qty -= 1;
            }
        })
        .await
    }

    async fn delete(&self, auth: &AuthContext, id: CartLineId) -> Result<(), UpstreamError> {
        self.mutate(auth, id, |lines, i| {
            lines.remove(i);
        })
        .await
    }

    async fn clear(&self, auth: &AuthContext) -> Result<(), UpstreamError> {
        self.mutation_calls.fetch_add(1, Ordering::SeqCst);
        self.delay().await;
        self.authorize(auth)?;
        self.lock().lines.clear();
        Ok(())
    }

    async fn checkout(&self, auth: &AuthContext, order: &CheckoutOrder) -> Result<serde_json::Value, UpstreamError> {
        self.delay().await;
        self.authorize(auth)?;

        let mut state = self.lock();
        if let Some(missing) = order
            .cart_ids
            .iter()
            .find(|id| !state.lines.iter().any(|line| line.id == **id))
        {
            return Err(UpstreamError::from(ValidationError::UnknownLine(*missing)));
        }
        state.lines.retain(|line| !order.cart_ids.contains(&line.id));
        state.orders += 1;
        Ok(json!({ "orderId": state.orders, "items": order.cart_ids.len() }))
    }

    async fn shipping_offer(&self, _locale: Locale) -> ShippingOffer {
        self.lock().offer.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::fixtures::line;

    fn auth() -> AuthContext {
        AuthContext {
            token: AccessToken("access-0".into()),
            locale: Locale::En,
        }
    }

    #[tokio::test]
    async fn login_honours_configured_credentials() {
        let backend = MemoryStorefrontBackend::new().with_credentials("01012345678", "secret");
        let input = |password: &str| LoginInput {
            mobile: "01012345678".into(),
            password: password.into(),
        };

        let err = backend.login(input("nope"), Locale::En).await.unwrap_err();
        assert_eq!(err.status, 401);
        let tokens = backend.login(input("secret"), Locale::En).await.unwrap();
        assert_eq!(tokens.access_token, AccessToken("access-0".into()));
    }

    #[tokio::test]
    async fn signup_needs_verification_before_password() {
        let backend = MemoryStorefrontBackend::new().with_otp("654321");
        let user_id = backend.sign_up("01112345678".into(), Locale::En).await.unwrap();

        let set = |password: &str| SetPasswordInput {
            user_id: user_id.clone(),
            password: password.into(),
        };
        let err = backend.set_password(set("Secret123"), Locale::En).await.unwrap_err();
        assert_eq!(err.status, 400);

        let verify = |otp: &str| VerifyOtpInput {
            user_id: user_id.clone(),
            otp: otp.into(),
        };
        assert!(!backend.verify_otp(verify(MEMORY_OTP), Locale::En).await.unwrap());
        assert!(backend.verify_otp(verify("654321"), Locale::En).await.unwrap());

        let done = backend.set_password(set("Secret123"), Locale::En).await.unwrap();
        assert!(done.tokens.is_some());
        let login = LoginInput {
            mobile: "01112345678".into(),
            password: "Secret123".into(),
        };
        assert!(backend.login(login, Locale::En).await.is_ok());
        let err = backend.sign_up("01112345678".into(), Locale::En).await.unwrap_err();
        assert_eq!(err.status, 409);
    }

    #[tokio::test]
    async fn add_item_merges_same_detail() {
        let backend = MemoryStorefrontBackend::new().with_lines(vec![line(1, 1, 10)]);
        let item = AddToCart {
            product_detail_id: 1000,
            qty: 2,
        };
        backend.add_item(&auth(), &item).await.unwrap();
        assert_eq!(backend.cart_lines()[0].qty, 3);

        let item = AddToCart {
            product_detail_id: 42,
            qty: 1,
        };
        backend.add_item(&auth(), &item).await.unwrap();
        assert_eq!(backend.cart_lines().len(), 2);
    }

    #[tokio::test]
    async fn checkout_removes_ordered_lines() {
        let backend = MemoryStorefrontBackend::new().with_lines(vec![line(1, 1, 10), line(2, 1, 10)]);
        let order = CheckoutOrder {
            cart_ids: vec![CartLineId(1)],
            address_id: 4,
            payment_type: PaymentType::Cash,
        };
        let receipt = backend.checkout(&auth(), &order).await.unwrap();
        assert_eq!(receipt["orderId"], 1);
        assert_eq!(backend.cart_lines().len(), 1);
    }

    #[tokio::test]
    async fn revoked_tokens_are_rejected() {
        let backend = MemoryStorefrontBackend::new();
        backend.revoke_tokens();
        let err = backend.fetch_cart(&auth()).await.unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthExpired);
    }
}
