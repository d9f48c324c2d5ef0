use crate::application_port::UpstreamError;
use crate::domain_model::*;
use crate::domain_port::AuthContext;
use serde_json::Value;

#[derive(Debug, Clone)]
pub struct LoginInput {
    pub mobile: String,
    pub password: String,
}

#[derive(Debug, Clone)]
pub struct VerifyOtpInput {
    pub user_id: String,
    pub otp: String,
}

#[derive(Debug, Clone)]
pub struct SetPasswordInput {
    pub user_id: String,
    pub password: String,
}

/// Outcome of choosing a password. `tokens` is present when the backend
/// signs the new account in right away.
#[derive(Debug, Clone)]
pub struct PasswordSet {
    pub profile: UserProfile,
    pub tokens: Option<IssuedTokens>,
}

#[async_trait::async_trait]
pub trait AuthBackend: Send + Sync {
    async fn login(&self, input: LoginInput, locale: Locale) -> Result<IssuedTokens, UpstreamError>;
    /// Exchange a refresh token for a new access token. Any error is terminal for the session.
    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<RefreshedTokens, UpstreamError>;

    /// Starts a signup for `mobile` and returns the new user id. An OTP is sent out of band.
    async fn sign_up(&self, mobile: String, locale: Locale) -> Result<String, UpstreamError>;
    async fn verify_otp(&self, input: VerifyOtpInput, locale: Locale) -> Result<bool, UpstreamError>;
    async fn set_password(&self, input: SetPasswordInput, locale: Locale) -> Result<PasswordSet, UpstreamError>;
    async fn complete_profile(&self, auth: &AuthContext, profile: &ProfileInput) -> Result<Value, UpstreamError>;
}
