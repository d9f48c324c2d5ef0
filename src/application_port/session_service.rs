use crate::application_port::{ErrorCode, UpstreamError};
use crate::domain_model::*;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("not signed in")]
    SignedOut,
    #[error("session is no longer valid: {0:?}")]
    Invalid(SessionFailure),
    #[error("token refresh failed: {0}")]
    Refresh(UpstreamError),
}

impl SessionError {
    /// Every session failure asks the user to authenticate again.
    pub fn to_upstream(&self, locale: Locale) -> UpstreamError {
        match self {
            SessionError::SignedOut => UpstreamError::localized(ErrorCode::AuthRequired, locale),
            SessionError::Invalid(_) | SessionError::Refresh(_) => {
                UpstreamError::localized(ErrorCode::AuthExpired, locale)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTrigger {
    Interval,
    Focus,
    Reconnect,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionStatus {
    pub state: SessionState,
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub access_token_expires: Option<DateTime<Utc>>,
    pub error: Option<SessionFailure>,
}

impl SessionStatus {
    pub fn signed_out() -> Self {
        Self {
            state: SessionState::SignedOut,
            access_token_expires: None,
            error: None,
        }
    }
}

/// Supplier of bearer tokens for authorized backend calls.
#[async_trait::async_trait]
pub trait TokenSource: Send + Sync {
    /// A token valid for at least the refresh threshold, refreshing (or joining
    /// an in-flight refresh) first when needed.
    async fn usable_token(&self) -> Result<AccessToken, SessionError>;
    /// The backend rejected a token; the session must not be used again.
    fn invalidate(&self, failure: SessionFailure);
}
