use crate::domain_model::{Locale, MessageKey, ValidationError};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    Timeout,
    Network,
    AuthRequired,
    AuthExpired,
    Validation,
    RateLimit,
    ApiError,
    Unknown,
}

impl ErrorCode {
    pub fn default_status(self) -> u16 {
        match self {
            ErrorCode::Timeout => 408,
            ErrorCode::Network => 503,
            ErrorCode::AuthRequired | ErrorCode::AuthExpired => 401,
            ErrorCode::Validation => 400,
            ErrorCode::RateLimit => 429,
            ErrorCode::ApiError | ErrorCode::Unknown => 500,
        }
    }

    pub fn message_key(self) -> MessageKey {
        match self {
            ErrorCode::Timeout => MessageKey::Timeout,
            ErrorCode::Network => MessageKey::Network,
            ErrorCode::AuthRequired => MessageKey::Unauthorized,
            ErrorCode::AuthExpired => MessageKey::SessionExpired,
            ErrorCode::Validation => MessageKey::Validation,
            ErrorCode::RateLimit => MessageKey::RateLimit,
            ErrorCode::ApiError | ErrorCode::Unknown => MessageKey::ServerError,
        }
    }

    pub fn is_auth(self) -> bool {
        matches!(self, ErrorCode::AuthRequired | ErrorCode::AuthExpired)
    }
}

/// Failure of a call to (or on behalf of) the upstream backend, already
/// classified and carrying a user-facing message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{code:?} ({status}): {message}")]
pub struct UpstreamError {
    pub code: ErrorCode,
    pub status: u16,
    pub message: String,
    pub detail: Option<String>,
}

impl UpstreamError {
    pub fn new(code: ErrorCode, status: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            status,
            message: message.into(),
            detail: None,
        }
    }

    pub fn localized(code: ErrorCode, locale: Locale) -> Self {
        Self::new(code, code.default_status(), locale.message(code.message_key()))
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn validation(error: &ValidationError) -> Self {
        Self::new(
            ErrorCode::Validation,
            ErrorCode::Validation.default_status(),
            error.to_string(),
        )
    }

    pub fn is_auth(&self) -> bool {
        self.code.is_auth()
    }
}

impl From<ValidationError> for UpstreamError {
    fn from(error: ValidationError) -> Self {
        UpstreamError::validation(&error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCode::AuthRequired).unwrap();
        assert_eq!(json, "\"AUTH_REQUIRED\"");
        let json = serde_json::to_string(&ErrorCode::ApiError).unwrap();
        assert_eq!(json, "\"API_ERROR\"");
    }

    #[test]
    fn localized_uses_locale_table() {
        let err = UpstreamError::localized(ErrorCode::Timeout, Locale::En);
        assert_eq!(err.status, 408);
        assert_eq!(err.message, "Request timeout. Please try again");
    }
}
