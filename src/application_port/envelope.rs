use crate::application_port::{ErrorCode, UpstreamError};
use serde::{Deserialize, Serialize};

/// `{success, data?, error?, errorCode?, status}`: the only shape the UI ever sees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_code: Option<ErrorCode>,
    pub status: u16,
}

impl<T> Envelope<T> {
    pub fn ok(data: T) -> Self {
        Self::ok_with_status(data, 200)
    }

    pub fn ok_with_status(data: T, status: u16) -> Self {
        Envelope {
            success: true,
            data: Some(data),
            error: None,
            error_code: None,
            status,
        }
    }

    pub fn err(code: ErrorCode, status: u16, message: impl Into<String>) -> Self {
        Envelope {
            success: false,
            data: None,
            error: Some(message.into()),
            error_code: Some(code),
            status,
        }
    }

    pub fn from_result(result: Result<T, UpstreamError>) -> Self {
        match result {
            Ok(data) => Envelope::ok(data),
            Err(error) => Envelope::from(error),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Envelope<U> {
        Envelope {
            success: self.success,
            data: self.data.map(f),
            error: self.error,
            error_code: self.error_code,
            status: self.status,
        }
    }
}

impl<T> From<UpstreamError> for Envelope<T> {
    fn from(error: UpstreamError) -> Self {
        Envelope::err(error.code, error.status, error.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_omits_error_fields() {
        let json = serde_json::to_value(Envelope::ok(5)).unwrap();
        assert_eq!(json, serde_json::json!({"success": true, "data": 5, "status": 200}));
    }

    #[test]
    fn failure_carries_code_and_status() {
        let err = UpstreamError::new(ErrorCode::ApiError, 404, "not found");
        let json = serde_json::to_value(Envelope::<()>::from(err)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "success": false,
                "error": "not found",
                "errorCode": "API_ERROR",
                "status": 404
            })
        );
    }
}
