use crate::application_port::{ErrorCode, UpstreamError};
use crate::domain_model::{Locale, MessageKey};
use reqwest::header::CONTENT_TYPE;
use reqwest::{Response, StatusCode};
use serde_json::Value;
use tracing::debug;

/// Reads the body as JSON when declared so, otherwise tries to parse the text
/// and falls back to the raw string.
pub async fn read_body(response: Response) -> (StatusCode, Value) {
    let status = response.status();
    let is_json = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("application/json"));

    let text = match response.text().await {
        Ok(text) => text,
        Err(e) => {
            debug!(error = %e, "failed to read upstream body");
            return (status, Value::Null);
        }
    };
    if text.trim().is_empty() {
        return (status, Value::Null);
    }

    let body = match serde_json::from_str::<Value>(&text) {
        Ok(value) => value,
        Err(e) => {
            if is_json {
                debug!(error = %e, "upstream declared json but sent something else");
            }
            Value::String(text)
        }
    };
    (status, body)
}

/// `detail`, then `message`, then `title`; a bare string body is used as is.
pub fn error_message(body: &Value) -> Option<String> {
    let pick = |key: &str| {
        body.get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };
    match body {
        Value::String(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
        Value::Object(_) => pick("detail").or_else(|| pick("message")).or_else(|| pick("title")),
        _ => None,
    }
}

/// Maps a decoded upstream response onto the error taxonomy. `authorized`
/// marks calls made with a bearer token, where 401 means the token expired.
pub fn into_result(
    status: StatusCode,
    body: Value,
    locale: Locale,
    authorized: bool,
) -> Result<Value, UpstreamError> {
    if status.is_success() {
        return Ok(body);
    }

    let code = match status {
        StatusCode::UNAUTHORIZED if authorized => ErrorCode::AuthExpired,
        StatusCode::REQUEST_TIMEOUT => ErrorCode::Timeout,
        StatusCode::TOO_MANY_REQUESTS => ErrorCode::RateLimit,
        _ => ErrorCode::ApiError,
    };
    let message = match code {
        ErrorCode::AuthExpired => locale.message(MessageKey::SessionExpired).to_string(),
        _ => error_message(&body).unwrap_or_else(|| locale.message(MessageKey::ServerError).to_string()),
    };
    if let Some(trace_id) = body.get("traceId").and_then(Value::as_str) {
        debug!(trace_id, status = status.as_u16(), "upstream error trace");
    }

    let error = UpstreamError::new(code, status.as_u16(), message);
    Err(match body.get("detail").and_then(Value::as_str) {
        Some(detail) => error.with_detail(detail),
        None => error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_priority_is_detail_message_title() {
        let body = json!({"title": "t", "message": "m", "detail": "d"});
        assert_eq!(error_message(&body).as_deref(), Some("d"));
        let body = json!({"title": "t", "message": "m"});
        assert_eq!(error_message(&body).as_deref(), Some("m"));
        let body = json!({"title": "t", "detail": ""});
        assert_eq!(error_message(&body).as_deref(), Some("t"));
        assert_eq!(error_message(&json!("plain text")).as_deref(), Some("plain text"));
        assert_eq!(error_message(&json!({"errors": []})), None);
    }

    #[test]
    fn unauthorized_depends_on_bearer() {
        let err = into_result(StatusCode::UNAUTHORIZED, Value::Null, Locale::En, true).unwrap_err();
        assert_eq!(err.code, ErrorCode::AuthExpired);

        let body = json!({"message": "Invalid credentials"});
        let err = into_result(StatusCode::UNAUTHORIZED, body, Locale::En, false).unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiError);
        assert_eq!(err.status, 401);
        assert_eq!(err.message, "Invalid credentials");
    }

    #[test]
    fn missing_message_falls_back_to_localized_server_error() {
        let err = into_result(StatusCode::BAD_GATEWAY, Value::Null, Locale::En, true).unwrap_err();
        assert_eq!(err.code, ErrorCode::ApiError);
        assert_eq!(err.status, 502);
        assert_eq!(err.message, Locale::En.message(MessageKey::ServerError));
    }

    #[test]
    fn success_passes_body_through() {
        let body = json!({"ok": true});
        assert_eq!(into_result(StatusCode::OK, body.clone(), Locale::Ar, true), Ok(body));
    }
}
