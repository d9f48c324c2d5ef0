use crate::application_port::*;
use crate::domain_model::{Locale, MessageKey};
use serde::Serialize;
use std::convert::Infallible;
use tracing::warn;
use warp::http::header::{HeaderValue, RETRY_AFTER};
use warp::http::StatusCode;
use warp::{Rejection, Reply, reject};

#[derive(Debug, Clone)]
pub enum ApiRejection {
    RateLimited { retry_after: u64, locale: Locale },
    Unauthorized { locale: Locale },
}

impl reject::Reject for ApiRejection {}

/// Serializes the envelope with an HTTP status equal to its `status` field.
pub fn envelope_reply<T: Serialize>(envelope: &Envelope<T>) -> warp::reply::Response {
    let status = StatusCode::from_u16(envelope.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(envelope), status).into_response()
}

fn rate_limited(retry_after: u64, locale: Locale) -> warp::reply::Response {
    let envelope = Envelope::<()>::err(
        ErrorCode::RateLimit,
        ErrorCode::RateLimit.default_status(),
        locale.retry_after_message(retry_after),
    );
    let mut response = envelope_reply(&envelope);
    let headers = response.headers_mut();
    headers.insert(RETRY_AFTER, HeaderValue::from(retry_after));
    headers.insert("X-RateLimit-Remaining", HeaderValue::from_static("0"));
    response
}

pub async fn recover_error(err: Rejection) -> Result<impl Reply, Infallible> {
    let locale = Locale::default();
    let response = if let Some(rejection) = err.find::<ApiRejection>() {
        match rejection {
            ApiRejection::RateLimited {
                retry_after,
                locale,
            } => rate_limited(*retry_after, *locale),
            ApiRejection::Unauthorized { locale } => envelope_reply(&Envelope::<()>::from(
                UpstreamError::localized(ErrorCode::AuthRequired, *locale),
            )),
        }
    } else if err.is_not_found() {
        envelope_reply(&Envelope::<()>::err(ErrorCode::Unknown, 404, "Not found"))
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        warn!(error = %e, "malformed request body");
        envelope_reply(&Envelope::<()>::err(
            ErrorCode::Validation,
            400,
            locale.message(MessageKey::Validation),
        ))
    } else if let Some(e) = err.find::<warp::reject::InvalidQuery>() {
        warn!(error = %e, "malformed query string");
        envelope_reply(&Envelope::<()>::err(
            ErrorCode::Validation,
            400,
            locale.message(MessageKey::Validation),
        ))
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        envelope_reply(&Envelope::<()>::err(ErrorCode::Unknown, 405, "Method not allowed"))
    } else {
        warn!(rejection = ?err, "unhandled rejection");
        envelope_reply(&Envelope::<()>::err(
            ErrorCode::Unknown,
            500,
            locale.message(MessageKey::ServerError),
        ))
    };
    Ok(response)
}
