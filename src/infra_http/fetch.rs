use crate::application_port::{ErrorCode, UpstreamError};
use crate::domain_model::Locale;
use reqwest::{Client, Request, Response, StatusCode};
use std::time::Duration;
use tracing::warn;

/// Retry rules shared by every outbound call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(1500),
            timeout: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// Linear backoff: the n-th retry waits `base_delay * n`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay * attempt
    }

    pub fn retries_status(&self, status: StatusCode) -> bool {
        status.is_server_error()
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("request to {url} timed out after {after:?}")]
    Timeout { url: String, after: Duration },
    #[error("network error reaching {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("invalid request: {0}")]
    Request(#[source] reqwest::Error),
}

impl FetchError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, FetchError::Timeout { .. } | FetchError::Network { .. })
    }

    pub fn classify(&self, locale: Locale) -> UpstreamError {
        match self {
            FetchError::Timeout { .. } => UpstreamError::localized(ErrorCode::Timeout, locale),
            FetchError::Network { .. } => UpstreamError::localized(ErrorCode::Network, locale),
            FetchError::Request(e) => {
                UpstreamError::localized(ErrorCode::Unknown, locale).with_detail(e.to_string())
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: Client,
    policy: RetryPolicy,
}

impl HttpFetcher {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            client: Client::builder().build().unwrap_or_default(),
            policy,
        }
    }

    pub fn client(&self) -> &Client {
        &self.client
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sends once. The request future is dropped, and the connection aborted,
    /// when `timeout` elapses.
    pub async fn fetch_with_timeout(
        &self,
        request: Request,
        timeout: Duration,
    ) -> Result<Response, FetchError> {
        let url = request.url().to_string();
        match tokio::time::timeout(timeout, self.client.execute(request)).await {
            Err(_) => Err(FetchError::Timeout { url, after: timeout }),
            Ok(Err(e)) if e.is_timeout() => Err(FetchError::Timeout { url, after: timeout }),
            Ok(Err(e)) if e.is_builder() => Err(FetchError::Request(e)),
            Ok(Err(e)) => Err(FetchError::Network { url, source: e }),
            Ok(Ok(response)) => Ok(response),
        }
    }

    pub async fn fetch_with_retry(&self, request: Request) -> Result<Response, FetchError> {
        self.fetch_with_policy(request, &self.policy).await
    }

    /// Retries 5xx responses and transport errors up to `policy.max_retries`
    /// times. The last 5xx response is returned as is.
    pub async fn fetch_with_policy(
        &self,
        request: Request,
        policy: &RetryPolicy,
    ) -> Result<Response, FetchError> {
        let mut attempt: u32 = 0;
        loop {
            let replay = if attempt < policy.max_retries {
                request.try_clone()
            } else {
                None
            };
            // out of budget, or the body cannot be replayed
            let Some(current) = replay else {
                return self.fetch_with_timeout(request, policy.timeout).await;
            };
            attempt += 1;

            let delay = policy.backoff(attempt);
            match self.fetch_with_timeout(current, policy.timeout).await {
                Ok(response) if policy.retries_status(response.status()) => {
                    warn!(
                        url = %response.url(),
                        status = response.status().as_u16(),
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "upstream server error, retrying"
                    );
                }
                Ok(response) => return Ok(response),
                Err(error) if error.is_retryable() => {
                    warn!(
                        %error,
                        attempt,
                        max_retries = policy.max_retries,
                        delay_ms = delay.as_millis() as u64,
                        "upstream unreachable, retrying"
                    );
                }
                Err(error) => return Err(error),
            }
            tokio::time::sleep(delay).await;
        }
    }
}
