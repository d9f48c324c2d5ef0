use crate::domain_model::ClientKey;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    /// Whole seconds until the next request would be allowed; zero when allowed.
    pub retry_after: u64,
    pub reset_at: DateTime<Utc>,
}

pub trait RateLimiter: Send + Sync {
    fn check(&self, key: &ClientKey) -> RateLimitDecision;
    /// Forgets every recorded request for `key`. Returns whether a bucket existed.
    fn reset(&self, key: &ClientKey) -> bool;
    /// Drops expired timestamps and empty buckets. Returns the number of buckets removed.
    fn cleanup(&self) -> usize;
    fn tracked(&self) -> usize;
}
