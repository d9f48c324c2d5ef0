use crate::application_port::{RateLimitDecision, RateLimiter};
use crate::domain_model::ClientKey;
use chrono::Utc;
use dashmap::DashMap;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub limit: u32,
    pub window: Duration,
    pub max_tracked: usize,
}

impl RateLimitPolicy {
    /// Login attempts: 5 per 15 minutes.
    pub fn auth() -> Self {
        Self {
            limit: 5,
            window: Duration::from_secs(15 * 60),
            max_tracked: 1000,
        }
    }

    /// General API traffic: 60 per minute.
    pub fn api() -> Self {
        Self {
            limit: 60,
            window: Duration::from_secs(60),
            max_tracked: 1000,
        }
    }
}

/// Sliding-window limiter: each client keeps the instants of its accepted
/// requests inside the current window.
pub struct SlidingWindowRateLimiter {
    name: &'static str,
    policy: RateLimitPolicy,
    buckets: DashMap<ClientKey, VecDeque<Instant>>,
}

impl SlidingWindowRateLimiter {
    pub fn new(name: &'static str, policy: RateLimitPolicy) -> Self {
        Self {
            name,
            policy,
            buckets: DashMap::new(),
        }
    }

    pub fn policy(&self) -> RateLimitPolicy {
        self.policy
    }

    pub fn spawn_cleanup(
        self: Arc<Self>,
        every: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = self.cleanup();
                        debug!(limiter = self.name, removed, tracked = self.tracked(), "rate limiter cleanup");
                    }
                }
            }
            info!(limiter = self.name, "rate limiter cleanup stopped");
        })
    }
}

fn prune(bucket: &mut VecDeque<Instant>, now: Instant, window: Duration) {
    while let Some(oldest) = bucket.front() {
        if now.saturating_duration_since(*oldest) >= window {
            bucket.pop_front();
        } else {
            break;
        }
    }
}

fn whole_seconds(duration: Duration) -> u64 {
    duration.as_millis().div_ceil(1000) as u64
}

impl RateLimiter for SlidingWindowRateLimiter {
    fn check(&self, key: &ClientKey) -> RateLimitDecision {
        // must run before taking an entry guard
        if self.buckets.len() > self.policy.max_tracked {
            let removed = self.cleanup();
            debug!(limiter = self.name, removed, "tracked clients over limit, cleaned up");
        }

        let now = Instant::now();
        let wall = Utc::now();
        let window = self.policy.window;
        let limit = self.policy.limit as usize;

        let mut bucket = self.buckets.entry(key.clone()).or_default();
        prune(&mut bucket, now, window);

        if bucket.len() >= limit {
            let wait = bucket
                .front()
                .map(|oldest| (*oldest + window).saturating_duration_since(now))
                .unwrap_or(window);
            let empty = bucket.is_empty();
            drop(bucket);
            if empty {
                self.buckets.remove_if(key, |_, b| b.is_empty());
            }

            debug!(limiter = self.name, client = %key, "request rate limited");
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after: whole_seconds(wait).max(1),
                reset_at: wall
                    + chrono::Duration::from_std(wait).unwrap_or(chrono::Duration::zero()),
            };
        }

        bucket.push_back(now);
        let remaining = limit.saturating_sub(bucket.len()) as u32;

        RateLimitDecision {
            allowed: true,
            remaining,
            retry_after: 0,
            reset_at: wall + chrono::Duration::from_std(window).unwrap_or(chrono::Duration::zero()),
        }
    }

    fn reset(&self, key: &ClientKey) -> bool {
        self.buckets.remove(key).is_some()
    }

    fn cleanup(&self) -> usize {
        let now = Instant::now();
        let window = self.policy.window;
        let before = self.buckets.len();
        self.buckets.retain(|_, bucket| {
            prune(bucket, now, window);
            !bucket.is_empty()
        });
        before.saturating_sub(self.buckets.len())
    }

    fn tracked(&self) -> usize {
        self.buckets.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: &str) -> ClientKey {
        ClientKey::derive(raw, b"test-secret")
    }

    fn limiter(limit: u32, window_secs: u64) -> SlidingWindowRateLimiter {
        SlidingWindowRateLimiter::new(
            "test",
            RateLimitPolicy {
                limit,
                window: Duration::from_secs(window_secs),
                max_tracked: 1000,
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn sixth_login_attempt_is_denied() {
        let limiter = SlidingWindowRateLimiter::new("auth", RateLimitPolicy::auth());
        let client = key("10.0.0.1");

        for expected_remaining in (0..5).rev() {
            let decision = limiter.check(&client);
            assert!(decision.allowed);
            assert_eq!(decision.remaining, expected_remaining);
        }

        let denied = limiter.check(&client);
        assert!(!denied.allowed);
        assert_eq!(denied.remaining, 0);
        assert_eq!(denied.retry_after, 900);
    }

    #[tokio::test(start_paused = true)]
    async fn window_slides_past_oldest_request() {
        let limiter = limiter(2, 60);
        let client = key("10.0.0.2");

        assert!(limiter.check(&client).allowed);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(limiter.check(&client).allowed);

        let denied = limiter.check(&client);
        assert!(!denied.allowed);
        assert_eq!(denied.retry_after, 30);

        tokio::time::advance(Duration::from_secs(30)).await;
        let decision = limiter.check(&client);
        assert!(decision.allowed);
        assert_eq!(decision.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn retry_after_is_at_least_one_second() {
        let limiter = limiter(1, 10);
        let client = key("10.0.0.3");

        assert!(limiter.check(&client).allowed);
        tokio::time::advance(Duration::from_millis(9_800)).await;
        assert_eq!(limiter.check(&client).retry_after, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_limit_denies_without_tracking() {
        let limiter = limiter(0, 10);
        let decision = limiter.check(&key("10.0.0.4"));
        assert!(!decision.allowed);
        assert_eq!(limiter.tracked(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn reset_forgets_client() {
        let limiter = limiter(1, 60);
        let client = key("10.0.0.5");

        assert!(limiter.check(&client).allowed);
        assert!(!limiter.check(&client).allowed);
        assert!(limiter.reset(&client));
        assert!(limiter.check(&client).allowed);
        assert!(!limiter.reset(&key("10.0.0.6")));
    }

    #[tokio::test(start_paused = true)]
    async fn clients_are_independent() {
        let limiter = limiter(1, 60);
        assert!(limiter.check(&key("a")).allowed);
        assert!(!limiter.check(&key("a")).allowed);
        assert!(limiter.check(&key("b")).allowed);
    }

    #[tokio::test(start_paused = true)]
    async fn cleanup_drops_expired_buckets() {
        let limiter = limiter(5, 60);
        limiter.check(&key("a"));
        tokio::time::advance(Duration::from_secs(45)).await;
        limiter.check(&key("b"));
        assert_eq!(limiter.tracked(), 2);

        tokio::time::advance(Duration::from_secs(20)).await;
        assert_eq!(limiter.cleanup(), 1);
        assert_eq!(limiter.tracked(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exceeding_max_tracked_triggers_cleanup() {
        let limiter = SlidingWindowRateLimiter::new(
            "test",
            RateLimitPolicy {
                limit: 5,
                window: Duration::from_secs(60),
                max_tracked: 2,
            },
        );
        limiter.check(&key("a"));
        limiter.check(&key("b"));
        limiter.check(&key("c"));
        assert_eq!(limiter.tracked(), 3);

        tokio::time::advance(Duration::from_secs(61)).await;
        limiter.check(&key("d"));
        assert_eq!(limiter.tracked(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_cleanup_stops_on_cancel() {
        let limiter = Arc::new(limiter(5, 60));
        limiter.check(&key("a"));
        let cancel = CancellationToken::new();
        let handle = limiter.clone().spawn_cleanup(Duration::from_secs(300), cancel.clone());

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(limiter.tracked(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
