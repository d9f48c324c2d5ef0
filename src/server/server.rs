use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_http::*;
use crate::infra_memory::*;
use crate::logger::*;
use crate::settings::{self, Settings};
use nanoid::nanoid;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub struct Server {
    pub auth_backend: Arc<dyn AuthBackend>,
    pub cart_backend: Arc<dyn CartBackend>,
    pub sessions: Arc<SessionRegistry>,
    pub auth_limiter: Arc<dyn RateLimiter>,
    pub api_limiter: Arc<dyn RateLimiter>,
    pub cache: Arc<ResponseCache>,
    pub client_secret: Arc<[u8]>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    cancel: CancellationToken,
}

fn retry_policy(upstream: &settings::Upstream) -> RetryPolicy {
    RetryPolicy {
        max_retries: upstream.retry_attempts,
        base_delay: Duration::from_millis(upstream.retry_delay_ms),
        timeout: Duration::from_millis(upstream.timeout_ms),
    }
}

fn session_policy(session: &settings::Session) -> SessionPolicy {
    SessionPolicy {
        access_ttl: chrono::Duration::seconds(session.access_ttl_secs),
        refresh_threshold: chrono::Duration::seconds(session.refresh_threshold_secs),
        cooldown: chrono::Duration::seconds(session.refresh_cooldown_secs),
        check_interval: Duration::from_secs(session.check_interval_secs),
    }
}

fn rate_limit_policy(limit: &settings::Limit) -> RateLimitPolicy {
    RateLimitPolicy {
        limit: limit.limit,
        window: Duration::from_secs(limit.window_secs),
        max_tracked: limit.max_tracked,
    }
}

impl Server {
    /// Builds the backend named by `upstream.backend` and starts the server on it.
    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let cache = Arc::new(ResponseCache::new(
            Duration::from_secs(settings.cache.ttl_secs),
            settings.cache.capacity,
        ));

        let (auth_backend, cart_backend): (Arc<dyn AuthBackend>, Arc<dyn CartBackend>) =
            match settings.upstream.backend.as_str() {
                "fake" => {
                    let backend = Arc::new(MemoryStorefrontBackend::new());
                    (backend.clone(), backend)
                }
                "real" => {
                    let fetcher = HttpFetcher::new(retry_policy(&settings.upstream));
                    let backend = Arc::new(
                        HttpStorefrontBackend::new(&settings.upstream.base_url, fetcher, cache.clone())
                            .with_refresh_timeout(Duration::from_millis(
                                settings.upstream.refresh_timeout_ms,
                            ))
                            .with_shipping_offer_ttl(Duration::from_secs(
                                settings.upstream.shipping_offer_ttl_secs,
                            )),
                    );
                    (backend.clone(), backend)
                }
                other => return Err(anyhow::anyhow!("Unknown upstream backend: {}", other)),
            };
        info!(backend = %settings.upstream.backend, base_url = %settings.upstream.base_url, "upstream selected");

        Ok(Self::build(settings, auth_backend, cart_backend, cache))
    }

    /// Wires the services around the given backends and spawns the
    /// background sweepers. Must run inside a tokio runtime.
    pub fn build(
        settings: &Settings,
        auth_backend: Arc<dyn AuthBackend>,
        cart_backend: Arc<dyn CartBackend>,
        cache: Arc<ResponseCache>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let client_secret: Arc<[u8]> = std::env::var("STOREFRONT_CLIENT_SECRET")
            .unwrap_or_else(|_| nanoid!(32))
            .into_bytes()
            .into();

        let sessions = Arc::new(SessionRegistry::new(
            auth_backend.clone(),
            Arc::new(SystemClock),
            session_policy(&settings.session),
        ));
        let auth_limiter = Arc::new(SlidingWindowRateLimiter::new(
            "auth",
            rate_limit_policy(&settings.rate_limit.auth),
        ));
        let api_limiter = Arc::new(SlidingWindowRateLimiter::new(
            "api",
            rate_limit_policy(&settings.rate_limit.api),
        ));

        let cleanup_every = Duration::from_secs(settings.rate_limit.cleanup_interval_secs);
        let tasks = vec![
            auth_limiter.clone().spawn_cleanup(cleanup_every, cancel.clone()),
            api_limiter.clone().spawn_cleanup(cleanup_every, cancel.clone()),
            cache.clone().spawn_purge(
                Duration::from_secs(settings.cache.purge_interval_secs),
                cancel.clone(),
            ),
            sessions.clone().spawn_sweeper(cancel.clone()),
        ];

        info!("server started");

        Self {
            auth_backend,
            cart_backend,
            sessions,
            auth_limiter,
            api_limiter,
            cache,
            client_secret,
            tasks: Mutex::new(tasks),
            cancel,
        }
    }

    pub async fn shutdown(&self) {
        info!("server shutting down...");

        self.cancel.cancel();

        let tasks = std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in tasks {
            let r = handle.await;
            debug!("background task stopped: {:?}", r);
        }
        self.cache.clear();
        info!(open_sessions = self.sessions.len(), "server stopped");
    }
}
