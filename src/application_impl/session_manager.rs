use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{AuthBackend, Clock};
use chrono::{DateTime, Duration, Utc};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct SessionPolicy {
    pub access_ttl: Duration,
    /// Tokens with less time left than this are refreshed before use.
    pub refresh_threshold: Duration,
    /// Minimum spacing between trigger-driven refresh attempts.
    pub cooldown: Duration,
    pub check_interval: std::time::Duration,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            access_ttl: Duration::minutes(15),
            refresh_threshold: Duration::minutes(3),
            cooldown: Duration::seconds(30),
            check_interval: std::time::Duration::from_secs(2 * 60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerOutcome {
    Refreshed,
    Failed,
    /// Token still fresh, nothing to refresh.
    NotNeeded,
    /// A refresh was attempted within the cooldown.
    CoolingDown,
    /// Already refreshing; the running refresh was awaited instead.
    Joined,
    Unusable,
}

type RefreshFuture = Shared<BoxFuture<'static, Result<AccessToken, SessionError>>>;

struct SessionInner {
    record: Option<SessionRecord>,
    in_flight: Option<RefreshFuture>,
    last_attempt: Option<DateTime<Utc>>,
    /// Bumped on sign-in and sign-out so a refresh started for an older
    /// session never lands in a newer one.
    generation: u64,
}

impl SessionInner {
    fn status(&self, now: DateTime<Utc>, threshold: Duration) -> SessionStatus {
        let Some(record) = &self.record else {
            return SessionStatus::signed_out();
        };
        let state = if record.error.is_some() {
            SessionState::Invalid
        } else if self.in_flight.is_some() {
            SessionState::Refreshing
        } else if record.is_fresh(now, threshold) {
            SessionState::Fresh
        } else {
            SessionState::NeedsRefresh
        };
        SessionStatus {
            state,
            access_token_expires: Some(record.access_token_expires),
            error: record.error,
        }
    }
}

enum TokenLookup {
    Ready(AccessToken),
    Refresh(RefreshFuture),
}

/// Owns one session's tokens and keeps the access token fresh. At most one
/// refresh runs at a time; concurrent callers await the same one.
pub struct SessionManager {
    inner: Arc<Mutex<SessionInner>>,
    backend: Arc<dyn AuthBackend>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    status_tx: Arc<watch::Sender<SessionStatus>>,
}

impl SessionManager {
    pub fn new(backend: Arc<dyn AuthBackend>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::signed_out());
        Self {
            inner: Arc::new(Mutex::new(SessionInner {
                record: None,
                in_flight: None,
                last_attempt: None,
                generation: 0,
            })),
            backend,
            clock,
            policy,
            status_tx: Arc::new(status_tx),
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, inner: &SessionInner) {
        self.status_tx
            .send_replace(inner.status(self.clock.now(), self.policy.refresh_threshold));
    }

    pub fn sign_in(&self, tokens: IssuedTokens) {
        let mut inner = self.lock();
        let now = self.clock.now();
        inner.record = Some(SessionRecord::issue(tokens, now, self.policy.access_ttl));
        inner.in_flight = None;
        inner.last_attempt = None;
        inner.generation += 1;
        self.publish(&inner);
        info!(generation = inner.generation, "session signed in");
    }

    pub fn sign_out(&self) {
        let mut inner = self.lock();
        inner.record = None;
        inner.in_flight = None;
        inner.generation += 1;
        self.publish(&inner);
        info!("session signed out");
    }

    pub fn status(&self) -> SessionStatus {
        let inner = self.lock();
        inner.status(self.clock.now(), self.policy.refresh_threshold)
    }

    /// Receives every state change; an `Invalid` status means the user must sign in again.
    pub fn subscribe(&self) -> watch::Receiver<SessionStatus> {
        self.status_tx.subscribe()
    }

    pub fn profile(&self) -> Option<UserProfile> {
        self.lock().record.as_ref().map(|r| r.profile.clone())
    }

    pub fn policy(&self) -> &SessionPolicy {
        &self.policy
    }

    /// Returns a token valid for at least the refresh threshold.
    pub async fn access_token(&self) -> Result<AccessToken, SessionError> {
        let lookup = {
            let mut inner = self.lock();
            let now = self.clock.now();
            let Some(record) = &inner.record else {
                return Err(SessionError::SignedOut);
            };
            if let Some(failure) = record.error {
                return Err(SessionError::Invalid(failure));
            }
            if record.is_fresh(now, self.policy.refresh_threshold) {
                TokenLookup::Ready(record.access_token.clone())
            } else {
                TokenLookup::Refresh(self.join_or_start(&mut inner, now))
            }
        };

        match lookup {
            TokenLookup::Ready(token) => Ok(token),
            TokenLookup::Refresh(refresh) => refresh.await,
        }
    }

    /// Refresh driven by the watcher or a focus/reconnect event. Honours the cooldown.
    pub async fn trigger(&self, trigger: RefreshTrigger) -> TriggerOutcome {
        let (refresh, joined) = {
            let mut inner = self.lock();
            let now = self.clock.now();
            let Some(record) = &inner.record else {
                return TriggerOutcome::Unusable;
            };
            if record.error.is_some() {
                return TriggerOutcome::Unusable;
            }
            if let Some(running) = &inner.in_flight {
                (running.clone(), true)
            } else if record.is_fresh(now, self.policy.refresh_threshold) {
                return TriggerOutcome::NotNeeded;
            } else if inner
                .last_attempt
                .is_some_and(|at| now - at < self.policy.cooldown)
            {
                debug!(?trigger, "refresh skipped during cooldown");
                return TriggerOutcome::CoolingDown;
            } else {
                debug!(?trigger, "refresh triggered");
                (self.join_or_start(&mut inner, now), false)
            }
        };

        match (refresh.await, joined) {
            (_, true) => TriggerOutcome::Joined,
            (Ok(_), false) => TriggerOutcome::Refreshed,
            (Err(_), false) => TriggerOutcome::Failed,
        }
    }

    /// Marks the session unusable without contacting the backend.
    pub fn invalidate(&self, failure: SessionFailure) {
        let mut inner = self.lock();
        let Some(record) = inner.record.as_mut() else {
            return;
        };
        if record.error.is_some() {
            return;
        }
        record.error = Some(failure);
        inner.in_flight = None;
        // a refresh still in flight must not revive the session
        inner.generation += 1;
        self.publish(&inner);
        warn!(?failure, "session invalidated");
    }

    pub fn spawn_watcher(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.check_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if self.trigger(RefreshTrigger::Interval).await == TriggerOutcome::Unusable {
                            debug!("session watcher idle: no usable session");
                        }
                    }
                }
            }
            info!("session watcher stopped");
        })
    }

    fn join_or_start(&self, inner: &mut SessionInner, now: DateTime<Utc>) -> RefreshFuture {
        if let Some(running) = &inner.in_flight {
            return running.clone();
        }
        let Some(record) = &inner.record else {
            return futures_util::future::ready(Err(SessionError::SignedOut))
                .boxed()
                .shared();
        };

        let refresh = run_refresh(
            self.inner.clone(),
            self.backend.clone(),
            self.clock.clone(),
            self.policy.clone(),
            self.status_tx.clone(),
            record.refresh_token.clone(),
            inner.generation,
        )
        .boxed()
        .shared();

        inner.last_attempt = Some(now);
        inner.in_flight = Some(refresh.clone());
        self.publish(inner);
        refresh
    }
}

async fn run_refresh(
    inner: Arc<Mutex<SessionInner>>,
    backend: Arc<dyn AuthBackend>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
    status_tx: Arc<watch::Sender<SessionStatus>>,
    refresh_token: RefreshToken,
    generation: u64,
) -> Result<AccessToken, SessionError> {
    let result = backend.refresh(&refresh_token).await;

    let mut inner = inner.lock().unwrap_or_else(PoisonError::into_inner);
    if inner.generation != generation {
        debug!("refresh finished for a replaced session, discarded");
        return match inner.record.as_ref().and_then(|record| record.error) {
            Some(failure) => Err(SessionError::Invalid(failure)),
            None => Err(SessionError::SignedOut),
        };
    }
    inner.in_flight = None;

    let now = clock.now();
    let outcome = match (result, inner.record.as_mut()) {
        (_, None) => Err(SessionError::SignedOut),
        (Ok(tokens), Some(record)) => {
            record.install(tokens, now, policy.access_ttl);
            info!(expires = %record.access_token_expires, "access token refreshed");
            Ok(record.access_token.clone())
        }
        (Err(error), Some(record)) => {
            record.error = Some(SessionFailure::RefreshFailed);
            warn!(code = ?error.code, status = error.status, "token refresh failed, session invalid");
            Err(SessionError::Refresh(error))
        }
    };

    status_tx.send_replace(inner.status(now, policy.refresh_threshold));
    outcome
}

#[async_trait::async_trait]
impl TokenSource for SessionManager {
    async fn usable_token(&self) -> Result<AccessToken, SessionError> {
        self.access_token().await
    }

    fn invalidate(&self, failure: SessionFailure) {
        SessionManager::invalidate(self, failure)
    }
}
