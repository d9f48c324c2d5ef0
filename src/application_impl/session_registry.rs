use crate::application_impl::{SessionManager, SessionPolicy, TriggerOutcome};
use crate::application_port::RefreshTrigger;
use crate::domain_model::{IssuedTokens, SessionId};
use crate::domain_port::{AuthBackend, Clock};
use dashmap::DashMap;
use futures_util::future::join_all;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Proxy-side sessions, one [`SessionManager`] per signed-in browser.
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<SessionManager>>,
    backend: Arc<dyn AuthBackend>,
    clock: Arc<dyn Clock>,
    policy: SessionPolicy,
}

impl SessionRegistry {
    pub fn new(backend: Arc<dyn AuthBackend>, clock: Arc<dyn Clock>, policy: SessionPolicy) -> Self {
        Self {
            sessions: DashMap::new(),
            backend,
            clock,
            policy,
        }
    }

    pub fn open(&self, tokens: IssuedTokens) -> (SessionId, Arc<SessionManager>) {
        let manager = Arc::new(SessionManager::new(
            self.backend.clone(),
            self.clock.clone(),
            self.policy.clone(),
        ));
        manager.sign_in(tokens);
        let id = SessionId::generate();
        self.sessions.insert(id.clone(), manager.clone());
        (id, manager)
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<SessionManager>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn close(&self, id: &SessionId) -> bool {
        match self.sessions.remove(id) {
            Some((_, manager)) => {
                manager.sign_out();
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Refreshes sessions close to expiry and drops the ones that can no
    /// longer be used. Returns the number of sessions dropped.
    pub async fn sweep(&self) -> usize {
        let sessions: Vec<Arc<SessionManager>> =
            self.sessions.iter().map(|entry| entry.value().clone()).collect();
        let outcomes = join_all(
            sessions
                .iter()
                .map(|manager| manager.trigger(RefreshTrigger::Interval)),
        )
        .await;
        let refreshed = outcomes
            .iter()
            .filter(|o| **o == TriggerOutcome::Refreshed)
            .count();

        let before = self.sessions.len();
        self.sessions
            .retain(|_, manager| manager.status().state.is_usable());
        let dropped = before.saturating_sub(self.sessions.len());
        debug!(refreshed, dropped, active = self.sessions.len(), "session sweep");
        dropped
    }

    pub fn spawn_sweeper(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.policy.check_interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        self.sweep().await;
                    }
                }
            }
            info!(active = self.sessions.len(), "session sweeper stopped");
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain_model::*;
    use crate::infra_memory::{ManualClock, MemoryStorefrontBackend};
    use chrono::{Duration, Utc};

    fn tokens(n: u32) -> IssuedTokens {
        IssuedTokens {
            access_token: AccessToken(format!("access-{n}")),
            refresh_token: RefreshToken(format!("refresh-{n}")),
            profile: UserProfile::default(),
        }
    }

    #[tokio::test]
    async fn open_get_close() {
        let backend = Arc::new(MemoryStorefrontBackend::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = SessionRegistry::new(backend, clock, SessionPolicy::default());

        let (id, manager) = registry.open(tokens(1));
        assert!(Arc::ptr_eq(&registry.get(&id).unwrap(), &manager));
        assert!(registry.close(&id));
        assert!(registry.get(&id).is_none());
        assert!(!registry.close(&id));
        assert_eq!(manager.status().state, SessionState::SignedOut);
    }

    #[tokio::test]
    async fn sweep_refreshes_due_sessions_and_drops_invalid_ones() {
        let backend = Arc::new(MemoryStorefrontBackend::new());
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let registry = SessionRegistry::new(backend.clone(), clock.clone(), SessionPolicy::default());

        let (kept, _) = registry.open(tokens(1));
        let (revoked, manager) = registry.open(tokens(2));
        manager.invalidate(SessionFailure::Revoked);

        clock.advance(Duration::minutes(13));
        assert_eq!(registry.sweep().await, 1);
        assert!(registry.get(&kept).is_some());
        assert!(registry.get(&revoked).is_none());
        assert_eq!(backend.refresh_calls(), 1);
    }
}
