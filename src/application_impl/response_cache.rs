use crate::domain_model::Locale;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub method: &'static str,
    pub endpoint: String,
    pub locale: Locale,
}

impl CacheKey {
    pub fn get(endpoint: impl Into<String>, locale: Locale) -> Self {
        Self {
            method: "GET",
            endpoint: endpoint.into(),
            locale,
        }
    }
}

struct CacheEntry {
    value: serde_json::Value,
    expires_at: Instant,
}

#[derive(Default)]
struct CacheEntries {
    map: HashMap<CacheKey, CacheEntry>,
    order: VecDeque<CacheKey>,
}

/// Bounded TTL cache for upstream GET bodies. Over capacity, the oldest
/// insertion is evicted first.
pub struct ResponseCache {
    ttl: Duration,
    capacity: usize,
    entries: Mutex<CacheEntries>,
}

impl ResponseCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            ttl,
            capacity,
            entries: Mutex::new(CacheEntries::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
        let mut entries = self.lock();
        let now = Instant::now();
        let expired = match entries.map.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };
        if expired {
            entries.map.remove(key);
            entries.order.retain(|k| k != key);
        }
        None
    }

    pub fn insert(&self, key: CacheKey, value: serde_json::Value) {
        self.insert_with_ttl(key, value, self.ttl);
    }

    pub fn insert_with_ttl(&self, key: CacheKey, value: serde_json::Value, ttl: Duration) {
        if self.capacity == 0 {
            return;
        }
        let mut entries = self.lock();
        let expires_at = Instant::now() + ttl;
        if entries.map.insert(key.clone(), CacheEntry { value, expires_at }).is_some() {
            entries.order.retain(|k| *k != key);
        }
        entries.order.push_back(key);

        while entries.map.len() > self.capacity {
            let Some(oldest) = entries.order.pop_front() else {
                break;
            };
            entries.map.remove(&oldest);
            debug!(endpoint = %oldest.endpoint, "response cache evicted oldest entry");
        }
    }

    pub fn purge_expired(&self) -> usize {
        let mut entries = self.lock();
        let now = Instant::now();
        let before = entries.map.len();
        entries.map.retain(|_, entry| entry.expires_at > now);
        let CacheEntries { map, order } = &mut *entries;
        order.retain(|k| map.contains_key(k));
        before - map.len()
    }

    pub fn clear(&self) {
        let mut entries = self.lock();
        entries.map.clear();
        entries.order.clear();
    }

    pub fn len(&self) -> usize {
        self.lock().map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn spawn_purge(self: Arc<Self>, every: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let purged = self.purge_expired();
                        debug!(purged, remaining = self.len(), "response cache purge");
                    }
                }
            }
            info!("response cache purge stopped");
        })
    }
}
