use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::time::Instant;
use tracing::debug;

/// Memoizes dashboard payloads for the reader.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DashboardCache: Send + Sync {
    async fn get(&self, key: &str) -> Option<Value>;

    async fn put(&self, key: &str, value: Value, ttl: Duration);

    async fn invalidate(&self, key: &str);
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: Value,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub hit_rate: f64,
}

/// In-process `key -> {value, expires_at}` map. Expired entries are dropped
/// lazily on lookup.
#[derive(Default)]
pub struct TtlCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl TtlCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn stats(&self) -> CacheStats {
        let hits = self.hits.load(Ordering::Relaxed);
        let misses = self.misses.load(Ordering::Relaxed);
        let total = hits + misses;

        CacheStats {
            hits,
            misses,
            entries: self.entries.read().await.len(),
            hit_rate: if total == 0 { 0.0 } else { hits as f64 / total as f64 },
        }
    }

    fn record_miss(&self, key: &str) -> Option<Value> {
        self.misses.fetch_add(1, Ordering::Relaxed);
        debug!("Dashboard cache miss: key={}", key);
        None
    }
}

#[async_trait]
impl DashboardCache for TtlCache {
    async fn get(&self, key: &str) -> Option<Value> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get(key) {
            Some(entry) => entry.is_expired(),
            None => return self.record_miss(key),
        };

        if expired {
            entries.remove(key);
            return self.record_miss(key);
        }

        self.hits.fetch_add(1, Ordering::Relaxed);
        debug!("Dashboard cache hit: key={}", key);
        entries.get(key).map(|entry| entry.value.clone())
    }

    async fn put(&self, key: &str, value: Value, ttl: Duration) {
        let entry = CacheEntry {
            value,
            expires_at: Instant::now() + ttl,
        };

        self.entries.write().await.insert(key.to_string(), entry);
        debug!("Dashboard cache set: key={}, ttl={:?}", key, ttl);
    }

    async fn invalidate(&self, key: &str) {
        self.entries.write().await.remove(key);
    }
}

/// Never stores anything; every read goes to the source.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopCache;

#[async_trait]
impl DashboardCache for NoopCache {
    async fn get(&self, _key: &str) -> Option<Value> {
        None
    }

    async fn put(&self, _key: &str, _value: Value, _ttl: Duration) {}

    async fn invalidate(&self, _key: &str) {}
}
