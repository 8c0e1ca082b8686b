use crate::RequestKey;
use mfg_relay_schema::ApiResult;
use moka::sync::Cache;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub value: ApiResult,
    pub stored_at: Instant,
}

/// Short-lived store of successful read results.
///
/// Freshness is judged against `tokio::time::Instant`; moka's own TTL only
/// bounds memory.
pub struct ResponseCache {
    store: Cache<RequestKey, CacheEntry>,
    ttl: Duration,
}

impl ResponseCache {
    pub fn new(ttl: Duration, max_capacity: u64) -> Self {
        let store = Cache::builder()
            .time_to_live(ttl.max(Duration::from_secs(1)))
            .max_capacity(max_capacity.max(1))
            .build();

        Self { store, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the cached value if it is still fresh, evicting it otherwise.
    pub fn get(&self, key: &RequestKey) -> Option<ApiResult> {
        let entry = self.store.get(key)?;
        if entry.stored_at.elapsed() > self.ttl {
            self.store.invalidate(key);
            return None;
        }
        Some(entry.value)
    }

    pub fn insert(&self, key: RequestKey, value: ApiResult) {
        self.store.insert(
            key,
            CacheEntry {
                value,
                stored_at: Instant::now(),
            },
        );
    }

    pub fn invalidate(&self, key: &RequestKey) {
        self.store.invalidate(key);
    }

    pub fn clear(&self) {
        self.store.invalidate_all();
        self.store.run_pending_tasks();
    }

    pub fn len(&self) -> u64 {
        self.store.run_pending_tasks();
        self.store.entry_count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
