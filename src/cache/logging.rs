use super::{Cache, CacheKey, CachedRows};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// Decorator that counts lookups and logs the running hit ratio
pub struct LoggingCache {
    delegate: Arc<dyn Cache>,
    requests: AtomicU64,
    hits: AtomicU64,
}

impl LoggingCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            requests: AtomicU64::new(0),
            hits: AtomicU64::new(0),
        }
    }

    /// Fraction of lookups that found an entry (0.0 before the first lookup)
    #[must_use]
    pub fn hit_ratio(&self) -> f64 {
        let requests = self.requests.load(Ordering::Relaxed);
        if requests == 0 {
            return 0.0;
        }
        self.hits.load(Ordering::Relaxed) as f64 / requests as f64
    }
}

impl Cache for LoggingCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn get(&self, key: &CacheKey) -> Option<CachedRows> {
        self.requests.fetch_add(1, Ordering::Relaxed);
        let value = self.delegate.get(key);
        if value.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
        }
        debug!(cache = self.id(), hit_ratio = self.hit_ratio(), "Cache Hit Ratio");
        value
    }

    fn put(&self, key: CacheKey, value: CachedRows) {
        self.delegate.put(key, value);
    }

    fn remove(&self, key: &CacheKey) -> Option<CachedRows> {
        self.delegate.remove(key)
    }

    fn clear(&self) {
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}
