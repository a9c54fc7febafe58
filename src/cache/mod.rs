/// Shared (second-level) cache contract and reference implementations
///
/// - `cache_key`: composite statement identity
/// - `perpetual`: unbounded map-backed cache
/// - `lru_cache`: size-bounded decorator
/// - `logging`: hit-ratio decorator
/// - `transactional`: per-session commit/rollback buffer
pub mod cache_key;
pub mod perpetual;
pub mod lru_cache;
pub mod logging;
pub mod transactional;

pub use cache_key::CacheKey;
pub use perpetual::PerpetualCache;
pub use lru_cache::LruCache;
pub use logging::LoggingCache;
pub use transactional::{TransactionalCache, TransactionalCacheManager};

use crate::types::Row;
use std::sync::Arc;

/// Rows stored in a cache. Shared, never mutated after insertion.
pub type CachedRows = Arc<Vec<Row>>;

/// A cache shared by every session whose statements reference it.
///
/// Implementations are responsible for their own thread-safety.
pub trait Cache: Send + Sync {
    /// Identifier; two caches with the same id are the same cache
    fn id(&self) -> &str;

    fn get(&self, key: &CacheKey) -> Option<CachedRows>;

    fn put(&self, key: CacheKey, value: CachedRows);

    fn remove(&self, key: &CacheKey) -> Option<CachedRows>;

    fn clear(&self);

    fn size(&self) -> usize;
}

impl std::fmt::Debug for dyn Cache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cache")
            .field("id", &self.id())
            .field("size", &self.size())
            .finish()
    }
}

/// Assembles a shared cache from the reference implementations
pub struct CacheBuilder {
    id: String,
    size: Option<usize>,
    logging: bool,
}

impl CacheBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            size: None,
            logging: true,
        }
    }

    /// Bounds the cache to `size` entries, evicting least recently used
    #[must_use]
    pub const fn size(mut self, size: usize) -> Self {
        self.size = Some(size);
        self
    }

    #[must_use]
    pub const fn logging(mut self, enabled: bool) -> Self {
        self.logging = enabled;
        self
    }

    #[must_use]
    pub fn build(self) -> Arc<dyn Cache> {
        let mut cache: Arc<dyn Cache> = Arc::new(PerpetualCache::new(self.id));
        if let Some(size) = self.size {
            cache = Arc::new(LruCache::new(cache, size));
        }
        if self.logging {
            cache = Arc::new(LoggingCache::new(cache));
        }
        cache
    }
}
