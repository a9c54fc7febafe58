use super::{Cache, CacheKey, CachedRows};
use lru::LruCache as KeyOrder;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;

/// Default entry bound when a zero size is requested
pub const DEFAULT_LRU_SIZE: usize = 1024;

/// Size-bounded decorator: evicts the least recently used key from the delegate
pub struct LruCache {
    delegate: Arc<dyn Cache>,
    keys: Mutex<KeyOrder<CacheKey, ()>>,
}

impl LruCache {
    pub fn new(delegate: Arc<dyn Cache>, size: usize) -> Self {
        let capacity = NonZeroUsize::new(size)
            .unwrap_or(NonZeroUsize::MIN.saturating_add(DEFAULT_LRU_SIZE - 1));
        Self {
            delegate,
            keys: Mutex::new(KeyOrder::new(capacity)),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.keys.lock().cap().get()
    }
}

impl Cache for LruCache {
    fn id(&self) -> &str {
        self.delegate.id()
    }

    fn get(&self, key: &CacheKey) -> Option<CachedRows> {
        // touch
        self.keys.lock().get(key);
        self.delegate.get(key)
    }

    fn put(&self, key: CacheKey, value: CachedRows) {
        // Held across the delegate writes so the order list and the delegate agree
        let mut keys = self.keys.lock();
        let evicted = keys.push(key.clone(), ());
        self.delegate.put(key.clone(), value);
        if let Some((eldest, ())) = evicted {
            if eldest != key {
                self.delegate.remove(&eldest);
            }
        }
    }

    fn remove(&self, key: &CacheKey) -> Option<CachedRows> {
        let mut keys = self.keys.lock();
        keys.pop(key);
        self.delegate.remove(key)
    }

    fn clear(&self) {
        let mut keys = self.keys.lock();
        keys.clear();
        self.delegate.clear();
    }

    fn size(&self) -> usize {
        self.delegate.size()
    }
}
