use super::{Cache, CacheKey, CachedRows};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Pending writes for one shared cache within one session
pub struct TransactionalCache {
    delegate: Arc<dyn Cache>,
    clear_on_commit: bool,
    entries_to_add_on_commit: HashMap<CacheKey, CachedRows>,
}

impl TransactionalCache {
    pub fn new(delegate: Arc<dyn Cache>) -> Self {
        Self {
            delegate,
            clear_on_commit: false,
            entries_to_add_on_commit: HashMap::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        self.delegate.id()
    }

    /// Session view: a pending clear hides everything, then pending puts, then the shared cache
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<CachedRows> {
        if self.clear_on_commit {
            return None;
        }
        if let Some(pending) = self.entries_to_add_on_commit.get(key) {
            return Some(Arc::clone(pending));
        }
        self.delegate.get(key)
    }

    pub fn put(&mut self, key: CacheKey, value: CachedRows) {
        self.entries_to_add_on_commit.insert(key, value);
    }

    pub fn clear(&mut self) {
        self.clear_on_commit = true;
        self.entries_to_add_on_commit.clear();
    }

    /// Applies the pending clear, then the pending puts, to the shared cache
    pub fn commit(&mut self) {
        if self.clear_on_commit {
            self.delegate.clear();
        }
        for (key, value) in self.entries_to_add_on_commit.drain() {
            self.delegate.put(key, value);
        }
        self.reset();
    }

    pub fn rollback(&mut self) {
        self.reset();
    }

    #[must_use]
    pub fn pending_puts(&self) -> usize {
        self.entries_to_add_on_commit.len()
    }

    #[must_use]
    pub const fn is_clear_pending(&self) -> bool {
        self.clear_on_commit
    }

    fn reset(&mut self) {
        self.clear_on_commit = false;
        self.entries_to_add_on_commit.clear();
    }
}

/// Per-session broker buffering writes for every shared cache the session touches.
///
/// Nothing buffered here is visible to other sessions until [`commit`](Self::commit).
/// Caches are kept in first-touch order, which is the order commit applies them in.
#[derive(Default)]
pub struct TransactionalCacheManager {
    transactional_caches: Vec<TransactionalCache>,
}

impl TransactionalCacheManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&mut self, cache: &Arc<dyn Cache>, key: &CacheKey) -> Option<CachedRows> {
        self.transactional_cache(cache).get(key)
    }

    pub fn put(&mut self, cache: &Arc<dyn Cache>, key: CacheKey, value: CachedRows) {
        self.transactional_cache(cache).put(key, value);
    }

    pub fn clear(&mut self, cache: &Arc<dyn Cache>) {
        self.transactional_cache(cache).clear();
    }

    pub fn commit(&mut self) {
        if !self.transactional_caches.is_empty() {
            debug!(caches = self.transactional_caches.len(), "Committing transactional caches");
        }
        for txc in &mut self.transactional_caches {
            txc.commit();
        }
        self.transactional_caches.clear();
    }

    pub fn rollback(&mut self) {
        if !self.transactional_caches.is_empty() {
            debug!(caches = self.transactional_caches.len(), "Rolling back transactional caches");
        }
        for txc in &mut self.transactional_caches {
            txc.rollback();
        }
        self.transactional_caches.clear();
    }

    /// Ids of the caches touched since the last commit/rollback, in touch order
    #[must_use]
    pub fn touched(&self) -> Vec<&str> {
        self.transactional_caches.iter().map(TransactionalCache::id).collect()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.transactional_caches.is_empty()
    }

    fn transactional_cache(&mut self, cache: &Arc<dyn Cache>) -> &mut TransactionalCache {
        let idx = match self
            .transactional_caches
            .iter()
            .position(|txc| txc.id() == cache.id())
        {
            Some(idx) => idx,
            None => {
                self.transactional_caches.push(TransactionalCache::new(Arc::clone(cache)));
                self.transactional_caches.len() - 1
            }
        };
        &mut self.transactional_caches[idx]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::PerpetualCache;
    use crate::types::{Row, Value};

    fn key(n: i64) -> CacheKey {
        let mut key = CacheKey::new();
        key.update(n);
        key
    }

    fn rows(n: i64) -> CachedRows {
        Arc::new(vec![Row::from_pairs([("n", Value::Integer(n))])])
    }

    fn shared(id: &str) -> Arc<dyn Cache> {
        Arc::new(PerpetualCache::new(id))
    }

    #[test]
    fn test_put_is_invisible_until_commit() {
        let cache = shared("a");
        let mut tcm = TransactionalCacheManager::new();
        let mut other = TransactionalCacheManager::new();

        tcm.put(&cache, key(1), rows(1));
        assert_eq!(tcm.get(&cache, &key(1)), Some(rows(1)));
        assert!(cache.get(&key(1)).is_none());
        assert!(other.get(&cache, &key(1)).is_none());

        tcm.commit();
        assert_eq!(cache.get(&key(1)), Some(rows(1)));
        assert_eq!(other.get(&cache, &key(1)), Some(rows(1)));
    }

    #[test]
    fn test_rollback_discards_puts() {
        let cache = shared("a");
        let mut tcm = TransactionalCacheManager::new();
        tcm.put(&cache, key(1), rows(1));
        tcm.rollback();

        let mut fresh = TransactionalCacheManager::new();
        assert!(fresh.get(&cache, &key(1)).is_none());
        assert_eq!(cache.size(), 0);
        assert!(tcm.is_empty());
    }

    #[test]
    fn test_pending_clear_hides_shared_entries() {
        let cache = shared("a");
        cache.put(key(1), rows(1));

        let mut tcm = TransactionalCacheManager::new();
        tcm.clear(&cache);
        assert!(tcm.get(&cache, &key(1)).is_none());
        // Not applied yet
        assert_eq!(cache.size(), 1);

        tcm.commit();
        assert_eq!(cache.size(), 0);
    }

    #[test]
    fn test_clear_discards_earlier_puts() {
        let cache = shared("a");
        let mut tcm = TransactionalCacheManager::new();
        tcm.put(&cache, key(1), rows(1));
        tcm.clear(&cache);
        tcm.commit();
        assert!(cache.get(&key(1)).is_none());
    }

    #[test]
    fn test_commit_applies_clear_before_puts() {
        let cache = shared("a");
        cache.put(key(9), rows(9));

        let mut tcm = TransactionalCacheManager::new();
        tcm.clear(&cache);
        tcm.put(&cache, key(1), rows(1));
        // Pending clear still hides the session's own put
        assert!(tcm.get(&cache, &key(1)).is_none());
        tcm.commit();

        assert_eq!(cache.get(&key(1)), Some(rows(1)));
        assert!(cache.get(&key(9)).is_none());
        assert_eq!(cache.size(), 1);
    }

    #[test]
    fn test_touch_order_and_identity_by_id() {
        let a = shared("a");
        let b = shared("b");
        let a_again: Arc<dyn Cache> = Arc::new(PerpetualCache::new("a"));

        let mut tcm = TransactionalCacheManager::new();
        tcm.put(&b, key(1), rows(1));
        tcm.put(&a, key(1), rows(1));
        tcm.put(&a_again, key(2), rows(2));
        assert_eq!(tcm.touched(), vec!["b", "a"]);
    }

    #[test]
    fn test_commit_resets_state() {
        let cache = shared("a");
        let mut tcm = TransactionalCacheManager::new();
        tcm.clear(&cache);
        tcm.commit();
        assert!(tcm.is_empty());

        cache.put(key(1), rows(1));
        assert_eq!(tcm.get(&cache, &key(1)), Some(rows(1)));
    }
}
