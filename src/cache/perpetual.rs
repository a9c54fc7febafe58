use super::{Cache, CacheKey, CachedRows};
use parking_lot::RwLock;
use std::collections::HashMap;

/// Unbounded cache backed by a hash map
#[derive(Debug)]
pub struct PerpetualCache {
    id: String,
    entries: RwLock<HashMap<CacheKey, CachedRows>>,
}

impl PerpetualCache {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Cache for PerpetualCache {
    fn id(&self) -> &str {
        &self.id
    }

    fn get(&self, key: &CacheKey) -> Option<CachedRows> {
        self.entries.read().get(key).cloned()
    }

    fn put(&self, key: CacheKey, value: CachedRows) {
        self.entries.write().insert(key, value);
    }

    fn remove(&self, key: &CacheKey) -> Option<CachedRows> {
        self.entries.write().remove(key)
    }

    fn clear(&self) {
        self.entries.write().clear();
    }

    fn size(&self) -> usize {
        self.entries.read().len()
    }
}

impl PartialEq for PerpetualCache {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}
