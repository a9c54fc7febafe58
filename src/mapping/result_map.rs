use crate::types::{Result, SqlMapError};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

/// Result shape metadata. Only nesting is tracked here; column mapping
/// belongs to the result-mapping layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResultMap {
    id: String,
    has_nested_result_maps: bool,
    has_nested_queries: bool,
}

impl ResultMap {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            has_nested_result_maps: false,
            has_nested_queries: false,
        }
    }

    #[must_use]
    pub const fn nested_result_maps(mut self, nested: bool) -> Self {
        self.has_nested_result_maps = nested;
        self
    }

    #[must_use]
    pub const fn nested_queries(mut self, nested: bool) -> Self {
        self.has_nested_queries = nested;
        self
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub const fn has_nested_result_maps(&self) -> bool {
        self.has_nested_result_maps
    }

    #[must_use]
    pub const fn has_nested_queries(&self) -> bool {
        self.has_nested_queries
    }
}

/// Result maps known to a configuration, shared with the statements built from it
#[derive(Debug, Default)]
pub struct ResultMapRegistry {
    maps: RwLock<HashMap<String, Arc<ResultMap>>>,
}

impl ResultMapRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, result_map: ResultMap) -> Result<Arc<ResultMap>> {
        let mut maps = self.maps.write();
        if maps.contains_key(result_map.id()) {
            return Err(SqlMapError::Configuration(format!(
                "Result Maps collection already contains value for {}",
                result_map.id()
            )));
        }
        let result_map = Arc::new(result_map);
        maps.insert(result_map.id().to_string(), Arc::clone(&result_map));
        Ok(result_map)
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<ResultMap>> {
        self.maps.read().get(id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.maps.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.maps.read().is_empty()
    }
}
