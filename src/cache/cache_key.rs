use crate::types::Value;
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

const DEFAULT_MULTIPLIER: i32 = 37;
const DEFAULT_HASHCODE: i32 = 17;

/// Composite identity of one statement execution.
///
/// Components are appended with [`CacheKey::update`] in a fixed order:
/// statement id, offset, limit, SQL text, then each effective parameter
/// value in binding order. The rolling hash, checksum and component count
/// reject most unequal keys cheaply; the component list decides equality.
#[derive(Debug, Clone)]
pub struct CacheKey {
    multiplier: i32,
    hashcode: i32,
    checksum: i64,
    count: i32,
    update_list: Vec<Value>,
}

impl CacheKey {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            multiplier: DEFAULT_MULTIPLIER,
            hashcode: DEFAULT_HASHCODE,
            checksum: 0,
            count: 0,
            update_list: Vec::new(),
        }
    }

    /// Appends one component and rolls it into the hash and checksum
    pub fn update(&mut self, component: impl Into<Value>) {
        let component = component.into();
        let mut base = Self::component_hash(&component);

        self.count = self.count.wrapping_add(1);
        self.checksum = self.checksum.wrapping_add(i64::from(base));
        base = base.wrapping_mul(self.count);
        self.hashcode = self.multiplier.wrapping_mul(self.hashcode).wrapping_add(base);

        self.update_list.push(component);
    }

    /// Appends every component of `components`, in order
    pub fn update_all<I, V>(&mut self, components: I)
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        for component in components {
            self.update(component);
        }
    }

    /// Number of components appended so far
    #[must_use]
    pub fn component_count(&self) -> usize {
        self.update_list.len()
    }

    #[must_use]
    pub fn components(&self) -> &[Value] {
        &self.update_list
    }

    #[must_use]
    pub const fn hashcode(&self) -> i32 {
        self.hashcode
    }

    // NULL hashes to 1 so that it still moves the rolling hash
    fn component_hash(component: &Value) -> i32 {
        if component.is_null() {
            return 1;
        }
        let mut hasher = DefaultHasher::new();
        component.hash(&mut hasher);
        let h = hasher.finish();
        (h ^ (h >> 32)) as i32
    }
}

impl Default for CacheKey {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        if std::ptr::eq(self, other) {
            return true;
        }
        self.hashcode == other.hashcode
            && self.checksum == other.checksum
            && self.count == other.count
            && self.update_list == other.update_list
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_i32(self.hashcode);
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.hashcode, self.checksum)?;
        for component in &self.update_list {
            write!(f, ":{component}")?;
        }
        Ok(())
    }
}
