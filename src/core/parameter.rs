use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use super::value::Value;

/// The parameter object a statement is executed with.
///
/// A `Scalar` answers every property lookup with itself, the way a
/// single primitive argument binds to any placeholder name. A `Map`
/// resolves properties by name; missing names bind as NULL.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parameter {
    #[default]
    None,
    Scalar(Value),
    Map(BTreeMap<String, Value>),
}

impl Parameter {
    /// Builds a named parameter map
    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Self::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    /// Resolves the value bound to `property`
    #[must_use]
    pub fn property(&self, property: &str) -> Value {
        match self {
            Self::None => Value::Null,
            Self::Scalar(v) => v.clone(),
            Self::Map(map) => map.get(property).cloned().unwrap_or(Value::Null),
        }
    }

    #[must_use]
    pub fn has_property(&self, property: &str) -> bool {
        match self {
            Self::None => false,
            Self::Scalar(_) => true,
            Self::Map(map) => map.contains_key(property),
        }
    }
}

impl From<Value> for Parameter {
    fn from(v: Value) -> Self {
        Self::Scalar(v)
    }
}

impl From<i64> for Parameter {
    fn from(v: i64) -> Self {
        Self::Scalar(Value::Integer(v))
    }
}

impl From<&str> for Parameter {
    fn from(v: &str) -> Self {
        Self::Scalar(Value::Text(v.to_string()))
    }
}

impl From<BTreeMap<String, Value>> for Parameter {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Map(map)
    }
}
