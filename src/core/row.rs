use serde::{Deserialize, Serialize};
use super::value::Value;

/// One materialized result row: column labels paired with values, in select order
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Row {
    pub columns: Vec<String>,
    pub values: Vec<Value>,
}

impl Row {
    /// Pairs labels with values; missing values become NULL and surplus values are dropped
    pub fn new(columns: Vec<String>, mut values: Vec<Value>) -> Self {
        values.resize(columns.len(), Value::Null);
        Self { columns, values }
    }

    /// Builds a row from `(column, value)` pairs
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let (columns, values) = pairs
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .unzip();
        Self { columns, values }
    }

    /// Looks up a column value by label (case-insensitive, first match wins)
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns
            .iter()
            .position(|c| c.eq_ignore_ascii_case(column))
            .and_then(|idx| self.values.get(idx))
    }

    /// Sets a column value, appending the column when it is not present yet
    pub fn set(&mut self, column: &str, value: Value) {
        match self.columns.iter().position(|c| c.eq_ignore_ascii_case(column)) {
            Some(idx) => {
                // Public fields may hold fewer values than labels
                if idx >= self.values.len() {
                    self.values.resize(idx + 1, Value::Null);
                }
                self.values[idx] = value;
            }
            None => {
                self.columns.push(column.to_string());
                self.values.push(value);
            }
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
