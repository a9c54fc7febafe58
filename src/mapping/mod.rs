/// Statement metadata: mapped statements, bound SQL, parameter and result maps
pub mod bound_sql;
pub mod sql_source;
pub mod result_map;
pub mod statement;

pub use bound_sql::{BoundSql, ParameterMap, ParameterMapping};
pub use sql_source::{LanguageDriver, RawLanguageDriver, SqlSource, StaticSqlSource};
pub use result_map::{ResultMap, ResultMapRegistry};
pub use statement::{MappedStatement, MappedStatementBuilder, StatementDefaults};

use serde::{Deserialize, Serialize};

/// How the backing store should run the statement text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementType {
    /// Plain statement, no parameter binding
    Statement,
    #[default]
    Prepared,
    /// Stored procedure call; may carry OUT parameters
    Callable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlCommandType {
    Unknown,
    Insert,
    Update,
    Delete,
    Select,
    Flush,
}

impl SqlCommandType {
    #[must_use]
    pub const fn is_select(&self) -> bool {
        matches!(self, Self::Select)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultSetType {
    ForwardOnly,
    ScrollInsensitive,
    ScrollSensitive,
}

/// Direction of a parameter binding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ParameterMode {
    #[default]
    In,
    Out,
    InOut,
}

/// Generated-key policy for inserts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyGenerator {
    #[default]
    None,
    /// Keys reported back by the backing store after the insert
    Generated,
}
