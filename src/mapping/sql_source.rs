use super::{BoundSql, ParameterMapping};
use crate::types::Parameter;
use std::sync::Arc;

/// Produces statement text and bindings for a parameter object
pub trait SqlSource: Send + Sync {
    fn bound_sql(&self, parameter: &Parameter) -> BoundSql;
}

/// Fixed text with fixed bindings
#[derive(Debug, Clone)]
pub struct StaticSqlSource {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
}

impl StaticSqlSource {
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
        }
    }
}

impl SqlSource for StaticSqlSource {
    fn bound_sql(&self, parameter: &Parameter) -> BoundSql {
        BoundSql::new(self.sql.clone(), self.parameter_mappings.clone(), parameter.clone())
    }
}

/// Turns a statement script into an [`SqlSource`]
pub trait LanguageDriver: Send + Sync {
    fn create_sql_source(&self, script: &str, parameter_mappings: Vec<ParameterMapping>) -> Arc<dyn SqlSource>;
}

/// Passes the script through untouched
#[derive(Debug, Default, Clone, Copy)]
pub struct RawLanguageDriver;

impl LanguageDriver for RawLanguageDriver {
    fn create_sql_source(&self, script: &str, parameter_mappings: Vec<ParameterMapping>) -> Arc<dyn SqlSource> {
        Arc::new(StaticSqlSource::new(script, parameter_mappings))
    }
}
