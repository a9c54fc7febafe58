/// Executor module - statement execution for one session
///
/// Structure:
/// - base: session-local cache, deferred loads, dirty tracking and the
///   transaction lifecycle shared by every backing-store executor
/// - simple: one round trip per statement
/// - batch: queues consecutive updates and sends them as batches
/// - caching: shared-cache decorator over any executor
/// - plugin: interceptor hooks around the finished executor chain
pub mod base;
pub mod simple;
pub mod batch;
pub mod caching;
pub mod plugin;

pub use base::{BaseExecutor, ExecutionContext, ExecutionStrategy, ExecutorOptions};
pub use simple::{SimpleExecutor, SimpleStrategy};
pub use batch::{BatchExecutor, BatchStrategy};
pub use caching::CachingExecutor;
pub use plugin::{CountingInterceptor, InterceptedExecutor, Interceptor, InterceptorChain, OperationCounts};

use crate::cache::CacheKey;
use crate::mapping::{BoundSql, MappedStatement};
use crate::session::RowBounds;
use crate::types::{Parameter, Result, Row, SqlMapError, Value};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Weak};

/// Which backing-store executor a session runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutorType {
    #[default]
    Simple,
    Batch,
}

impl FromStr for ExecutorType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "simple" => Ok(Self::Simple),
            "batch" => Ok(Self::Batch),
            other => Err(format!("unknown executor type '{other}' (expected simple or batch)")),
        }
    }
}

/// Lifetime of entries in the session-local cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LocalCacheScope {
    /// Entries live until commit, rollback, an update or an explicit clear
    #[default]
    Session,
    /// Entries are dropped when each top-level query completes
    Statement,
}

/// Outcome of one flushed batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    pub statement_id: String,
    pub sql: String,
    pub parameters: Vec<Vec<Value>>,
    pub update_counts: Vec<u64>,
}

impl BatchResult {
    #[must_use]
    pub fn total_updates(&self) -> u64 {
        self.update_counts.iter().sum()
    }
}

/// Position of a streaming handler within one result
#[derive(Debug, Default)]
pub struct ResultContext {
    result_count: usize,
    stopped: bool,
}

impl ResultContext {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn next(&mut self) {
        self.result_count += 1;
    }

    /// Rows delivered so far, including the current one
    #[must_use]
    pub const fn result_count(&self) -> usize {
        self.result_count
    }

    /// Asks the executor to stop delivering rows
    pub fn stop(&mut self) {
        self.stopped = true;
    }

    #[must_use]
    pub const fn is_stopped(&self) -> bool {
        self.stopped
    }
}

/// Receives rows one at a time instead of a materialized list.
/// Streamed results are never cached.
pub trait ResultHandler {
    fn handle_result(&mut self, row: Row, context: &mut ResultContext);
}

impl<F> ResultHandler for F
where
    F: FnMut(Row, &mut ResultContext),
{
    fn handle_result(&mut self, row: Row, context: &mut ResultContext) {
        self(row, context);
    }
}

/// Shape a deferred load is extracted into
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetType {
    Collection,
    /// At most one row; more is an error
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedValue {
    Rows(Vec<Row>),
    Row(Option<Row>),
}

impl LoadedValue {
    pub(crate) fn extract(rows: &[Row], target_type: TargetType) -> Result<Self> {
        match target_type {
            TargetType::Collection => Ok(Self::Rows(rows.to_vec())),
            TargetType::Single if rows.len() > 1 => Err(SqlMapError::TooManyResults(rows.len())),
            TargetType::Single => Ok(Self::Row(rows.first().cloned())),
        }
    }
}

/// An object under construction whose property is filled by a deferred load
pub trait ResultObject: Send + Sync {
    fn set_value(&self, property: &str, value: LoadedValue) -> Result<()>;
}

/// Plain property bag implementing [`ResultObject`]
#[derive(Debug, Default)]
pub struct LoadedProperties {
    values: Mutex<BTreeMap<String, LoadedValue>>,
}

impl LoadedProperties {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, property: &str) -> Option<LoadedValue> {
        self.values.lock().get(property).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }
}

impl ResultObject for LoadedProperties {
    fn set_value(&self, property: &str, value: LoadedValue) -> Result<()> {
        self.values.lock().insert(property.to_string(), value);
        Ok(())
    }
}

/// Session-scoped execution engine.
///
/// Methods take `&self`: a nested query issued while a result is being
/// mapped re-enters the same executor chain. A session drives its executor
/// from one thread at a time.
pub trait Executor: Send + Sync {
    /// Runs a mutating statement and marks the session dirty
    fn update(&self, ms: &MappedStatement, parameter: &Parameter) -> Result<u64>;

    /// Runs a query, computing the bound SQL and cache key first
    fn query(
        &self,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
    ) -> Result<Vec<Row>> {
        let bound_sql = ms.bound_sql(parameter);
        let key = self.create_cache_key(ms, parameter, row_bounds, &bound_sql)?;
        self.query_with_key(ms, parameter, row_bounds, handler, &key, &bound_sql)
    }

    /// Runs a query with a precomputed key and bound SQL. With a handler the
    /// rows are streamed to it and an empty list is returned.
    fn query_with_key(
        &self,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>>;

    fn flush_statements(&self) -> Result<Vec<BatchResult>>;

    fn commit(&self, required: bool) -> Result<()>;

    fn rollback(&self, required: bool) -> Result<()>;

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey>;

    /// Session-local cache membership only
    fn is_cached(&self, ms: &MappedStatement, key: &CacheKey) -> Result<bool>;

    fn clear_local_cache(&self) -> Result<()>;

    /// Fills `property` of `target` from the session-local cache entry for
    /// `key`, now if completed rows are cached, otherwise once the current
    /// top-level query finishes
    fn defer_load(
        &self,
        ms: &MappedStatement,
        target: Arc<dyn ResultObject>,
        property: &str,
        key: &CacheKey,
        target_type: TargetType,
    ) -> Result<()>;

    fn close(&self, force_rollback: bool) -> Result<()>;

    fn is_closed(&self) -> bool;

    /// True when an update ran since the last commit or rollback
    fn is_dirty(&self) -> bool;

    /// Installs the outermost decorator; at most once
    fn set_executor_wrapper(&self, wrapper: Weak<dyn Executor>) -> Result<()>;
}

#[cfg(test)]
pub(crate) use test_support::NoopExecutor;

#[cfg(test)]
mod test_support {
    use super::*;

    /// Executor that refuses everything; for tests that need a `&dyn Executor`
    pub struct NoopExecutor;

    impl Executor for NoopExecutor {
        fn update(&self, _ms: &MappedStatement, _parameter: &Parameter) -> Result<u64> {
            Err(SqlMapError::ClosedSession)
        }

        fn query_with_key(
            &self,
            _ms: &MappedStatement,
            _parameter: &Parameter,
            _row_bounds: RowBounds,
            _handler: Option<&mut dyn ResultHandler>,
            _key: &CacheKey,
            _bound_sql: &BoundSql,
        ) -> Result<Vec<Row>> {
            Err(SqlMapError::ClosedSession)
        }

        fn flush_statements(&self) -> Result<Vec<BatchResult>> {
            Ok(Vec::new())
        }

        fn commit(&self, _required: bool) -> Result<()> {
            Ok(())
        }

        fn rollback(&self, _required: bool) -> Result<()> {
            Ok(())
        }

        fn create_cache_key(
            &self,
            _ms: &MappedStatement,
            _parameter: &Parameter,
            _row_bounds: RowBounds,
            _bound_sql: &BoundSql,
        ) -> Result<CacheKey> {
            Ok(CacheKey::new())
        }

        fn is_cached(&self, _ms: &MappedStatement, _key: &CacheKey) -> Result<bool> {
            Ok(false)
        }

        fn clear_local_cache(&self) -> Result<()> {
            Ok(())
        }

        fn defer_load(
            &self,
            _ms: &MappedStatement,
            _target: Arc<dyn ResultObject>,
            _property: &str,
            _key: &CacheKey,
            _target_type: TargetType,
        ) -> Result<()> {
            Ok(())
        }

        fn close(&self, _force_rollback: bool) -> Result<()> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }

        fn is_dirty(&self) -> bool {
            false
        }

        fn set_executor_wrapper(&self, _wrapper: Weak<dyn Executor>) -> Result<()> {
            Ok(())
        }
    }
}
