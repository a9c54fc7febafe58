use super::{BatchResult, Executor, ResultHandler, ResultObject, TargetType};
use crate::cache::{Cache, CacheKey, TransactionalCacheManager};
use crate::mapping::{BoundSql, MappedStatement, ParameterMode, StatementType};
use crate::session::RowBounds;
use crate::types::{Parameter, Result, Row, SqlMapError};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// Shared-cache decorator. Reads go through the session's
/// [`TransactionalCacheManager`]; fills and flushes become visible to other
/// sessions only when this session commits.
pub struct CachingExecutor {
    delegate: Arc<dyn Executor>,
    tcm: Mutex<TransactionalCacheManager>,
}

impl CachingExecutor {
    /// Wraps `delegate` and installs the decorator as its outer executor
    pub fn new(delegate: Arc<dyn Executor>) -> Result<Arc<Self>> {
        let executor = Arc::new(Self {
            delegate,
            tcm: Mutex::new(TransactionalCacheManager::new()),
        });
        let wrapper: Weak<dyn Executor> = Arc::downgrade(&executor) as Weak<dyn Executor>;
        executor.delegate.set_executor_wrapper(wrapper)?;
        Ok(executor)
    }

    #[must_use]
    pub fn delegate(&self) -> &Arc<dyn Executor> {
        &self.delegate
    }

    /// Ids of the shared caches touched since the last commit or rollback
    #[must_use]
    pub fn touched_caches(&self) -> Vec<String> {
        self.tcm.lock().touched().into_iter().map(str::to_string).collect()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.delegate.is_closed() {
            return Err(SqlMapError::ClosedSession);
        }
        Ok(())
    }

    fn flush_cache_if_required(&self, ms: &MappedStatement) {
        if let Some(cache) = ms.cache() {
            if ms.is_flush_cache_required() {
                debug!(statement = ms.log_id(), cache = cache.id(), "Flushing shared cache");
                self.tcm.lock().clear(cache);
            }
        }
    }

    fn query_through_cache(
        &self,
        cache: &Arc<dyn Cache>,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        ensure_no_out_params(ms, bound_sql)?;
        let cached = self.tcm.lock().get(cache, key);
        if let Some(rows) = cached {
            debug!(statement = ms.log_id(), cache = cache.id(), "Shared cache hit");
            return Ok(rows.to_vec());
        }
        let rows = self
            .delegate
            .query_with_key(ms, parameter, row_bounds, None, key, bound_sql)?;
        self.tcm.lock().put(cache, key.clone(), Arc::new(rows.clone()));
        Ok(rows)
    }
}

fn ensure_no_out_params(ms: &MappedStatement, bound_sql: &BoundSql) -> Result<()> {
    if ms.statement_type() != StatementType::Callable {
        return Ok(());
    }
    if bound_sql
        .parameter_mappings()
        .iter()
        .any(|m| m.mode != ParameterMode::In)
    {
        return Err(SqlMapError::Configuration(format!(
            "Caching stored procedures with OUT params is not supported. Please configure use_cache=false in {} statement.",
            ms.id()
        )));
    }
    Ok(())
}

impl Executor for CachingExecutor {
    fn update(&self, ms: &MappedStatement, parameter: &Parameter) -> Result<u64> {
        self.ensure_open()?;
        self.flush_cache_if_required(ms);
        self.delegate.update(ms, parameter)
    }

    fn query_with_key(
        &self,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let Some(cache) = ms.cache() else {
            return self
                .delegate
                .query_with_key(ms, parameter, row_bounds, handler, key, bound_sql);
        };
        self.flush_cache_if_required(ms);
        if ms.is_use_cache() && handler.is_none() {
            return self.query_through_cache(cache, ms, parameter, row_bounds, key, bound_sql);
        }
        self.delegate
            .query_with_key(ms, parameter, row_bounds, handler, key, bound_sql)
    }

    fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        self.delegate.flush_statements()
    }

    fn commit(&self, required: bool) -> Result<()> {
        self.delegate.commit(required)?;
        self.tcm.lock().commit();
        Ok(())
    }

    fn rollback(&self, required: bool) -> Result<()> {
        let result = self.delegate.rollback(required);
        if required {
            self.tcm.lock().rollback();
        }
        result
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.delegate.create_cache_key(ms, parameter, row_bounds, bound_sql)
    }

    fn is_cached(&self, ms: &MappedStatement, key: &CacheKey) -> Result<bool> {
        self.delegate.is_cached(ms, key)
    }

    fn clear_local_cache(&self) -> Result<()> {
        self.delegate.clear_local_cache()
    }

    fn defer_load(
        &self,
        ms: &MappedStatement,
        target: Arc<dyn ResultObject>,
        property: &str,
        key: &CacheKey,
        target_type: TargetType,
    ) -> Result<()> {
        self.delegate.defer_load(ms, target, property, key, target_type)
    }

    fn close(&self, force_rollback: bool) -> Result<()> {
        self.ensure_open()?;
        {
            let mut tcm = self.tcm.lock();
            if force_rollback {
                tcm.rollback();
            } else {
                tcm.commit();
            }
        }
        self.delegate.close(force_rollback)
    }

    fn is_closed(&self) -> bool {
        self.delegate.is_closed()
    }

    fn is_dirty(&self) -> bool {
        self.delegate.is_dirty()
    }

    fn set_executor_wrapper(&self, _wrapper: Weak<dyn Executor>) -> Result<()> {
        Err(SqlMapError::Configuration(
            "CachingExecutor is the outermost executor and cannot be wrapped".to_string(),
        ))
    }
}
