use super::{BatchResult, Executor, LoadedValue, LocalCacheScope, ResultContext, ResultHandler, ResultObject, TargetType};
use crate::cache::{CacheKey, CachedRows};
use crate::mapping::{BoundSql, MappedStatement, ParameterMode, StatementType};
use crate::session::RowBounds;
use crate::transaction::{Connection, StatementRequest, Transaction};
use crate::types::{Parameter, Result, Row, SqlMapError, Value};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;
use tracing::{debug, warn};

/// Backing-store round trips; everything else lives in [`BaseExecutor`]
pub trait ExecutionStrategy: Send + Sync {
    fn do_update(&self, ctx: &ExecutionContext<'_>, ms: &MappedStatement, bound_sql: &BoundSql) -> Result<u64>;

    /// Returns every row the store produced; bounds are applied by the caller
    fn do_query(&self, ctx: &ExecutionContext<'_>, ms: &MappedStatement, bound_sql: &BoundSql) -> Result<Vec<Row>>;

    fn do_flush_statements(&self, ctx: &ExecutionContext<'_>, is_rollback: bool) -> Result<Vec<BatchResult>>;
}

/// What a strategy may touch during one round trip
pub struct ExecutionContext<'a> {
    transaction: &'a Mutex<Box<dyn Transaction>>,
    executor: &'a dyn Executor,
    default_timeout: Option<Duration>,
}

impl<'a> ExecutionContext<'a> {
    /// Connection of the session's transaction, opened on first use
    pub fn connection(&self) -> Result<Arc<dyn Connection>> {
        self.transaction.lock().connection().map_err(SqlMapError::Transaction)
    }

    /// Outermost executor of the session
    #[must_use]
    pub const fn executor(&self) -> &'a dyn Executor {
        self.executor
    }

    /// Statement timeout, falling back to the default, capped by the transaction timeout
    #[must_use]
    pub fn timeout(&self, statement_timeout: Option<Duration>) -> Option<Duration> {
        let timeout = statement_timeout.or(self.default_timeout);
        match (timeout, self.transaction.lock().timeout()) {
            (Some(t), Some(tx)) => Some(t.min(tx)),
            (None, tx) => tx,
            (t, None) => t,
        }
    }

    pub fn request<'b>(&'b self, ms: &'b MappedStatement, sql: &'b str, parameters: &'b [Value]) -> StatementRequest<'b> {
        StatementRequest {
            statement_id: ms.id(),
            statement_type: ms.statement_type(),
            sql,
            parameters,
            timeout: self.timeout(ms.timeout()),
            fetch_size: ms.fetch_size(),
            executor: self.executor,
        }
    }
}

/// Values sent to the store for one statement. Plain statements bind nothing.
#[must_use]
pub fn bind_parameters(ms: &MappedStatement, bound_sql: &BoundSql) -> Vec<Value> {
    match ms.statement_type() {
        StatementType::Statement => Vec::new(),
        StatementType::Prepared | StatementType::Callable => bound_sql.parameter_values(),
    }
}

pub(crate) fn log_prepare(ms: &MappedStatement, sql: &str, parameters: &[Value]) {
    debug!(statement = ms.log_id(), "==>  Preparing: {}", sql);
    debug!(
        statement = ms.log_id(),
        "==> Parameters: {}",
        parameters.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
    );
}

/// Knobs a base executor takes from the session settings
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutorOptions {
    pub local_cache_scope: LocalCacheScope,
    pub default_timeout: Option<Duration>,
}

enum LocalEntry {
    /// The query for this key is running further up the stack
    ExecutionPlaceholder,
    Rows(CachedRows),
}

struct DeferredLoad {
    target: Arc<dyn ResultObject>,
    property: String,
    key: CacheKey,
    target_type: TargetType,
}

#[derive(Default)]
struct LocalState {
    local_cache: HashMap<CacheKey, LocalEntry>,
    deferred_loads: VecDeque<DeferredLoad>,
}

impl LocalState {
    fn completed_rows(&self, key: &CacheKey) -> Option<CachedRows> {
        match self.local_cache.get(key) {
            Some(LocalEntry::Rows(rows)) => Some(Arc::clone(rows)),
            Some(LocalEntry::ExecutionPlaceholder) | None => None,
        }
    }
}

/// Executor bound to one transaction.
///
/// Owns the session-local cache and the deferred-load queue, tracks the
/// dirty flag and drives the transaction through commit, rollback and close.
/// Round trips are delegated to an [`ExecutionStrategy`].
pub struct BaseExecutor<S> {
    strategy: S,
    transaction: Mutex<Box<dyn Transaction>>,
    local: Mutex<LocalState>,
    wrapper: OnceLock<Weak<dyn Executor>>,
    local_cache_scope: LocalCacheScope,
    default_timeout: Option<Duration>,
    query_stack: AtomicUsize,
    closed: AtomicBool,
    dirty: AtomicBool,
}

impl<S: ExecutionStrategy> BaseExecutor<S> {
    pub fn with_strategy(strategy: S, transaction: Box<dyn Transaction>, options: ExecutorOptions) -> Self {
        Self {
            strategy,
            transaction: Mutex::new(transaction),
            local: Mutex::new(LocalState::default()),
            wrapper: OnceLock::new(),
            local_cache_scope: options.local_cache_scope,
            default_timeout: options.default_timeout,
            query_stack: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
            dirty: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub const fn strategy(&self) -> &S {
        &self.strategy
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SqlMapError::ClosedSession);
        }
        Ok(())
    }

    fn with_context<T>(&self, f: impl FnOnce(&ExecutionContext<'_>) -> Result<T>) -> Result<T> {
        let outer = self.wrapper.get().and_then(Weak::upgrade);
        let this: &dyn Executor = self;
        let ctx = ExecutionContext {
            transaction: &self.transaction,
            executor: outer.as_deref().unwrap_or(this),
            default_timeout: self.default_timeout,
        };
        f(&ctx)
    }

    fn clear_local_state(&self) {
        self.local.lock().local_cache.clear();
    }

    fn query_local_or_database(
        &self,
        ms: &MappedStatement,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        if handler.is_none() {
            if let Some(rows) = self.local.lock().completed_rows(key) {
                debug!(statement = ms.log_id(), "Session cache hit");
                return Ok(rows.to_vec());
            }
        }
        self.query_from_database(ms, row_bounds, handler, key, bound_sql)
    }

    fn query_from_database(
        &self,
        ms: &MappedStatement,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.local
            .lock()
            .local_cache
            .insert(key.clone(), LocalEntry::ExecutionPlaceholder);
        let result = self.with_context(|ctx| self.strategy.do_query(ctx, ms, bound_sql));
        self.local.lock().local_cache.remove(key);

        let rows: Vec<Row> = result?
            .into_iter()
            .skip(row_bounds.offset)
            .take(row_bounds.limit)
            .collect();

        match handler {
            Some(handler) => {
                let mut context = ResultContext::new();
                for row in rows {
                    context.next();
                    handler.handle_result(row, &mut context);
                    if context.is_stopped() {
                        break;
                    }
                }
                Ok(Vec::new())
            }
            None => {
                self.local
                    .lock()
                    .local_cache
                    .insert(key.clone(), LocalEntry::Rows(Arc::new(rows.clone())));
                Ok(rows)
            }
        }
    }

    fn resolve(&self, load: &DeferredLoad) -> Result<()> {
        let rows = self.local.lock().completed_rows(&load.key);
        let rows = rows.as_deref().map_or(&[][..], Vec::as_slice);
        let value = LoadedValue::extract(rows, load.target_type)?;
        load.target.set_value(&load.property, value)
    }

    fn resolve_deferred_loads(&self) -> Result<()> {
        // Popped one at a time so a load may queue further loads
        loop {
            let Some(load) = self.local.lock().deferred_loads.pop_front() else {
                return Ok(());
            };
            self.resolve(&load)?;
        }
    }
}

impl<S: ExecutionStrategy> Executor for BaseExecutor<S> {
    fn update(&self, ms: &MappedStatement, parameter: &Parameter) -> Result<u64> {
        self.ensure_open()?;
        debug!(statement = ms.log_id(), "Executing update");
        self.clear_local_state();
        self.dirty.store(true, Ordering::Release);
        let bound_sql = ms.bound_sql(parameter);
        self.with_context(|ctx| self.strategy.do_update(ctx, ms, &bound_sql))
    }

    fn query_with_key(
        &self,
        ms: &MappedStatement,
        _parameter: &Parameter,
        row_bounds: RowBounds,
        handler: Option<&mut dyn ResultHandler>,
        key: &CacheKey,
        bound_sql: &BoundSql,
    ) -> Result<Vec<Row>> {
        self.ensure_open()?;
        if self.query_stack.load(Ordering::Acquire) == 0 && ms.is_flush_cache_required() {
            self.clear_local_state();
        }

        self.query_stack.fetch_add(1, Ordering::AcqRel);
        let result = self.query_local_or_database(ms, row_bounds, handler, key, bound_sql);
        let depth = self.query_stack.fetch_sub(1, Ordering::AcqRel) - 1;

        if depth == 0 {
            let resolved = match &result {
                Ok(_) => self.resolve_deferred_loads(),
                Err(_) => {
                    self.local.lock().deferred_loads.clear();
                    Ok(())
                }
            };
            if self.local_cache_scope == LocalCacheScope::Statement {
                self.clear_local_state();
            }
            resolved?;
        }
        result
    }

    fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        self.ensure_open()?;
        self.with_context(|ctx| self.strategy.do_flush_statements(ctx, false))
    }

    fn commit(&self, required: bool) -> Result<()> {
        self.ensure_open()?;
        self.clear_local_state();
        self.flush_statements()?;
        if required {
            self.transaction.lock().commit().map_err(SqlMapError::Transaction)?;
        }
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn rollback(&self, required: bool) -> Result<()> {
        self.ensure_open()?;
        self.clear_local_state();
        let flushed = self.with_context(|ctx| self.strategy.do_flush_statements(ctx, true));
        // The transaction is rolled back even when discarding batches failed
        let rolled_back = if required {
            self.transaction.lock().rollback().map_err(SqlMapError::Transaction)
        } else {
            Ok(())
        };
        flushed?;
        rolled_back?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        _parameter: &Parameter,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.ensure_open()?;
        let mut key = CacheKey::new();
        key.update(ms.id());
        key.update(row_bounds.offset);
        key.update(row_bounds.limit);
        key.update(bound_sql.sql());
        for mapping in bound_sql.parameter_mappings() {
            if mapping.mode != ParameterMode::Out {
                key.update(bound_sql.value_for(mapping));
            }
        }
        Ok(key)
    }

    fn is_cached(&self, _ms: &MappedStatement, key: &CacheKey) -> Result<bool> {
        self.ensure_open()?;
        Ok(self.local.lock().local_cache.contains_key(key))
    }

    fn clear_local_cache(&self) -> Result<()> {
        self.ensure_open()?;
        self.clear_local_state();
        Ok(())
    }

    fn defer_load(
        &self,
        ms: &MappedStatement,
        target: Arc<dyn ResultObject>,
        property: &str,
        key: &CacheKey,
        target_type: TargetType,
    ) -> Result<()> {
        self.ensure_open()?;
        let load = DeferredLoad {
            target,
            property: property.to_string(),
            key: key.clone(),
            target_type,
        };
        let can_load = self.local.lock().completed_rows(key).is_some();
        if can_load {
            self.resolve(&load)
        } else {
            debug!(statement = ms.log_id(), property, "Deferring load until the current query completes");
            self.local.lock().deferred_loads.push_back(load);
            Ok(())
        }
    }

    fn close(&self, force_rollback: bool) -> Result<()> {
        self.ensure_open()?;
        if let Err(e) = self.rollback(force_rollback) {
            warn!("Unexpected exception on closing transaction. Cause: {}", e);
        }
        self.closed.store(true, Ordering::Release);
        {
            let mut local = self.local.lock();
            local.local_cache.clear();
            local.deferred_loads.clear();
        }
        self.transaction.lock().close().map_err(SqlMapError::Transaction)
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn set_executor_wrapper(&self, wrapper: Weak<dyn Executor>) -> Result<()> {
        self.wrapper
            .set(wrapper)
            .map_err(|_| SqlMapError::Configuration("Executor wrapper is already installed".to_string()))
    }
}

impl<S> Drop for BaseExecutor<S> {
    fn drop(&mut self) {
        if !*self.closed.get_mut() {
            if let Err(e) = self.transaction.get_mut().close() {
                warn!("Failed to close transaction of dropped executor: {}", e);
            }
        }
    }
}
