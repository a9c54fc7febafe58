use super::{BatchResult, Executor, ResultHandler, ResultObject, TargetType};
use crate::cache::CacheKey;
use crate::mapping::{BoundSql, MappedStatement};
use crate::session::RowBounds;
use crate::types::{Parameter, Result, Row};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Hooks run around executor operations.
///
/// Every hook defaults to a no-op. A `before_*` hook that returns an error
/// aborts the operation before it reaches the executor, except
/// `before_close`: its error is returned after the executor has closed.
pub trait Interceptor: Send + Sync {
    fn before_update(&self, _ms: &MappedStatement, _parameter: &Parameter) -> Result<()> {
        Ok(())
    }

    fn after_update(&self, _ms: &MappedStatement, _affected: u64) {}

    fn before_query(&self, _ms: &MappedStatement, _parameter: &Parameter, _row_bounds: RowBounds) -> Result<()> {
        Ok(())
    }

    fn after_query(&self, _ms: &MappedStatement, _rows: &[Row]) {}

    fn before_commit(&self, _required: bool) -> Result<()> {
        Ok(())
    }

    fn before_rollback(&self, _required: bool) -> Result<()> {
        Ok(())
    }

    fn before_close(&self, _force_rollback: bool) -> Result<()> {
        Ok(())
    }
}

/// Ordered interceptors, applied when an executor is built
#[derive(Clone, Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    /// Wraps `executor` so every registered interceptor sees its operations
    #[must_use]
    pub fn plugin_all(&self, executor: Arc<dyn Executor>) -> Arc<dyn Executor> {
        if self.interceptors.is_empty() {
            return executor;
        }
        Arc::new(InterceptedExecutor {
            inner: executor,
            interceptors: self.interceptors.clone(),
        })
    }
}

/// Executor that runs `before_*` hooks in registration order and
/// `after_*` hooks in reverse order around the wrapped executor
pub struct InterceptedExecutor {
    inner: Arc<dyn Executor>,
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptedExecutor {
    fn before(&self, hook: impl Fn(&dyn Interceptor) -> Result<()>) -> Result<()> {
        self.interceptors.iter().try_for_each(|i| hook(i.as_ref()))
    }

    fn after(&self, hook: impl Fn(&dyn Interceptor)) {
        self.interceptors.iter().rev().for_each(|i| hook(i.as_ref()));
    }
}

impl Executor for InterceptedExecutor {
    fn update(&self, ms: &MappedStatement, parameter: &Parameter) -> Result<u64> {
        self.before(|i| i.before_update(ms, parameter))?;
        let affected = self.inner.update(ms, parameter)?;
        self.after(|i| i.after_update(ms, affected));
        Ok(affected)
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
        self.before(|i| i.before_query(ms, parameter, row_bounds))?;
        let rows = self
            .inner
            .query_with_key(ms, parameter, row_bounds, handler, key, bound_sql)?;
        self.after(|i| i.after_query(ms, &rows));
        Ok(rows)
    }

    fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        self.inner.flush_statements()
    }

    fn commit(&self, required: bool) -> Result<()> {
        self.before(|i| i.before_commit(required))?;
        self.inner.commit(required)
    }

    fn rollback(&self, required: bool) -> Result<()> {
        self.before(|i| i.before_rollback(required))?;
        self.inner.rollback(required)
    }

    fn create_cache_key(
        &self,
        ms: &MappedStatement,
        parameter: &Parameter,
        row_bounds: RowBounds,
        bound_sql: &BoundSql,
    ) -> Result<CacheKey> {
        self.inner.create_cache_key(ms, parameter, row_bounds, bound_sql)
    }

    fn is_cached(&self, ms: &MappedStatement, key: &CacheKey) -> Result<bool> {
        self.inner.is_cached(ms, key)
    }

    fn clear_local_cache(&self) -> Result<()> {
        self.inner.clear_local_cache()
    }

    fn defer_load(
        &self,
        ms: &MappedStatement,
        target: Arc<dyn ResultObject>,
        property: &str,
        key: &CacheKey,
        target_type: TargetType,
    ) -> Result<()> {
        self.inner.defer_load(ms, target, property, key, target_type)
    }

    fn close(&self, force_rollback: bool) -> Result<()> {
        // Close is terminal: the chain closes even when a hook fails
        let hooks = self.before(|i| i.before_close(force_rollback));
        let closed = self.inner.close(force_rollback);
        hooks.and(closed)
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn is_dirty(&self) -> bool {
        self.inner.is_dirty()
    }

    fn set_executor_wrapper(&self, wrapper: Weak<dyn Executor>) -> Result<()> {
        self.inner.set_executor_wrapper(wrapper)
    }
}

/// Operation counts observed by a [`CountingInterceptor`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationCounts {
    pub queries: u64,
    pub rows: u64,
    pub updates: u64,
    pub affected: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

/// Counts the operations that pass through the executor chain
#[derive(Debug, Default)]
pub struct CountingInterceptor {
    queries: AtomicU64,
    rows: AtomicU64,
    updates: AtomicU64,
    affected: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

impl CountingInterceptor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn counts(&self) -> OperationCounts {
        OperationCounts {
            queries: self.queries.load(Ordering::Relaxed),
            rows: self.rows.load(Ordering::Relaxed),
            updates: self.updates.load(Ordering::Relaxed),
            affected: self.affected.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            rollbacks: self.rollbacks.load(Ordering::Relaxed),
        }
    }
}

impl Interceptor for CountingInterceptor {
    fn after_update(&self, _ms: &MappedStatement, affected: u64) {
        self.updates.fetch_add(1, Ordering::Relaxed);
        self.affected.fetch_add(affected, Ordering::Relaxed);
    }

    fn after_query(&self, _ms: &MappedStatement, rows: &[Row]) {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.rows.fetch_add(rows.len() as u64, Ordering::Relaxed);
    }

    fn before_commit(&self, _required: bool) -> Result<()> {
        self.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn before_rollback(&self, _required: bool) -> Result<()> {
        self.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NoopExecutor;
    use crate::types::SqlMapError;
    use parking_lot::Mutex;

    struct Recorder {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
        reject_commit: bool,
    }

    impl Interceptor for Recorder {
        fn before_commit(&self, _required: bool) -> Result<()> {
            self.log.lock().push(format!("before:{}", self.name));
            if self.reject_commit {
                return Err(SqlMapError::Interceptor(format!("{} vetoed commit", self.name)));
            }
            Ok(())
        }

        fn after_update(&self, _ms: &MappedStatement, _affected: u64) {
            self.log.lock().push(format!("after:{}", self.name));
        }
    }

    fn chain(log: &Arc<Mutex<Vec<String>>>, reject_second: bool) -> InterceptorChain {
        let mut chain = InterceptorChain::new();
        for (name, reject) in [("first", false), ("second", reject_second), ("third", false)] {
            chain.add(Arc::new(Recorder {
                name,
                log: Arc::clone(log),
                reject_commit: reject,
            }));
        }
        chain
    }

    #[test]
    fn test_empty_chain_returns_executor_unchanged() {
        let executor: Arc<dyn Executor> = Arc::new(NoopExecutor);
        let wrapped = InterceptorChain::new().plugin_all(Arc::clone(&executor));
        assert!(Arc::ptr_eq(&executor, &wrapped));
    }

    #[test]
    fn test_before_hooks_run_in_order_and_abort() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let executor = chain(&log, true).plugin_all(Arc::new(NoopExecutor));

        let err = executor.commit(true).unwrap_err();
        assert!(matches!(err, SqlMapError::Interceptor(_)));
        assert_eq!(*log.lock(), vec!["before:first".to_string(), "before:second".to_string()]);
    }

    #[test]
    fn test_counting_interceptor_counts_commits() {
        let counter = Arc::new(CountingInterceptor::new());
        let mut chain = InterceptorChain::new();
        chain.add(counter.clone());
        let executor = chain.plugin_all(Arc::new(NoopExecutor));
        executor.commit(false).unwrap();
        executor.rollback(false).unwrap();
        assert_eq!(counter.counts().commits, 1);
        assert_eq!(counter.counts().rollbacks, 1);
    }
}
