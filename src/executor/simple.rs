use super::base::{bind_parameters, log_prepare};
use super::{BaseExecutor, BatchResult, ExecutionContext, ExecutionStrategy, ExecutorOptions};
use crate::mapping::{BoundSql, MappedStatement};
use crate::transaction::Transaction;
use crate::types::{Result, Row, SqlMapError};
use tracing::debug;

/// One round trip per statement, nothing queued
#[derive(Debug, Default, Clone, Copy)]
pub struct SimpleStrategy;

pub type SimpleExecutor = BaseExecutor<SimpleStrategy>;

impl BaseExecutor<SimpleStrategy> {
    pub fn new(transaction: Box<dyn Transaction>, options: ExecutorOptions) -> Self {
        Self::with_strategy(SimpleStrategy, transaction, options)
    }
}

impl ExecutionStrategy for SimpleStrategy {
    fn do_update(&self, ctx: &ExecutionContext<'_>, ms: &MappedStatement, bound_sql: &BoundSql) -> Result<u64> {
        let parameters = bind_parameters(ms, bound_sql);
        log_prepare(ms, bound_sql.sql(), &parameters);
        let connection = ctx.connection()?;
        let count = connection
            .update(&ctx.request(ms, bound_sql.sql(), &parameters))
            .map_err(|e| SqlMapError::execution(ms.id(), e))?;
        debug!(statement = ms.log_id(), "<==    Updates: {}", count);
        Ok(count)
    }

    fn do_query(&self, ctx: &ExecutionContext<'_>, ms: &MappedStatement, bound_sql: &BoundSql) -> Result<Vec<Row>> {
        let parameters = bind_parameters(ms, bound_sql);
        log_prepare(ms, bound_sql.sql(), &parameters);
        let connection = ctx.connection()?;
        let rows = connection
            .query(&ctx.request(ms, bound_sql.sql(), &parameters))
            .map_err(|e| SqlMapError::execution(ms.id(), e))?;
        debug!(statement = ms.log_id(), "<==      Total: {}", rows.len());
        Ok(rows)
    }

    fn do_flush_statements(&self, _ctx: &ExecutionContext<'_>, _is_rollback: bool) -> Result<Vec<BatchResult>> {
        Ok(Vec::new())
    }
}
