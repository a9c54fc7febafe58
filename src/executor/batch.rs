use super::base::{bind_parameters, log_prepare};
use super::{BaseExecutor, BatchResult, ExecutionContext, ExecutionStrategy, ExecutorOptions};
use crate::mapping::{BoundSql, MappedStatement, StatementType};
use crate::transaction::{StatementRequest, Transaction};
use crate::types::{Result, Row, SqlMapError, Value};
use parking_lot::Mutex;
use std::time::Duration;
use tracing::debug;

/// Count reported for an update that was queued rather than executed
pub const BATCH_UPDATE_RETURN_VALUE: u64 = 0;

/// Consecutive updates of one statement with identical SQL text
#[derive(Debug)]
struct PendingBatch {
    statement_id: String,
    log_id: String,
    statement_type: StatementType,
    sql: String,
    timeout: Option<Duration>,
    fetch_size: Option<u32>,
    parameters: Vec<Vec<Value>>,
}

impl PendingBatch {
    fn accepts(&self, ms: &MappedStatement, sql: &str) -> bool {
        self.statement_id == ms.id() && self.sql == sql
    }
}

/// Queues updates until flushed; queries flush first
#[derive(Debug, Default)]
pub struct BatchStrategy {
    pending: Mutex<Vec<PendingBatch>>,
}

impl BatchStrategy {
    /// Statements currently queued, across all batches
    #[must_use]
    pub fn pending_statements(&self) -> usize {
        self.pending.lock().iter().map(|b| b.parameters.len()).sum()
    }
}

pub type BatchExecutor = BaseExecutor<BatchStrategy>;

impl BaseExecutor<BatchStrategy> {
    pub fn new(transaction: Box<dyn Transaction>, options: ExecutorOptions) -> Self {
        Self::with_strategy(BatchStrategy::default(), transaction, options)
    }
}

impl ExecutionStrategy for BatchStrategy {
    fn do_update(&self, _ctx: &ExecutionContext<'_>, ms: &MappedStatement, bound_sql: &BoundSql) -> Result<u64> {
        let parameters = bind_parameters(ms, bound_sql);
        let sql = bound_sql.sql();
        let mut pending = self.pending.lock();
        match pending.last_mut() {
            Some(batch) if batch.accepts(ms, sql) => {
                debug!(statement = ms.log_id(), "==> Parameters: {:?}", parameters);
                batch.parameters.push(parameters);
            }
            _ => {
                log_prepare(ms, sql, &parameters);
                pending.push(PendingBatch {
                    statement_id: ms.id().to_string(),
                    log_id: ms.log_id().to_string(),
                    statement_type: ms.statement_type(),
                    sql: sql.to_string(),
                    timeout: ms.timeout(),
                    fetch_size: ms.fetch_size(),
                    parameters: vec![parameters],
                });
            }
        }
        Ok(BATCH_UPDATE_RETURN_VALUE)
    }

    fn do_query(&self, ctx: &ExecutionContext<'_>, ms: &MappedStatement, bound_sql: &BoundSql) -> Result<Vec<Row>> {
        self.do_flush_statements(ctx, false)?;
        let parameters = bind_parameters(ms, bound_sql);
        log_prepare(ms, bound_sql.sql(), &parameters);
        let connection = ctx.connection()?;
        let rows = connection
            .query(&ctx.request(ms, bound_sql.sql(), &parameters))
            .map_err(|e| SqlMapError::execution(ms.id(), e))?;
        debug!(statement = ms.log_id(), "<==      Total: {}", rows.len());
        Ok(rows)
    }

    fn do_flush_statements(&self, ctx: &ExecutionContext<'_>, is_rollback: bool) -> Result<Vec<BatchResult>> {
        let batches = std::mem::take(&mut *self.pending.lock());
        if is_rollback || batches.is_empty() {
            if !batches.is_empty() {
                debug!(batches = batches.len(), "Discarding queued batches on rollback");
            }
            return Ok(Vec::new());
        }

        let connection = ctx.connection()?;
        let mut results = Vec::with_capacity(batches.len());
        for batch in batches {
            let request = StatementRequest {
                statement_id: &batch.statement_id,
                statement_type: batch.statement_type,
                sql: &batch.sql,
                parameters: &[],
                timeout: ctx.timeout(batch.timeout),
                fetch_size: batch.fetch_size,
                executor: ctx.executor(),
            };
            let update_counts = connection
                .execute_batch(&request, &batch.parameters)
                .map_err(|e| SqlMapError::execution(&batch.statement_id, e))?;
            debug!(statement = batch.log_id.as_str(), "<==    Batch: {} statements", update_counts.len());
            results.push(BatchResult {
                statement_id: batch.statement_id,
                sql: batch.sql,
                parameters: batch.parameters,
                update_counts,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Executor;
    use crate::mapping::{ParameterMapping, RawLanguageDriver, ResultMapRegistry, SqlCommandType, StatementDefaults, StaticSqlSource};
    use crate::session::RowBounds;
    use crate::transaction::{MemoryDataSource, MemoryTransaction};
    use crate::types::{DatabaseError, Parameter};
    use std::sync::Arc;

    fn statement(id: &str, sql: &str, command: SqlCommandType, params: &[&str]) -> MappedStatement {
        let defaults = StatementDefaults {
            timeout: None,
            use_generated_keys: false,
            log_prefix: None,
            lang: Arc::new(RawLanguageDriver),
            result_maps: Arc::new(ResultMapRegistry::new()),
        };
        let mappings = params.iter().map(|p| ParameterMapping::new(*p)).collect();
        MappedStatement::builder(&defaults, id, Arc::new(StaticSqlSource::new(sql, mappings)), command)
            .build()
            .unwrap()
    }

    fn source() -> Arc<MemoryDataSource> {
        let source = Arc::new(MemoryDataSource::new());
        source.create_table("tags", Vec::new());
        source.register_update("INSERT INTO tags (name) VALUES (?)", |tables, req| {
            let tags = tables
                .get_mut("tags")
                .ok_or_else(|| DatabaseError::TableNotFound("tags".to_string()))?;
            tags.push(Row::from_pairs([("name", req.parameters[0].clone())]));
            Ok(1)
        });
        source.register_update("DELETE FROM tags", |tables, _| {
            let tags = tables
                .get_mut("tags")
                .ok_or_else(|| DatabaseError::TableNotFound("tags".to_string()))?;
            let removed = tags.len() as u64;
            tags.clear();
            Ok(removed)
        });
        source.register_query("SELECT * FROM tags", |tables, _| {
            Ok(tables.get("tags").cloned().unwrap_or_default())
        });
        source
    }

    fn executor(source: &Arc<MemoryDataSource>) -> BatchExecutor {
        BatchExecutor::new(
            Box::new(MemoryTransaction::new(Arc::clone(source), None, false)),
            ExecutorOptions::default(),
        )
    }

    #[test]
    fn test_updates_are_grouped_until_flush() {
        let source = source();
        let exec = executor(&source);
        let insert = statement("tags.insert", "INSERT INTO tags (name) VALUES (?)", SqlCommandType::Insert, &["name"]);
        let clear = statement("tags.clear", "DELETE FROM tags", SqlCommandType::Delete, &[]);

        for name in ["a", "b", "c"] {
            assert_eq!(exec.update(&insert, &Parameter::from(name)).unwrap(), BATCH_UPDATE_RETURN_VALUE);
        }
        exec.update(&clear, &Parameter::None).unwrap();
        exec.update(&insert, &Parameter::from("d")).unwrap();
        assert_eq!(exec.strategy().pending_statements(), 5);
        assert!(source.table("tags").unwrap().is_empty());

        let results = exec.flush_statements().unwrap();
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].update_counts, vec![1, 1, 1]);
        assert_eq!(results[1].update_counts, vec![3]);
        assert_eq!(results[2].statement_id, "tags.insert");
        assert_eq!(source.table("tags").unwrap().len(), 1);
        assert_eq!(source.stats().batches, 3);
    }

    #[test]
    fn test_query_flushes_pending_batches() {
        let source = source();
        let exec = executor(&source);
        let insert = statement("tags.insert", "INSERT INTO tags (name) VALUES (?)", SqlCommandType::Insert, &["name"]);
        let select = statement("tags.all", "SELECT * FROM tags", SqlCommandType::Select, &[]);

        exec.update(&insert, &Parameter::from("rust")).unwrap();
        let rows = exec.query(&select, &Parameter::None, RowBounds::DEFAULT, None).unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(exec.strategy().pending_statements(), 0);
    }

    #[test]
    fn test_rollback_discards_pending_batches() {
        let source = source();
        let exec = executor(&source);
        let insert = statement("tags.insert", "INSERT INTO tags (name) VALUES (?)", SqlCommandType::Insert, &["name"]);

        exec.update(&insert, &Parameter::from("x")).unwrap();
        exec.rollback(true).unwrap();
        assert_eq!(exec.strategy().pending_statements(), 0);
        assert_eq!(source.stats().batches, 0);
        assert!(exec.flush_statements().unwrap().is_empty());
    }

    #[test]
    fn test_commit_flushes_then_commits() {
        let source = source();
        let exec = executor(&source);
        let insert = statement("tags.insert", "INSERT INTO tags (name) VALUES (?)", SqlCommandType::Insert, &["name"]);

        exec.update(&insert, &Parameter::from("x")).unwrap();
        exec.update(&insert, &Parameter::from("y")).unwrap();
        exec.commit(true).unwrap();
        assert_eq!(source.table("tags").unwrap().len(), 2);
        assert_eq!(source.stats().commits, 1);
    }
}
