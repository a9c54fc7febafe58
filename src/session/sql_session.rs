use super::{Configuration, RowBounds};
use crate::binding::{MapperResult, ReturnKind};
use crate::executor::{BatchResult, Executor, ResultHandler};
use crate::mapping::SqlCommandType;
use crate::types::{Parameter, Result, Row, SqlMapError, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// One unit of work: an executor chain plus its transaction.
///
/// Dropping an open session closes it, rolling back uncommitted work.
pub struct SqlSession {
    configuration: Arc<Configuration>,
    executor: Arc<dyn Executor>,
    auto_commit: bool,
    closed: bool,
}

impl SqlSession {
    pub(crate) fn new(configuration: Arc<Configuration>, executor: Arc<dyn Executor>, auto_commit: bool) -> Self {
        Self {
            configuration,
            executor,
            auto_commit,
            closed: false,
        }
    }

    #[must_use]
    pub fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    #[must_use]
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    #[must_use]
    pub const fn is_closed(&self) -> bool {
        self.closed
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.executor.is_dirty()
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(SqlMapError::ClosedSession);
        }
        Ok(())
    }

    fn is_commit_or_rollback_required(&self, force: bool) -> bool {
        (!self.auto_commit && self.executor.is_dirty()) || force
    }

    /// At most one row; more is an error
    pub fn select_one(&self, statement: &str, parameter: &Parameter) -> Result<Option<Row>> {
        let mut rows = self.select_list(statement, parameter)?;
        match rows.len() {
            0 | 1 => Ok(rows.pop()),
            n => Err(SqlMapError::TooManyResults(n)),
        }
    }

    pub fn select_list(&self, statement: &str, parameter: &Parameter) -> Result<Vec<Row>> {
        self.select_list_with_bounds(statement, parameter, RowBounds::DEFAULT)
    }

    pub fn select_list_with_bounds(&self, statement: &str, parameter: &Parameter, row_bounds: RowBounds) -> Result<Vec<Row>> {
        self.ensure_open()?;
        let ms = self.configuration.mapped_statement(statement)?;
        self.executor.query(&ms, parameter, row_bounds, None)
    }

    /// Rows keyed by the value of `map_key`; later rows win on duplicate keys
    pub fn select_map(&self, statement: &str, parameter: &Parameter, map_key: &str) -> Result<HashMap<Value, Row>> {
        let rows = self.select_list(statement, parameter)?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get(map_key).cloned().unwrap_or(Value::Null), row))
            .collect())
    }

    /// Streams rows to `handler`; nothing is cached
    pub fn select(
        &self,
        statement: &str,
        parameter: &Parameter,
        row_bounds: RowBounds,
        handler: &mut dyn ResultHandler,
    ) -> Result<()> {
        self.ensure_open()?;
        let ms = self.configuration.mapped_statement(statement)?;
        self.executor.query(&ms, parameter, row_bounds, Some(handler))?;
        Ok(())
    }

    pub fn insert(&self, statement: &str, parameter: &Parameter) -> Result<u64> {
        self.update(statement, parameter)
    }

    pub fn update(&self, statement: &str, parameter: &Parameter) -> Result<u64> {
        self.ensure_open()?;
        let ms = self.configuration.mapped_statement(statement)?;
        self.executor.update(&ms, parameter)
    }

    pub fn delete(&self, statement: &str, parameter: &Parameter) -> Result<u64> {
        self.update(statement, parameter)
    }

    pub fn commit(&self) -> Result<()> {
        self.commit_with(false)
    }

    /// Commits; `force` commits the transaction even when nothing changed
    pub fn commit_with(&self, force: bool) -> Result<()> {
        self.ensure_open()?;
        self.executor.commit(self.is_commit_or_rollback_required(force))
    }

    pub fn rollback(&self) -> Result<()> {
        self.rollback_with(false)
    }

    pub fn rollback_with(&self, force: bool) -> Result<()> {
        self.ensure_open()?;
        self.executor.rollback(self.is_commit_or_rollback_required(force))
    }

    pub fn flush_statements(&self) -> Result<Vec<BatchResult>> {
        self.ensure_open()?;
        self.executor.flush_statements()
    }

    /// Empties the session-local cache
    pub fn clear_cache(&self) -> Result<()> {
        self.ensure_open()?;
        self.executor.clear_local_cache()
    }

    /// Closes the session; uncommitted changes are rolled back.
    /// Closing twice is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        let force_rollback = self.is_commit_or_rollback_required(false);
        self.closed = true;
        debug!(force_rollback, "Closing session");
        self.executor.close(force_rollback)
    }

    /// Dispatches a registered mapper method
    pub fn invoke(&self, mapper: &str, method: &str, args: &[Value]) -> Result<MapperResult> {
        self.ensure_open()?;
        let mapper_method = self.configuration.mapper_registry().resolve(mapper, method)?;
        let parameter = mapper_method.bind(args)?;
        let statement = mapper_method.statement_id.as_str();

        match (mapper_method.command, &mapper_method.returns) {
            (SqlCommandType::Insert | SqlCommandType::Update | SqlCommandType::Delete, _) => {
                Ok(MapperResult::Affected(self.update(statement, &parameter)?))
            }
            (SqlCommandType::Flush, _) => {
                let results = self.flush_statements()?;
                Ok(MapperResult::Affected(results.iter().map(BatchResult::total_updates).sum()))
            }
            (SqlCommandType::Select, ReturnKind::Many) => Ok(MapperResult::Rows(self.select_list(statement, &parameter)?)),
            (SqlCommandType::Select, ReturnKind::One) => Ok(MapperResult::Row(self.select_one(statement, &parameter)?)),
            (SqlCommandType::Select, ReturnKind::Map(key)) => {
                Ok(MapperResult::Map(self.select_map(statement, &parameter, key)?))
            }
            (SqlCommandType::Select, ReturnKind::Affected) | (SqlCommandType::Unknown, _) => Err(SqlMapError::Binding(
                format!("Unknown execution method for: {statement}"),
            )),
        }
    }
}

impl Drop for SqlSession {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!("Error closing dropped session: {}", e);
        }
    }
}
