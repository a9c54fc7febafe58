// Transaction module - transactional resource and backing-store seams

mod memory;

pub use memory::{DataSourceStats, MemoryConnection, MemoryDataSource, MemoryTransaction, MemoryTransactionFactory, Tables};

use crate::executor::Executor;
use crate::mapping::StatementType;
use crate::types::{DatabaseError, Row, Value};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// Transaction isolation requested when opening a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IsolationLevel {
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

/// Everything a backing store needs to run one statement
#[derive(Clone, Copy)]
pub struct StatementRequest<'a> {
    pub statement_id: &'a str,
    pub statement_type: StatementType,
    pub sql: &'a str,
    pub parameters: &'a [Value],
    pub timeout: Option<Duration>,
    pub fetch_size: Option<u32>,
    /// Outermost executor of the session, for nested statement resolution
    pub executor: &'a dyn Executor,
}

impl<'a> StatementRequest<'a> {
    /// Same statement bound to another parameter row
    #[must_use]
    pub const fn with_parameters(self, parameters: &'a [Value]) -> Self {
        Self { parameters, ..self }
    }
}

impl std::fmt::Debug for StatementRequest<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatementRequest")
            .field("statement_id", &self.statement_id)
            .field("sql", &self.sql)
            .field("parameters", &self.parameters)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// A live connection to the backing store
pub trait Connection: Send + Sync {
    fn query(&self, request: &StatementRequest<'_>) -> Result<Vec<Row>, DatabaseError>;

    fn update(&self, request: &StatementRequest<'_>) -> Result<u64, DatabaseError>;

    /// Runs the same statement once per parameter row, returning one count per row
    fn execute_batch(&self, request: &StatementRequest<'_>, batch: &[Vec<Value>]) -> Result<Vec<u64>, DatabaseError> {
        batch
            .iter()
            .map(|parameters| self.update(&request.with_parameters(parameters)))
            .collect()
    }
}

/// The transactional resource owned by one executor
pub trait Transaction: Send {
    /// Opens the connection lazily; later calls return the same connection
    fn connection(&mut self) -> Result<Arc<dyn Connection>, DatabaseError>;

    fn commit(&mut self) -> Result<(), DatabaseError>;

    fn rollback(&mut self) -> Result<(), DatabaseError>;

    fn close(&mut self) -> Result<(), DatabaseError>;

    /// Transaction-wide timeout, if the resource imposes one
    fn timeout(&self) -> Option<Duration> {
        None
    }
}

pub trait TransactionFactory: Send + Sync {
    fn new_transaction(
        &self,
        level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Result<Box<dyn Transaction>, DatabaseError>;
}
