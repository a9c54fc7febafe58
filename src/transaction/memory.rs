use super::{Connection, IsolationLevel, StatementRequest, Transaction, TransactionFactory};
use crate::types::{DatabaseError, Row, Value};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::debug;

/// Named in-memory tables
pub type Tables = HashMap<String, Vec<Row>>;

type QueryHandler = Arc<dyn Fn(&Tables, &StatementRequest<'_>) -> Result<Vec<Row>, DatabaseError> + Send + Sync>;
type UpdateHandler = Arc<dyn Fn(&mut Tables, &StatementRequest<'_>) -> Result<u64, DatabaseError> + Send + Sync>;

/// Round trips served by a [`MemoryDataSource`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DataSourceStats {
    pub queries: u64,
    pub updates: u64,
    pub batches: u64,
    pub commits: u64,
    pub rollbacks: u64,
}

#[derive(Default)]
struct Counters {
    queries: AtomicU64,
    updates: AtomicU64,
    batches: AtomicU64,
    commits: AtomicU64,
    rollbacks: AtomicU64,
}

/// In-memory backing store. Statements are resolved by exact SQL text to a
/// registered handler that reads or mutates the tables.
#[derive(Default)]
pub struct MemoryDataSource {
    tables: RwLock<Tables>,
    queries: RwLock<HashMap<String, QueryHandler>>,
    updates: RwLock<HashMap<String, UpdateHandler>>,
    counters: Counters,
}

impl MemoryDataSource {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates (or replaces) a table
    pub fn create_table(&self, name: impl Into<String>, rows: Vec<Row>) {
        self.tables.write().insert(name.into(), rows);
    }

    #[must_use]
    pub fn table(&self, name: &str) -> Option<Vec<Row>> {
        self.tables.read().get(name).cloned()
    }

    pub fn register_query<F>(&self, sql: impl Into<String>, handler: F)
    where
        F: Fn(&Tables, &StatementRequest<'_>) -> Result<Vec<Row>, DatabaseError> + Send + Sync + 'static,
    {
        self.queries.write().insert(sql.into(), Arc::new(handler));
    }

    pub fn register_update<F>(&self, sql: impl Into<String>, handler: F)
    where
        F: Fn(&mut Tables, &StatementRequest<'_>) -> Result<u64, DatabaseError> + Send + Sync + 'static,
    {
        self.updates.write().insert(sql.into(), Arc::new(handler));
    }

    #[must_use]
    pub fn stats(&self) -> DataSourceStats {
        DataSourceStats {
            queries: self.counters.queries.load(Ordering::Relaxed),
            updates: self.counters.updates.load(Ordering::Relaxed),
            batches: self.counters.batches.load(Ordering::Relaxed),
            commits: self.counters.commits.load(Ordering::Relaxed),
            rollbacks: self.counters.rollbacks.load(Ordering::Relaxed),
        }
    }

    fn run_query(&self, request: &StatementRequest<'_>) -> Result<Vec<Row>, DatabaseError> {
        let handler = self
            .queries
            .read()
            .get(request.sql)
            .cloned()
            .ok_or_else(|| DatabaseError::UnknownStatement(request.sql.to_string()))?;
        self.counters.queries.fetch_add(1, Ordering::Relaxed);
        // No lock is held while the handler runs; it may issue nested statements
        let tables = self.tables.read().clone();
        handler(&tables, request)
    }

    fn run_update(&self, request: &StatementRequest<'_>) -> Result<u64, DatabaseError> {
        let handler = self
            .updates
            .read()
            .get(request.sql)
            .cloned()
            .ok_or_else(|| DatabaseError::UnknownStatement(request.sql.to_string()))?;
        self.counters.updates.fetch_add(1, Ordering::Relaxed);
        let mut tables = self.tables.write();
        handler(&mut tables, request)
    }
}

/// Connection to a [`MemoryDataSource`].
///
/// Outside auto-commit the tables are snapshotted on the first write and
/// restored on rollback. Writes are visible to other connections at once.
pub struct MemoryConnection {
    source: Arc<MemoryDataSource>,
    auto_commit: bool,
    snapshot: Mutex<Option<Tables>>,
    closed: AtomicBool,
}

impl MemoryConnection {
    fn new(source: Arc<MemoryDataSource>, auto_commit: bool) -> Self {
        Self {
            source,
            auto_commit,
            snapshot: Mutex::new(None),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), DatabaseError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(DatabaseError::ConnectionClosed);
        }
        Ok(())
    }

    fn begin_write(&self) {
        if self.auto_commit {
            return;
        }
        let mut snapshot = self.snapshot.lock();
        if snapshot.is_none() {
            *snapshot = Some(self.source.tables.read().clone());
        }
    }

    /// True when uncommitted writes exist
    #[must_use]
    pub fn in_transaction(&self) -> bool {
        self.snapshot.lock().is_some()
    }

    pub fn commit(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        self.snapshot.lock().take();
        self.source.counters.commits.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    pub fn rollback(&self) -> Result<(), DatabaseError> {
        self.ensure_open()?;
        if let Some(snapshot) = self.snapshot.lock().take() {
            *self.source.tables.write() = snapshot;
        }
        self.source.counters.rollbacks.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Closes the connection, discarding uncommitted writes
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        if let Some(snapshot) = self.snapshot.lock().take() {
            debug!("Discarding uncommitted writes on close");
            *self.source.tables.write() = snapshot;
        }
    }
}

impl Connection for MemoryConnection {
    fn query(&self, request: &StatementRequest<'_>) -> Result<Vec<Row>, DatabaseError> {
        self.ensure_open()?;
        self.source.run_query(request)
    }

    fn update(&self, request: &StatementRequest<'_>) -> Result<u64, DatabaseError> {
        self.ensure_open()?;
        self.begin_write();
        self.source.run_update(request)
    }

    fn execute_batch(&self, request: &StatementRequest<'_>, batch: &[Vec<Value>]) -> Result<Vec<u64>, DatabaseError> {
        self.ensure_open()?;
        self.source.counters.batches.fetch_add(1, Ordering::Relaxed);
        self.begin_write();
        batch
            .iter()
            .map(|parameters| self.source.run_update(&request.with_parameters(parameters)))
            .collect()
    }
}

/// [`Transaction`] over a [`MemoryDataSource`]; the connection opens on first use
pub struct MemoryTransaction {
    source: Arc<MemoryDataSource>,
    level: Option<IsolationLevel>,
    auto_commit: bool,
    connection: Option<Arc<MemoryConnection>>,
}

impl MemoryTransaction {
    #[must_use]
    pub const fn new(source: Arc<MemoryDataSource>, level: Option<IsolationLevel>, auto_commit: bool) -> Self {
        Self {
            source,
            level,
            auto_commit,
            connection: None,
        }
    }

    #[must_use]
    pub const fn isolation_level(&self) -> Option<IsolationLevel> {
        self.level
    }
}

impl Transaction for MemoryTransaction {
    fn connection(&mut self) -> Result<Arc<dyn Connection>, DatabaseError> {
        let connection = self
            .connection
            .get_or_insert_with(|| Arc::new(MemoryConnection::new(Arc::clone(&self.source), self.auto_commit)));
        connection.ensure_open()?;
        Ok(Arc::clone(connection) as Arc<dyn Connection>)
    }

    fn commit(&mut self) -> Result<(), DatabaseError> {
        match &self.connection {
            Some(connection) if !self.auto_commit => connection.commit(),
            _ => Ok(()),
        }
    }

    fn rollback(&mut self) -> Result<(), DatabaseError> {
        match &self.connection {
            Some(connection) if !self.auto_commit => connection.rollback(),
            _ => Ok(()),
        }
    }

    fn close(&mut self) -> Result<(), DatabaseError> {
        if let Some(connection) = self.connection.take() {
            connection.close();
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryTransactionFactory {
    source: Arc<MemoryDataSource>,
}

impl MemoryTransactionFactory {
    #[must_use]
    pub const fn new(source: Arc<MemoryDataSource>) -> Self {
        Self { source }
    }

    #[must_use]
    pub const fn data_source(&self) -> &Arc<MemoryDataSource> {
        &self.source
    }
}

impl TransactionFactory for MemoryTransactionFactory {
    fn new_transaction(
        &self,
        level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Result<Box<dyn Transaction>, DatabaseError> {
        Ok(Box::new(MemoryTransaction::new(Arc::clone(&self.source), level, auto_commit)))
    }
}
