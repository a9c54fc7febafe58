use super::{Configuration, SqlSession};
use crate::executor::ExecutorType;
use crate::transaction::IsolationLevel;
use crate::types::{Result, SqlMapError};
use std::sync::Arc;
use tracing::info;

/// Opens sessions against one [`Configuration`]
#[derive(Clone)]
pub struct SqlSessionFactory {
    configuration: Arc<Configuration>,
}

impl SqlSessionFactory {
    #[must_use]
    pub fn new(configuration: Configuration) -> Self {
        Self {
            configuration: Arc::new(configuration),
        }
    }

    #[must_use]
    pub const fn configuration(&self) -> &Arc<Configuration> {
        &self.configuration
    }

    /// Default executor type, no auto-commit
    pub fn open_session(&self) -> Result<SqlSession> {
        self.open_session_with(self.configuration.settings().default_executor_type, None, false)
    }

    pub fn open_session_auto_commit(&self, auto_commit: bool) -> Result<SqlSession> {
        self.open_session_with(self.configuration.settings().default_executor_type, None, auto_commit)
    }

    pub fn open_session_with_type(&self, executor_type: ExecutorType) -> Result<SqlSession> {
        self.open_session_with(executor_type, None, false)
    }

    pub fn open_session_with_level(&self, level: IsolationLevel) -> Result<SqlSession> {
        self.open_session_with(self.configuration.settings().default_executor_type, Some(level), false)
    }

    /// Opens a session. If building the executor chain fails the new
    /// transaction is closed with the executor that owned it.
    pub fn open_session_with(
        &self,
        executor_type: ExecutorType,
        level: Option<IsolationLevel>,
        auto_commit: bool,
    ) -> Result<SqlSession> {
        let environment = self.configuration.environment().ok_or_else(|| {
            SqlMapError::Configuration("Environment was not configured".to_string())
        })?;
        let transaction = environment
            .transaction_factory()
            .new_transaction(level, auto_commit)
            .map_err(SqlMapError::Transaction)?;
        let executor = self.configuration.new_executor(transaction, executor_type)?;
        info!(
            environment = environment.id(),
            executor = ?executor_type,
            auto_commit,
            "Opened session"
        );
        Ok(SqlSession::new(Arc::clone(&self.configuration), executor, auto_commit))
    }
}
