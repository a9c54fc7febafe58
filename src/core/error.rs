use thiserror::Error;

/// Errors reported by a backing store (`Connection` / `Transaction` implementations)
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Table '{0}' not found")]
    TableNotFound(String),
    #[error("No handler registered for statement: {0}")]
    UnknownStatement(String),
    #[error("Parameter count mismatch: expected {expected}, got {actual}")]
    ParameterCountMismatch { expected: usize, actual: usize },
    #[error("Type mismatch: {0}")]
    TypeMismatch(String),
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("Statement timed out after {0} seconds")]
    Timeout(u64),
    #[error("Connection is closed")]
    ConnectionClosed,
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by executors, caches and sessions
#[derive(Error, Debug)]
pub enum SqlMapError {
    /// Fatal misconfiguration; never retried
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Error executing statement '{statement}': {source}")]
    Execution {
        statement: String,
        #[source]
        source: DatabaseError,
    },
    #[error("Transaction error: {0}")]
    Transaction(#[source] DatabaseError),
    #[error("Executor was closed")]
    ClosedSession,
    #[error("Expected one result (or none) to be returned by select_one(), but found: {0}")]
    TooManyResults(usize),
    #[error("Binding error: {0}")]
    Binding(String),
    #[error("Interceptor rejected operation: {0}")]
    Interceptor(String),
    #[error("Settings error: {0}")]
    Settings(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SqlMapError {
    /// Wraps a backing-store failure with the id of the statement that caused it
    pub fn execution(statement: &str, source: DatabaseError) -> Self {
        Self::Execution {
            statement: statement.to_string(),
            source,
        }
    }

    #[must_use]
    pub const fn is_closed_session(&self) -> bool {
        matches!(self, Self::ClosedSession)
    }
}

pub type Result<T> = std::result::Result<T, SqlMapError>;
