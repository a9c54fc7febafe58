// SqlMapper - statement executor with a session-local cache and a transactional shared cache
// Modular architecture: mapping metadata, executors, caches, transactions, sessions

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::needless_pass_by_value)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::significant_drop_tightening)]
#![allow(clippy::manual_let_else)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_arguments)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::collapsible_if)]
#![allow(clippy::type_complexity)]
#![allow(clippy::multiple_crate_versions)]

// Core types: values, rows, parameters, errors
pub mod core;

// Re-export all core types as types module
pub mod types {
    pub use crate::core::*;
}

// Shared (second-level) caches and the per-session transactional buffer
pub mod cache;

// Statement metadata (mapped statements, bound SQL, parameter/result maps)
pub mod mapping;

// Executors (base, simple, batch, caching decorator, interceptors)
pub mod executor;

// Transactional resource and backing-store seams, in-memory store
pub mod transaction;

// Settings, configuration, session factory and sessions
pub mod session;

// Static mapper dispatch
pub mod binding;

// Re-export commonly used types for convenience
pub use crate::core::{DatabaseError, Parameter, Result, Row, SqlMapError, Value};
pub use cache::{Cache, CacheBuilder, CacheKey, TransactionalCacheManager};
pub use mapping::{BoundSql, MappedStatement, SqlCommandType, StatementType};
pub use executor::{CachingExecutor, Executor, ExecutorType, LocalCacheScope};
pub use transaction::{MemoryDataSource, MemoryTransactionFactory, Transaction, TransactionFactory};
pub use session::{Configuration, Environment, RowBounds, Settings, SqlSession, SqlSessionFactory};
pub use binding::{MapperMethod, MapperResult, ReturnKind};
