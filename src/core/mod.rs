// Module declarations
pub mod error;
pub mod value;
pub mod row;
pub mod parameter;

// Re-exports for convenience
pub use error::{DatabaseError, Result, SqlMapError};
pub use value::Value;
pub use row::Row;
pub use parameter::Parameter;
