/// Session layer: settings, configuration, session factory and sessions
///
/// - settings: file + environment backed switches
/// - row_bounds: offset/limit window for queries
/// - configuration: statement registry and executor factory
/// - factory: opens sessions
/// - sql_session: statement-id based API over one executor chain
pub mod settings;
pub mod row_bounds;
pub mod configuration;
pub mod factory;
pub mod sql_session;

pub use settings::Settings;
pub use row_bounds::{NO_ROW_LIMIT, NO_ROW_OFFSET, RowBounds};
pub use configuration::{Configuration, Environment};
pub use factory::SqlSessionFactory;
pub use sql_session::SqlSession;
