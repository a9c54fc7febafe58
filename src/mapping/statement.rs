use super::{
    BoundSql, KeyGenerator, LanguageDriver, ParameterMap, ResultMap, ResultMapRegistry, ResultSetType,
    SqlCommandType, SqlSource, StatementType,
};
use crate::cache::Cache;
use crate::types::{Parameter, Result, SqlMapError};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Values a statement inherits from the configuration it is declared in
#[derive(Clone)]
pub struct StatementDefaults {
    pub timeout: Option<Duration>,
    pub use_generated_keys: bool,
    pub log_prefix: Option<String>,
    pub lang: Arc<dyn LanguageDriver>,
    pub result_maps: Arc<ResultMapRegistry>,
}

/// Immutable per-statement policy, shared by every session
pub struct MappedStatement {
    resource: Option<String>,
    id: String,
    fetch_size: Option<u32>,
    timeout: Option<Duration>,
    statement_type: StatementType,
    result_set_type: Option<ResultSetType>,
    sql_source: Arc<dyn SqlSource>,
    cache: Option<Arc<dyn Cache>>,
    parameter_map: ParameterMap,
    result_maps: Vec<Arc<ResultMap>>,
    flush_cache_required: bool,
    use_cache: bool,
    result_ordered: bool,
    sql_command_type: SqlCommandType,
    key_generator: KeyGenerator,
    key_properties: Vec<String>,
    key_columns: Vec<String>,
    // Widened (never narrowed) while resolving bound SQL
    has_nested_result_maps: AtomicBool,
    database_id: Option<String>,
    log_id: String,
    lang: Arc<dyn LanguageDriver>,
    result_sets: Vec<String>,
    result_map_registry: Arc<ResultMapRegistry>,
}

impl MappedStatement {
    /// Starts a builder preloaded with the configuration's defaults.
    ///
    /// Selects default to `use_cache = true`, `flush_cache_required = false`;
    /// everything else defaults to the opposite.
    pub fn builder(
        defaults: &StatementDefaults,
        id: impl Into<String>,
        sql_source: Arc<dyn SqlSource>,
        sql_command_type: SqlCommandType,
    ) -> MappedStatementBuilder {
        let is_select = sql_command_type.is_select();
        MappedStatementBuilder::default()
            .configuration(defaults)
            .id(id)
            .sql_source(sql_source)
            .sql_command_type(sql_command_type)
            .use_cache(is_select)
            .flush_cache_required(!is_select)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    #[must_use]
    pub const fn fetch_size(&self) -> Option<u32> {
        self.fetch_size
    }

    #[must_use]
    pub const fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    #[must_use]
    pub const fn statement_type(&self) -> StatementType {
        self.statement_type
    }

    #[must_use]
    pub const fn result_set_type(&self) -> Option<ResultSetType> {
        self.result_set_type
    }

    #[must_use]
    pub fn sql_source(&self) -> &Arc<dyn SqlSource> {
        &self.sql_source
    }

    #[must_use]
    pub const fn cache(&self) -> Option<&Arc<dyn Cache>> {
        self.cache.as_ref()
    }

    #[must_use]
    pub const fn parameter_map(&self) -> &ParameterMap {
        &self.parameter_map
    }

    #[must_use]
    pub fn result_maps(&self) -> &[Arc<ResultMap>] {
        &self.result_maps
    }

    #[must_use]
    pub const fn is_flush_cache_required(&self) -> bool {
        self.flush_cache_required
    }

    #[must_use]
    pub const fn is_use_cache(&self) -> bool {
        self.use_cache
    }

    #[must_use]
    pub const fn is_result_ordered(&self) -> bool {
        self.result_ordered
    }

    #[must_use]
    pub const fn sql_command_type(&self) -> SqlCommandType {
        self.sql_command_type
    }

    #[must_use]
    pub const fn key_generator(&self) -> KeyGenerator {
        self.key_generator
    }

    #[must_use]
    pub fn key_properties(&self) -> &[String] {
        &self.key_properties
    }

    #[must_use]
    pub fn key_columns(&self) -> &[String] {
        &self.key_columns
    }

    #[must_use]
    pub fn has_nested_result_maps(&self) -> bool {
        self.has_nested_result_maps.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn database_id(&self) -> Option<&str> {
        self.database_id.as_deref()
    }

    /// Name statement logs are emitted under (log prefix + id)
    #[must_use]
    pub fn log_id(&self) -> &str {
        &self.log_id
    }

    #[must_use]
    pub fn lang(&self) -> &Arc<dyn LanguageDriver> {
        &self.lang
    }

    #[must_use]
    pub fn result_sets(&self) -> &[String] {
        &self.result_sets
    }

    /// Resolves text and bindings for `parameter`.
    ///
    /// Falls back to the declared parameter map when the SQL source reports
    /// no bindings, then widens `has_nested_result_maps` for any binding that
    /// reads through a result map with nested result maps.
    pub fn bound_sql(&self, parameter: &Parameter) -> BoundSql {
        let mut bound_sql = self.sql_source.bound_sql(parameter);
        if bound_sql.parameter_mappings().is_empty() {
            let (sql, _, additional) = bound_sql.into_parts();
            bound_sql = BoundSql::new(sql, self.parameter_map.mappings.clone(), parameter.clone())
                .with_additional(additional);
        }

        for mapping in bound_sql.parameter_mappings() {
            let Some(rm_id) = mapping.result_map_id.as_deref() else {
                continue;
            };
            if let Some(result_map) = self.result_map_registry.get(rm_id) {
                if result_map.has_nested_result_maps() {
                    self.has_nested_result_maps.fetch_or(true, Ordering::AcqRel);
                }
            }
        }

        bound_sql
    }
}

impl std::fmt::Debug for MappedStatement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MappedStatement")
            .field("id", &self.id)
            .field("sql_command_type", &self.sql_command_type)
            .field("statement_type", &self.statement_type)
            .field("cache", &self.cache.as_ref().map(|c| c.id().to_string()))
            .field("use_cache", &self.use_cache)
            .field("flush_cache_required", &self.flush_cache_required)
            .finish_non_exhaustive()
    }
}

/// Assembles a [`MappedStatement`]; `build` validates required fields
#[derive(Default)]
pub struct MappedStatementBuilder {
    defaults: Option<StatementDefaults>,
    resource: Option<String>,
    id: Option<String>,
    fetch_size: Option<u32>,
    timeout: Option<Duration>,
    statement_type: StatementType,
    result_set_type: Option<ResultSetType>,
    sql_source: Option<Arc<dyn SqlSource>>,
    cache: Option<Arc<dyn Cache>>,
    parameter_map: Option<ParameterMap>,
    result_maps: Vec<Arc<ResultMap>>,
    flush_cache_required: bool,
    use_cache: bool,
    result_ordered: bool,
    sql_command_type: Option<SqlCommandType>,
    key_generator: Option<KeyGenerator>,
    key_properties: Vec<String>,
    key_columns: Vec<String>,
    has_nested_result_maps: bool,
    database_id: Option<String>,
    lang: Option<Arc<dyn LanguageDriver>>,
    result_sets: Vec<String>,
}

impl MappedStatementBuilder {
    /// Inherits timeout, language driver and result-map registry from a configuration
    #[must_use]
    pub fn configuration(mut self, defaults: &StatementDefaults) -> Self {
        if self.timeout.is_none() {
            self.timeout = defaults.timeout;
        }
        if self.lang.is_none() {
            self.lang = Some(Arc::clone(&defaults.lang));
        }
        self.defaults = Some(defaults.clone());
        self
    }

    #[must_use]
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    #[must_use]
    pub fn sql_source(mut self, sql_source: Arc<dyn SqlSource>) -> Self {
        self.sql_source = Some(sql_source);
        self
    }

    #[must_use]
    pub const fn sql_command_type(mut self, sql_command_type: SqlCommandType) -> Self {
        self.sql_command_type = Some(sql_command_type);
        self
    }

    #[must_use]
    pub fn parameter_map(mut self, parameter_map: ParameterMap) -> Self {
        self.parameter_map = Some(parameter_map);
        self
    }

    /// Sets result maps; any nested result map marks the statement as nested
    #[must_use]
    pub fn result_maps(mut self, result_maps: Vec<Arc<ResultMap>>) -> Self {
        self.has_nested_result_maps |= result_maps.iter().any(|rm| rm.has_nested_result_maps());
        self.result_maps = result_maps;
        self
    }

    #[must_use]
    pub const fn fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = Some(fetch_size);
        self
    }

    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    #[must_use]
    pub const fn statement_type(mut self, statement_type: StatementType) -> Self {
        self.statement_type = statement_type;
        self
    }

    #[must_use]
    pub const fn result_set_type(mut self, result_set_type: ResultSetType) -> Self {
        self.result_set_type = Some(result_set_type);
        self
    }

    #[must_use]
    pub fn cache(mut self, cache: Arc<dyn Cache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub const fn flush_cache_required(mut self, flush_cache_required: bool) -> Self {
        self.flush_cache_required = flush_cache_required;
        self
    }

    #[must_use]
    pub const fn use_cache(mut self, use_cache: bool) -> Self {
        self.use_cache = use_cache;
        self
    }

    #[must_use]
    pub const fn result_ordered(mut self, result_ordered: bool) -> Self {
        self.result_ordered = result_ordered;
        self
    }

    #[must_use]
    pub const fn key_generator(mut self, key_generator: KeyGenerator) -> Self {
        self.key_generator = Some(key_generator);
        self
    }

    /// Comma-delimited property names receiving generated keys
    #[must_use]
    pub fn key_property(mut self, key_property: &str) -> Self {
        self.key_properties = delimited_string_to_vec(key_property);
        self
    }

    #[must_use]
    pub fn key_column(mut self, key_column: &str) -> Self {
        self.key_columns = delimited_string_to_vec(key_column);
        self
    }

    #[must_use]
    pub fn database_id(mut self, database_id: impl Into<String>) -> Self {
        self.database_id = Some(database_id.into());
        self
    }

    #[must_use]
    pub fn lang(mut self, lang: Arc<dyn LanguageDriver>) -> Self {
        self.lang = Some(lang);
        self
    }

    #[must_use]
    pub fn result_sets(mut self, result_sets: &str) -> Self {
        self.result_sets = delimited_string_to_vec(result_sets);
        self
    }

    pub fn build(self) -> Result<MappedStatement> {
        let defaults = self.defaults.ok_or_else(|| missing("configuration"))?;
        let id = self.id.ok_or_else(|| missing("id"))?;
        let sql_source = self.sql_source.ok_or_else(|| missing("sql source"))?;
        let lang = self.lang.ok_or_else(|| missing("language driver"))?;

        let sql_command_type = self.sql_command_type.unwrap_or(SqlCommandType::Unknown);
        let key_generator = self.key_generator.unwrap_or(
            if defaults.use_generated_keys && sql_command_type == SqlCommandType::Insert {
                KeyGenerator::Generated
            } else {
                KeyGenerator::None
            },
        );
        let log_id = match &defaults.log_prefix {
            Some(prefix) => format!("{prefix}{id}"),
            None => id.clone(),
        };
        let parameter_map = self
            .parameter_map
            .unwrap_or_else(|| ParameterMap::new("defaultParameterMap", Vec::new()));

        Ok(MappedStatement {
            resource: self.resource,
            id,
            fetch_size: self.fetch_size,
            timeout: self.timeout,
            statement_type: self.statement_type,
            result_set_type: self.result_set_type,
            sql_source,
            cache: self.cache,
            parameter_map,
            result_maps: self.result_maps,
            flush_cache_required: self.flush_cache_required,
            use_cache: self.use_cache,
            result_ordered: self.result_ordered,
            sql_command_type,
            key_generator,
            key_properties: self.key_properties,
            key_columns: self.key_columns,
            has_nested_result_maps: AtomicBool::new(self.has_nested_result_maps),
            database_id: self.database_id,
            log_id,
            lang,
            result_sets: self.result_sets,
            result_map_registry: defaults.result_maps,
        })
    }
}

fn missing(field: &str) -> SqlMapError {
    SqlMapError::Configuration(format!("MappedStatement requires a {field}"))
}

fn delimited_string_to_vec(input: &str) -> Vec<String> {
    if input.trim().is_empty() {
        return Vec::new();
    }
    input.split(',').map(|s| s.trim().to_string()).collect()
}
