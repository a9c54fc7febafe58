use super::Settings;
use crate::binding::{MapperMethod, MapperRegistry, ReturnKind};
use crate::cache::Cache;
use crate::executor::{
    BatchExecutor, CachingExecutor, Executor, ExecutorOptions, ExecutorType, Interceptor, InterceptorChain,
    SimpleExecutor,
};
use crate::mapping::{
    LanguageDriver, MappedStatement, MappedStatementBuilder, ParameterMap, ParameterMapping, RawLanguageDriver,
    ResultMap, ResultMapRegistry, SqlCommandType, StatementDefaults,
};
use crate::transaction::{Transaction, TransactionFactory};
use crate::types::{Result, SqlMapError};
use std::collections::HashMap;
use std::sync::Arc;

/// Where sessions get their transactions from
#[derive(Clone)]
pub struct Environment {
    id: String,
    transaction_factory: Arc<dyn TransactionFactory>,
}

impl Environment {
    pub fn new(id: impl Into<String>, transaction_factory: Arc<dyn TransactionFactory>) -> Self {
        Self {
            id: id.into(),
            transaction_factory,
        }
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn transaction_factory(&self) -> &Arc<dyn TransactionFactory> {
        &self.transaction_factory
    }
}

/// Statement registry and executor factory shared by every session.
/// Built once, then read-only behind an `Arc`.
pub struct Configuration {
    settings: Settings,
    environment: Option<Environment>,
    lang: Arc<dyn LanguageDriver>,
    mapped_statements: HashMap<String, Arc<MappedStatement>>,
    caches: HashMap<String, Arc<dyn Cache>>,
    parameter_maps: HashMap<String, ParameterMap>,
    result_maps: Arc<ResultMapRegistry>,
    interceptor_chain: InterceptorChain,
    mapper_registry: MapperRegistry,
}

impl Configuration {
    #[must_use]
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            environment: None,
            lang: Arc::new(RawLanguageDriver),
            mapped_statements: HashMap::new(),
            caches: HashMap::new(),
            parameter_maps: HashMap::new(),
            result_maps: Arc::new(ResultMapRegistry::new()),
            interceptor_chain: InterceptorChain::new(),
            mapper_registry: MapperRegistry::new(),
        }
    }

    #[must_use]
    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = Some(environment);
        self
    }

    #[must_use]
    pub const fn settings(&self) -> &Settings {
        &self.settings
    }

    #[must_use]
    pub const fn environment(&self) -> Option<&Environment> {
        self.environment.as_ref()
    }

    pub fn set_language_driver(&mut self, lang: Arc<dyn LanguageDriver>) {
        self.lang = lang;
    }

    /// Values new statements inherit from this configuration
    #[must_use]
    pub fn statement_defaults(&self) -> StatementDefaults {
        StatementDefaults {
            timeout: self.settings.default_timeout(),
            use_generated_keys: self.settings.use_generated_keys,
            log_prefix: self.settings.log_prefix.clone(),
            lang: Arc::clone(&self.lang),
            result_maps: Arc::clone(&self.result_maps),
        }
    }

    /// Starts a statement whose SQL source comes from the language driver
    pub fn statement_builder(
        &self,
        id: impl Into<String>,
        script: &str,
        parameter_mappings: Vec<ParameterMapping>,
        command: SqlCommandType,
    ) -> MappedStatementBuilder {
        let sql_source = self.lang.create_sql_source(script, parameter_mappings);
        MappedStatement::builder(&self.statement_defaults(), id, sql_source, command)
    }

    pub fn add_mapped_statement(&mut self, ms: MappedStatement) -> Result<Arc<MappedStatement>> {
        if self.mapped_statements.contains_key(ms.id()) {
            return Err(SqlMapError::Configuration(format!(
                "Mapped Statements collection already contains value for {}",
                ms.id()
            )));
        }
        let ms = Arc::new(ms);
        self.mapped_statements.insert(ms.id().to_string(), Arc::clone(&ms));
        Ok(ms)
    }

    pub fn mapped_statement(&self, id: &str) -> Result<Arc<MappedStatement>> {
        self.mapped_statements.get(id).cloned().ok_or_else(|| {
            SqlMapError::Configuration(format!("Mapped Statements collection does not contain value for {id}"))
        })
    }

    #[must_use]
    pub fn has_statement(&self, id: &str) -> bool {
        self.mapped_statements.contains_key(id)
    }

    #[must_use]
    pub fn mapped_statement_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.mapped_statements.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn add_cache(&mut self, cache: Arc<dyn Cache>) -> Result<()> {
        if self.caches.contains_key(cache.id()) {
            return Err(SqlMapError::Configuration(format!(
                "Caches collection already contains value for {}",
                cache.id()
            )));
        }
        self.caches.insert(cache.id().to_string(), cache);
        Ok(())
    }

    #[must_use]
    pub fn cache(&self, id: &str) -> Option<Arc<dyn Cache>> {
        self.caches.get(id).cloned()
    }

    #[must_use]
    pub fn caches(&self) -> Vec<Arc<dyn Cache>> {
        let mut caches: Vec<_> = self.caches.values().cloned().collect();
        caches.sort_by(|a, b| a.id().cmp(b.id()));
        caches
    }

    pub fn add_parameter_map(&mut self, parameter_map: ParameterMap) -> Result<()> {
        if self.parameter_maps.contains_key(&parameter_map.id) {
            return Err(SqlMapError::Configuration(format!(
                "Parameter Maps collection already contains value for {}",
                parameter_map.id
            )));
        }
        self.parameter_maps.insert(parameter_map.id.clone(), parameter_map);
        Ok(())
    }

    pub fn parameter_map(&self, id: &str) -> Result<ParameterMap> {
        self.parameter_maps.get(id).cloned().ok_or_else(|| {
            SqlMapError::Configuration(format!("Parameter Maps collection does not contain value for {id}"))
        })
    }

    pub fn add_result_map(&mut self, result_map: ResultMap) -> Result<Arc<ResultMap>> {
        self.result_maps.add(result_map)
    }

    pub fn result_map(&self, id: &str) -> Result<Arc<ResultMap>> {
        self.result_maps.get(id).ok_or_else(|| {
            SqlMapError::Configuration(format!("Result Maps collection does not contain value for {id}"))
        })
    }

    pub fn add_interceptor(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptor_chain.add(interceptor);
    }

    /// Binds `mapper.method` to a statement. The statement must already be
    /// registered and its command must fit the declared return kind.
    pub fn add_mapper_method(&mut self, mapper: &str, method: &str, mut mapper_method: MapperMethod) -> Result<()> {
        let ms = self.mapped_statement(&mapper_method.statement_id).map_err(|_| {
            SqlMapError::Configuration(format!(
                "Invalid bound statement (not found): {mapper}.{method} -> {}",
                mapper_method.statement_id
            ))
        })?;
        let command = ms.sql_command_type();
        let compatible = match command {
            SqlCommandType::Select => !matches!(mapper_method.returns, ReturnKind::Affected),
            SqlCommandType::Insert | SqlCommandType::Update | SqlCommandType::Delete | SqlCommandType::Flush => {
                matches!(mapper_method.returns, ReturnKind::Affected)
            }
            SqlCommandType::Unknown => false,
        };
        if !compatible {
            return Err(SqlMapError::Configuration(format!(
                "Unknown execution method for: {} ({command:?} returning {:?})",
                ms.id(),
                mapper_method.returns
            )));
        }
        mapper_method.command = command;
        self.mapper_registry.add(mapper, method, mapper_method)
    }

    #[must_use]
    pub const fn mapper_registry(&self) -> &MapperRegistry {
        &self.mapper_registry
    }

    /// Builds the executor chain for one session: backing-store executor,
    /// then the shared-cache decorator when enabled, then interceptors
    pub fn new_executor(&self, transaction: Box<dyn Transaction>, executor_type: ExecutorType) -> Result<Arc<dyn Executor>> {
        let options = ExecutorOptions {
            local_cache_scope: self.settings.local_cache_scope,
            default_timeout: self.settings.default_timeout(),
        };
        let executor: Arc<dyn Executor> = match executor_type {
            ExecutorType::Simple => Arc::new(SimpleExecutor::new(transaction, options)),
            ExecutorType::Batch => Arc::new(BatchExecutor::new(transaction, options)),
        };
        let executor: Arc<dyn Executor> = if self.settings.cache_enabled {
            CachingExecutor::new(executor)?
        } else {
            executor
        };
        Ok(self.interceptor_chain.plugin_all(executor))
    }
}
