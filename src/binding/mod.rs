//! Static mapper dispatch: (mapper, method) resolved to a statement once at startup

use crate::mapping::SqlCommandType;
use crate::types::{Parameter, Result, Row, SqlMapError, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What a mapper method hands back to its caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnKind {
    /// Every row
    Many,
    /// At most one row
    One,
    /// Affected-row count
    Affected,
    /// Rows keyed by the named column
    Map(String),
}

/// One dispatch-table entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MapperMethod {
    pub statement_id: String,
    /// Filled from the statement when the method is registered
    pub command: SqlCommandType,
    pub returns: ReturnKind,
    pub param_names: Vec<String>,
}

impl MapperMethod {
    pub fn new(statement_id: impl Into<String>, returns: ReturnKind) -> Self {
        Self {
            statement_id: statement_id.into(),
            command: SqlCommandType::Unknown,
            returns,
            param_names: Vec::new(),
        }
    }

    /// Names the positional arguments
    #[must_use]
    pub fn params(mut self, names: &[&str]) -> Self {
        self.param_names = names.iter().map(|n| (*n).to_string()).collect();
        self
    }

    /// Turns call arguments into a statement parameter.
    ///
    /// No arguments bind nothing; a single unnamed argument binds as a
    /// scalar. Otherwise arguments are bound by name (when named) and
    /// always as `param1..paramN`.
    pub fn bind(&self, args: &[Value]) -> Result<Parameter> {
        if !self.param_names.is_empty() && self.param_names.len() != args.len() {
            return Err(SqlMapError::Binding(format!(
                "{} expects {} argument(s) ({}), got {}",
                self.statement_id,
                self.param_names.len(),
                self.param_names.join(", "),
                args.len()
            )));
        }
        match args {
            [] => Ok(Parameter::None),
            [single] if self.param_names.is_empty() => Ok(Parameter::Scalar(single.clone())),
            _ => {
                let mut map = BTreeMap::new();
                for (i, arg) in args.iter().enumerate() {
                    if let Some(name) = self.param_names.get(i) {
                        map.insert(name.clone(), arg.clone());
                    }
                    map.entry(format!("param{}", i + 1)).or_insert_with(|| arg.clone());
                }
                Ok(Parameter::Map(map))
            }
        }
    }
}

/// Result of a dispatched mapper call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MapperResult {
    Rows(Vec<Row>),
    Row(Option<Row>),
    Affected(u64),
    Map(HashMap<Value, Row>),
}

/// Dispatch table keyed by mapper and method name
#[derive(Debug, Default, Clone)]
pub struct MapperRegistry {
    methods: HashMap<(String, String), Arc<MapperMethod>>,
}

impl MapperRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add(&mut self, mapper: &str, method: &str, mapper_method: MapperMethod) -> Result<()> {
        let key = (mapper.to_string(), method.to_string());
        if self.methods.contains_key(&key) {
            return Err(SqlMapError::Configuration(format!(
                "Mapper method {mapper}.{method} is already registered"
            )));
        }
        self.methods.insert(key, Arc::new(mapper_method));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, mapper: &str, method: &str) -> Option<Arc<MapperMethod>> {
        self.methods.get(&(mapper.to_string(), method.to_string())).cloned()
    }

    pub fn resolve(&self, mapper: &str, method: &str) -> Result<Arc<MapperMethod>> {
        self.get(mapper, method)
            .ok_or_else(|| SqlMapError::Binding(format!("Mapper method {mapper}.{method} is not registered")))
    }

    /// Whether any method of `mapper` is registered
    #[must_use]
    pub fn has_mapper(&self, mapper: &str) -> bool {
        self.methods.keys().any(|(m, _)| m == mapper)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}
