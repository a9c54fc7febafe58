use super::ParameterMode;
use crate::types::{Parameter, Value};
use std::collections::BTreeMap;

/// One placeholder binding: which property feeds it and in which direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterMapping {
    pub property: String,
    pub mode: ParameterMode,
    /// Result map used to read an OUT cursor, if any
    pub result_map_id: Option<String>,
}

impl ParameterMapping {
    pub fn new(property: impl Into<String>) -> Self {
        Self {
            property: property.into(),
            mode: ParameterMode::In,
            result_map_id: None,
        }
    }

    #[must_use]
    pub const fn mode(mut self, mode: ParameterMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn result_map(mut self, id: impl Into<String>) -> Self {
        self.result_map_id = Some(id.into());
        self
    }
}

/// Declared, named list of parameter bindings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParameterMap {
    pub id: String,
    pub mappings: Vec<ParameterMapping>,
}

impl ParameterMap {
    pub fn new(id: impl Into<String>, mappings: Vec<ParameterMapping>) -> Self {
        Self {
            id: id.into(),
            mappings,
        }
    }
}

/// Statement text plus the bindings resolved for one parameter object
#[derive(Debug, Clone)]
pub struct BoundSql {
    sql: String,
    parameter_mappings: Vec<ParameterMapping>,
    parameter: Parameter,
    additional_parameters: BTreeMap<String, Value>,
}

impl BoundSql {
    pub fn new(sql: impl Into<String>, parameter_mappings: Vec<ParameterMapping>, parameter: Parameter) -> Self {
        Self {
            sql: sql.into(),
            parameter_mappings,
            parameter,
            additional_parameters: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &str {
        &self.sql
    }

    #[must_use]
    pub fn parameter_mappings(&self) -> &[ParameterMapping] {
        &self.parameter_mappings
    }

    #[must_use]
    pub const fn parameter(&self) -> &Parameter {
        &self.parameter
    }

    /// Binds a value generated while building the SQL (loop variables and the like).
    /// Additional parameters shadow properties of the parameter object.
    pub fn set_additional_parameter(&mut self, name: impl Into<String>, value: Value) {
        self.additional_parameters.insert(name.into(), value);
    }

    #[must_use]
    pub fn has_additional_parameter(&self, name: &str) -> bool {
        self.additional_parameters.contains_key(name)
    }

    pub(crate) fn into_parts(self) -> (String, Vec<ParameterMapping>, BTreeMap<String, Value>) {
        (self.sql, self.parameter_mappings, self.additional_parameters)
    }

    pub(crate) fn with_additional(mut self, additional: BTreeMap<String, Value>) -> Self {
        self.additional_parameters = additional;
        self
    }

    /// Effective value for one binding
    #[must_use]
    pub fn value_for(&self, mapping: &ParameterMapping) -> Value {
        if let Some(value) = self.additional_parameters.get(&mapping.property) {
            return value.clone();
        }
        self.parameter.property(&mapping.property)
    }

    /// Values for every binding, in placeholder order. OUT bindings are sent as NULL.
    #[must_use]
    pub fn parameter_values(&self) -> Vec<Value> {
        self.parameter_mappings
            .iter()
            .map(|m| match m.mode {
                ParameterMode::Out => Value::Null,
                ParameterMode::In | ParameterMode::InOut => self.value_for(m),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_values_follow_binding_order() {
        let bound = BoundSql::new(
            "UPDATE users SET name = ? WHERE id = ?",
            vec![ParameterMapping::new("name"), ParameterMapping::new("id")],
            Parameter::map([("id", Value::Integer(1)), ("name", Value::from("Alice"))]),
        );
        assert_eq!(bound.parameter_values(), vec![Value::from("Alice"), Value::Integer(1)]);
    }

    #[test]
    fn test_additional_parameters_shadow_properties() {
        let mut bound = BoundSql::new(
            "SELECT * FROM t WHERE id = ?",
            vec![ParameterMapping::new("id")],
            Parameter::map([("id", Value::Integer(1))]),
        );
        bound.set_additional_parameter("id", Value::Integer(99));
        assert!(bound.has_additional_parameter("id"));
        assert_eq!(bound.parameter_values(), vec![Value::Integer(99)]);
    }

    #[test]
    fn test_out_bindings_sent_as_null() {
        let bound = BoundSql::new(
            "{call total(?, ?)}",
            vec![
                ParameterMapping::new("id"),
                ParameterMapping::new("total").mode(ParameterMode::Out),
            ],
            Parameter::map([("id", Value::Integer(3)), ("total", Value::Integer(10))]),
        );
        assert_eq!(bound.parameter_values(), vec![Value::Integer(3), Value::Null]);
    }
}
