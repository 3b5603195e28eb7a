use std::collections::BTreeSet;

use serde_json::{Map, Value as JsonValue};

/// An input value as written in an operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    String(String),
    Boolean(bool),
    Enum(String),
    List(Vec<Value>),
    Object(Vec<(String, Value)>),
    Variable(String),
}

impl Value {
    /// A literal for `value`. JSON strings become GraphQL strings, never enum values.
    pub fn from_json(value: &JsonValue) -> Value {
        match value {
            JsonValue::Null => Value::Null,
            JsonValue::Bool(value) => Value::Boolean(*value),
            JsonValue::Number(number) => match number.as_i64() {
                Some(int) => Value::Int(int),
                None => Value::Float(number.as_f64().unwrap_or_default()),
            },
            JsonValue::String(value) => Value::String(value.clone()),
            JsonValue::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            JsonValue::Object(fields) => Value::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), Value::from_json(value)))
                    .collect(),
            ),
        }
    }

    /// The JSON form of this value with variables replaced by their values. Missing
    /// variables are null.
    pub fn to_json(&self, variables: &Map<String, JsonValue>) -> JsonValue {
        match self {
            Value::Null => JsonValue::Null,
            Value::Int(value) => (*value).into(),
            Value::Float(value) => serde_json::Number::from_f64(*value)
                .map(JsonValue::Number)
                .unwrap_or_default(),
            Value::String(value) | Value::Enum(value) => JsonValue::String(value.clone()),
            Value::Boolean(value) => JsonValue::Bool(*value),
            Value::List(items) => items.iter().map(|item| item.to_json(variables)).collect(),
            Value::Object(fields) => JsonValue::Object(
                fields
                    .iter()
                    .map(|(name, value)| (name.clone(), value.to_json(variables)))
                    .collect(),
            ),
            Value::Variable(name) => variables.get(name).cloned().unwrap_or_default(),
        }
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Value::Variable(_))
    }

    pub(super) fn collect_variables(&self, used: &mut BTreeSet<String>) {
        match self {
            Value::Variable(name) => {
                used.insert(name.clone());
            }
            Value::List(items) => items.iter().for_each(|item| item.collect_variables(used)),
            Value::Object(fields) => fields.iter().for_each(|(_, value)| value.collect_variables(used)),
            _ => (),
        }
    }

    pub(super) fn visit_variables_mut(&mut self, f: &mut impl FnMut(&mut String)) {
        match self {
            Value::Variable(name) => f(name),
            Value::List(items) => items.iter_mut().for_each(|item| item.visit_variables_mut(f)),
            Value::Object(fields) => fields.iter_mut().for_each(|(_, value)| value.visit_variables_mut(f)),
            _ => (),
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn json_conversions() {
        let json = json!({ "id": 1, "score": 1.5, "tags": ["a", null], "active": true });
        let value = Value::from_json(&json);

        assert_eq!(
            value,
            Value::Object(vec![
                ("id".into(), Value::Int(1)),
                ("score".into(), Value::Float(1.5)),
                (
                    "tags".into(),
                    Value::List(vec![Value::String("a".into()), Value::Null])
                ),
                ("active".into(), Value::Boolean(true)),
            ])
        );
        assert_eq!(value.to_json(&Map::new()), json);
    }

    #[test]
    fn variables_are_substituted() {
        let variables = json!({ "id": "7" }).as_object().cloned().unwrap();
        let value = Value::List(vec![Value::Variable("id".into()), Value::Variable("missing".into())]);
        assert_eq!(value.to_json(&variables), json!(["7", null]));
    }
}
