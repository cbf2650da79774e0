use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};

use crate::document::normalize_number;

/// The host's generic value encoding.
///
/// Numbers are always doubles on the wire; integral ones come back as
/// integers when converted to a [`Value`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum HostValue {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<HostValue>),
    Struct(BTreeMap<String, HostValue>),
}

impl HostValue {
    pub fn as_struct(&self) -> Option<&BTreeMap<String, HostValue>> {
        if let HostValue::Struct(m) = self {
            Some(m)
        } else {
            None
        }
    }

    pub fn into_json(self) -> Value {
        Value::from(self)
    }
}

impl From<HostValue> for Value {
    fn from(v: HostValue) -> Self {
        match v {
            HostValue::Null => Value::Null,
            HostValue::Bool(b) => Value::Bool(b),
            HostValue::Number(n) => Number::from_f64(n)
                .map(|n| Value::Number(normalize_number(n)))
                .unwrap_or(Value::Null),
            HostValue::String(s) => Value::String(s),
            HostValue::List(items) => Value::Array(items.into_iter().map(Value::from).collect()),
            HostValue::Struct(fields) => Value::Object(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, Value::from(v)))
                    .collect::<Map<_, _>>(),
            ),
        }
    }
}

impl From<Value> for HostValue {
    fn from(v: Value) -> Self {
        match v {
            Value::Null => HostValue::Null,
            Value::Bool(b) => HostValue::Bool(b),
            Value::Number(n) => HostValue::Number(n.as_f64().unwrap_or_default()),
            Value::String(s) => HostValue::String(s),
            Value::Array(items) => {
                HostValue::List(items.into_iter().map(HostValue::from).collect())
            }
            Value::Object(fields) => HostValue::Struct(
                fields
                    .into_iter()
                    .map(|(k, v)| (k, HostValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&Value> for HostValue {
    fn from(v: &Value) -> Self {
        HostValue::from(v.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn converts_both_ways() {
        let original = json!({
            "name": "robot", "count": 3, "ratio": 0.5, "on": true,
            "tags": ["a", null, 2], "nested": {"k": {}}
        });
        let host = HostValue::from(&original);
        assert_eq!(Value::from(host), original);
    }

    #[test]
    fn integral_numbers_decode_as_integers() {
        let v: Value = HostValue::Number(42.0).into();
        assert!(v.is_i64());
        let v: Value = HostValue::Number(-1.25).into();
        assert_eq!(v, json!(-1.25));
    }

    #[test]
    fn wire_form_is_tagged() {
        let v = HostValue::List(vec![HostValue::Bool(true), HostValue::Null]);
        assert_eq!(
            serde_json::to_value(&v).unwrap(),
            json!({"kind": "list", "value": [{"kind": "bool", "value": true}, {"kind": "null"}]})
        );
        let back: HostValue =
            serde_json::from_value(json!({"kind": "number", "value": 7})).unwrap();
        assert_eq!(back, HostValue::Number(7.0));
    }
}
