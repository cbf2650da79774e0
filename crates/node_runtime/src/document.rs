use serde_json::{Map, Number, Value};

use crate::error::Result;

/// An ordered JSON object addressed by dotted paths.
///
/// `a.b.c` and `a[0].b` both address nested object keys; `[i]` is read as `.i`,
/// so traversal only ever descends through objects.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PathDocument {
    root: Map<String, Value>,
}

impl PathDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses `bytes` as a JSON object. Anything else is an error.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        match serde_json::from_slice::<Value>(bytes)? {
            Value::Object(root) => Ok(Self { root }),
            other => Err(crate::Error::Serialization(format!(
                "expected a JSON object, found {}",
                kind_of(&other)
            ))),
        }
    }

    pub fn from_map(root: Map<String, Value>) -> Self {
        Self { root }
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.root
    }

    pub fn as_map_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.root
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.root
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_empty()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        // a Map of Values always serializes
        serde_json::to_vec(&self.root).unwrap_or_else(|_| b"{}".to_vec())
    }

    /// Borrows the value at `path`, or `None` if any segment is missing or a
    /// non-object is met on the way down.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let segments = split_path(path);
        let (last, parents) = segments.split_last()?;
        let mut current = &self.root;
        for segment in parents {
            current = current.get(segment.as_str())?.as_object()?;
        }
        current.get(last.as_str())
    }

    /// The value at `path` with integral numbers normalised to integers.
    /// JSON `null` reads as absent.
    pub fn get(&self, path: &str) -> Option<Value> {
        match self.lookup(path) {
            None | Some(Value::Null) => None,
            Some(v) => Some(normalize_numbers(v.clone())),
        }
    }

    /// Writes `value` at `path`, creating intermediate objects as needed.
    ///
    /// A segment that exists but is not an object is replaced by a fresh
    /// object, discarding what was there.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = split_path(path);
        let Some((last, parents)) = segments.split_last() else {
            return;
        };
        let mut current = &mut self.root;
        for segment in parents {
            let slot = current
                .entry(segment.clone())
                .or_insert_with(|| Value::Object(Map::new()));
            if !slot.is_object() {
                *slot = Value::Object(Map::new());
            }
            let Value::Object(map) = slot else {
                return;
            };
            current = map;
        }
        current.insert(last.clone(), value);
    }

    pub fn get_string(&self, path: &str) -> String {
        match self.lookup(path) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Number(n)) => n.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            Some(other) => other.to_string(),
        }
    }

    pub fn get_bool(&self, path: &str) -> bool {
        match self.lookup(path) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
            _ => false,
        }
    }

    pub fn get_int(&self, path: &str) -> i64 {
        match self.lookup(path) {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_u64().map(|u| u as i64))
                .or_else(|| n.as_f64().map(|f| f as i64))
                .unwrap_or_default(),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0,
        }
    }

    pub fn get_float(&self, path: &str) -> f64 {
        match self.lookup(path) {
            Some(Value::Number(n)) => n.as_f64().unwrap_or_default(),
            Some(Value::String(s)) => s.trim().parse().unwrap_or_default(),
            _ => 0.0,
        }
    }
}

fn split_path(path: &str) -> Vec<String> {
    path.replace('[', ".")
        .replace(']', "")
        .split('.')
        .map(str::to_owned)
        .collect()
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Rewrites floats that are mathematically integral (`3.0`) as integers,
/// recursively.
pub fn normalize_numbers(value: Value) -> Value {
    match value {
        Value::Number(n) => Value::Number(normalize_number(n)),
        Value::Array(items) => Value::Array(items.into_iter().map(normalize_numbers).collect()),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, normalize_numbers(v)))
                .collect(),
        ),
        other => other,
    }
}

pub(crate) fn normalize_number(n: Number) -> Number {
    if n.is_f64() {
        if let Some(f) = n.as_f64() {
            if f.fract() == 0.0 && f >= i64::MIN as f64 && f < i64::MAX as f64 {
                return Number::from(f as i64);
            }
        }
    }
    n
}
