//! Record document
//!
//! Open, dynamically-keyed document exchanged with backing collections.
//! Field order is preserved; reads and writes go through typed accessors.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A workload document (field name -> arbitrary JSON value)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(Map<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Wrap a JSON value; `None` unless it is an object
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Raw field access
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Field is present, even if null
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Field is present and not null
    pub fn is_set(&self, field: &str) -> bool {
        matches!(self.0.get(field), Some(v) if !v.is_null())
    }

    /// Field is absent, null, or a zero value (`""`, `0`, `false`, `{}`, `[]`)
    pub fn is_empty_value(&self, field: &str) -> bool {
        match self.0.get(field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.is_empty(),
            Some(Value::Bool(b)) => !b,
            Some(Value::Number(n)) => n.as_f64() == Some(0.0),
            Some(Value::Array(arr)) => arr.is_empty(),
            Some(Value::Object(map)) => map.is_empty(),
        }
    }

    /// String field, only if it holds a JSON string
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Field rendered as text; absent and null become `""`
    pub fn get_string(&self, field: &str) -> String {
        self.0.get(field).map(value_to_string).unwrap_or_default()
    }

    /// Nested document field
    pub fn get_map(&self, field: &str) -> Option<&Map<String, Value>> {
        self.0.get(field).and_then(Value::as_object)
    }

    /// Sequence field
    pub fn get_slice(&self, field: &str) -> Option<&Vec<Value>> {
        self.0.get(field).and_then(Value::as_array)
    }

    /// Sequence field, keeping only the entries that are documents
    pub fn get_records(&self, field: &str) -> Vec<Record> {
        self.get_slice(field)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| Record::from_value(item.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Set a field, returning the previous value
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Set `key = value` inside the string map at `field`.
    ///
    /// A missing, null or non-map field is replaced by a fresh map.
    pub fn merge_into_map(&mut self, field: &str, key: &str, value: &str) {
        let entry = self
            .0
            .entry(field.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !entry.is_object() {
            *entry = Value::Object(Map::new());
        }
        if let Value::Object(map) = entry {
            map.insert(key.to_string(), Value::String(value.to_string()));
        }
    }

    /// Shallow merge: every field of `other` overwrites the same field here
    pub fn merge(&mut self, other: Record) {
        for (field, value) in other.0 {
            self.0.insert(field, value);
        }
    }

    /// Resolve a dot-notation path (`selector.matchLabels`) to a value.
    /// Numeric segments index into sequences.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut parts = path.split('.');
        let mut current = self.0.get(parts.next()?)?;

        for part in parts {
            current = if let Ok(idx) = part.parse::<usize>() {
                current.get(idx)?
            } else {
                current.get(part)?
            };
        }

        Some(current)
    }
}

impl From<Map<String, Value>> for Record {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        record.into_value()
    }
}

/// Render a scalar as text (strings unquoted, null as empty)
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
