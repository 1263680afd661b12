//! Value types for skiff's runtime.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Serialize, Serializer};

use crate::deferred::{Deferred, DeferredState};

/// A runtime value.
///
/// Supports primitives (null, bool, int, float, string), lists, records
/// and deferred values. Records keep their keys sorted so output is stable.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),
    /// A computation that has not necessarily finished yet.
    Deferred(Deferred),
}

impl Value {
    /// Name of the value's type, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Record(_) => "record",
            Value::Deferred(_) => "deferred",
        }
    }

    /// The deferred handle, if this value is one.
    ///
    /// This is the classification the shell uses to decide whether a result
    /// must be awaited.
    pub fn as_deferred(&self) -> Option<&Deferred> {
        match self {
            Value::Deferred(d) => Some(d),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Build a record from `(key, value)` pairs.
    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Record(fields.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Convert to JSON. Deferred values become a tagged object describing
    /// their current state; non-finite floats become null.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::List(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Record(fields) => serde_json::Value::Object(
                fields.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Deferred(d) => {
                let mut map = serde_json::Map::new();
                map.insert("_type".to_string(), serde_json::Value::String("deferred".to_string()));
                map.insert("id".to_string(), serde_json::Value::Number(d.id().into()));
                let state = match d.state() {
                    DeferredState::Pending => "pending",
                    DeferredState::Resolved(_) => "resolved",
                    DeferredState::Rejected(_) => "rejected",
                };
                map.insert("state".to_string(), serde_json::Value::String(state.to_string()));
                serde_json::Value::Object(map)
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

/// Plain rendering: strings are unquoted at the top level and quoted when
/// nested, the way an interactive shell echoes results.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => write!(f, "{s}"),
            other => write_nested(f, other),
        }
    }
}

fn write_nested(f: &mut fmt::Formatter<'_>, value: &Value) -> fmt::Result {
    match value {
        Value::Null => write!(f, "null"),
        Value::Bool(b) => write!(f, "{b}"),
        Value::Int(i) => write!(f, "{i}"),
        Value::Float(x) => write!(f, "{x}"),
        Value::String(s) => write!(f, "{s:?}"),
        Value::List(items) => {
            write!(f, "[")?;
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write_nested(f, item)?;
            }
            write!(f, "]")
        }
        Value::Record(fields) => {
            if fields.is_empty() {
                return write!(f, "{{}}");
            }
            write!(f, "{{ ")?;
            for (i, (k, v)) in fields.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{k}: ")?;
                write_nested(f, v)?;
            }
            write!(f, " }}")
        }
        Value::Deferred(d) => write!(f, "{d}"),
    }
}

/// Render a value the way it appears inside a container (strings quoted).
pub fn display_nested(value: &Value) -> String {
    struct Nested<'a>(&'a Value);

    impl fmt::Display for Nested<'_> {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write_nested(f, self.0)
        }
    }

    Nested(value).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_quotes_nested_strings_only() {
        let v = Value::List(vec![Value::from("a"), Value::Int(1)]);
        assert_eq!(v.to_string(), r#"["a", 1]"#);
        assert_eq!(Value::from("a").to_string(), "a");
        assert_eq!(display_nested(&Value::from("a")), r#""a""#);
    }

    #[test]
    fn record_display_is_sorted() {
        let v = Value::record([("b", Value::Int(2)), ("a", Value::Int(1))]);
        assert_eq!(v.to_string(), "{ a: 1, b: 2 }");
        assert_eq!(Value::Record(BTreeMap::new()).to_string(), "{}");
    }

    #[test]
    fn serializes_as_plain_json() {
        let json = serde_json::json!({"name": "demo", "tags": [1, 2.5, null]});
        let value = Value::record([
            ("name", Value::from("demo")),
            ("tags", Value::List(vec![Value::Int(1), Value::Float(2.5), Value::Null])),
        ]);
        assert_eq!(value.to_json(), json);
        assert_eq!(serde_json::to_value(&value).expect("serialize"), json);
    }

    #[test]
    fn nan_serializes_as_null() {
        assert_eq!(Value::Float(f64::NAN).to_json(), serde_json::Value::Null);
    }

    #[test]
    fn deferred_is_classified() {
        let (deferred, _resolver) = Deferred::channel();
        let value = Value::Deferred(deferred);
        assert!(value.as_deferred().is_some());
        assert!(Value::Int(1).as_deferred().is_none());
        assert_eq!(value.to_json()["state"], "pending");
    }
}
