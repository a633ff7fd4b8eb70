//! Value types crossing the native boundary
//!
//! ## Value Model
//!
//! `Value` has one variant per scalar column kind plus `Null` and `Link`.
//! Link lists are not values: they are reached through their own handle.
//!
//! - No implicit coercions: `Int(1) != Double(1.0)`
//! - `String("")` and `Null` are different values
//! - `Binary(vec![])` and `Null` are different values

use crate::kind::ValueKind;
use crate::types::RowKey;
use chrono::{DateTime, Utc};

/// Value read from or written to a native column
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Null (only valid for nullable columns and links)
    Null,
    /// 64-bit signed integer
    Int(i64),
    /// 32-bit float
    Float(f32),
    /// 64-bit float
    Double(f64),
    /// Boolean
    Bool(bool),
    /// UTF-8 string
    String(String),
    /// Raw bytes
    Binary(Vec<u8>),
    /// Point in time, second precision in storage
    Timestamp(DateTime<Utc>),
    /// Reference to a row of the link target table
    Link(RowKey),
}

impl Value {
    /// Column kind this value can be stored in, `None` for `Null`
    pub fn kind(&self) -> Option<ValueKind> {
        match self {
            Value::Null => None,
            Value::Int(_) => Some(ValueKind::Int),
            Value::Float(_) => Some(ValueKind::Float),
            Value::Double(_) => Some(ValueKind::Double),
            Value::Bool(_) => Some(ValueKind::Bool),
            Value::String(_) => Some(ValueKind::String),
            Value::Binary(_) => Some(ValueKind::Binary),
            Value::Timestamp(_) => Some(ValueKind::Timestamp),
            Value::Link(_) => Some(ValueKind::Link),
        }
    }

    /// Check if this is `Null`
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name used in diagnostics
    pub fn type_name(&self) -> &'static str {
        match self.kind() {
            Some(kind) => kind.name(),
            None => "null",
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Binary(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}
