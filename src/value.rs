//! Scalar values flowing between specs, statements and rows
//!
//! `Value` is the single dynamic representation used for bound statement
//! arguments and decoded row cells. `Id` is the narrower primary-key form:
//! it is hashable and ordered so it can key batch maps and cursors.

use std::fmt;

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Logical type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Bool,
    Int,
    Float,
    String,
    Bytes,
    /// Stored as RFC 3339 text.
    Time,
}

impl FieldType {
    /// Whether `Add` (increment) mutations are allowed on this type.
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Int | FieldType::Float)
    }

    /// Check that a caller-supplied value fits this column type.
    ///
    /// `Null` is always accepted here; nullability is the column's concern.
    pub fn accepts(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (FieldType::Bool, Value::Bool(_)) => true,
            (FieldType::Int, Value::Int(_)) => true,
            (FieldType::Float, Value::Float(_) | Value::Int(_)) => true,
            (FieldType::String, Value::String(_)) => true,
            (FieldType::Bytes, Value::Bytes(_)) => true,
            (FieldType::Time, Value::Time(_)) => true,
            _ => false,
        }
    }

    /// Convert a raw driver value into this column's logical representation.
    ///
    /// Backends without native booleans or timestamps hand back integers and
    /// text; this restores the declared type.
    pub fn coerce(&self, value: Value) -> Result<Value, String> {
        match (self, value) {
            (_, Value::Null) => Ok(Value::Null),
            (FieldType::Bool, Value::Int(i)) => Ok(Value::Bool(i != 0)),
            (FieldType::Bool, v @ Value::Bool(_)) => Ok(v),
            (FieldType::Int, v @ Value::Int(_)) => Ok(v),
            (FieldType::Int, Value::Bool(b)) => Ok(Value::Int(b as i64)),
            (FieldType::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
            (FieldType::Float, v @ Value::Float(_)) => Ok(v),
            (FieldType::String, v @ Value::String(_)) => Ok(v),
            (FieldType::Bytes, v @ Value::Bytes(_)) => Ok(v),
            (FieldType::Bytes, Value::String(s)) => Ok(Value::Bytes(s.into_bytes())),
            (FieldType::Time, v @ Value::Time(_)) => Ok(v),
            (FieldType::Time, Value::String(s)) => parse_time(&s).map(Value::Time),
            (ty, other) => Err(format!("cannot read {} as {:?}", other.kind(), ty)),
        }
    }
}

/// Parse a stored timestamp: RFC 3339 first, then SQLite's `datetime()` format.
fn parse_time(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .or_else(|_| {
            NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                .map(|ndt| ndt.and_utc())
                .map_err(|e| format!("invalid datetime '{}': {}", s, e))
        })
}

/// A SQL value that can be bound to a statement or read from a row.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Time(DateTime<Utc>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(*b as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Time(t) => Some(*t),
            Value::String(s) => parse_time(s).ok(),
            _ => None,
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Bytes(_) => "bytes",
            Value::Time(_) => "time",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::String(s) => write!(f, "{:?}", s),
            Value::Bytes(b) => write!(f, "<{} bytes>", b.len()),
            Value::Time(t) => write!(f, "{}", t.to_rfc3339()),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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
        Value::Bytes(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Time(v)
    }
}

impl From<Id> for Value {
    fn from(v: Id) -> Self {
        match v {
            Id::Int(i) => Value::Int(i),
            Id::Str(s) => Value::String(s),
        }
    }
}

impl From<&Id> for Value {
    fn from(v: &Id) -> Self {
        v.clone().into()
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Declared type of a primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdType {
    Int,
    String,
}

impl fmt::Display for IdType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdType::Int => write!(f, "int"),
            IdType::String => write!(f, "string"),
        }
    }
}

/// A primary-key value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Id {
    Int(i64),
    Str(String),
}

impl Id {
    pub fn id_type(&self) -> IdType {
        match self {
            Id::Int(_) => IdType::Int,
            Id::Str(_) => IdType::String,
        }
    }

    /// Read an id of the declared type out of a row cell.
    pub fn from_value(value: &Value, ty: IdType) -> Option<Id> {
        match (ty, value) {
            (IdType::Int, Value::Int(i)) => Some(Id::Int(*i)),
            (IdType::Int, Value::String(s)) => s.parse().ok().map(Id::Int),
            (IdType::String, Value::String(s)) => Some(Id::Str(s.clone())),
            (IdType::String, Value::Int(i)) => Some(Id::Str(i.to_string())),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Id::Int(i) => Some(*i),
            Id::Str(_) => None,
        }
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Id::Int(i) => write!(f, "{}", i),
            Id::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for Id {
    fn from(v: i64) -> Self {
        Id::Int(v)
    }
}

impl From<i32> for Id {
    fn from(v: i32) -> Self {
        Id::Int(v as i64)
    }
}

impl From<&str> for Id {
    fn from(v: &str) -> Self {
        Id::Str(v.to_string())
    }
}

impl From<String> for Id {
    fn from(v: String) -> Self {
        Id::Str(v)
    }
}
