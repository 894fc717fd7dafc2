//! Column values and feature rows.
//!
//! A container stores feature rows in ordinary relational tables. Column
//! values are limited to the container's storage classes; geometries travel
//! as opaque `Blob` values and are decoded by the spatial layer's codec.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Polymorphic column value.
///
/// Covers the storage classes of the embedded container.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// 64-bit signed integer.
    Integer(i64),
    /// 64-bit floating point.
    Real(f64),
    /// UTF-8 text.
    Text(String),
    /// Opaque binary (geometry encodings live here).
    Blob(Vec<u8>),
}

impl Value {
    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Integer value, if this is an `Integer`.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Numeric value widened to f64 (`Integer` or `Real`).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) => Some(*v as f64),
            Value::Real(v) => Some(*v),
            _ => None,
        }
    }

    /// Text value, if this is `Text`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Blob bytes, if this is a `Blob`.
    pub fn as_blob(&self) -> Option<&[u8]> {
        match self {
            Value::Blob(b) => Some(b),
            _ => None,
        }
    }

    /// SQL-style comparison.
    ///
    /// Numbers compare across `Integer`/`Real`; any comparison involving
    /// `Null` or mismatched classes yields `None` (three-valued logic
    /// collapses to "no match" at the call site).
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Text(a), Value::Text(b)) => Some(a.cmp(b)),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) => write!(f, "{v}"),
            Value::Real(v) => write!(f, "{v}"),
            Value::Text(s) => write!(f, "{s}"),
            Value::Blob(b) => write!(f, "x'{}b'", b.len()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

/// One feature row: a stable row id plus named column values.
///
/// The id is carried outside the column list so projections never lose the
/// row identity the index layers key on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    id: i64,
    columns: Vec<(String, Value)>,
}

impl Row {
    /// Create an empty row with the given id.
    pub fn new(id: i64) -> Self {
        Self {
            id,
            columns: Vec::new(),
        }
    }

    /// Builder-style column append.
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.columns.push((name.into(), value.into()));
        self
    }

    /// Row id.
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Look up a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.columns
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    /// Replace or append a column value.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(slot) = self.columns.iter_mut().find(|(n, _)| n == name) {
            slot.1 = value;
        } else {
            self.columns.push((name.to_string(), value));
        }
    }

    /// All columns in declaration order.
    pub fn columns(&self) -> &[(String, Value)] {
        &self.columns
    }

    /// Project onto the named columns, keeping the row id.
    ///
    /// Missing columns project as `Null`, matching what a relational
    /// projection over an absent column would surface.
    pub fn project(&self, names: &[String]) -> Row {
        let columns = names
            .iter()
            .map(|n| {
                let v = self.get(n).cloned().unwrap_or(Value::Null);
                (n.clone(), v)
            })
            .collect();
        Row {
            id: self.id,
            columns,
        }
    }
}
