//! Typed scalar values.
//!
//! A [`ScalarValue`] is the leaf of every resolved blueprint tree: a string,
//! 64-bit signed integer, float or boolean, optionally tagged with the source
//! position it was parsed from. Unsigned integers are not part of the model;
//! values that arrive as unsigned from the function bridge are folded into
//! the int variant when they fit.

use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::core::source::SourceSpan;

/// The typed payload of a scalar.
#[derive(Debug, Clone, PartialEq)]
pub enum ScalarKind {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ScalarKind {
    /// Name of the scalar type, used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            ScalarKind::Str(_) => "string",
            ScalarKind::Int(_) => "int",
            ScalarKind::Float(_) => "float",
            ScalarKind::Bool(_) => "bool",
        }
    }
}

impl std::fmt::Display for ScalarKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScalarKind::Str(s) => write!(f, "{}", s),
            ScalarKind::Int(i) => write!(f, "{}", i),
            ScalarKind::Float(v) => write!(f, "{}", v),
            ScalarKind::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// A scalar with optional source metadata.
///
/// Serializes as the bare JSON scalar; the span never crosses the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct ScalarValue {
    pub kind: ScalarKind,
    pub span: Option<SourceSpan>,
}

impl ScalarValue {
    pub fn str(value: impl Into<String>) -> Self {
        Self {
            kind: ScalarKind::Str(value.into()),
            span: None,
        }
    }

    pub fn int(value: i64) -> Self {
        Self {
            kind: ScalarKind::Int(value),
            span: None,
        }
    }

    pub fn float(value: f64) -> Self {
        Self {
            kind: ScalarKind::Float(value),
            span: None,
        }
    }

    pub fn bool(value: bool) -> Self {
        Self {
            kind: ScalarKind::Bool(value),
            span: None,
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn as_str(&self) -> Option<&str> {
        match &self.kind {
            ScalarKind::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind {
            ScalarKind::Int(i) => Some(i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self.kind {
            ScalarKind::Float(v) => Some(v),
            ScalarKind::Int(i) => Some(i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self.kind {
            ScalarKind::Bool(b) => Some(b),
            _ => None,
        }
    }

    /// Render the scalar as a string fragment for substitution concatenation.
    pub fn to_fragment(&self) -> String {
        self.kind.to_string()
    }

    /// Equality on the payload alone, ignoring source metadata.
    pub fn value_eq(&self, other: &ScalarValue) -> bool {
        self.kind == other.kind
    }
}

impl std::fmt::Display for ScalarValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl Serialize for ScalarValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match &self.kind {
            ScalarKind::Str(s) => serializer.serialize_str(s),
            ScalarKind::Int(i) => serializer.serialize_i64(*i),
            ScalarKind::Float(v) => serializer.serialize_f64(*v),
            ScalarKind::Bool(b) => serializer.serialize_bool(*b),
        }
    }
}

impl<'de> Deserialize<'de> for ScalarValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = serde_json::Value::deserialize(deserializer)?;
        ScalarValue::from_json(&value)
            .ok_or_else(|| D::Error::custom(format!("expected a scalar value, got {}", value)))
    }
}

impl ScalarValue {
    /// Build a scalar from a JSON value, or `None` for arrays, objects and null.
    pub fn from_json(value: &serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::String(s) => Some(ScalarValue::str(s.clone())),
            serde_json::Value::Bool(b) => Some(ScalarValue::bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(ScalarValue::int(i))
                } else {
                    n.as_f64().map(ScalarValue::float)
                }
            }
            _ => None,
        }
    }

    /// Convert to a JSON value, dropping source metadata.
    pub fn to_json(&self) -> serde_json::Value {
        match &self.kind {
            ScalarKind::Str(s) => serde_json::Value::String(s.clone()),
            ScalarKind::Int(i) => serde_json::Value::from(*i),
            ScalarKind::Float(v) => {
                serde_json::Number::from_f64(*v).map_or(serde_json::Value::Null, serde_json::Value::Number)
            }
            ScalarKind::Bool(b) => serde_json::Value::Bool(*b),
        }
    }
}
