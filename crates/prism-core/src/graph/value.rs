//! Typed property values.

use std::fmt;

use prism_color::{Colour, PixelFormat};

use crate::buffer::Buffer;
use crate::error::ConfigurationError;

/// Kind of a property value, as declared in an operation's schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Int,
    Double,
    Bool,
    String,
    Colour,
    Format,
    Buffer,
}

impl ValueKind {
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::Double => "double",
            Self::Bool => "bool",
            Self::String => "string",
            Self::Colour => "colour",
            Self::Format => "format",
            Self::Buffer => "buffer",
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A property value.
#[derive(Debug, Clone)]
pub enum Value {
    Int(i64),
    Double(f64),
    Bool(bool),
    String(String),
    Colour(Colour),
    Format(PixelFormat),
    Buffer(Buffer),
}

impl Value {
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Int(_) => ValueKind::Int,
            Self::Double(_) => ValueKind::Double,
            Self::Bool(_) => ValueKind::Bool,
            Self::String(_) => ValueKind::String,
            Self::Colour(_) => ValueKind::Colour,
            Self::Format(_) => ValueKind::Format,
            Self::Buffer(_) => ValueKind::Buffer,
        }
    }

    /// Convert to `kind` where the conversion is lossless or a parse:
    /// int → double, string → colour, string → format.
    pub fn coerce(self, kind: ValueKind, property: &str) -> Result<Value, ConfigurationError> {
        if self.kind() == kind {
            return Ok(self);
        }
        let mismatch = |found: ValueKind| ConfigurationError::PropertyType {
            property: property.to_string(),
            expected: kind.name(),
            found: found.name(),
        };
        match (self, kind) {
            (Value::Int(i), ValueKind::Double) => Ok(Value::Double(i as f64)),
            (Value::String(s), ValueKind::Colour) => Colour::parse(&s)
                .map(Value::Colour)
                .map_err(ConfigurationError::Color),
            (Value::String(s), ValueKind::Format) => prism_color::format(&s)
                .map(Value::Format)
                .map_err(ConfigurationError::Color),
            (other, _) => Err(mismatch(other.kind())),
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_double(&self) -> Option<f64> {
        match self {
            Self::Double(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_colour(&self) -> Option<Colour> {
        match self {
            Self::Colour(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_format(&self) -> Option<&PixelFormat> {
        match self {
            Self::Format(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_buffer(&self) -> Option<&Buffer> {
        match self {
            Self::Buffer(v) => Some(v),
            _ => None,
        }
    }

    /// JSON form; `None` for values that have no textual representation.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        Some(match self {
            Self::Int(v) => serde_json::Value::from(*v),
            Self::Double(v) => serde_json::Value::from(*v),
            Self::Bool(v) => serde_json::Value::from(*v),
            Self::String(v) => serde_json::Value::from(v.as_str()),
            Self::Colour(v) => serde_json::Value::from(v.to_css_string()),
            Self::Format(v) => serde_json::Value::from(v.name()),
            Self::Buffer(_) => return None,
        })
    }

    /// Parse a JSON value as `kind`.
    pub fn from_json(
        kind: ValueKind,
        property: &str,
        json: &serde_json::Value,
    ) -> Result<Value, ConfigurationError> {
        let mismatch = || ConfigurationError::PropertyType {
            property: property.to_string(),
            expected: kind.name(),
            found: json_kind(json),
        };
        match kind {
            ValueKind::Int => json.as_i64().map(Value::Int).ok_or_else(mismatch),
            ValueKind::Double => json.as_f64().map(Value::Double).ok_or_else(mismatch),
            ValueKind::Bool => json.as_bool().map(Value::Bool).ok_or_else(mismatch),
            ValueKind::String => json
                .as_str()
                .map(|s| Value::String(s.to_string()))
                .ok_or_else(mismatch),
            ValueKind::Colour | ValueKind::Format => {
                let s = json.as_str().ok_or_else(mismatch)?;
                Value::String(s.to_string()).coerce(kind, property)
            }
            ValueKind::Buffer => Err(mismatch()),
        }
    }
}

fn json_kind(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(n) if n.is_i64() => "int",
        serde_json::Value::Number(_) => "double",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Double(a), Self::Double(b)) => a == b,
            (Self::Bool(a), Self::Bool(b)) => a == b,
            (Self::String(a), Self::String(b)) => a == b,
            (Self::Colour(a), Self::Colour(b)) => a == b,
            (Self::Format(a), Self::Format(b)) => a == b,
            (Self::Buffer(a), Self::Buffer(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Colour> for Value {
    fn from(v: Colour) -> Self {
        Self::Colour(v)
    }
}

impl From<PixelFormat> for Value {
    fn from(v: PixelFormat) -> Self {
        Self::Format(v)
    }
}

impl From<Buffer> for Value {
    fn from(v: Buffer) -> Self {
        Self::Buffer(v)
    }
}
