//! Property schemas and validated property sets.

use std::collections::BTreeMap;

use prism_color::{Colour, PixelFormat};

use crate::buffer::Buffer;
use crate::error::ConfigurationError;
use crate::graph::{Value, ValueKind};

/// Declaration of one property: kind, default, numeric range and metadata keys.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    name: String,
    kind: ValueKind,
    default: Option<Value>,
    range: Option<(f64, f64)>,
    keys: BTreeMap<String, String>,
}

impl PropertySpec {
    /// A property whose kind is taken from `default`.
    pub fn new(name: &str, default: impl Into<Value>) -> Self {
        let default = default.into();
        Self {
            name: name.to_string(),
            kind: default.kind(),
            default: Some(default),
            range: None,
            keys: BTreeMap::new(),
        }
    }

    /// A property with no default (buffers).
    pub fn unset(name: &str, kind: ValueKind) -> Self {
        Self {
            name: name.to_string(),
            kind,
            default: None,
            range: None,
            keys: BTreeMap::new(),
        }
    }

    pub fn range(mut self, min: f64, max: f64) -> Self {
        self.range = Some((min, max));
        self
    }

    pub fn key(mut self, key: &str, value: &str) -> Self {
        self.keys.insert(key.to_string(), value.to_string());
        self
    }

    pub fn describe(self, text: &str) -> Self {
        self.key("description", text)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> ValueKind {
        self.kind
    }

    pub fn default_value(&self) -> Option<&Value> {
        self.default.as_ref()
    }

    pub fn value_range(&self) -> Option<(f64, f64)> {
        self.range
    }

    pub fn keys(&self) -> &BTreeMap<String, String> {
        &self.keys
    }

    /// Coerce `value` to this property's kind and check its range.
    pub fn validate(&self, value: Value) -> Result<Value, ConfigurationError> {
        let value = value.coerce(self.kind, &self.name)?;
        if let (Some((min, max)), Some(v)) = (self.range, value.as_double()) {
            if !(min..=max).contains(&v) {
                return Err(ConfigurationError::PropertyRange {
                    property: self.name.clone(),
                    value: v,
                    min,
                    max,
                });
            }
        }
        Ok(value)
    }
}

/// Validated property values of one node.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(BTreeMap<String, Value>);

impl Properties {
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub(crate) fn insert(&mut self, name: &str, value: Value) {
        self.0.insert(name.to_string(), value);
    }

    pub fn int(&self, name: &str) -> i64 {
        self.get(name).and_then(Value::as_int).unwrap_or(0)
    }

    /// `int` narrowed to `i32`, saturating.
    pub fn int32(&self, name: &str) -> i32 {
        self.int(name).clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32
    }

    pub fn double(&self, name: &str) -> f64 {
        self.get(name).and_then(Value::as_double).unwrap_or(0.0)
    }

    pub fn bool(&self, name: &str) -> bool {
        self.get(name).and_then(Value::as_bool).unwrap_or(false)
    }

    pub fn colour(&self, name: &str) -> Colour {
        self.get(name).and_then(Value::as_colour).unwrap_or_default()
    }

    pub fn format(&self, name: &str) -> Option<PixelFormat> {
        self.get(name).and_then(Value::as_format).cloned()
    }

    pub fn buffer(&self, name: &str) -> Option<Buffer> {
        self.get(name).and_then(Value::as_buffer).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_validates_range() {
        let spec = PropertySpec::new("radius", 4).range(0.0, 100.0);
        assert!(spec.validate(Value::Int(10)).is_ok());
        let err = spec.validate(Value::Int(-1)).unwrap_err();
        assert!(matches!(err, ConfigurationError::PropertyRange { min: 0.0, .. }));
    }

    #[test]
    fn test_spec_rejects_nan() {
        let spec = PropertySpec::new("value", 1.0).range(-10.0, 10.0);
        assert!(spec.validate(Value::Double(f64::NAN)).is_err());
    }

    #[test]
    fn test_properties_defaults_when_missing() {
        let props = Properties::default();
        assert_eq!(props.int("x"), 0);
        assert_eq!(props.colour("value"), Colour::default());
        assert!(props.buffer("buffer").is_none());
    }
}
