//! Scalar metric values.
//!
//! The value set is closed: integers, floats, booleans and short strings.
//! Anything else coming in through dynamic input (JSON, serde) is rejected.

use std::fmt;

use serde::{Serialize, Serializer};
use serde_json::Value;

/// Longest string value accepted by a leaf metric, in bytes.
pub const MAX_TEXT_VALUE_LEN: usize = 255;

/// Value held by a leaf metric.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Text(String),
}

/// Type tag for a stored value.
///
/// The string forms are part of the persisted schema and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Integer,
    Float,
    Boolean,
    Text,
}

impl ValueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValueType::Integer => "int",
            ValueType::Float => "float",
            ValueType::Boolean => "bool",
            ValueType::Text => "str",
        }
    }

    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(ValueType::Integer),
            "float" => Some(ValueType::Float),
            "bool" => Some(ValueType::Boolean),
            "str" => Some(ValueType::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl MetricValue {
    pub fn value_type(&self) -> ValueType {
        match self {
            MetricValue::Integer(_) => ValueType::Integer,
            MetricValue::Float(_) => ValueType::Float,
            MetricValue::Boolean(_) => ValueType::Boolean,
            MetricValue::Text(_) => ValueType::Text,
        }
    }

    /// Numeric view used by threshold comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            MetricValue::Integer(i) => Some(*i as f64),
            MetricValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, MetricValue::Integer(_) | MetricValue::Float(_))
    }

    /// Check the value is storable: finite floats and short strings only.
    pub fn check(&self) -> Result<(), String> {
        match self {
            MetricValue::Float(f) if !f.is_finite() => {
                Err(format!("non-finite float {}", f))
            }
            MetricValue::Text(s) if s.len() > MAX_TEXT_VALUE_LEN => Err(format!(
                "string of {} bytes exceeds limit of {}",
                s.len(),
                MAX_TEXT_VALUE_LEN
            )),
            _ => Ok(()),
        }
    }

    /// Convert a JSON scalar. Objects, arrays and nulls are not metric values.
    pub fn from_json(value: &Value) -> Result<Self, String> {
        let converted = match value {
            Value::Bool(b) => MetricValue::Boolean(*b),
            Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetricValue::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    MetricValue::Float(f)
                } else {
                    return Err(format!("number {} does not fit in 64 bits", n));
                }
            }
            Value::String(s) => MetricValue::Text(s.clone()),
            Value::Null => return Err("null is not a metric value".to_string()),
            Value::Array(_) => return Err("arrays are not metric values".to_string()),
            Value::Object(_) => return Err("objects are composite, not scalar".to_string()),
        };
        converted.check()?;
        Ok(converted)
    }

    pub fn to_json(&self) -> Value {
        match self {
            MetricValue::Integer(i) => Value::from(*i),
            MetricValue::Float(f) => Value::from(*f),
            MetricValue::Boolean(b) => Value::Bool(*b),
            MetricValue::Text(s) => Value::String(s.clone()),
        }
    }
}

impl fmt::Display for MetricValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricValue::Integer(i) => write!(f, "{}", i),
            MetricValue::Float(v) => write!(f, "{}", v),
            MetricValue::Boolean(b) => write!(f, "{}", b),
            MetricValue::Text(s) => write!(f, "{:?}", s),
        }
    }
}

impl Serialize for MetricValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            MetricValue::Integer(i) => serializer.serialize_i64(*i),
            MetricValue::Float(f) => serializer.serialize_f64(*f),
            MetricValue::Boolean(b) => serializer.serialize_bool(*b),
            MetricValue::Text(s) => serializer.serialize_str(s),
        }
    }
}

impl From<i64> for MetricValue {
    fn from(v: i64) -> Self {
        MetricValue::Integer(v)
    }
}

impl From<i32> for MetricValue {
    fn from(v: i32) -> Self {
        MetricValue::Integer(i64::from(v))
    }
}

impl From<u32> for MetricValue {
    fn from(v: u32) -> Self {
        MetricValue::Integer(i64::from(v))
    }
}

impl From<f64> for MetricValue {
    fn from(v: f64) -> Self {
        MetricValue::Float(v)
    }
}

impl From<f32> for MetricValue {
    fn from(v: f32) -> Self {
        MetricValue::Float(f64::from(v))
    }
}

impl From<bool> for MetricValue {
    fn from(v: bool) -> Self {
        MetricValue::Boolean(v)
    }
}

impl From<&str> for MetricValue {
    fn from(v: &str) -> Self {
        MetricValue::Text(v.to_string())
    }
}

impl From<String> for MetricValue {
    fn from(v: String) -> Self {
        MetricValue::Text(v)
    }
}
