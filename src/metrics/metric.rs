//! Leaf metrics and the node type shared with composites.

use serde::{Serialize, Serializer};

use crate::error::ConstructionError;
use crate::metrics::composite::CompositeMetric;
use crate::metrics::value::MetricValue;

/// Separator used when joining names into a field path.
pub const PATH_SEPARATOR: char = '.';

/// Characters that may not appear inside a metric name.
///
/// Both are accepted as path separators on lookup, so neither can be part
/// of a name without making paths ambiguous.
pub const RESERVED_NAME_CHARS: &[char] = &['.', '/'];

/// Validate a node name.
pub fn validate_name(name: &str) -> Result<(), ConstructionError> {
    if name.is_empty() {
        return Err(ConstructionError::EmptyName);
    }
    if let Some(reserved) = name.chars().find(|c| RESERVED_NAME_CHARS.contains(c)) {
        return Err(ConstructionError::ReservedCharacter {
            name: name.to_string(),
            reserved,
        });
    }
    Ok(())
}

/// Discriminator for metric nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Leaf,
    Composite,
}

/// A named scalar value.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    value: MetricValue,
}

impl Metric {
    pub fn new(name: &str, value: impl Into<MetricValue>) -> Result<Self, ConstructionError> {
        validate_name(name)?;
        let value = value.into();
        value
            .check()
            .map_err(|reason| ConstructionError::UnsupportedValue {
                name: name.to_string(),
                reason,
            })?;
        Ok(Self {
            name: name.to_string(),
            value,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &MetricValue {
        &self.value
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.value.serialize(serializer)
    }
}

/// Either kind of metric node.
#[derive(Debug, Clone, PartialEq)]
pub enum BasicMetric {
    Leaf(Metric),
    Composite(CompositeMetric),
}

impl BasicMetric {
    pub fn name(&self) -> &str {
        match self {
            BasicMetric::Leaf(m) => m.name(),
            BasicMetric::Composite(c) => c.name(),
        }
    }

    pub fn kind(&self) -> MetricKind {
        match self {
            BasicMetric::Leaf(_) => MetricKind::Leaf,
            BasicMetric::Composite(_) => MetricKind::Composite,
        }
    }

    pub fn as_leaf(&self) -> Option<&Metric> {
        match self {
            BasicMetric::Leaf(m) => Some(m),
            BasicMetric::Composite(_) => None,
        }
    }

    pub fn as_composite(&self) -> Option<&CompositeMetric> {
        match self {
            BasicMetric::Composite(c) => Some(c),
            BasicMetric::Leaf(_) => None,
        }
    }

    /// Leaf value, if this node is a leaf.
    pub fn value(&self) -> Option<&MetricValue> {
        self.as_leaf().map(Metric::value)
    }
}

impl From<Metric> for BasicMetric {
    fn from(m: Metric) -> Self {
        BasicMetric::Leaf(m)
    }
}

impl From<CompositeMetric> for BasicMetric {
    fn from(c: CompositeMetric) -> Self {
        BasicMetric::Composite(c)
    }
}

impl Serialize for BasicMetric {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            BasicMetric::Leaf(m) => m.serialize(serializer),
            BasicMetric::Composite(c) => c.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_new() {
        let m = Metric::new("cpu", 42.5).unwrap();
        assert_eq!(m.name(), "cpu");
        assert_eq!(m.value(), &MetricValue::Float(42.5));
    }

    #[test]
    fn test_metric_name_rules() {
        assert_eq!(Metric::new("", 1).unwrap_err(), ConstructionError::EmptyName);
        assert!(matches!(
            Metric::new("grandchild2.1", 1),
            Err(ConstructionError::ReservedCharacter { reserved: '.', .. })
        ));
        assert!(matches!(
            Metric::new("by/file", 1),
            Err(ConstructionError::ReservedCharacter { reserved: '/', .. })
        ));
        assert!(Metric::new("test_sql_store", 1).is_ok());
    }

    #[test]
    fn test_metric_rejects_nan() {
        assert!(matches!(
            Metric::new("cpu", f64::NAN),
            Err(ConstructionError::UnsupportedValue { .. })
        ));
    }

    #[test]
    fn test_basic_metric_kind() {
        let leaf: BasicMetric = Metric::new("mem", 1024).unwrap().into();
        assert_eq!(leaf.kind(), MetricKind::Leaf);
        assert_eq!(leaf.value(), Some(&MetricValue::Integer(1024)));

        let branch: BasicMetric = CompositeMetric::new("Build").unwrap().into();
        assert_eq!(branch.kind(), MetricKind::Composite);
        assert!(branch.value().is_none());
        assert_eq!(branch.name(), "Build");
    }
}
