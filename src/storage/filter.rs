//! Metadata filters and field selections for store queries.
//!
//! A metadata filter is a list of conditions on metadata keys, all of which
//! must hold for a record to be selected. A record lacking a filtered key
//! never matches, whatever the comparison.
//!
//! A field selection narrows which leaf fields a time-window query returns.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::metrics::{Metadata, MetadataValue};
use crate::rules::FieldPattern;

/// Comparison applied between stored metadata and a filter value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Comparison {
    Equal,
    NotEqual,
    LessThan,
    GreaterThan,
    LessThanOrEqual,
    GreaterThanOrEqual,
}

impl Comparison {
    pub fn sql_operator(&self) -> &'static str {
        match self {
            Comparison::Equal => "=",
            Comparison::NotEqual => "<>",
            Comparison::LessThan => "<",
            Comparison::GreaterThan => ">",
            Comparison::LessThanOrEqual => "<=",
            Comparison::GreaterThanOrEqual => ">=",
        }
    }

    fn holds(&self, ordering: Ordering) -> bool {
        match self {
            Comparison::Equal => ordering == Ordering::Equal,
            Comparison::NotEqual => ordering != Ordering::Equal,
            Comparison::LessThan => ordering == Ordering::Less,
            Comparison::GreaterThan => ordering == Ordering::Greater,
            Comparison::LessThanOrEqual => ordering != Ordering::Greater,
            Comparison::GreaterThanOrEqual => ordering != Ordering::Less,
        }
    }
}

/// One condition: `stored[name] <comparison> value`.
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataCondition {
    pub name: String,
    pub comparison: Comparison,
    pub value: MetadataValue,
}

impl MetadataCondition {
    /// Values of different types never satisfy a condition.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        let stored = match metadata.get(&self.name) {
            Some(v) => v,
            None => return false,
        };
        match (stored, &self.value) {
            (MetadataValue::Integer(a), MetadataValue::Integer(b)) => self.comparison.holds(a.cmp(b)),
            (MetadataValue::Text(a), MetadataValue::Text(b)) => self.comparison.holds(a.cmp(b)),
            _ => false,
        }
    }
}

/// Conjunction of metadata conditions.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    conditions: Vec<MetadataCondition>,
}

impl MetadataFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Require `name == value`.
    pub fn eq(self, name: &str, value: impl Into<MetadataValue>) -> Self {
        self.with(name, Comparison::Equal, value)
    }

    pub fn with(mut self, name: &str, comparison: Comparison, value: impl Into<MetadataValue>) -> Self {
        self.conditions.push(MetadataCondition {
            name: name.to_string(),
            comparison,
            value: value.into(),
        });
        self
    }

    pub fn conditions(&self) -> &[MetadataCondition] {
        &self.conditions
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// In-memory evaluation, equivalent to what the store does in SQL.
    pub fn matches(&self, metadata: &Metadata) -> bool {
        self.conditions.iter().all(|c| c.matches(metadata))
    }
}

impl From<&Metadata> for MetadataFilter {
    /// Exact match on every key of the given metadata.
    fn from(metadata: &Metadata) -> Self {
        metadata
            .iter()
            .fold(MetadataFilter::new(), |filter, (name, value)| {
                filter.eq(name, value.clone())
            })
    }
}

/// One entry of a field selection: a path or glob, negated by a leading `!`.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldSelector {
    pattern: FieldPattern,
    negated: bool,
}

impl FieldSelector {
    pub fn parse(selector: &str) -> Result<Self> {
        let trimmed = selector.trim();
        let (negated, path) = match trimmed.strip_prefix('!') {
            Some(rest) => (true, rest),
            None => (false, trimmed),
        };
        let pattern = FieldPattern::new(path)
            .map_err(|e| Error::InvalidArgument(format!("field selector '{}': {}", selector, e)))?;
        Ok(Self { pattern, negated })
    }

    pub fn is_negated(&self) -> bool {
        self.negated
    }

    pub fn pattern(&self) -> &FieldPattern {
        &self.pattern
    }

    pub fn holds(&self, field_path: &str) -> bool {
        self.pattern.matches(field_path) != self.negated
    }
}

/// Disjunction of field selectors; an empty selection keeps every field.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldSelection {
    selectors: Vec<FieldSelector>,
}

impl FieldSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse each entry with `FieldSelector::parse`.
    pub fn parse<I, S>(selectors: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let selectors = selectors
            .into_iter()
            .map(|s| FieldSelector::parse(s.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { selectors })
    }

    pub fn selectors(&self) -> &[FieldSelector] {
        &self.selectors
    }

    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    /// A field is kept when any selector holds for it.
    pub fn selects(&self, field_path: &str) -> bool {
        self.selectors.is_empty() || self.selectors.iter().any(|s| s.holds(field_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_equality_superset_match() {
        let filter = MetadataFilter::new().eq("platform", "linux");
        assert!(filter.matches(&Metadata::new().with("platform", "linux").with("run", 3)));
        assert!(!filter.matches(&Metadata::new().with("platform", "macos")));
        assert!(!filter.matches(&Metadata::new().with("run", 3)));
    }

    #[test]
    fn test_type_mismatch_never_matches() {
        let filter = MetadataFilter::new().eq("build", 5);
        assert!(!filter.matches(&Metadata::new().with("build", "5")));
        let filter = MetadataFilter::new().with("build", Comparison::NotEqual, 5);
        assert!(!filter.matches(&Metadata::new().with("build", "5")));
    }

    #[test]
    fn test_ordering_comparisons() {
        let meta = Metadata::new().with("build", 10);
        assert!(MetadataFilter::new().with("build", Comparison::GreaterThan, 9).matches(&meta));
        assert!(MetadataFilter::new().with("build", Comparison::LessThanOrEqual, 10).matches(&meta));
        assert!(!MetadataFilter::new().with("build", Comparison::LessThan, 10).matches(&meta));
        assert!(MetadataFilter::new().with("build", Comparison::NotEqual, 11).matches(&meta));
    }

    #[test]
    fn test_from_metadata() {
        let meta = Metadata::new().with("platform", "linux").with("run", 3);
        let filter = MetadataFilter::from(&meta);
        assert_eq!(filter.conditions().len(), 2);
        assert!(filter.matches(&meta));
        assert!(MetadataFilter::new().is_empty());
    }

    #[test]
    fn test_field_selection() {
        let all = FieldSelection::new();
        assert!(all.selects("Build.cpu"));

        let selection = FieldSelection::parse(["Build.cpu", "/Build/tests/*"]).unwrap();
        assert!(selection.selects("Build.cpu"));
        assert!(selection.selects("Build.tests.passed"));
        assert!(!selection.selects("Build.mem"));

        let negated = FieldSelection::parse(["!Build.coverage.*"]).unwrap();
        assert!(negated.selectors()[0].is_negated());
        assert!(negated.selects("Build.cpu"));
        assert!(!negated.selects("Build.coverage.core_rs"));
    }

    #[test]
    fn test_empty_field_selector_rejected() {
        assert!(matches!(FieldSelection::parse(["!"]), Err(Error::InvalidArgument(_))));
        assert!(matches!(FieldSelector::parse(""), Err(Error::InvalidArgument(_))));
    }
}
