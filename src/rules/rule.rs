//! Rule trees.
//!
//! A leaf rule compares the value at a field path against a threshold; a
//! composite rule groups named child rules. Rule trees are plain data and
//! can be evaluated against any number of metric trees.

use std::collections::HashSet;
use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::metrics::MetricValue;
use crate::rules::pattern::FieldPattern;

lazy_static! {
    /// `<path> <op> <value> [+- <tolerance>]`
    static ref RULE_EXPRESSION: Regex = Regex::new(
        r#"^\s*(\S+)\s*(<=|>=|==|!=|~=|<|>)\s*("[^"]*"|\S+)(?:\s*\+-\s*(\S+))?\s*$"#
    ).unwrap();
}

/// Comparison applied by a leaf rule: `value <op> threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operator {
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    NotEqual,
    /// `|value - threshold| <= tolerance`
    Within { tolerance: f64 },
}

impl Operator {
    pub fn symbol(&self) -> &'static str {
        match self {
            Operator::LessThan => "<",
            Operator::LessThanOrEqual => "<=",
            Operator::GreaterThan => ">",
            Operator::GreaterThanOrEqual => ">=",
            Operator::Equal => "==",
            Operator::NotEqual => "!=",
            Operator::Within { .. } => "~=",
        }
    }

    pub fn parse(symbol: &str, tolerance: Option<f64>) -> Result<Self> {
        let op = match (symbol, tolerance) {
            ("<", None) => Operator::LessThan,
            ("<=", None) => Operator::LessThanOrEqual,
            (">", None) => Operator::GreaterThan,
            (">=", None) => Operator::GreaterThanOrEqual,
            ("==", None) => Operator::Equal,
            ("!=", None) => Operator::NotEqual,
            ("~=", Some(tolerance)) => Operator::Within { tolerance },
            ("~=", None) => {
                return Err(Error::InvalidRule("'~=' requires a '+-' tolerance".to_string()))
            }
            (op, Some(_)) => {
                return Err(Error::InvalidRule(format!("tolerance is only valid with '~=', not '{}'", op)))
            }
            (op, None) => return Err(Error::InvalidRule(format!("unknown operator '{}'", op))),
        };
        Ok(op)
    }

    fn is_ordering(&self) -> bool {
        !matches!(self, Operator::Equal | Operator::NotEqual)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Status reported when a leaf rule's comparison is false.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Severity {
    #[default]
    Fail,
    Warn,
}

/// Comparison of one field (or every field matching a glob) against a
/// threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct LeafRule {
    name: String,
    pattern: FieldPattern,
    operator: Operator,
    threshold: MetricValue,
    severity: Severity,
}

impl LeafRule {
    pub fn new(
        name: &str,
        field_path: &str,
        operator: Operator,
        threshold: impl Into<MetricValue>,
    ) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRule("rule name must not be empty".to_string()));
        }
        let threshold = threshold.into();
        threshold.check().map_err(Error::InvalidRule)?;
        if operator.is_ordering() && !threshold.is_numeric() {
            return Err(Error::InvalidRule(format!(
                "operator '{}' needs a numeric threshold, got {}",
                operator, threshold
            )));
        }
        if let Operator::Within { tolerance } = operator {
            if !tolerance.is_finite() || tolerance < 0.0 {
                return Err(Error::InvalidRule(format!("invalid tolerance {}", tolerance)));
            }
        }
        Ok(Self {
            name: name.to_string(),
            pattern: FieldPattern::new(field_path)?,
            operator,
            threshold,
            severity: Severity::Fail,
        })
    }

    /// Parse `<path> <op> <value> [+- <tolerance>]`; the rule is named after
    /// the expression.
    pub fn parse(expression: &str) -> Result<Self> {
        let caps = RULE_EXPRESSION
            .captures(expression)
            .ok_or_else(|| Error::InvalidRule(format!("cannot parse rule '{}'", expression)))?;
        let tolerance = match caps.get(4) {
            Some(t) => Some(t.as_str().parse::<f64>().map_err(|_| {
                Error::InvalidRule(format!("tolerance '{}' is not a number", t.as_str()))
            })?),
            None => None,
        };
        let operator = Operator::parse(&caps[2], tolerance)?;
        let threshold = parse_threshold(&caps[3]);
        Self::new(expression.trim(), &caps[1], operator, threshold)
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pattern(&self) -> &FieldPattern {
        &self.pattern
    }

    pub fn operator(&self) -> Operator {
        self.operator
    }

    pub fn threshold(&self) -> &MetricValue {
        &self.threshold
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Apply the comparison. `Err` when the value cannot be compared.
    pub fn compare(&self, value: &MetricValue) -> std::result::Result<bool, String> {
        use MetricValue::*;
        let threshold = &self.threshold;
        match (value, threshold) {
            (Integer(v), Integer(t)) if !matches!(self.operator, Operator::Within { .. }) => {
                Ok(self.holds(v.cmp(t)))
            }
            _ if value.is_numeric() && threshold.is_numeric() => {
                let (v, t) = match (value.as_f64(), threshold.as_f64()) {
                    (Some(v), Some(t)) => (v, t),
                    _ => return Err("numeric conversion failed".to_string()),
                };
                if let Operator::Within { tolerance } = self.operator {
                    return Ok((v - t).abs() <= tolerance);
                }
                v.partial_cmp(&t)
                    .map(|ord| self.holds(ord))
                    .ok_or_else(|| format!("cannot order {} and {}", v, t))
            }
            _ if self.operator.is_ordering() => Err(format!(
                "operator '{}' needs a numeric value, got {}",
                self.operator, value
            )),
            _ if value.value_type() != threshold.value_type() => Err(format!(
                "cannot compare {} value {} with {} threshold {}",
                value.value_type(),
                value,
                threshold.value_type(),
                threshold
            )),
            _ => Ok(match self.operator {
                Operator::NotEqual => value != threshold,
                _ => value == threshold,
            }),
        }
    }

    fn holds(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self.operator {
            Operator::LessThan => ordering == Less,
            Operator::LessThanOrEqual => ordering != Greater,
            Operator::GreaterThan => ordering == Greater,
            Operator::GreaterThanOrEqual => ordering != Less,
            Operator::Equal | Operator::Within { .. } => ordering == Equal,
            Operator::NotEqual => ordering != Equal,
        }
    }
}

impl fmt::Display for LeafRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.pattern.as_str(), self.operator, self.threshold)?;
        if let Operator::Within { tolerance } = self.operator {
            write!(f, " +- {}", tolerance)?;
        }
        Ok(())
    }
}

fn parse_threshold(raw: &str) -> MetricValue {
    if let Ok(i) = raw.parse::<i64>() {
        return MetricValue::Integer(i);
    }
    if let Ok(f) = raw.parse::<f64>() {
        return MetricValue::Float(f);
    }
    match raw {
        "true" => MetricValue::Boolean(true),
        "false" => MetricValue::Boolean(false),
        _ => MetricValue::Text(raw.trim_matches('"').to_string()),
    }
}

/// Named group of child rules; child names are unique.
#[derive(Debug, Clone, PartialEq)]
pub struct CompositeRule {
    name: String,
    children: Vec<Rule>,
    names: HashSet<String>,
}

impl CompositeRule {
    pub fn new(name: &str) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(Error::InvalidRule("rule name must not be empty".to_string()));
        }
        Ok(Self {
            name: name.to_string(),
            children: Vec::new(),
            names: HashSet::new(),
        })
    }

    pub fn add(&mut self, rule: impl Into<Rule>) -> Result<()> {
        let rule = rule.into();
        if !self.names.insert(rule.name().to_string()) {
            return Err(Error::InvalidRule(format!(
                "rule '{}' already has a child named '{}'",
                self.name,
                rule.name()
            )));
        }
        self.children.push(rule);
        Ok(())
    }

    pub fn with(mut self, rule: impl Into<Rule>) -> Result<Self> {
        self.add(rule)?;
        Ok(self)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn children(&self) -> &[Rule] {
        &self.children
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

/// A node of a rule tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    Leaf(LeafRule),
    Composite(CompositeRule),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Rule::Leaf(r) => r.name(),
            Rule::Composite(r) => r.name(),
        }
    }
}

impl From<LeafRule> for Rule {
    fn from(rule: LeafRule) -> Self {
        Rule::Leaf(rule)
    }
}

impl From<CompositeRule> for Rule {
    fn from(rule: CompositeRule) -> Self {
        Rule::Composite(rule)
    }
}
