//! Rule evaluation.
//!
//! Evaluation borrows both trees immutably and never fails: problems
//! resolving or comparing a field become `ERROR` nodes in the result.
//!
//! A glob rule that matches no field at all is an `ERROR`. One whose matches
//! are all excluded passes, with a message naming the exclusion.

use crate::error::Result;
use crate::logging::LogContext;
use crate::metrics::CompositeMetric;
use crate::rules::pattern::FieldPattern;
use crate::rules::rule::{CompositeRule, LeafRule, Rule, Severity};
use crate::rules::status::{Status, ValidationStatus};
use crate::{log_debug, log_warn};

/// Evaluate a rule tree against a metric tree with no exclusions.
pub fn evaluate(metric: &CompositeMetric, rule: &Rule) -> ValidationStatus {
    RulesEngine::new().evaluate(metric, rule)
}

/// Evaluates rule trees, skipping fields matched by an exclusion pattern
/// when expanding glob rules.
#[derive(Debug, Clone, Default)]
pub struct RulesEngine {
    exclusions: Vec<FieldPattern>,
}

impl RulesEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exclusions are matched against the full field path and against the
    /// path relative to the root.
    pub fn add_exclusion(&mut self, pattern: &str) -> Result<()> {
        let pattern = FieldPattern::new(pattern)?;
        if !self.exclusions.contains(&pattern) {
            self.exclusions.push(pattern);
        }
        Ok(())
    }

    pub fn with_exclusion(mut self, pattern: &str) -> Result<Self> {
        self.add_exclusion(pattern)?;
        Ok(self)
    }

    pub fn exclusions(&self) -> impl Iterator<Item = &str> {
        self.exclusions.iter().map(FieldPattern::as_str)
    }

    fn is_excluded(&self, field_path: &str) -> bool {
        let relative = field_path.split_once('.').map(|(_, rest)| rest);
        self.exclusions
            .iter()
            .any(|e| e.matches(field_path) || relative.map_or(false, |r| e.matches(r)))
    }

    pub fn evaluate(&self, metric: &CompositeMetric, rule: &Rule) -> ValidationStatus {
        let ctx = LogContext::new("rules").with_metric(metric.name());
        let status = self.evaluate_rule(metric, rule, &ctx);
        log_debug!(ctx, "RULES_EVALUATED", rule = rule.name(), status = status.status().as_str());
        status
    }

    fn evaluate_rule(&self, metric: &CompositeMetric, rule: &Rule, ctx: &LogContext) -> ValidationStatus {
        match rule {
            Rule::Leaf(leaf) => self.evaluate_leaf(metric, leaf, ctx),
            Rule::Composite(group) => self.evaluate_composite(metric, group, ctx),
        }
    }

    fn evaluate_composite(
        &self,
        metric: &CompositeMetric,
        group: &CompositeRule,
        ctx: &LogContext,
    ) -> ValidationStatus {
        let children = group
            .children()
            .iter()
            .map(|child| self.evaluate_rule(metric, child, ctx))
            .collect();
        ValidationStatus::aggregate(group.name(), children)
    }

    fn evaluate_leaf(&self, metric: &CompositeMetric, rule: &LeafRule, ctx: &LogContext) -> ValidationStatus {
        if !rule.pattern().is_glob() {
            return check_field(metric, rule, rule.name(), rule.pattern().as_str(), ctx);
        }

        let matched: Vec<String> = metric
            .leaves()
            .into_iter()
            .map(|(path, _)| path)
            .filter(|path| rule.pattern().matches(path))
            .collect();
        if matched.is_empty() {
            let message = format!("pattern '{}' matched no fields", rule.pattern().as_str());
            log_warn!(ctx, "RULE_ERROR", rule = rule.name(), reason = message);
            return ValidationStatus::error(rule.name(), Some(rule.pattern().as_str()), message);
        }

        let children: Vec<ValidationStatus> = matched
            .iter()
            .filter(|path| !self.is_excluded(path))
            .map(|path| check_field(metric, rule, path, path, ctx))
            .collect();
        if children.is_empty() {
            let message = format!("all {} fields matching '{}' are excluded", matched.len(), rule.pattern().as_str());
            log_debug!(ctx, "RULE_SKIPPED", rule = rule.name(), reason = message);
            return ValidationStatus::leaf(rule.name(), Status::Pass, Some(rule.pattern().as_str()), None, Some(message));
        }
        ValidationStatus::aggregate(rule.name(), children)
    }
}

fn check_field(
    metric: &CompositeMetric,
    rule: &LeafRule,
    name: &str,
    field_path: &str,
    ctx: &LogContext,
) -> ValidationStatus {
    let field = match metric.field(field_path) {
        Some(field) => field,
        None => {
            let message = format!("field '{}' not found", field_path);
            log_warn!(ctx, "RULE_ERROR", rule = rule.name(), reason = message);
            return ValidationStatus::error(name, Some(field_path), message);
        }
    };

    let value = field.value();
    match rule.compare(value) {
        Ok(true) => ValidationStatus::leaf(name, Status::Pass, Some(field_path), Some(value.clone()), None),
        Ok(false) => {
            let status = match rule.severity() {
                Severity::Fail => Status::Fail,
                Severity::Warn => Status::Warn,
            };
            let message = format!("{} = {} violates '{}'", field_path, value, rule);
            log_debug!(ctx, "RULE_VIOLATED", rule = rule.name(), status = status.as_str(), value = value.to_string());
            ValidationStatus::leaf(name, status, Some(field_path), Some(value.clone()), Some(message))
        }
        Err(reason) => {
            log_warn!(ctx, "RULE_ERROR", rule = rule.name(), reason = reason);
            ValidationStatus::leaf(name, Status::Error, Some(field_path), Some(value.clone()), Some(reason))
        }
    }
}
