//! YAML rule files.
//!
//! ```yaml
//! content:
//!   - ruleset:
//!       description: coverage
//!       exclusions:
//!         - exclusion: "CodeCoverage.by_file.*_excluded_rs"
//!       rules:
//!         - action: validate
//!           rule: "CodeCoverage.overall >= 85.0"
//!         - action: confirm
//!           rule: "Performance.cpu ~= 50 +- 5"
//! ```
//!
//! `validate` rules fail, `confirm` rules only warn. Each ruleset becomes a
//! composite child of the loaded rule tree; exclusions apply to the whole
//! engine.

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::metrics::CompositeMetric;
use crate::rules::engine::RulesEngine;
use crate::rules::rule::{CompositeRule, LeafRule, Rule, Severity};
use crate::rules::status::ValidationStatus;

/// Name of the rule tree produced by the loaders.
pub const ROOT_RULE_NAME: &str = "rules";

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RulesDocument {
    #[serde(default)]
    content: Vec<ContentItem>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ContentItem {
    ruleset: RuleSetSection,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleSetSection {
    description: Option<String>,
    #[serde(default)]
    exclusions: Vec<ExclusionEntry>,
    #[serde(default)]
    rules: Vec<RuleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ExclusionEntry {
    exclusion: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RuleEntry {
    action: Action,
    rule: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "lowercase")]
enum Action {
    Validate,
    Confirm,
}

impl From<Action> for Severity {
    fn from(action: Action) -> Self {
        match action {
            Action::Validate => Severity::Fail,
            Action::Confirm => Severity::Warn,
        }
    }
}

/// A loaded rule tree with the engine configured for its exclusions.
#[derive(Debug, Clone)]
pub struct RuleSet {
    pub rule: Rule,
    pub engine: RulesEngine,
}

impl RuleSet {
    pub fn evaluate(&self, metric: &CompositeMetric) -> ValidationStatus {
        self.engine.evaluate(metric, &self.rule)
    }
}

pub fn load_rules_file(path: impl AsRef<Path>) -> Result<RuleSet> {
    let path = path.as_ref();
    let text = fs::read_to_string(path)?;
    log::info!("[rules] RULES_LOADING path={}", path.display());
    parse_rules(&text)
}

pub fn parse_rules(text: &str) -> Result<RuleSet> {
    let document: RulesDocument =
        serde_yaml::from_str(text).map_err(|e| Error::InvalidRule(format!("malformed rules document: {}", e)))?;
    if document.content.is_empty() {
        return Err(Error::InvalidRule("rules document has no content".to_string()));
    }

    let mut root = CompositeRule::new(ROOT_RULE_NAME)?;
    let mut engine = RulesEngine::new();
    for (index, item) in document.content.into_iter().enumerate() {
        let section = item.ruleset;
        let name = section
            .description
            .clone()
            .unwrap_or_else(|| format!("ruleset {}", index + 1));
        if section.rules.is_empty() {
            return Err(Error::InvalidRule(format!("ruleset '{}' has no rules", name)));
        }
        for entry in &section.exclusions {
            engine.add_exclusion(&entry.exclusion)?;
        }

        let mut group = CompositeRule::new(&name)?;
        for entry in &section.rules {
            let rule = LeafRule::parse(&entry.rule)?.with_severity(entry.action.into());
            group.add(rule)?;
        }
        root.add(group)?;
    }
    log::debug!("[rules] RULES_PARSED rulesets={}", root.children().len());

    Ok(RuleSet {
        rule: root.into(),
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::rule::Operator;
    use crate::rules::status::Status;

    const RULES: &str = r#"
content:
  - ruleset:
      description: coverage
      exclusions:
        - exclusion: "CodeCoverage.by_file.*_excluded_rs"
      rules:
        - action: validate
          rule: "CodeCoverage.overall >= 85.0"
        - action: validate
          rule: "/CodeCoverage/by_file/* >= 60"
  - ruleset:
      description: performance
      rules:
        - action: confirm
          rule: "Performance.cpu ~= 50 +- 5"
"#;

    #[test]
    fn test_parse_rules_structure() {
        let set = parse_rules(RULES).unwrap();
        let root = match &set.rule {
            Rule::Composite(c) => c,
            other => panic!("expected composite, got {:?}", other),
        };
        let names: Vec<&str> = root.children().iter().map(Rule::name).collect();
        assert_eq!(names, vec!["coverage", "performance"]);

        let perf = match &root.children()[1] {
            Rule::Composite(c) => c,
            other => panic!("expected composite, got {:?}", other),
        };
        match &perf.children()[0] {
            Rule::Leaf(leaf) => {
                assert_eq!(leaf.severity(), Severity::Warn);
                assert_eq!(leaf.operator(), Operator::Within { tolerance: 5.0 });
            }
            other => panic!("expected leaf, got {:?}", other),
        }
        assert_eq!(set.engine.exclusions().collect::<Vec<_>>(), vec!["CodeCoverage.by_file.*_excluded_rs"]);
    }

    #[test]
    fn test_evaluate_loaded_rules() {
        let mut coverage = CompositeMetric::new("CodeCoverage").unwrap();
        coverage.add_key_value("overall", 88.0).unwrap();
        let mut by_file = coverage.add_composite("by_file").unwrap();
        by_file.add_key_value("main_rs", 90.0).unwrap();
        by_file.add_key_value("gen_excluded_rs", 1.0).unwrap();

        let set = parse_rules(RULES).unwrap();
        let status = set.evaluate(&coverage);
        assert_eq!(status.child("coverage").map(|s| s.status()), Some(Status::Pass));
        // Performance.cpu lives in another tree
        assert_eq!(status.child("performance").map(|s| s.status()), Some(Status::Error));
        assert_eq!(status.status(), Status::Error);
    }

    #[test]
    fn test_malformed_documents() {
        assert!(matches!(parse_rules("content: []"), Err(Error::InvalidRule(_))));
        assert!(matches!(parse_rules("other: 1"), Err(Error::InvalidRule(_))));
        assert!(matches!(parse_rules(": : :"), Err(Error::InvalidRule(_))));

        let no_rules = "content:\n  - ruleset:\n      description: empty\n";
        assert!(matches!(parse_rules(no_rules), Err(Error::InvalidRule(_))));

        let bad_action = "content:\n  - ruleset:\n      rules:\n        - action: alert\n          rule: \"A.b < 1\"\n";
        assert!(matches!(parse_rules(bad_action), Err(Error::InvalidRule(_))));

        let bad_rule = "content:\n  - ruleset:\n      rules:\n        - action: validate\n          rule: \"A.b\"\n";
        assert!(matches!(parse_rules(bad_rule), Err(Error::InvalidRule(_))));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        assert!(matches!(load_rules_file("/nonexistent/rules.yaml"), Err(Error::Io(_))));
    }
}
