//! Validation results.

use std::fmt;

use serde::Serialize;

use crate::metrics::MetricValue;

/// Outcome of a rule, ordered from best to worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pass,
    Warn,
    Fail,
    Error,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Pass => "PASS",
            Status::Warn => "WARN",
            Status::Fail => "FAIL",
            Status::Error => "ERROR",
        }
    }

    /// Worst of the given statuses; `Pass` for none.
    pub fn worst<I: IntoIterator<Item = Status>>(statuses: I) -> Status {
        statuses.into_iter().max().unwrap_or(Status::Pass)
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result tree mirroring the rule tree that produced it.
///
/// A node built with `aggregate` always carries the worst status of its
/// children, so the invariant cannot be broken after construction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationStatus {
    name: String,
    status: Status,
    message: Option<String>,
    field_path: Option<String>,
    value: Option<MetricValue>,
    children: Vec<ValidationStatus>,
}

impl ValidationStatus {
    /// Verdict of a single comparison.
    pub fn leaf(
        name: &str,
        status: Status,
        field_path: Option<&str>,
        value: Option<MetricValue>,
        message: Option<String>,
    ) -> Self {
        Self {
            name: name.to_string(),
            status,
            message,
            field_path: field_path.map(str::to_string),
            value,
            children: Vec::new(),
        }
    }

    pub fn error(name: &str, field_path: Option<&str>, message: impl Into<String>) -> Self {
        Self::leaf(name, Status::Error, field_path, None, Some(message.into()))
    }

    /// Node whose status is the worst of its children.
    pub fn aggregate(name: &str, children: Vec<ValidationStatus>) -> Self {
        let status = Status::worst(children.iter().map(|c| c.status));
        Self {
            name: name.to_string(),
            status,
            message: None,
            field_path: None,
            value: None,
            children,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn field_path(&self) -> Option<&str> {
        self.field_path.as_deref()
    }

    pub fn value(&self) -> Option<&MetricValue> {
        self.value.as_ref()
    }

    pub fn children(&self) -> &[ValidationStatus] {
        &self.children
    }

    pub fn child(&self, name: &str) -> Option<&ValidationStatus> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn is_pass(&self) -> bool {
        self.status == Status::Pass
    }

    /// Childless nodes whose status is not `Pass`, depth-first.
    pub fn violations(&self) -> Vec<&ValidationStatus> {
        let mut out = Vec::new();
        self.collect_violations(&mut out);
        out
    }

    fn collect_violations<'a>(&'a self, out: &mut Vec<&'a ValidationStatus>) {
        if self.children.is_empty() {
            if self.status != Status::Pass {
                out.push(self);
            }
            return;
        }
        for child in &self.children {
            child.collect_violations(out);
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}[{}] {}", "", self.status, self.name, indent = depth * 2)?;
        if let Some(message) = &self.message {
            write!(f, ": {}", message)?;
        }
        writeln!(f)?;
        for child in &self.children {
            child.write_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf(name: &str, status: Status) -> ValidationStatus {
        ValidationStatus::leaf(name, status, None, None, None)
    }

    #[test]
    fn test_severity_order() {
        assert!(Status::Error > Status::Fail);
        assert!(Status::Fail > Status::Warn);
        assert!(Status::Warn > Status::Pass);
        assert_eq!(Status::worst(Vec::new()), Status::Pass);
    }

    #[test]
    fn test_aggregate_worst_of() {
        let s = ValidationStatus::aggregate("r", vec![leaf("a", Status::Pass), leaf("b", Status::Warn)]);
        assert_eq!(s.status(), Status::Warn);
        let s = ValidationStatus::aggregate("r", vec![leaf("a", Status::Pass), leaf("b", Status::Fail)]);
        assert_eq!(s.status(), Status::Fail);
        let s = ValidationStatus::aggregate("r", vec![leaf("a", Status::Fail), leaf("b", Status::Error)]);
        assert_eq!(s.status(), Status::Error);
        assert!(ValidationStatus::aggregate("r", Vec::new()).is_pass());
    }

    #[test]
    fn test_violations_and_report() {
        let inner = ValidationStatus::aggregate("inner", vec![leaf("x", Status::Fail), leaf("y", Status::Pass)]);
        let root = ValidationStatus::aggregate("root", vec![inner, ValidationStatus::error("z", None, "no such field")]);
        let names: Vec<&str> = root.violations().into_iter().map(|v| v.name()).collect();
        assert_eq!(names, vec!["x", "z"]);
        assert_eq!(root.child("inner").map(|c| c.status()), Some(Status::Fail));

        let report = root.to_string();
        assert!(report.starts_with("[ERROR] root\n"));
        assert!(report.contains("    [FAIL] x\n"));
        assert!(report.contains("  [ERROR] z: no such field\n"));
    }
}
