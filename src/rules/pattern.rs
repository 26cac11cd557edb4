//! Glob patterns over field paths.
//!
//! `*` matches any run of characters (separators included) and `?` any
//! single character. Paths may be written with `/` or `.` separators and an
//! optional leading separator; they are normalized to the dotted form.

use lazy_static::lazy_static;
use regex::Regex;

use crate::error::{Error, Result};
use crate::metrics::PATH_SEPARATOR;

lazy_static! {
    /// Characters that turn a path into a pattern
    static ref GLOB_CHARS: Regex = Regex::new(r"[*?]").unwrap();
}

/// Dotted form of a `/`- or `.`-separated path.
pub fn normalize_path(path: &str) -> String {
    path.trim()
        .replace('/', ".")
        .trim_start_matches(PATH_SEPARATOR)
        .to_string()
}

/// A compiled field path pattern.
#[derive(Debug, Clone)]
pub struct FieldPattern {
    source: String,
    regex: Option<Regex>,
}

impl FieldPattern {
    pub fn new(pattern: &str) -> Result<Self> {
        let source = normalize_path(pattern);
        if source.is_empty() {
            return Err(Error::InvalidRule("empty field path".to_string()));
        }
        let regex = if GLOB_CHARS.is_match(&source) {
            Some(glob_to_regex(&source)?)
        } else {
            None
        };
        Ok(Self { source, regex })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    pub fn is_glob(&self) -> bool {
        self.regex.is_some()
    }

    pub fn matches(&self, field_path: &str) -> bool {
        match &self.regex {
            Some(regex) => regex.is_match(field_path),
            None => self.source == field_path,
        }
    }
}

impl PartialEq for FieldPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

fn glob_to_regex(glob: &str) -> Result<Regex> {
    let mut expr = String::with_capacity(glob.len() + 8);
    expr.push('^');
    for ch in glob.chars() {
        match ch {
            '*' => expr.push_str(".*"),
            '?' => expr.push('.'),
            other => expr.push_str(&regex::escape(&other.to_string())),
        }
    }
    expr.push('$');
    Regex::new(&expr).map_err(|e| Error::InvalidRule(format!("bad pattern '{}': {}", glob, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_path() {
        assert_eq!(normalize_path("/CodeCoverage/overall"), "CodeCoverage.overall");
        assert_eq!(normalize_path("Build.cpu"), "Build.cpu");
        assert_eq!(normalize_path(" .Build/cpu "), "Build.cpu");
    }

    #[test]
    fn test_literal_pattern() {
        let p = FieldPattern::new("Build/cpu").unwrap();
        assert!(!p.is_glob());
        assert!(p.matches("Build.cpu"));
        assert!(!p.matches("Build.cpu2"));
    }

    #[test]
    fn test_glob_pattern() {
        let p = FieldPattern::new("CodeCoverage.by_file.*").unwrap();
        assert!(p.is_glob());
        assert!(p.matches("CodeCoverage.by_file.main_rs"));
        assert!(p.matches("CodeCoverage.by_file.nested.deep"));
        assert!(!p.matches("CodeCoverage.overall"));

        let p = FieldPattern::new("Build.cpu?").unwrap();
        assert!(p.matches("Build.cpu1"));
        assert!(!p.matches("Build.cpu"));
    }

    #[test]
    fn test_regex_characters_are_literal() {
        let p = FieldPattern::new("A.b+c*").unwrap();
        assert!(p.matches("A.b+c_d"));
        assert!(!p.matches("A.bbc"));
    }

    #[test]
    fn test_empty_pattern_rejected() {
        assert!(FieldPattern::new(" / ").is_err());
    }
}
