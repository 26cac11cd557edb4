//! Error types.
//!
//! Construction problems are reported separately from store and rule
//! errors so callers can tell a bad tree apart from a bad database.

use thiserror::Error;

/// Failure to build a metric node.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConstructionError {
    #[error("metric name must not be empty")]
    EmptyName,

    #[error("metric name '{name}' contains reserved character '{reserved}'")]
    ReservedCharacter { name: String, reserved: char },

    #[error("composite metric '{parent}' already has a child named '{child}'")]
    DuplicateName { parent: String, child: String },

    #[error("unsupported value for metric '{name}': {reason}")]
    UnsupportedValue { name: String, reason: String },
}

/// Crate-wide error.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Construction(#[from] ConstructionError),

    #[error("no metric at '{path}' in composite metric '{metric}'")]
    KeyNotFound { metric: String, path: String },

    #[error("malformed record{} for metric '{metric_name}' at '{field_path}': {reason}", record_suffix(.record_id))]
    MalformedRecord {
        metric_name: String,
        record_id: Option<i64>,
        field_path: String,
        reason: String,
    },

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("invalid rule: {0}")]
    InvalidRule(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

fn record_suffix(record_id: &Option<i64>) -> String {
    match record_id {
        Some(id) => format!(" {}", id),
        None => String::new(),
    }
}

impl Error {
    pub(crate) fn malformed(field_path: &str, reason: impl Into<String>) -> Self {
        Error::MalformedRecord {
            metric_name: String::new(),
            record_id: None,
            field_path: field_path.to_string(),
            reason: reason.into(),
        }
    }

    /// Attach record location to a `MalformedRecord` error; other variants pass through.
    pub(crate) fn in_record(self, name: &str, id: i64) -> Self {
        match self {
            Error::MalformedRecord {
                field_path, reason, ..
            } => Error::MalformedRecord {
                metric_name: name.to_string(),
                record_id: Some(id),
                field_path,
                reason,
            },
            other => other,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_malformed_record_context() {
        let err = Error::malformed("Build.cpu", "duplicate path").in_record("Nightly", 7);
        let msg = err.to_string();
        assert!(msg.contains("record 7"));
        assert!(msg.contains("'Nightly'"));
        assert!(msg.contains("Build.cpu"));
    }

    #[test]
    fn test_construction_error_converts() {
        let err: Error = ConstructionError::EmptyName.into();
        assert!(matches!(err, Error::Construction(ConstructionError::EmptyName)));
    }
}
