//! Store configuration.

use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Path that opens a private in-memory database.
pub const IN_MEMORY_PATH: &str = ":memory:";

pub const ENV_DB_PATH: &str = "DAKTYLOS_DB_PATH";
pub const ENV_CREATE_SCHEMA: &str = "DAKTYLOS_CREATE_SCHEMA";
pub const ENV_BUSY_TIMEOUT_MS: &str = "DAKTYLOS_BUSY_TIMEOUT_MS";

/// Configuration for `SqlMetricStore::open`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Database file, or `:memory:`.
    pub db_path: PathBuf,
    /// Create tables on open if they do not exist.
    pub create_schema: bool,
    /// How long a locked database is retried before failing.
    pub busy_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("metrics.sqlite3"),
            create_schema: true,
            busy_timeout_ms: 5_000,
        }
    }
}

impl StoreConfig {
    pub fn in_memory() -> Self {
        Self {
            db_path: PathBuf::from(IN_MEMORY_PATH),
            ..Self::default()
        }
    }

    pub fn with_path(mut self, db_path: impl Into<PathBuf>) -> Self {
        self.db_path = db_path.into();
        self
    }

    pub fn is_in_memory(&self) -> bool {
        self.db_path.as_os_str() == IN_MEMORY_PATH
    }

    /// Defaults overridden by `DAKTYLOS_*` environment variables.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        if let Some(path) = lookup(ENV_DB_PATH) {
            config.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_CREATE_SCHEMA) {
            config.create_schema = parse_bool(&raw).ok_or_else(|| {
                Error::Configuration(format!("{} must be a boolean, got '{}'", ENV_CREATE_SCHEMA, raw))
            })?;
        }
        if let Some(raw) = lookup(ENV_BUSY_TIMEOUT_MS) {
            config.busy_timeout_ms = raw.trim().parse().map_err(|_| {
                Error::Configuration(format!(
                    "{} must be a non-negative integer, got '{}'",
                    ENV_BUSY_TIMEOUT_MS, raw
                ))
            })?;
        }
        Ok(config)
    }

    /// Short label used in log context.
    pub fn label(&self) -> String {
        if self.is_in_memory() {
            return "memory".to_string();
        }
        self.db_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.db_path.display().to_string())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = StoreConfig::default();
        assert!(config.create_schema);
        assert_eq!(config.busy_timeout_ms, 5_000);
        assert!(!config.is_in_memory());
        assert!(StoreConfig::in_memory().is_in_memory());
        assert_eq!(StoreConfig::in_memory().label(), "memory");
    }

    #[test]
    fn test_from_lookup_overrides() {
        let config = StoreConfig::from_lookup(lookup_from(&[
            (ENV_DB_PATH, "/var/lib/daktylos/ci.db"),
            (ENV_CREATE_SCHEMA, "no"),
            (ENV_BUSY_TIMEOUT_MS, "250"),
        ]))
        .unwrap();
        assert_eq!(config.db_path, PathBuf::from("/var/lib/daktylos/ci.db"));
        assert!(!config.create_schema);
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.label(), "ci.db");
    }

    #[test]
    fn test_from_lookup_rejects_bad_values() {
        let err = StoreConfig::from_lookup(lookup_from(&[(ENV_CREATE_SCHEMA, "maybe")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
        let err = StoreConfig::from_lookup(lookup_from(&[(ENV_BUSY_TIMEOUT_MS, "-1")])).unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_serde_partial() {
        let config: StoreConfig = serde_json::from_str(r#"{"db_path": ":memory:"}"#).unwrap();
        assert!(config.is_in_memory());
        assert!(config.create_schema);
    }
}
