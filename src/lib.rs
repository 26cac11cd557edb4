//! Daktylos Core - hierarchical metrics with SQL history and threshold rules
//!
//! This crate records named trees of measurements (test coverage, build
//! times, resource usage) as snapshots in a SQL database and checks them
//! against threshold rules. The implementation prioritizes:
//!
//! 1. **Fidelity** - a stored tree reads back exactly as it was posted
//! 2. **Logging** - every store and rule decision logged with context
//! 3. **Portability** - plain parameterized SQL, no engine extensions
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `metrics` - Leaf and composite metrics, values and metadata
//! - `storage` - Tree/row mapping, SQL schema and the SQLite store
//! - `rules` - Rule trees, evaluation and YAML rule files
//! - `logging` - Structured logging with store context
//! - `error` - Error types
//!
//! ```
//! use daktylos_core::metrics::{CompositeMetric, Metadata};
//! use daktylos_core::storage::{MetricStore, SqlMetricStore};
//!
//! let mut build = CompositeMetric::new("Build").unwrap();
//! build.add_key_value("cpu", 42.5).unwrap();
//! build.add_key_value("mem", 1024).unwrap();
//!
//! let store = SqlMetricStore::open_in_memory().unwrap();
//! let meta = Metadata::new().with("platform", "linux");
//! store.post("Nightly", &build, &meta, None).unwrap();
//!
//! let latest = store.composite_metrics_by_volume("Nightly", 1, None).unwrap();
//! assert_eq!(latest[0].0, build);
//! ```

pub mod error;
pub mod logging;
pub mod metrics;
pub mod rules;
pub mod storage;

pub use error::{ConstructionError, Error, Result};
pub use metrics::{BasicMetric, CompositeMetric, CompositeMut, Metadata, MetadataValue, Metric, MetricValue};
pub use rules::{evaluate, load_rules_file, parse_rules, Rule, RulesEngine, Status, ValidationStatus};
pub use storage::{MetadataFilter, MetricStore, PostOptions, SqlMetricStore, StoreConfig};

/// Initialize the process-wide logger.
///
/// `RUST_LOG` overrides the default `info` level. Calling this more than
/// once is harmless.
pub fn init_logging() {
    let _ = env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .format_timestamp_millis()
        .try_init();
}
