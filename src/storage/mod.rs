//! Storage module.
//!
//! Persists composite metric snapshots in SQL tables: one record row per
//! snapshot, one row per metadata entry and one row per flattened leaf
//! field. `SqlMetricStore` is the SQLite implementation of `MetricStore`.

pub mod config;
pub mod filter;
pub mod mapper;
pub mod models;
pub mod queries;
pub mod sql;
pub mod store;

pub use config::*;
pub use filter::*;
pub use mapper::{flatten, reconstruct, FieldRow, FieldValue};
pub use sql::*;
pub use store::*;
