//! Structured logging with store context.
//!
//! Provides logging macros and utilities that include the store, metric name
//! and record id in every log message for easy correlation.

pub mod structured;

pub use structured::*;
