//! Metric data model.
//!
//! Leaf `Metric` values and `CompositeMetric` trees, plus the metadata
//! attached to a snapshot when it is stored.

pub mod composite;
pub mod metadata;
pub mod metric;
pub mod value;

pub use composite::*;
pub use metadata::*;
pub use metric::*;
pub use value::*;
