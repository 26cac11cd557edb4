//! Rules engine.
//!
//! Rule trees of threshold comparisons evaluated against composite metric
//! trees, producing a `ValidationStatus` tree of PASS/WARN/FAIL/ERROR
//! verdicts. Rule trees can be built in code or loaded from YAML.

pub mod engine;
pub mod loader;
pub mod pattern;
pub mod rule;
pub mod status;

pub use engine::*;
pub use loader::*;
pub use pattern::FieldPattern;
pub use rule::*;
pub use status::*;
