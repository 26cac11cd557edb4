//! Structured logging utilities.
//!
//! Provides context-aware logging with the store, metric name and record id
//! included in every log message.

use std::fmt;

/// Logging context for store and rule operations.
#[derive(Debug, Clone)]
pub struct LogContext {
    pub store: String,
    pub metric: Option<String>,
    pub record_id: Option<i64>,
}

impl LogContext {
    pub fn new(store: &str) -> Self {
        Self {
            store: store.to_string(),
            metric: None,
            record_id: None,
        }
    }

    pub fn with_metric(&self, metric: &str) -> Self {
        Self {
            store: self.store.clone(),
            metric: Some(metric.to_string()),
            record_id: self.record_id,
        }
    }

    pub fn with_record(&self, record_id: i64) -> Self {
        Self {
            store: self.store.clone(),
            metric: self.metric.clone(),
            record_id: Some(record_id),
        }
    }
}

impl fmt::Display for LogContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[store={}]", self.store)?;
        if let Some(metric) = &self.metric {
            write!(f, " [metric={}]", metric)?;
        }
        if let Some(id) = self.record_id {
            write!(f, " [record={}]", id)?;
        }
        Ok(())
    }
}

/// Log an info message with context.
#[macro_export]
macro_rules! log_info {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::info!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event
            $(, $value)*
        );
    };
}

/// Log a warning message with context.
#[macro_export]
macro_rules! log_warn {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::warn!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event
            $(, $value)*
        );
    };
}

/// Log an error message with context.
#[macro_export]
macro_rules! log_error {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::error!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event
            $(, $value)*
        );
    };
}

/// Log a debug message with context.
#[macro_export]
macro_rules! log_debug {
    ($ctx:expr, $event:expr $(, $key:ident = $value:expr)* $(,)?) => {
        log::debug!(
            concat!("{} {}", $(" ", stringify!($key), "={:?}"),*),
            $ctx,
            $event
            $(, $value)*
        );
    };
}
