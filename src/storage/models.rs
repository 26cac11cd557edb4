//! Database models for metric storage.
//!
//! These models represent the structure of data in the database tables and
//! the encoding of typed values into the engine's dynamically typed `value`
//! columns.

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::Row;
use serde::{Deserialize, Serialize};

use crate::metrics::{MetadataValue, MetricValue, ValueType};
use crate::storage::mapper::{FieldValue, BRANCH_TAG};

/// A row of `metric_records`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordRow {
    pub id: i64,
    pub metric_name: String,
    pub timestamp_us: i64,
    pub project: Option<String>,
    pub uuid: String,
}

impl RecordRow {
    /// Map a row selected with `queries::RECORD_COLUMNS`.
    pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            metric_name: row.get(1)?,
            timestamp_us: row.get(2)?,
            project: row.get(3)?,
            uuid: row.get(4)?,
        })
    }

    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_micros(self.timestamp_us)
    }
}

/// Engine representation of a timestamp: microseconds since the epoch.
pub fn encode_timestamp(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_micros()
}

pub fn decode_timestamp(micros: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp_micros(micros)
}

/// Tag and engine value for a field row.
pub fn encode_field(value: &FieldValue) -> (&'static str, SqlValue) {
    let encoded = match value {
        FieldValue::Scalar(MetricValue::Integer(i)) => SqlValue::Integer(*i),
        FieldValue::Scalar(MetricValue::Float(f)) => SqlValue::Real(*f),
        FieldValue::Scalar(MetricValue::Boolean(b)) => SqlValue::Integer(i64::from(*b)),
        FieldValue::Scalar(MetricValue::Text(s)) => SqlValue::Text(s.clone()),
        FieldValue::EmptyBranch => SqlValue::Null,
    };
    (value.type_tag(), encoded)
}

/// Inverse of `encode_field`. The tag decides the type; the stored value
/// must agree with it.
pub fn decode_field(tag: &str, value: SqlValue) -> Result<FieldValue, String> {
    if tag == BRANCH_TAG {
        return match value {
            SqlValue::Null => Ok(FieldValue::EmptyBranch),
            other => Err(format!("branch marker carries a value: {:?}", other)),
        };
    }
    let value_type = ValueType::parse(tag).ok_or_else(|| format!("unknown value type tag '{}'", tag))?;
    let decoded = match (value_type, value) {
        (ValueType::Integer, SqlValue::Integer(i)) => MetricValue::Integer(i),
        (ValueType::Float, SqlValue::Real(f)) => MetricValue::Float(f),
        (ValueType::Float, SqlValue::Integer(i)) => MetricValue::Float(i as f64),
        (ValueType::Boolean, SqlValue::Integer(0)) => MetricValue::Boolean(false),
        (ValueType::Boolean, SqlValue::Integer(1)) => MetricValue::Boolean(true),
        (ValueType::Text, SqlValue::Text(s)) => MetricValue::Text(s),
        (ty, other) => return Err(format!("stored value {:?} does not match tag '{}'", other, ty)),
    };
    Ok(FieldValue::Scalar(decoded))
}

pub fn encode_metadata(value: &MetadataValue) -> (&'static str, SqlValue) {
    let encoded = match value {
        MetadataValue::Integer(i) => SqlValue::Integer(*i),
        MetadataValue::Text(s) => SqlValue::Text(s.clone()),
    };
    (value.type_tag(), encoded)
}

pub fn decode_metadata(tag: &str, value: SqlValue) -> Result<MetadataValue, String> {
    match (tag, value) {
        ("int", SqlValue::Integer(i)) => Ok(MetadataValue::Integer(i)),
        ("str", SqlValue::Text(s)) => Ok(MetadataValue::Text(s)),
        (tag, other) => Err(format!("metadata value {:?} does not match tag '{}'", other, tag)),
    }
}
