//! SQL query builders.
//!
//! Generates SQL for the metric tables. Execution is handled by
//! `SqlMetricStore`; everything here is plain text plus bound parameters.

use rusqlite::types::Value as SqlValue;

use crate::storage::filter::MetadataFilter;

/// Schema statements, applied in order. All are idempotent.
pub const SCHEMA_STATEMENTS: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS metric_records (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        metric_name TEXT NOT NULL,
        timestamp_us INTEGER NOT NULL,
        project TEXT,
        uuid TEXT NOT NULL
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_metric_records_name_ts
        ON metric_records (metric_name, timestamp_us, id)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_metadata (
        record_id INTEGER NOT NULL REFERENCES metric_records (id),
        name TEXT NOT NULL,
        value_type TEXT NOT NULL,
        value,
        PRIMARY KEY (record_id, name)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_metric_metadata_name
        ON metric_metadata (name, value)
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS metric_fields (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        record_id INTEGER NOT NULL REFERENCES metric_records (id),
        field_path TEXT NOT NULL,
        value_type TEXT NOT NULL,
        value,
        UNIQUE (record_id, field_path)
    )
    "#,
];

/// Columns of `metric_records`, in the order `RecordRow::from_row` reads them.
pub fn get_record_columns() -> Vec<&'static str> {
    vec!["id", "metric_name", "timestamp_us", "project", "uuid"]
}

fn record_columns_qualified() -> String {
    get_record_columns()
        .iter()
        .map(|c| format!("r.{}", c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Build INSERT query for metric_records.
pub fn build_record_insert() -> &'static str {
    r#"
    INSERT INTO metric_records (metric_name, timestamp_us, project, uuid)
    VALUES (?1, ?2, ?3, ?4)
    "#
}

/// Build INSERT query for metric_metadata.
pub fn build_metadata_insert() -> &'static str {
    r#"
    INSERT INTO metric_metadata (record_id, name, value_type, value)
    VALUES (?1, ?2, ?3, ?4)
    "#
}

/// Build INSERT query for metric_fields.
pub fn build_field_insert() -> &'static str {
    r#"
    INSERT INTO metric_fields (record_id, field_path, value_type, value)
    VALUES (?1, ?2, ?3, ?4)
    "#
}

/// Fields of one record, in write order.
pub fn build_fields_select() -> &'static str {
    "SELECT field_path, value_type, value FROM metric_fields WHERE record_id = ?1 ORDER BY id"
}

/// Metadata of one record.
pub fn build_metadata_select() -> &'static str {
    "SELECT name, value_type, value FROM metric_metadata WHERE record_id = ?1 ORDER BY name"
}

/// One EXISTS clause per filter condition, each with three parameters
/// (name, type tag, value). Values of another type never match.
pub fn build_metadata_filter(filter: Option<&MetadataFilter>) -> (String, Vec<SqlValue>) {
    let mut clause = String::new();
    let mut params = Vec::new();
    for condition in filter.map(MetadataFilter::conditions).unwrap_or(&[]) {
        clause.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM metric_metadata m WHERE m.record_id = r.id \
             AND m.name = ? AND m.value_type = ? AND m.value {} ?)",
            condition.comparison.sql_operator()
        ));
        let (tag, value) = super::models::encode_metadata(&condition.value);
        params.push(SqlValue::Text(condition.name.clone()));
        params.push(SqlValue::Text(tag.to_string()));
        params.push(value);
    }
    (clause, params)
}

/// Most recent records of a metric, newest first, ties broken by insertion
/// order (later insert counts as newer).
///
/// Parameters: metric name, filter parameters, limit.
pub fn build_records_by_volume(filter: Option<&MetadataFilter>) -> (String, Vec<SqlValue>) {
    let (filter_clause, filter_params) = build_metadata_filter(filter);
    let query = format!(
        "SELECT {} FROM metric_records r WHERE r.metric_name = ?{} \
         ORDER BY r.timestamp_us DESC, r.id DESC LIMIT ?",
        record_columns_qualified(),
        filter_clause
    );
    (query, filter_params)
}

/// Records of a metric inside an inclusive time window, oldest first, ties
/// broken by insertion order.
///
/// Parameters: metric name, oldest, newest, filter parameters.
pub fn build_records_by_date(filter: Option<&MetadataFilter>) -> (String, Vec<SqlValue>) {
    let (filter_clause, filter_params) = build_metadata_filter(filter);
    let query = format!(
        "SELECT {} FROM metric_records r \
         WHERE r.metric_name = ? AND r.timestamp_us >= ? AND r.timestamp_us <= ?{} \
         ORDER BY r.timestamp_us ASC, r.id ASC",
        record_columns_qualified(),
        filter_clause
    );
    (query, filter_params)
}

/// Field rows of every record of a metric inside an inclusive time window,
/// oldest record first. Empty-branch markers are excluded.
///
/// Parameters: metric name, oldest, newest, filter parameters.
pub fn build_fields_by_date(filter: Option<&MetadataFilter>) -> (String, Vec<SqlValue>) {
    let (filter_clause, filter_params) = build_metadata_filter(filter);
    let query = format!(
        "SELECT r.id, r.timestamp_us, f.field_path, f.value_type, f.value \
         FROM metric_records r JOIN metric_fields f ON f.record_id = r.id \
         WHERE r.metric_name = ? AND r.timestamp_us >= ? AND r.timestamp_us <= ? \
         AND f.value_type <> 'branch'{} \
         ORDER BY r.timestamp_us ASC, r.id ASC, f.id ASC",
        filter_clause
    );
    (query, filter_params)
}

/// Record ids of a metric, newest first.
pub fn build_record_ids_newest_first() -> &'static str {
    "SELECT id FROM metric_records WHERE metric_name = ?1 ORDER BY timestamp_us DESC, id DESC"
}

/// Record ids of a metric strictly older than a timestamp.
pub fn build_record_ids_older_than() -> &'static str {
    "SELECT id FROM metric_records WHERE metric_name = ?1 AND timestamp_us < ?2"
}

/// Delete statements for one record, children first.
pub fn build_record_deletes() -> [&'static str; 3] {
    [
        "DELETE FROM metric_fields WHERE record_id = ?1",
        "DELETE FROM metric_metadata WHERE record_id = ?1",
        "DELETE FROM metric_records WHERE id = ?1",
    ]
}
