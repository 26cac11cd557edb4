//! SQLite-backed metric store.

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Transaction};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::logging::LogContext;
use crate::metrics::{CompositeMetric, Metadata};
use crate::storage::config::StoreConfig;
use crate::storage::filter::MetadataFilter;
use crate::storage::mapper::{self, FieldRow, FieldValue};
use crate::storage::models::{self, RecordRow};
use crate::storage::queries;
use crate::storage::store::{FieldQuery, FieldSeries, MetricStore, PostOptions, RecordId, StoredMetric};
use crate::{log_debug, log_error, log_info, log_warn};

/// A metric store over one SQLite connection.
///
/// The connection is guarded by a mutex, so a shared store serializes its
/// callers. Writes run in a transaction that rolls back if dropped
/// uncommitted.
pub struct SqlMetricStore {
    conn: Mutex<Connection>,
    ctx: LogContext,
}

impl fmt::Debug for SqlMetricStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlMetricStore")
            .field("store", &self.ctx.store)
            .finish_non_exhaustive()
    }
}

impl SqlMetricStore {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let conn = Connection::open(&config.db_path)?;
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        Self::with_label(conn, config.create_schema, &config.label())
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::open(&StoreConfig::in_memory())
    }

    /// Wrap a caller-supplied connection.
    pub fn from_connection(conn: Connection, create_schema: bool) -> Result<Self> {
        Self::with_label(conn, create_schema, "external")
    }

    fn with_label(conn: Connection, create_schema: bool, label: &str) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
            ctx: LogContext::new(label),
        };
        if create_schema {
            store.create_schema()?;
        }
        Ok(store)
    }

    fn create_schema(&self) -> Result<()> {
        let conn = self.conn.lock();
        for stmt in queries::SCHEMA_STATEMENTS {
            conn.execute_batch(stmt)
                .map_err(|e| Error::Configuration(format!("failed to create schema: {}", e)))?;
        }
        log_info!(self.ctx, "SCHEMA_READY", tables = 3);
        Ok(())
    }

    /// Release the connection, reporting any error from closing it.
    pub fn close(self) -> Result<()> {
        let conn = self.conn.into_inner();
        conn.close().map_err(|(_, e)| Error::Storage(e))
    }

    fn load_record(&self, conn: &Connection, record: RecordRow) -> Result<StoredMetric> {
        let ctx = self.ctx.with_metric(&record.metric_name).with_record(record.id);
        let timestamp = record.timestamp().ok_or_else(|| {
            Error::malformed("", format!("timestamp {} out of range", record.timestamp_us))
                .in_record(&record.metric_name, record.id)
        })?;

        let mut stmt = conn.prepare_cached(queries::build_fields_select())?;
        let raw_fields = stmt
            .query_map(params![record.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, SqlValue>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut rows = Vec::with_capacity(raw_fields.len());
        for (field_path, tag, value) in raw_fields {
            let value = models::decode_field(&tag, value)
                .map_err(|reason| Error::malformed(&field_path, reason).in_record(&record.metric_name, record.id))?;
            rows.push(FieldRow { field_path, value });
        }
        let metric = mapper::reconstruct(&rows).map_err(|e| {
            let e = e.in_record(&record.metric_name, record.id);
            log_warn!(ctx, "MALFORMED_RECORD", error = e.to_string());
            e
        })?;

        let metadata = self.load_metadata(conn, &record)?;

        Ok(StoredMetric {
            record_id: record.id,
            metric_name: record.metric_name,
            timestamp,
            metadata,
            project: record.project,
            uuid: record.uuid,
            metric,
        })
    }

    fn load_metadata(&self, conn: &Connection, record: &RecordRow) -> Result<Metadata> {
        let mut stmt = conn.prepare_cached(queries::build_metadata_select())?;
        let raw = stmt
            .query_map(params![record.id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, SqlValue>(2)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut metadata = Metadata::new();
        for (name, tag, value) in raw {
            let value = models::decode_metadata(&tag, value).map_err(|reason| {
                Error::malformed(&format!("metadata:{}", name), reason).in_record(&record.metric_name, record.id)
            })?;
            metadata.insert(&name, value);
        }
        Ok(metadata)
    }

    fn delete_records(tx: &Transaction<'_>, ids: &[RecordId]) -> Result<usize> {
        let deletes = queries::build_record_deletes();
        let mut deleted = 0;
        for id in ids {
            for (i, stmt) in deletes.iter().enumerate() {
                let affected = tx.execute(stmt, params![id])?;
                if i == deletes.len() - 1 {
                    deleted += affected;
                }
            }
        }
        Ok(deleted)
    }
}

fn check_metric_name(metric_name: &str) -> Result<()> {
    if metric_name.trim().is_empty() {
        return Err(Error::InvalidArgument("metric name must not be empty".to_string()));
    }
    Ok(())
}

fn limit_param(count: usize) -> SqlValue {
    SqlValue::Integer(i64::try_from(count).unwrap_or(i64::MAX))
}

impl MetricStore for SqlMetricStore {
    fn post_with(
        &self,
        metric_name: &str,
        metric_data: &CompositeMetric,
        options: PostOptions,
    ) -> Result<RecordId> {
        check_metric_name(metric_name)?;
        let timestamp = options.timestamp.unwrap_or_else(Utc::now);
        let uuid = options.uuid.unwrap_or_else(|| Uuid::new_v4().to_string());
        let rows = mapper::flatten(metric_data);

        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        tx.execute(
            queries::build_record_insert(),
            params![metric_name, models::encode_timestamp(&timestamp), options.project, uuid],
        )?;
        let record_id = tx.last_insert_rowid();
        {
            let mut insert_meta = tx.prepare(queries::build_metadata_insert())?;
            for (name, value) in options.metadata.iter() {
                let (tag, value) = models::encode_metadata(value);
                insert_meta.execute(params![record_id, name, tag, value])?;
            }
            let mut insert_field = tx.prepare(queries::build_field_insert())?;
            for row in &rows {
                let (tag, value) = models::encode_field(&row.value);
                insert_field.execute(params![record_id, row.field_path, tag, value])?;
            }
        }
        let ctx = self.ctx.with_metric(metric_name).with_record(record_id);
        tx.commit().map_err(|e| {
            log_error!(ctx, "POST_FAILED", error = e.to_string());
            e
        })?;

        log_info!(
            ctx,
            "METRIC_POSTED",
            fields = rows.len(),
            metadata = options.metadata.len(),
            timestamp = timestamp.to_rfc3339()
        );
        Ok(record_id)
    }

    fn stored_metrics_by_volume(
        &self,
        metric_name: &str,
        count: usize,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredMetric>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let (query, filter_params) = queries::build_records_by_volume(metadata_filter);
        let mut bound = Vec::with_capacity(filter_params.len() + 2);
        bound.push(SqlValue::Text(metric_name.to_string()));
        bound.extend(filter_params);
        bound.push(limit_param(count));

        let conn = self.conn.lock();
        let records = {
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params_from_iter(bound), RecordRow::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        log_debug!(
            self.ctx.with_metric(metric_name),
            "VOLUME_QUERY",
            requested = count,
            found = records.len()
        );
        records
            .into_iter()
            .map(|record| self.load_record(&conn, record))
            .collect()
    }

    fn stored_metrics_by_date(
        &self,
        metric_name: &str,
        oldest: DateTime<Utc>,
        newest: Option<DateTime<Utc>>,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredMetric>> {
        let newest = newest.unwrap_or_else(Utc::now);
        let (query, filter_params) = queries::build_records_by_date(metadata_filter);
        let mut bound = Vec::with_capacity(filter_params.len() + 3);
        bound.push(SqlValue::Text(metric_name.to_string()));
        bound.push(SqlValue::Integer(models::encode_timestamp(&oldest)));
        bound.push(SqlValue::Integer(models::encode_timestamp(&newest)));
        bound.extend(filter_params);

        let conn = self.conn.lock();
        let records = {
            let mut stmt = conn.prepare(&query)?;
            let rows = stmt.query_map(params_from_iter(bound), RecordRow::from_row)?;
            rows.collect::<rusqlite::Result<Vec<_>>>()?
        };
        log_debug!(
            self.ctx.with_metric(metric_name),
            "DATE_QUERY",
            oldest = oldest.to_rfc3339(),
            newest = newest.to_rfc3339(),
            found = records.len()
        );
        records
            .into_iter()
            .map(|record| self.load_record(&conn, record))
            .collect()
    }

    fn query_fields(
        &self,
        metric_name: &str,
        oldest: DateTime<Utc>,
        newest: Option<DateTime<Utc>>,
        field_query: &FieldQuery,
    ) -> Result<FieldSeries> {
        if field_query.max_count == Some(0) {
            return Ok(FieldSeries::new());
        }
        let newest = newest.unwrap_or_else(Utc::now);
        let (query, filter_params) = queries::build_fields_by_date(field_query.metadata_filter.as_ref());
        let mut bound = Vec::with_capacity(filter_params.len() + 3);
        bound.push(SqlValue::Text(metric_name.to_string()));
        bound.push(SqlValue::Integer(models::encode_timestamp(&oldest)));
        bound.push(SqlValue::Integer(models::encode_timestamp(&newest)));
        bound.extend(filter_params);

        let conn = self.conn.lock();
        let mut stmt = conn.prepare(&query)?;
        let raw = stmt
            .query_map(params_from_iter(bound), |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i64>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, SqlValue>(4)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // rows come oldest record first, so the newest records are at the end
        let kept: Option<HashSet<RecordId>> = field_query.max_count.map(|max| {
            let mut ids: Vec<RecordId> = Vec::new();
            for (record_id, ..) in &raw {
                if ids.last() != Some(record_id) {
                    ids.push(*record_id);
                }
            }
            ids.into_iter().rev().take(max).collect()
        });

        let mut series: FieldSeries = BTreeMap::new();
        for (record_id, timestamp_us, field_path, tag, value) in raw {
            if kept.as_ref().map_or(false, |ids| !ids.contains(&record_id))
                || !field_query.fields.selects(&field_path)
            {
                continue;
            }
            let locate = |reason: String| Error::malformed(&field_path, reason).in_record(metric_name, record_id);
            let timestamp = models::decode_timestamp(timestamp_us)
                .ok_or_else(|| locate(format!("timestamp {} out of range", timestamp_us)))?;
            let value = match models::decode_field(&tag, value).map_err(&locate)? {
                FieldValue::Scalar(v) => v,
                FieldValue::EmptyBranch => continue,
            };
            series.entry(field_path).or_default().push((timestamp, value));
        }
        log_debug!(
            self.ctx.with_metric(metric_name),
            "FIELD_QUERY",
            oldest = oldest.to_rfc3339(),
            newest = newest.to_rfc3339(),
            selectors = field_query.fields.selectors().len(),
            fields = series.len()
        );
        Ok(series)
    }

    fn purge(&self, metric_name: &str, older_than: Option<DateTime<Utc>>) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ids: Vec<RecordId> = match older_than {
            Some(cutoff) => {
                let mut stmt = tx.prepare(queries::build_record_ids_older_than())?;
                let ids = stmt
                    .query_map(params![metric_name, models::encode_timestamp(&cutoff)], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<RecordId>>>()?;
                ids
            }
            None => {
                let mut stmt = tx.prepare(queries::build_record_ids_newest_first())?;
                let ids = stmt
                    .query_map(params![metric_name], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<RecordId>>>()?;
                ids
            }
        };
        let deleted = Self::delete_records(&tx, &ids)?;
        tx.commit()?;
        log_info!(
            self.ctx.with_metric(metric_name),
            "METRICS_PURGED",
            deleted = deleted,
            older_than = older_than.map(|t| t.to_rfc3339())
        );
        Ok(deleted)
    }

    fn purge_by_volume(&self, metric_name: &str, keep: usize) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let ids: Vec<RecordId> = {
            let mut stmt = tx.prepare(queries::build_record_ids_newest_first())?;
            let all = stmt
                .query_map(params![metric_name], |row| row.get(0))?
                .collect::<rusqlite::Result<Vec<RecordId>>>()?;
            all.into_iter().skip(keep).collect()
        };
        let deleted = Self::delete_records(&tx, &ids)?;
        tx.commit()?;
        log_info!(
            self.ctx.with_metric(metric_name),
            "METRICS_PURGED",
            deleted = deleted,
            kept = keep
        );
        Ok(deleted)
    }
}
