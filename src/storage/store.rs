//! The metric store interface.
//!
//! Stores persist composite trees under a metric name together with a
//! timestamp and metadata, and answer volume (most recent N) and time-window
//! queries over them.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;
use crate::metrics::{CompositeMetric, Metadata, MetadataValue, MetricValue};
use crate::storage::filter::{FieldSelection, MetadataFilter};

/// Store-assigned identifier of one posted snapshot.
pub type RecordId = i64;

/// `field_path -> [(timestamp, value)]`, each series oldest first.
pub type FieldSeries = BTreeMap<String, Vec<(DateTime<Utc>, MetricValue)>>;

/// Everything known about a posted snapshot besides its tree.
#[derive(Debug, Clone, Default)]
pub struct PostOptions {
    pub metadata: Metadata,
    /// Defaults to the time of the post.
    pub timestamp: Option<DateTime<Utc>>,
    pub project: Option<String>,
    /// External correlation id; a random v4 uuid is generated when absent.
    pub uuid: Option<String>,
}

impl PostOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn meta(mut self, name: &str, value: impl Into<MetadataValue>) -> Self {
        self.metadata.insert(name, value);
        self
    }

    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn project(mut self, project: &str) -> Self {
        self.project = Some(project.to_string());
        self
    }

    pub fn uuid(mut self, uuid: &str) -> Self {
        self.uuid = Some(uuid.to_string());
        self
    }
}

/// Restrictions on a time-window field query beyond the window itself.
#[derive(Debug, Clone, Default)]
pub struct FieldQuery {
    pub fields: FieldSelection,
    /// Only the newest `max_count` snapshots inside the window contribute.
    pub max_count: Option<usize>,
    pub metadata_filter: Option<MetadataFilter>,
}

impl FieldQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fields(mut self, fields: FieldSelection) -> Self {
        self.fields = fields;
        self
    }

    pub fn max_count(mut self, max_count: usize) -> Self {
        self.max_count = Some(max_count);
        self
    }

    pub fn metadata_filter(mut self, filter: MetadataFilter) -> Self {
        self.metadata_filter = Some(filter);
        self
    }
}

/// A snapshot as read back from a store.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredMetric {
    pub record_id: RecordId,
    pub metric_name: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Metadata,
    pub project: Option<String>,
    pub uuid: String,
    pub metric: CompositeMetric,
}

/// Persistent storage of composite metric snapshots.
pub trait MetricStore {
    /// Store one snapshot atomically.
    fn post_with(
        &self,
        metric_name: &str,
        metric_data: &CompositeMetric,
        options: PostOptions,
    ) -> Result<RecordId>;

    fn post(
        &self,
        metric_name: &str,
        metric_data: &CompositeMetric,
        metadata: &Metadata,
        timestamp: Option<DateTime<Utc>>,
    ) -> Result<RecordId> {
        let options = PostOptions {
            metadata: metadata.clone(),
            timestamp,
            ..PostOptions::default()
        };
        self.post_with(metric_name, metric_data, options)
    }

    /// Store any serializable record, converted to a tree named `root_name`.
    fn post_data<T: Serialize>(
        &self,
        metric_name: &str,
        root_name: &str,
        data: &T,
        options: PostOptions,
    ) -> Result<RecordId>
    where
        Self: Sized,
    {
        let tree = CompositeMetric::from_serialize(root_name, data)?;
        self.post_with(metric_name, &tree, options)
    }

    /// Up to `count` most recent snapshots matching `metadata_filter`,
    /// newest first.
    fn stored_metrics_by_volume(
        &self,
        metric_name: &str,
        count: usize,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredMetric>>;

    fn dataclass_metrics_by_volume(&self, metric_name: &str, count: usize) -> Result<Vec<StoredMetric>> {
        self.stored_metrics_by_volume(metric_name, count, None)
    }

    fn composite_metrics_by_volume(
        &self,
        metric_name: &str,
        count: usize,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CompositeMetric, Metadata)>> {
        Ok(self
            .stored_metrics_by_volume(metric_name, count, metadata_filter)?
            .into_iter()
            .map(|s| (s.metric, s.metadata))
            .collect())
    }

    /// Most recent snapshots converted back into typed records.
    fn typed_metrics_by_volume<T: DeserializeOwned>(&self, metric_name: &str, count: usize) -> Result<Vec<T>>
    where
        Self: Sized,
    {
        self.stored_metrics_by_volume(metric_name, count, None)?
            .iter()
            .map(|s| s.metric.to_deserialize())
            .collect()
    }

    /// Snapshots in `[oldest, newest]` (newest defaults to now), oldest first.
    fn stored_metrics_by_date(
        &self,
        metric_name: &str,
        oldest: DateTime<Utc>,
        newest: Option<DateTime<Utc>>,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<StoredMetric>>;

    fn composite_metrics_by_date(
        &self,
        metric_name: &str,
        oldest: DateTime<Utc>,
        newest: Option<DateTime<Utc>>,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<Vec<(CompositeMetric, Metadata)>> {
        Ok(self
            .stored_metrics_by_date(metric_name, oldest, newest, metadata_filter)?
            .into_iter()
            .map(|s| (s.metric, s.metadata))
            .collect())
    }

    /// Selected leaf values of the snapshots in `[oldest, newest]`, grouped
    /// by field path.
    fn query_fields(
        &self,
        metric_name: &str,
        oldest: DateTime<Utc>,
        newest: Option<DateTime<Utc>>,
        query: &FieldQuery,
    ) -> Result<FieldSeries>;

    /// Leaf values of every snapshot in `[oldest, newest]` (newest defaults
    /// to now), grouped by field path.
    fn metric_fields_by_date(
        &self,
        metric_name: &str,
        oldest: DateTime<Utc>,
        newest: Option<DateTime<Utc>>,
        metadata_filter: Option<&MetadataFilter>,
    ) -> Result<FieldSeries> {
        let query = FieldQuery {
            metadata_filter: metadata_filter.cloned(),
            ..FieldQuery::default()
        };
        self.query_fields(metric_name, oldest, newest, &query)
    }

    /// Delete snapshots strictly older than `older_than`, or all of them.
    fn purge(&self, metric_name: &str, older_than: Option<DateTime<Utc>>) -> Result<usize>;

    /// Keep the `keep` most recent snapshots and delete the rest.
    fn purge_by_volume(&self, metric_name: &str, keep: usize) -> Result<usize>;
}
