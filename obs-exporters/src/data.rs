//! Metric data handed from the provider to readers.

use chrono::{DateTime, Utc};
use obs_primitives::{Attributes, Resource};
use serde::{Deserialize, Serialize};

/// Instrument category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstrumentKind {
    /// Monotonic sum.
    Counter,
    /// Last recorded value.
    Gauge,
    /// Bucketed distribution.
    Histogram,
}

impl InstrumentKind {
    /// Lowercase kind name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Counter => "counter",
            Self::Gauge => "gauge",
            Self::Histogram => "histogram",
        }
    }
}

/// Name and version of the meter that produced a stream.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InstrumentationScope {
    /// Scope name, usually the service name.
    pub name: String,
    /// Optional scope version.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

impl InstrumentationScope {
    /// Creates a scope.
    #[must_use]
    pub fn new(name: impl Into<String>, version: Option<String>) -> Self {
        Self {
            name: name.into(),
            version,
        }
    }
}

/// Aggregated histogram state for one label set.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistogramValue {
    /// Upper bucket bounds, ascending.
    pub bounds: Vec<f64>,
    /// Per-bucket counts; one more entry than `bounds` for the overflow bucket.
    pub bucket_counts: Vec<u64>,
    /// Number of recorded values.
    pub count: u64,
    /// Sum of recorded values.
    pub sum: f64,
    /// Smallest recorded value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    /// Largest recorded value.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
}

impl HistogramValue {
    /// Empty histogram over the supplied bounds.
    #[must_use]
    pub fn empty(bounds: Vec<f64>) -> Self {
        let buckets = bounds.len() + 1;
        Self {
            bounds,
            bucket_counts: vec![0; buckets],
            count: 0,
            sum: 0.0,
            min: None,
            max: None,
        }
    }

    /// Adds one observation.
    pub fn observe(&mut self, value: f64) {
        let index = self
            .bounds
            .iter()
            .position(|bound| value <= *bound)
            .unwrap_or(self.bounds.len());
        self.bucket_counts[index] += 1;
        self.count += 1;
        self.sum += value;
        self.min = Some(self.min.map_or(value, |min| min.min(value)));
        self.max = Some(self.max.map_or(value, |max| max.max(value)));
    }
}

/// Value of one data point.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "lowercase")]
pub enum PointValue {
    /// Cumulative monotonic sum.
    Sum(f64),
    /// Last value.
    Gauge(f64),
    /// Distribution.
    Histogram(HistogramValue),
}

/// One label set and its aggregated value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Labels identifying the series.
    pub labels: Attributes,
    /// Aggregated value.
    pub value: PointValue,
}

/// All data points of one instrument.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MetricStream {
    /// Instrument name.
    pub name: String,
    /// Human-readable description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Unit of measurement.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    /// Instrument kind.
    pub kind: InstrumentKind,
    /// Producing meter.
    pub scope: InstrumentationScope,
    /// Data points, one per label set.
    pub points: Vec<DataPoint>,
}

/// A collection pass over every instrument of a provider.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBatch {
    /// Resource of the emitting service.
    pub resource: Resource,
    /// Start of the cumulative aggregation window.
    pub started_at: DateTime<Utc>,
    /// Collection time.
    pub collected_at: DateTime<Utc>,
    /// Streams in the batch.
    pub metrics: Vec<MetricStream>,
}

impl MetricBatch {
    /// Creates a batch stamped with the current time.
    #[must_use]
    pub fn new(resource: Resource, metrics: Vec<MetricStream>) -> Self {
        let now = Utc::now();
        Self {
            resource,
            started_at: now,
            collected_at: now,
            metrics,
        }
    }

    /// Sets the start of the cumulative window, normally provider creation.
    #[must_use]
    pub fn with_start_time(mut self, started_at: DateTime<Utc>) -> Self {
        self.started_at = started_at;
        self
    }

    /// Returns the first stream with the given name.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&MetricStream> {
        self.metrics.iter().find(|stream| stream.name == name)
    }

    /// Returns `true` when no instrument produced data.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.metrics.iter().all(|stream| stream.points.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn histogram_places_values_in_buckets() {
        let mut histogram = HistogramValue::empty(vec![10.0, 100.0]);
        histogram.observe(5.0);
        histogram.observe(10.0);
        histogram.observe(50.0);
        histogram.observe(500.0);

        assert_eq!(histogram.bucket_counts, vec![2, 1, 1]);
        assert_eq!(histogram.count, 4);
        assert!((histogram.sum - 565.0).abs() < f64::EPSILON);
        assert_eq!(histogram.min, Some(5.0));
        assert_eq!(histogram.max, Some(500.0));
    }
}
