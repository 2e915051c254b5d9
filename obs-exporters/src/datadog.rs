//! Datadog metrics intake (`POST /api/v2/series`) payloads.
//!
//! Counters are cumulative in the provider but Datadog `count` series expect
//! the increase per submission, so the encoder remembers the last submitted
//! value of every series and sends the difference.

use std::collections::HashMap;

use obs_primitives::{Resource, semconv};
use parking_lot::Mutex;
use serde::Serialize;

use crate::data::{DataPoint, MetricBatch, PointValue};
use crate::push::PayloadEncoder;
use crate::traits::ExporterResult;

/// Content type of the series endpoint.
pub const DATADOG_JSON: &str = "application/json";

/// Datadog metric intake types.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SeriesType {
    /// Increase over the submission interval.
    Count = 1,
    /// Point-in-time value.
    Gauge = 3,
}

impl Serialize for SeriesType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(*self as u8)
    }
}

/// Request body of the v2 series endpoint.
#[derive(Debug, Serialize)]
pub struct SeriesPayload {
    /// Submitted series.
    pub series: Vec<Series>,
}

/// One metric series.
#[derive(Debug, Serialize)]
pub struct Series {
    /// Metric name.
    pub metric: String,
    /// Intake type.
    #[serde(rename = "type")]
    pub kind: SeriesType,
    /// Points of the series; one per submission.
    pub points: Vec<SeriesPoint>,
    /// `key:value` tags.
    pub tags: Vec<String>,
    /// Unit, when the instrument declares one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

/// A timestamped value.
#[derive(Debug, Serialize)]
pub struct SeriesPoint {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Value.
    pub value: f64,
}

/// Maps batches to `series[]` payloads, tracking counter state between calls.
#[derive(Debug, Default)]
pub struct DatadogEncoder {
    submitted: Mutex<HashMap<String, f64>>,
}

impl DatadogEncoder {
    /// Encoder with no submission history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the payload for `batch` and records the submitted counter values.
    #[must_use]
    pub fn payload(&self, batch: &MetricBatch) -> SeriesPayload {
        let timestamp = batch.collected_at.timestamp();
        let resource_tags = resource_tags(&batch.resource);
        let mut submitted = self.submitted.lock();
        let mut series = Vec::new();

        for stream in &batch.metrics {
            for point in &stream.points {
                let tags = point_tags(&resource_tags, point);
                let mut push = |metric: String, kind: SeriesType, value: f64| {
                    series.push(Series {
                        metric,
                        kind,
                        points: vec![SeriesPoint { timestamp, value }],
                        tags: tags.clone(),
                        unit: stream.unit.clone(),
                    });
                };

                match &point.value {
                    PointValue::Gauge(value) => push(stream.name.clone(), SeriesType::Gauge, *value),
                    PointValue::Sum(total) => {
                        let delta = increase(&mut submitted, &stream.name, &tags, *total);
                        push(stream.name.clone(), SeriesType::Count, delta);
                    }
                    PointValue::Histogram(histogram) => {
                        let count_name = format!("{}.count", stream.name);
                        let sum_name = format!("{}.sum", stream.name);
                        #[allow(clippy::cast_precision_loss)]
                        let count = increase(&mut submitted, &count_name, &tags, histogram.count as f64);
                        let sum = increase(&mut submitted, &sum_name, &tags, histogram.sum);
                        push(count_name, SeriesType::Count, count);
                        push(sum_name, SeriesType::Count, sum);
                        if let Some(max) = histogram.max {
                            push(format!("{}.max", stream.name), SeriesType::Gauge, max);
                        }
                        if let Some(min) = histogram.min {
                            push(format!("{}.min", stream.name), SeriesType::Gauge, min);
                        }
                    }
                }
            }
        }

        SeriesPayload { series }
    }
}

impl PayloadEncoder for DatadogEncoder {
    fn content_type(&self) -> &'static str {
        DATADOG_JSON
    }

    fn encode(&self, batch: &MetricBatch) -> ExporterResult<Vec<u8>> {
        Ok(serde_json::to_vec(&self.payload(batch))?)
    }
}

fn increase(submitted: &mut HashMap<String, f64>, metric: &str, tags: &[String], total: f64) -> f64 {
    let key = format!("{metric}|{}", tags.join(","));
    let previous = submitted.insert(key, total).unwrap_or(0.0);
    // A smaller total means the series restarted; the whole value is new.
    if total < previous { total } else { total - previous }
}

fn resource_tags(resource: &Resource) -> Vec<String> {
    resource
        .iter()
        .map(|(key, value)| {
            let key = match key {
                semconv::SERVICE_NAME => "service",
                semconv::SERVICE_VERSION => "version",
                semconv::DEPLOYMENT_ENVIRONMENT => "env",
                other => other,
            };
            format!("{key}:{value}")
        })
        .collect()
}

fn point_tags(resource_tags: &[String], point: &DataPoint) -> Vec<String> {
    resource_tags
        .iter()
        .cloned()
        .chain(point.labels.iter().map(|(key, value)| format!("{key}:{value}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use obs_primitives::Attributes;

    use super::*;
    use crate::data::{HistogramValue, InstrumentKind, InstrumentationScope, MetricStream};

    fn batch(total: f64) -> MetricBatch {
        let mut latency = HistogramValue::empty(vec![100.0]);
        latency.observe(40.0);
        MetricBatch::new(
            Resource::new([
                ("service.name", "svc"),
                ("deployment.environment", "prod"),
            ]),
            vec![
                MetricStream {
                    name: "payments.processed".into(),
                    description: None,
                    unit: None,
                    kind: InstrumentKind::Counter,
                    scope: InstrumentationScope::new("svc", None),
                    points: vec![DataPoint {
                        labels: Attributes::from([("method".to_owned(), "card".to_owned())]),
                        value: PointValue::Sum(total),
                    }],
                },
                MetricStream {
                    name: "latency".into(),
                    description: None,
                    unit: Some("ms".into()),
                    kind: InstrumentKind::Histogram,
                    scope: InstrumentationScope::new("svc", None),
                    points: vec![DataPoint {
                        labels: Attributes::new(),
                        value: PointValue::Histogram(latency),
                    }],
                },
            ],
        )
    }

    #[test]
    fn counters_are_sent_as_increases() {
        let encoder = DatadogEncoder::new();

        let first = encoder.payload(&batch(5.0));
        assert_eq!(first.series[0].metric, "payments.processed");
        assert_eq!(first.series[0].kind, SeriesType::Count);
        assert!((first.series[0].points[0].value - 5.0).abs() < f64::EPSILON);

        let second = encoder.payload(&batch(8.0));
        assert!((second.series[0].points[0].value - 3.0).abs() < f64::EPSILON);

        let restarted = encoder.payload(&batch(2.0));
        assert!((restarted.series[0].points[0].value - 2.0).abs() < f64::EPSILON);
    }

    #[test]
    fn body_matches_series_schema() {
        let body = DatadogEncoder::new().encode(&batch(1.0)).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&body).unwrap();

        let counter = &value["series"][0];
        assert_eq!(counter["metric"], "payments.processed");
        assert_eq!(counter["type"], 1);
        assert_eq!(counter["points"][0]["value"], 1.0);
        let tags = counter["tags"].as_array().unwrap();
        assert!(tags.contains(&"service:svc".into()));
        assert!(tags.contains(&"env:prod".into()));
        assert!(tags.contains(&"method:card".into()));

        let names: Vec<_> = value["series"]
            .as_array()
            .unwrap()
            .iter()
            .map(|series| series["metric"].as_str().unwrap().to_owned())
            .collect();
        assert_eq!(
            names,
            ["payments.processed", "latency.count", "latency.sum", "latency.max", "latency.min"]
        );
        assert_eq!(value["series"][1]["unit"], "ms");
    }
}
