//! OTLP/HTTP encoding: batches become protobuf `ExportMetricsServiceRequest`s.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use opentelemetry_proto::tonic::collector::metrics::v1::ExportMetricsServiceRequest;
use opentelemetry_proto::tonic::common::v1::{
    AnyValue, InstrumentationScope as ProtoScope, KeyValue, any_value,
};
use opentelemetry_proto::tonic::metrics::v1::{
    AggregationTemporality, Gauge, Histogram, HistogramDataPoint, Metric, NumberDataPoint,
    ResourceMetrics, ScopeMetrics, Sum, metric, number_data_point,
};
use opentelemetry_proto::tonic::resource::v1::Resource as ProtoResource;
use prost::Message;

use crate::data::{
    DataPoint, InstrumentKind, InstrumentationScope, MetricBatch, MetricStream, PointValue,
};
use crate::push::PayloadEncoder;
use crate::traits::ExporterResult;

/// Content type of OTLP/HTTP protobuf requests.
pub const OTLP_PROTOBUF: &str = "application/x-protobuf";

/// Encodes batches as binary OTLP metrics requests.
#[derive(Clone, Copy, Debug, Default)]
pub struct OtlpEncoder;

impl PayloadEncoder for OtlpEncoder {
    fn content_type(&self) -> &'static str {
        OTLP_PROTOBUF
    }

    fn encode(&self, batch: &MetricBatch) -> ExporterResult<Vec<u8>> {
        Ok(export_request(batch).encode_to_vec())
    }
}

/// Maps a batch onto the OTLP metrics data model. Sums and histograms are
/// cumulative from the batch start time.
#[must_use]
pub fn export_request(batch: &MetricBatch) -> ExportMetricsServiceRequest {
    let start = unix_nanos(batch.started_at);
    let time = unix_nanos(batch.collected_at);

    let mut scopes: BTreeMap<&InstrumentationScope, Vec<Metric>> = BTreeMap::new();
    for stream in &batch.metrics {
        if stream.points.is_empty() {
            continue;
        }
        scopes
            .entry(&stream.scope)
            .or_default()
            .push(proto_metric(stream, start, time));
    }

    let scope_metrics = scopes
        .into_iter()
        .map(|(scope, metrics)| ScopeMetrics {
            scope: Some(ProtoScope {
                name: scope.name.clone(),
                version: scope.version.clone().unwrap_or_default(),
                ..Default::default()
            }),
            metrics,
            ..Default::default()
        })
        .collect();

    ExportMetricsServiceRequest {
        resource_metrics: vec![ResourceMetrics {
            resource: Some(ProtoResource {
                attributes: key_values(batch.resource.iter()),
                ..Default::default()
            }),
            scope_metrics,
            ..Default::default()
        }],
    }
}

fn proto_metric(stream: &MetricStream, start: u64, time: u64) -> Metric {
    let number_points = || {
        stream
            .points
            .iter()
            .filter_map(|point| number_point(point, start, time))
            .collect::<Vec<_>>()
    };

    let data = match stream.kind {
        InstrumentKind::Counter => metric::Data::Sum(Sum {
            data_points: number_points(),
            aggregation_temporality: AggregationTemporality::Cumulative as i32,
            is_monotonic: true,
        }),
        InstrumentKind::Gauge => metric::Data::Gauge(Gauge {
            data_points: number_points(),
        }),
        InstrumentKind::Histogram => metric::Data::Histogram(Histogram {
            data_points: stream
                .points
                .iter()
                .filter_map(|point| histogram_point(point, start, time))
                .collect(),
            aggregation_temporality: AggregationTemporality::Cumulative as i32,
        }),
    };

    Metric {
        name: stream.name.clone(),
        description: stream.description.clone().unwrap_or_default(),
        unit: stream.unit.clone().unwrap_or_default(),
        data: Some(data),
        ..Default::default()
    }
}

fn number_point(point: &DataPoint, start: u64, time: u64) -> Option<NumberDataPoint> {
    let (value, start) = match point.value {
        PointValue::Sum(value) => (value, start),
        PointValue::Gauge(value) => (value, 0),
        PointValue::Histogram(_) => return None,
    };
    Some(NumberDataPoint {
        attributes: key_values(point.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        start_time_unix_nano: start,
        time_unix_nano: time,
        value: Some(number_data_point::Value::AsDouble(value)),
        ..Default::default()
    })
}

fn histogram_point(point: &DataPoint, start: u64, time: u64) -> Option<HistogramDataPoint> {
    let PointValue::Histogram(histogram) = &point.value else {
        return None;
    };
    Some(HistogramDataPoint {
        attributes: key_values(point.labels.iter().map(|(k, v)| (k.as_str(), v.as_str()))),
        start_time_unix_nano: start,
        time_unix_nano: time,
        count: histogram.count,
        sum: Some(histogram.sum),
        bucket_counts: histogram.bucket_counts.clone(),
        explicit_bounds: histogram.bounds.clone(),
        min: histogram.min,
        max: histogram.max,
        ..Default::default()
    })
}

fn key_values<'a>(pairs: impl Iterator<Item = (&'a str, &'a str)>) -> Vec<KeyValue> {
    pairs
        .map(|(key, value)| KeyValue {
            key: key.to_owned(),
            value: Some(AnyValue {
                value: Some(any_value::Value::StringValue(value.to_owned())),
            }),
        })
        .collect()
}

fn unix_nanos(at: DateTime<Utc>) -> u64 {
    at.timestamp_nanos_opt()
        .and_then(|nanos| u64::try_from(nanos).ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use obs_primitives::{Attributes, Resource};

    use super::*;
    use crate::data::HistogramValue;

    fn stream(name: &str, kind: InstrumentKind, scope: &str, value: PointValue) -> MetricStream {
        MetricStream {
            name: name.into(),
            description: Some(format!("{name} description")),
            unit: None,
            kind,
            scope: InstrumentationScope::new(scope, Some("1.0.0".into())),
            points: vec![DataPoint {
                labels: Attributes::from([("method".to_owned(), "card".to_owned())]),
                value,
            }],
        }
    }

    #[test]
    fn groups_streams_by_scope_under_one_resource() {
        let mut latency = HistogramValue::empty(vec![10.0, 100.0]);
        latency.observe(40.0);
        let batch = MetricBatch::new(
            Resource::new([("service.name", "svc")]),
            vec![
                stream("payments", InstrumentKind::Counter, "billing", PointValue::Sum(3.0)),
                stream("queue", InstrumentKind::Gauge, "billing", PointValue::Gauge(7.0)),
                stream("latency", InstrumentKind::Histogram, "http", PointValue::Histogram(latency)),
            ],
        );

        let request = export_request(&batch);
        let resource_metrics = &request.resource_metrics[0];
        let resource = resource_metrics.resource.as_ref().unwrap();
        assert_eq!(resource.attributes[0].key, "service.name");
        assert_eq!(resource_metrics.scope_metrics.len(), 2);

        let billing = &resource_metrics.scope_metrics[0];
        assert_eq!(billing.scope.as_ref().unwrap().name, "billing");
        let Some(metric::Data::Sum(sum)) = &billing.metrics[0].data else {
            panic!("counter should map to a sum");
        };
        assert!(sum.is_monotonic);
        assert_eq!(
            sum.aggregation_temporality,
            AggregationTemporality::Cumulative as i32
        );
        assert_eq!(
            sum.data_points[0].value,
            Some(number_data_point::Value::AsDouble(3.0))
        );

        let http = &resource_metrics.scope_metrics[1];
        let Some(metric::Data::Histogram(histogram)) = &http.metrics[0].data else {
            panic!("histogram should map to a histogram");
        };
        assert_eq!(histogram.data_points[0].bucket_counts, vec![0, 1, 0]);
        assert_eq!(histogram.data_points[0].explicit_bounds, vec![10.0, 100.0]);
    }

    #[test]
    fn encoded_body_decodes_as_export_request() {
        let batch = MetricBatch::new(
            Resource::new([("service.name", "svc")]),
            vec![stream("payments", InstrumentKind::Counter, "billing", PointValue::Sum(1.0))],
        );

        let body = OtlpEncoder.encode(&batch).unwrap();
        let decoded = ExportMetricsServiceRequest::decode(body.as_slice()).unwrap();
        assert_eq!(decoded, export_request(&batch));
        assert_eq!(
            decoded.resource_metrics[0].scope_metrics[0].metrics[0].name,
            "payments"
        );
    }
}
