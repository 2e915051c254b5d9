//! Counters, gauges and histograms.

use std::collections::BTreeMap;
use std::sync::Arc;

use obs_exporters::{
    DataPoint, HistogramValue, InstrumentKind, InstrumentationScope, MetricStream, PointValue,
};
use obs_primitives::Attributes;
use parking_lot::Mutex;
use tracing::warn;

use crate::error::{SignalError, SignalResult};

/// Default histogram bucket bounds.
pub const DEFAULT_HISTOGRAM_BUCKETS: [f64; 15] = [
    0.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0, 250.0, 500.0, 750.0, 1000.0, 2500.0, 5000.0,
    7500.0, 10000.0,
];

const MAX_INSTRUMENT_NAME_LEN: usize = 255;

/// Per-call labels.
pub type Labels<'a> = &'a [(&'a str, &'a str)];

/// Static description and labels for an instrument handle.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MetricOptions {
    description: Option<String>,
    unit: Option<String>,
    labels: Attributes,
}

impl MetricOptions {
    /// Empty options.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Sets the unit, such as `ms` or `By`.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    /// Adds a label applied to every recording made through the handle.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Static labels.
    #[must_use]
    pub fn labels(&self) -> &Attributes {
        &self.labels
    }
}

/// Checks an instrument name: ASCII letter first, then letters, digits,
/// `_`, `.`, `-` or `/`, at most 255 characters.
///
/// # Errors
///
/// Returns [`SignalError::InvalidInstrument`] describing the violation.
pub fn validate_instrument_name(name: &str) -> SignalResult<()> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err(SignalError::invalid_instrument(name, "name is empty")),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(SignalError::invalid_instrument(
                name,
                "name must start with an ASCII letter",
            ));
        }
        Some(_) => {}
    }
    if name.len() > MAX_INSTRUMENT_NAME_LEN {
        return Err(SignalError::invalid_instrument(
            name,
            format!("name exceeds {MAX_INSTRUMENT_NAME_LEN} characters"),
        ));
    }
    if let Some(bad) = chars.find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-' | '/'))) {
        return Err(SignalError::invalid_instrument(
            name,
            format!("character `{bad}` is not allowed"),
        ));
    }
    Ok(())
}

pub(crate) fn validate_buckets(name: &str, bounds: &[f64]) -> SignalResult<()> {
    if bounds.iter().any(|bound| !bound.is_finite()) {
        return Err(SignalError::invalid_instrument(name, "bucket bounds must be finite"));
    }
    if bounds.windows(2).any(|pair| pair[0] >= pair[1]) {
        return Err(SignalError::invalid_instrument(
            name,
            "bucket bounds must be strictly ascending",
        ));
    }
    Ok(())
}

#[derive(Debug, Default)]
struct Series {
    points: BTreeMap<Attributes, PointValue>,
    last: Option<f64>,
}

/// Shared aggregation state behind every handle of one instrument.
#[derive(Debug)]
pub(crate) struct InstrumentCell {
    name: String,
    description: Option<String>,
    unit: Option<String>,
    kind: InstrumentKind,
    scope: InstrumentationScope,
    bounds: Vec<f64>,
    series: Mutex<Series>,
}

impl InstrumentCell {
    pub(crate) fn new(
        name: &str,
        kind: InstrumentKind,
        scope: InstrumentationScope,
        options: &MetricOptions,
        bounds: Vec<f64>,
    ) -> Self {
        Self {
            name: name.to_owned(),
            description: options.description.clone(),
            unit: options.unit.clone(),
            kind,
            scope,
            bounds,
            series: Mutex::new(Series::default()),
        }
    }

    pub(crate) fn name(&self) -> &str {
        &self.name
    }

    pub(crate) const fn kind(&self) -> InstrumentKind {
        self.kind
    }

    pub(crate) fn bounds(&self) -> &[f64] {
        &self.bounds
    }

    fn update(&self, labels: Attributes, value: f64) {
        let mut series = self.series.lock();
        series.last = Some(value);
        let point = series.points.entry(labels).or_insert_with(|| match self.kind {
            InstrumentKind::Counter => PointValue::Sum(0.0),
            InstrumentKind::Gauge => PointValue::Gauge(0.0),
            InstrumentKind::Histogram => {
                PointValue::Histogram(HistogramValue::empty(self.bounds.clone()))
            }
        });
        match point {
            PointValue::Sum(sum) => *sum += value,
            PointValue::Gauge(current) => *current = value,
            PointValue::Histogram(histogram) => histogram.observe(value),
        }
    }

    pub(crate) fn snapshot(&self) -> MetricStream {
        let points = self
            .series
            .lock()
            .points
            .iter()
            .map(|(labels, value)| DataPoint {
                labels: labels.clone(),
                value: value.clone(),
            })
            .collect();
        MetricStream {
            name: self.name.clone(),
            description: self.description.clone(),
            unit: self.unit.clone(),
            kind: self.kind,
            scope: self.scope.clone(),
            points,
        }
    }
}

/// Handle state common to all instrument kinds.
#[derive(Clone, Debug)]
struct Handle {
    cell: Arc<InstrumentCell>,
    labels: Arc<Attributes>,
}

impl Handle {
    fn new(cell: Arc<InstrumentCell>, defaults: &Attributes, options: &MetricOptions) -> Self {
        let mut labels = defaults.clone();
        labels.extend(options.labels.clone());
        Self {
            cell,
            labels: Arc::new(labels),
        }
    }

    fn record(&self, value: f64, labels: Labels<'_>) {
        let mut merged = (*self.labels).clone();
        merged.extend(
            labels
                .iter()
                .map(|(key, value)| ((*key).to_owned(), (*value).to_owned())),
        );
        self.cell.update(merged, value);
    }
}

/// Monotonic sum.
#[derive(Clone, Debug)]
pub struct Counter(Handle);

impl Counter {
    pub(crate) fn new(cell: Arc<InstrumentCell>, defaults: &Attributes, options: &MetricOptions) -> Self {
        Self(Handle::new(cell, defaults, options))
    }

    /// Instrument name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.cell.name()
    }

    /// Adds `value` to the series selected by `labels`.
    ///
    /// Negative or non-finite increments are dropped with a warning.
    pub fn increment(&self, value: f64, labels: Labels<'_>) {
        if !value.is_finite() || value < 0.0 {
            warn!(instrument = self.name(), value, "counter increment must be a non-negative number; ignoring");
            return;
        }
        self.0.record(value, labels);
    }

    /// Adds one.
    pub fn inc(&self, labels: Labels<'_>) {
        self.increment(1.0, labels);
    }

    /// Total across every series.
    #[must_use]
    pub fn current_value(&self) -> f64 {
        self.0
            .cell
            .series
            .lock()
            .points
            .values()
            .map(|point| match point {
                PointValue::Sum(sum) => *sum,
                _ => 0.0,
            })
            .sum()
    }
}

/// Last-value instrument.
#[derive(Clone, Debug)]
pub struct Gauge(Handle);

impl Gauge {
    pub(crate) fn new(cell: Arc<InstrumentCell>, defaults: &Attributes, options: &MetricOptions) -> Self {
        Self(Handle::new(cell, defaults, options))
    }

    /// Instrument name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.cell.name()
    }

    /// Replaces the value of the series selected by `labels`.
    pub fn set(&self, value: f64, labels: Labels<'_>) {
        if !value.is_finite() {
            warn!(instrument = self.name(), value, "gauge value must be finite; ignoring");
            return;
        }
        self.0.record(value, labels);
    }

    /// Most recently set value, across all series.
    #[must_use]
    pub fn current_value(&self) -> Option<f64> {
        self.0.cell.series.lock().last
    }
}

/// Bucketed distribution.
#[derive(Clone, Debug)]
pub struct Histogram(Handle);

impl Histogram {
    pub(crate) fn new(cell: Arc<InstrumentCell>, defaults: &Attributes, options: &MetricOptions) -> Self {
        Self(Handle::new(cell, defaults, options))
    }

    /// Instrument name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.0.cell.name()
    }

    /// Records one observation.
    pub fn record(&self, value: f64, labels: Labels<'_>) {
        if !value.is_finite() {
            warn!(instrument = self.name(), value, "histogram value must be finite; ignoring");
            return;
        }
        self.0.record(value, labels);
    }

    /// Upper bucket bounds.
    #[must_use]
    pub fn buckets(&self) -> &[f64] {
        self.0.cell.bounds()
    }

    /// Number of observations across every series.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.0
            .cell
            .series
            .lock()
            .points
            .values()
            .map(|point| match point {
                PointValue::Histogram(histogram) => histogram.count,
                _ => 0,
            })
            .sum()
    }
}
