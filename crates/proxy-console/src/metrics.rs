use std::collections::{BTreeMap, VecDeque};
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const METRICS_WINDOW: usize = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MetricSeries {
    System,
    Performance,
}

impl MetricSeries {
    pub const ALL: [MetricSeries; 2] = [MetricSeries::System, MetricSeries::Performance];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetricSeries::System => "system",
            MetricSeries::Performance => "performance",
        }
    }
}

impl std::fmt::Display for MetricSeries {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One point in time with numeric fields keyed by dotted path, e.g.
/// `cpu.percent` or `latency.p95`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSample {
    pub timestamp: NaiveDateTime,
    pub fields: BTreeMap<String, f64>,
}

impl MetricSample {
    /// Builds a sample from a backend JSON object. The time comes from
    /// `timestamp` (or `bucket` for aggregates); every numeric leaf becomes a
    /// field. Returns `None` when there is no parseable time.
    pub fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let timestamp = object
            .get("timestamp")
            .or_else(|| object.get("bucket"))
            .and_then(Value::as_str)
            .and_then(parse_timestamp)?;

        let mut fields = BTreeMap::new();
        for (key, value) in object {
            if key == "timestamp" || key == "bucket" {
                continue;
            }
            flatten(key, value, &mut fields);
        }
        Some(Self { timestamp, fields })
    }

    pub fn get(&self, key: &str) -> Option<f64> {
        self.fields.get(key).copied()
    }
}

fn flatten(prefix: &str, value: &Value, out: &mut BTreeMap<String, f64>) {
    match value {
        Value::Number(number) => {
            if let Some(n) = number.as_f64() {
                out.insert(prefix.to_string(), n);
            }
        }
        Value::Object(map) => {
            for (key, nested) in map {
                flatten(&format!("{prefix}.{key}"), nested, out);
            }
        }
        _ => {}
    }
}

pub(crate) fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::from_str(raw)
        .ok()
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.naive_utc())
        })
}

/// Parses a JSON array of sample objects, skipping entries without a time.
pub fn samples_from_json(value: &Value) -> Vec<MetricSample> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(MetricSample::from_json).collect())
        .unwrap_or_default()
}

#[derive(Debug, Clone)]
pub struct MetricsWindow {
    samples: VecDeque<MetricSample>,
    capacity: usize,
}

impl Default for MetricsWindow {
    fn default() -> Self {
        Self::new(METRICS_WINDOW)
    }
}

impl MetricsWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity.min(METRICS_WINDOW)),
            capacity: capacity.max(1),
        }
    }

    pub fn push(&mut self, sample: MetricSample) {
        if self.samples.len() >= self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    pub fn replace(&mut self, samples: Vec<MetricSample>) {
        let skip = samples.len().saturating_sub(self.capacity);
        self.samples = samples.into_iter().skip(skip).collect();
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn latest(&self) -> Option<&MetricSample> {
        self.samples.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSample> {
        self.samples.iter()
    }

    /// Values of one field across the window, oldest first. Samples missing
    /// the field are skipped.
    pub fn values(&self, key: &str) -> Vec<f64> {
        self.samples.iter().filter_map(|s| s.get(key)).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum LookBack {
    #[default]
    OneHour,
    SixHours,
    OneDay,
}

impl LookBack {
    pub fn hours(self) -> u32 {
        match self {
            LookBack::OneHour => 1,
            LookBack::SixHours => 6,
            LookBack::OneDay => 24,
        }
    }

    pub fn interval_minutes(self) -> u32 {
        match self {
            LookBack::OneHour => 1,
            LookBack::SixHours => 5,
            LookBack::OneDay => 15,
        }
    }

    pub fn next(self) -> Self {
        match self {
            LookBack::OneHour => LookBack::SixHours,
            LookBack::SixHours => LookBack::OneDay,
            LookBack::OneDay => LookBack::OneHour,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            LookBack::OneHour => "1h",
            LookBack::SixHours => "6h",
            LookBack::OneDay => "24h",
        }
    }
}

/// All metric state owned by a session.
#[derive(Debug, Clone)]
pub struct MetricsHistory {
    windows: BTreeMap<MetricSeries, MetricsWindow>,
    lookback: LookBack,
    aggregate: Option<(LookBack, Vec<MetricSample>)>,
}

impl Default for MetricsHistory {
    fn default() -> Self {
        Self::new(METRICS_WINDOW)
    }
}

impl MetricsHistory {
    pub fn new(capacity: usize) -> Self {
        let windows = MetricSeries::ALL
            .into_iter()
            .map(|series| (series, MetricsWindow::new(capacity)))
            .collect();
        Self {
            windows,
            lookback: LookBack::default(),
            aggregate: None,
        }
    }

    pub fn push(&mut self, series: MetricSeries, sample: MetricSample) {
        self.window_mut(series).push(sample);
    }

    pub fn replace(&mut self, series: MetricSeries, samples: Vec<MetricSample>) {
        self.window_mut(series).replace(samples);
    }

    pub fn window(&self, series: MetricSeries) -> &MetricsWindow {
        &self.windows[&series]
    }

    pub fn lookback(&self) -> LookBack {
        self.lookback
    }

    pub fn set_lookback(&mut self, lookback: LookBack) {
        self.lookback = lookback;
    }

    /// Stores an aggregate response. Responses for a look-back that is no
    /// longer selected are dropped.
    pub fn set_aggregate(&mut self, lookback: LookBack, buckets: Vec<MetricSample>) {
        if lookback == self.lookback {
            self.aggregate = Some((lookback, buckets));
        }
    }

    pub fn aggregate(&self) -> Option<&[MetricSample]> {
        self.aggregate
            .as_ref()
            .filter(|(lookback, _)| *lookback == self.lookback)
            .map(|(_, buckets)| buckets.as_slice())
    }

    fn window_mut(&mut self, series: MetricSeries) -> &mut MetricsWindow {
        self.windows.entry(series).or_default()
    }
}
