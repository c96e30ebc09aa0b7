// Collector module - typed metric specifications and live collectors
// This file defines the metric kinds, the resolved metric specification
// and the collector wrapper handed out by the registry
//
// Numan Thabit 2025 Nov

pub mod factory;

pub use factory::{build, instantiate};

use crate::config::MetricParams;
use crate::errors::{MetricsError, Result};
use prometheus::core::Collector as PromCollector;
use prometheus::{Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramVec, Registry};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Metric kind, resolved once from the configuration string
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKind::Counter => "Counter",
            MetricKind::Gauge => "Gauge",
            MetricKind::Histogram => "Histogram",
        }
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = MetricsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "counter" => Ok(MetricKind::Counter),
            "gauge" => Ok(MetricKind::Gauge),
            "histogram" => Ok(MetricKind::Histogram),
            other => Err(MetricsError::Configuration(format!(
                "unrecognized metric kind: {other}"
            ))),
        }
    }
}

/// Resolved description of one metric
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSpec {
    pub name: String,
    pub kind: MetricKind,
    pub help: String,
    /// Ordered label keys; empty means an unlabeled collector
    pub label_names: Vec<String>,
    /// Histogram bucket boundaries; `None` selects the default ladder
    pub buckets: Option<Vec<f64>>,
}

impl MetricSpec {
    pub fn new(name: impl Into<String>, kind: MetricKind, help: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            help: help.into(),
            label_names: Vec::new(),
            buckets: None,
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }

    pub fn is_labeled(&self) -> bool {
        !self.label_names.is_empty()
    }

    /// Resolve declarative parameters into a spec.
    pub fn from_params(name: &str, params: &MetricParams) -> Result<Self> {
        if name.trim().is_empty() {
            return Err(MetricsError::Configuration(
                "metric name must not be empty".to_string(),
            ));
        }

        let kind = params
            .kind
            .as_deref()
            .ok_or_else(|| MetricsError::Configuration(format!("metric {name}: missing kind")))?
            .parse::<MetricKind>()
            .map_err(|e| MetricsError::Configuration(format!("metric {name}: {e}")))?;

        let help = params
            .help
            .as_deref()
            .map(str::trim)
            .filter(|h| !h.is_empty())
            .ok_or_else(|| MetricsError::Configuration(format!("metric {name}: missing help")))?;

        let mut seen = HashSet::with_capacity(params.label_names.len());
        for label in &params.label_names {
            if !seen.insert(label.as_str()) {
                return Err(MetricsError::Configuration(format!(
                    "metric {name}: duplicate label {label}"
                )));
            }
        }

        let buckets = match (kind, &params.buckets) {
            (MetricKind::Histogram, buckets) => buckets.clone(),
            (_, Some(_)) => {
                warn!(metric = %name, kind = %kind, "buckets ignored for non-histogram metric");
                None
            }
            (_, None) => None,
        };

        Ok(Self {
            name: name.to_string(),
            kind,
            help: help.to_string(),
            label_names: params.label_names.clone(),
            buckets,
        })
    }
}

/// Concrete prometheus instrument behind a collector
#[derive(Clone)]
pub enum Instrument {
    Counter(Counter),
    CounterVec(CounterVec),
    Gauge(Gauge),
    GaugeVec(GaugeVec),
    Histogram(Histogram),
    HistogramVec(HistogramVec),
}

/// A live collector bound to exactly one [`MetricSpec`].
///
/// Clones share state: the instruments are reference counted internally.
#[derive(Clone)]
pub struct Collector {
    spec: MetricSpec,
    instrument: Instrument,
}

impl fmt::Debug for Collector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collector")
            .field("name", &self.spec.name)
            .field("kind", &self.spec.kind)
            .field("labels", &self.spec.label_names)
            .finish()
    }
}

impl Collector {
    pub(crate) fn new(spec: MetricSpec, instrument: Instrument) -> Self {
        Self { spec, instrument }
    }

    pub fn spec(&self) -> &MetricSpec {
        &self.spec
    }

    pub fn name(&self) -> &str {
        &self.spec.name
    }

    pub fn kind(&self) -> MetricKind {
        self.spec.kind
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn counter(&self) -> Result<&Counter> {
        match &self.instrument {
            Instrument::Counter(c) => Ok(c),
            _ => Err(self.mismatch("unlabeled Counter")),
        }
    }

    pub fn counter_vec(&self) -> Result<&CounterVec> {
        match &self.instrument {
            Instrument::CounterVec(c) => Ok(c),
            _ => Err(self.mismatch("labeled Counter")),
        }
    }

    pub fn gauge(&self) -> Result<&Gauge> {
        match &self.instrument {
            Instrument::Gauge(g) => Ok(g),
            _ => Err(self.mismatch("unlabeled Gauge")),
        }
    }

    pub fn gauge_vec(&self) -> Result<&GaugeVec> {
        match &self.instrument {
            Instrument::GaugeVec(g) => Ok(g),
            _ => Err(self.mismatch("labeled Gauge")),
        }
    }

    pub fn histogram(&self) -> Result<&Histogram> {
        match &self.instrument {
            Instrument::Histogram(h) => Ok(h),
            _ => Err(self.mismatch("unlabeled Histogram")),
        }
    }

    pub fn histogram_vec(&self) -> Result<&HistogramVec> {
        match &self.instrument {
            Instrument::HistogramVec(h) => Ok(h),
            _ => Err(self.mismatch("labeled Histogram")),
        }
    }

    fn mismatch(&self, expected: &'static str) -> MetricsError {
        MetricsError::KindMismatch {
            name: self.spec.name.clone(),
            expected,
        }
    }

    fn boxed(&self) -> Box<dyn PromCollector> {
        match &self.instrument {
            Instrument::Counter(c) => Box::new(c.clone()),
            Instrument::CounterVec(c) => Box::new(c.clone()),
            Instrument::Gauge(g) => Box::new(g.clone()),
            Instrument::GaugeVec(g) => Box::new(g.clone()),
            Instrument::Histogram(h) => Box::new(h.clone()),
            Instrument::HistogramVec(h) => Box::new(h.clone()),
        }
    }

    pub(crate) fn register_into(&self, registry: &Registry) -> Result<()> {
        registry.register(self.boxed())?;
        Ok(())
    }

    pub(crate) fn unregister_from(&self, registry: &Registry) -> Result<()> {
        registry.unregister(self.boxed())?;
        Ok(())
    }
}
