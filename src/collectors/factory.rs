// Collector factory
// Turns a metric name plus declarative parameters into one typed prometheus
// collector. Nothing here registers the collector anywhere.
//
// Numan Thabit 2025 Nov

use super::{Collector, Instrument, MetricKind, MetricSpec};
use crate::config::MetricParams;
use crate::errors::{MetricsError, Result};
use prometheus::{
    Counter, CounterVec, Gauge, GaugeVec, Histogram, HistogramOpts, HistogramVec, Opts,
};
use tracing::debug;

/// Resolve `params` and construct the matching collector.
pub fn build(name: &str, params: &MetricParams) -> Result<Collector> {
    let spec = MetricSpec::from_params(name, params)?;
    instantiate(&spec)
}

/// Construct the collector for an already resolved spec.
///
/// Labeled specs produce the `*Vec` variant of their kind. Histograms use the
/// configured buckets verbatim, falling back to [`prometheus::DEFAULT_BUCKETS`].
pub fn instantiate(spec: &MetricSpec) -> Result<Collector> {
    debug!(
        metric = %spec.name,
        kind = %spec.kind,
        labels = ?spec.label_names,
        "creating metric collector"
    );

    let labels: Vec<&str> = spec.label_names.iter().map(String::as_str).collect();
    let opts = Opts::new(spec.name.as_str(), spec.help.as_str());

    let instrument = match spec.kind {
        MetricKind::Counter if labels.is_empty() => Counter::with_opts(opts).map(Instrument::Counter),
        MetricKind::Counter => CounterVec::new(opts, &labels).map(Instrument::CounterVec),
        MetricKind::Gauge if labels.is_empty() => Gauge::with_opts(opts).map(Instrument::Gauge),
        MetricKind::Gauge => GaugeVec::new(opts, &labels).map(Instrument::GaugeVec),
        MetricKind::Histogram => {
            let mut hopts = HistogramOpts::from(opts);
            if let Some(buckets) = &spec.buckets {
                hopts = hopts.buckets(buckets.clone());
            }
            if labels.is_empty() {
                Histogram::with_opts(hopts).map(Instrument::Histogram)
            } else {
                HistogramVec::new(hopts, &labels).map(Instrument::HistogramVec)
            }
        }
    }
    .map_err(|e| MetricsError::Configuration(format!("metric {}: {e}", spec.name)))?;

    Ok(Collector::new(spec.clone(), instrument))
}
