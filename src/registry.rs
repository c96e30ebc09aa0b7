// Metric registry
// Name -> collector mapping built once at startup, plus the prometheus
// registry the exposition endpoint reads from
//
// Numan Thabit 2025 Nov

use crate::collectors::{self, Collector, MetricSpec};
use crate::errors::{MetricsError, Result};
use crate::gate::InitGate;
use once_cell::sync::OnceCell;
use prometheus::proto::MetricFamily;
use prometheus::{
    Counter, CounterVec, Encoder, Gauge, GaugeVec, Histogram, HistogramVec, Registry, TextEncoder,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

/// Owned metric registry shared by the aggregators and the exposition handler.
///
/// The mapping is written once by [`MetricRegistry::initialize`] and only read
/// afterwards; collectors synchronize their own numeric state.
pub struct MetricRegistry {
    exposition: Registry,
    collectors: OnceCell<HashMap<String, Collector>>,
    initializing: AtomicBool,
    gate: InitGate,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::with_exposition(Registry::new())
    }

    /// Use an existing prometheus registry for exposition.
    pub fn with_exposition(exposition: Registry) -> Self {
        Self {
            exposition,
            collectors: OnceCell::new(),
            initializing: AtomicBool::new(false),
            gate: InitGate::new(),
        }
    }

    /// Build, map and register every spec, then open the gate.
    ///
    /// Fails fast on the first duplicate name or construction error. Nothing
    /// stays registered with the exposition registry when this returns an error.
    pub fn initialize(&self, specs: &[MetricSpec]) -> Result<()> {
        if self.initializing.swap(true, Ordering::SeqCst) {
            return Err(MetricsError::AlreadyInitialized);
        }

        let mut built: HashMap<String, Collector> = HashMap::with_capacity(specs.len());
        for spec in specs {
            if built.contains_key(&spec.name) {
                return Err(MetricsError::Configuration(format!(
                    "duplicate metric name: {}",
                    spec.name
                )));
            }
            let collector = collectors::instantiate(spec)?;
            built.insert(spec.name.clone(), collector);
        }

        let mut registered: Vec<&Collector> = Vec::with_capacity(built.len());
        for collector in built.values() {
            if let Err(err) = collector.register_into(&self.exposition) {
                for done in registered {
                    if let Err(e) = done.unregister_from(&self.exposition) {
                        warn!(metric = %done.name(), error = %e, "rollback unregister failed");
                    }
                }
                return Err(MetricsError::Configuration(format!(
                    "register metric {}: {err}",
                    collector.name()
                )));
            }
            debug!(metric = %collector.name(), kind = %collector.kind(), "metric registered");
            registered.push(collector);
        }

        let count = built.len();
        self.collectors
            .set(built)
            .map_err(|_| MetricsError::AlreadyInitialized)?;
        self.gate.open()?;
        info!(metrics = count, "metric registry initialized");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        self.gate.is_open()
    }

    /// Wait until [`MetricRegistry::initialize`] has completed.
    pub async fn ready(&self) {
        self.gate.wait().await
    }

    /// Look up a collector. Never blocks; fails with `NotInitialized` before
    /// the gate opens.
    pub fn get(&self, name: &str) -> Result<&Collector> {
        let map = self.collectors.get().ok_or(MetricsError::NotInitialized)?;
        map.get(name)
            .ok_or_else(|| MetricsError::UnknownMetric(name.to_string()))
    }

    /// Wait for initialization, then look up a collector.
    pub async fn collector(&self, name: &str) -> Result<&Collector> {
        self.ready().await;
        self.get(name)
    }

    pub fn counter(&self, name: &str) -> Result<&Counter> {
        self.get(name)?.counter()
    }

    pub fn counter_vec(&self, name: &str) -> Result<&CounterVec> {
        self.get(name)?.counter_vec()
    }

    pub fn gauge(&self, name: &str) -> Result<&Gauge> {
        self.get(name)?.gauge()
    }

    pub fn gauge_vec(&self, name: &str) -> Result<&GaugeVec> {
        self.get(name)?.gauge_vec()
    }

    pub fn histogram(&self, name: &str) -> Result<&Histogram> {
        self.get(name)?.histogram()
    }

    pub fn histogram_vec(&self, name: &str) -> Result<&HistogramVec> {
        self.get(name)?.histogram_vec()
    }

    /// Configured metric names, sorted. Empty before initialization.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self
            .collectors
            .get()
            .map(|m| m.keys().map(String::as_str).collect())
            .unwrap_or_default();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.collectors.get().map_or(0, HashMap::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register the process collector (cpu, memory, fds) for this process.
    #[cfg(target_os = "linux")]
    pub fn register_process_collector(&self) -> Result<()> {
        let collector = prometheus::process_collector::ProcessCollector::for_self();
        self.exposition
            .register(Box::new(collector))
            .map_err(|e| MetricsError::Configuration(format!("register process collector: {e}")))
    }

    #[cfg(not(target_os = "linux"))]
    pub fn register_process_collector(&self) -> Result<()> {
        warn!("process metrics are only collected on linux; skipping");
        Ok(())
    }

    pub fn exposition(&self) -> &Registry {
        &self.exposition
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.exposition.gather()
    }

    /// Render every registered collector in the prometheus text format.
    pub fn encode_text(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder.encode(&self.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| MetricsError::Encoding(format!("utf8: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collectors::MetricKind;

    fn specs() -> Vec<MetricSpec> {
        vec![
            MetricSpec::new("jobs_total", MetricKind::Counter, "jobs"),
            MetricSpec::new("queue_depth", MetricKind::Gauge, "depth").with_labels(["queue"]),
        ]
    }

    #[test]
    fn get_before_initialize_is_not_initialized() {
        let registry = MetricRegistry::new();
        assert!(matches!(
            registry.get("jobs_total"),
            Err(MetricsError::NotInitialized)
        ));
        assert!(registry.is_empty());
    }

    #[test]
    fn second_initialize_is_rejected() {
        let registry = MetricRegistry::new();
        registry.initialize(&specs()).unwrap();
        assert!(matches!(
            registry.initialize(&specs()),
            Err(MetricsError::AlreadyInitialized)
        ));
        assert_eq!(registry.names(), vec!["jobs_total", "queue_depth"]);
    }

    #[test]
    fn registration_conflict_rolls_back() {
        let shared = Registry::new();
        let taken = Gauge::new("queue_depth", "already here").unwrap();
        shared.register(Box::new(taken)).unwrap();

        let registry = MetricRegistry::with_exposition(shared);
        let err = registry.initialize(&specs()).unwrap_err();
        assert!(matches!(err, MetricsError::Configuration(_)));
        assert!(!registry.is_ready());

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|mf| mf.get_name().to_string())
            .collect();
        assert_eq!(names, vec!["queue_depth".to_string()]);
    }

    #[test]
    fn typed_access_checks_kind() {
        let registry = MetricRegistry::new();
        registry.initialize(&specs()).unwrap();
        assert!(registry.counter("jobs_total").is_ok());
        assert!(matches!(
            registry.gauge("jobs_total"),
            Err(MetricsError::KindMismatch { .. })
        ));
        assert!(matches!(
            registry.gauge("queue_depth"),
            Err(MetricsError::KindMismatch { .. })
        ));
        assert!(registry.gauge_vec("queue_depth").is_ok());
    }
}
