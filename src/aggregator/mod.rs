// Aggregator module - event-driven metric updates
// This file declares the metric names the aggregators write to and the
// table of collectors they require from configuration
//
// Numan Thabit 2025 Nov

pub mod topology;
pub mod trace;

pub use topology::{TopologyAggregator, TopologySnapshot, TopologySummary};
pub use trace::{TraceAggregator, TraceEvent};

use crate::collectors::{MetricKind, MetricSpec};
use crate::errors::{MetricsError, Result};

pub const NODES_TOTAL: &str = "moleculer_nodes_total";
pub const NODES: &str = "moleculer_nodes";
pub const SERVICES_TOTAL: &str = "moleculer_services_total";
pub const SERVICE_ENDPOINTS_TOTAL: &str = "moleculer_service_endpoints_total";
pub const ACTIONS_TOTAL: &str = "moleculer_actions_total";
pub const ACTION_ENDPOINTS_TOTAL: &str = "moleculer_action_endpoints_total";
pub const EVENTS_TOTAL: &str = "moleculer_events_total";
pub const EVENT_ENDPOINTS_TOTAL: &str = "moleculer_event_endpoints_total";

pub const ALL_REQ_TOTAL: &str = "moleculer_all_req_total";
pub const REQ_TOTAL: &str = "moleculer_req_total";
pub const ALL_REQ_ERRORS_TOTAL: &str = "moleculer_all_req_errors_total";
pub const REQ_ERRORS_TOTAL: &str = "moleculer_req_errors_total";
pub const ALL_REQ_DURATION_MS: &str = "moleculer_all_req_duration_ms";
pub const REQ_DURATION_MS: &str = "moleculer_req_duration_ms";

/// A collector an aggregator writes to, with the label keys it sets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Requirement {
    pub name: &'static str,
    pub kind: MetricKind,
    pub labels: &'static [&'static str],
}

const fn req(name: &'static str, kind: MetricKind, labels: &'static [&'static str]) -> Requirement {
    Requirement { name, kind, labels }
}

const BY_TARGET: &[&str] = &["action", "service", "nodeID"];

/// Every collector the topology and trace aggregators use.
pub const REQUIRED_METRICS: [Requirement; 14] = [
    req(NODES_TOTAL, MetricKind::Gauge, &[]),
    req(NODES, MetricKind::Gauge, &["nodeID", "type", "version", "langVersion"]),
    req(SERVICES_TOTAL, MetricKind::Gauge, &[]),
    req(SERVICE_ENDPOINTS_TOTAL, MetricKind::Gauge, &["service", "version"]),
    req(ACTIONS_TOTAL, MetricKind::Gauge, &[]),
    req(ACTION_ENDPOINTS_TOTAL, MetricKind::Gauge, &["action"]),
    req(EVENTS_TOTAL, MetricKind::Gauge, &[]),
    req(EVENT_ENDPOINTS_TOTAL, MetricKind::Gauge, &["event", "group"]),
    req(ALL_REQ_TOTAL, MetricKind::Counter, &[]),
    req(REQ_TOTAL, MetricKind::Counter, BY_TARGET),
    req(ALL_REQ_ERRORS_TOTAL, MetricKind::Counter, &[]),
    req(
        REQ_ERRORS_TOTAL,
        MetricKind::Counter,
        &["action", "service", "nodeID", "errorMessage"],
    ),
    req(ALL_REQ_DURATION_MS, MetricKind::Histogram, &[]),
    req(REQ_DURATION_MS, MetricKind::Histogram, BY_TARGET),
];

impl Requirement {
    /// Check a configured spec against this requirement. Label order is free.
    pub fn check(&self, spec: &MetricSpec) -> Result<()> {
        if spec.kind != self.kind {
            return Err(MetricsError::Configuration(format!(
                "metric {} must be a {}, configured as {}",
                self.name, self.kind, spec.kind
            )));
        }
        let mut configured: Vec<&str> = spec.label_names.iter().map(String::as_str).collect();
        let mut expected: Vec<&str> = self.labels.to_vec();
        configured.sort_unstable();
        expected.sort_unstable();
        if configured != expected {
            return Err(MetricsError::Configuration(format!(
                "metric {} needs labels {:?}, configured with {:?}",
                self.name, self.labels, spec.label_names
            )));
        }
        Ok(())
    }
}

/// Fail unless every required collector is configured with the right shape.
pub fn check_required(specs: &[MetricSpec]) -> Result<()> {
    for requirement in &REQUIRED_METRICS {
        let spec = specs
            .iter()
            .find(|s| s.name == requirement.name)
            .ok_or_else(|| {
                MetricsError::Configuration(format!("missing required metric {}", requirement.name))
            })?;
        requirement.check(spec)?;
    }
    Ok(())
}
