// Topology aggregator
// On any cluster topology change, queries nodes, services, actions and
// event subscriptions in one fan-out and sets the topology gauges from the
// combined snapshot
//
// Numan Thabit 2025 Nov

use super::{
    ACTIONS_TOTAL, ACTION_ENDPOINTS_TOTAL, EVENTS_TOTAL, EVENT_ENDPOINTS_TOTAL, NODES,
    NODES_TOTAL, SERVICES_TOTAL, SERVICE_ENDPOINTS_TOTAL,
};
use crate::errors::{MetricsError, Result};
use crate::registry::MetricRegistry;
use crate::transport::{Broker, CallSpec};
use prometheus::{Gauge, GaugeVec};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub const NODES_QUERY: &str = "nodes";
pub const SERVICES_QUERY: &str = "services";
pub const ACTIONS_QUERY: &str = "actions";
pub const EVENTS_QUERY: &str = "events";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ClientInfo {
    #[serde(default, rename = "type", deserialize_with = "lenient_string")]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
    #[serde(default, rename = "langVersion", deserialize_with = "lenient_string")]
    pub lang_version: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NodeRecord {
    pub id: String,
    #[serde(default)]
    pub available: bool,
    #[serde(default)]
    pub client: ClientInfo,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ServiceRecord {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub version: String,
    #[serde(default)]
    pub endpoints: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ActionRecord {
    pub name: String,
    #[serde(default)]
    pub endpoints: Vec<Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventRecord {
    pub name: String,
    #[serde(default, deserialize_with = "lenient_string")]
    pub group: String,
    #[serde(default)]
    pub endpoints: Vec<Value>,
}

/// Versions and groups arrive as strings, numbers or null depending on the node.
fn lenient_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
    })
}

/// Decoded result of one fan-out. Built completely before any gauge is touched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TopologySnapshot {
    pub nodes: Vec<NodeRecord>,
    pub services: Vec<ServiceRecord>,
    pub actions: Vec<ActionRecord>,
    pub events: Vec<EventRecord>,
}

impl TopologySnapshot {
    pub fn from_results(mut results: BTreeMap<String, Value>) -> Result<Self> {
        Ok(Self {
            nodes: take_records(&mut results, NODES_QUERY)?,
            services: take_records(&mut results, SERVICES_QUERY)?,
            actions: take_records(&mut results, ACTIONS_QUERY)?,
            events: take_records(&mut results, EVENTS_QUERY)?,
        })
    }

    pub fn summary(&self) -> TopologySummary {
        TopologySummary {
            nodes: self.nodes.len(),
            services: self.services.len(),
            actions: self.actions.len(),
            events: self.events.len(),
        }
    }
}

fn take_records<T: DeserializeOwned>(results: &mut BTreeMap<String, Value>, query: &str) -> Result<Vec<T>> {
    let value = results.remove(query).ok_or_else(|| MetricsError::FanOutFailure {
        query: query.to_string(),
        reason: "missing result".to_string(),
    })?;
    serde_json::from_value(value)
        .map_err(|e| MetricsError::MalformedPayload(format!("{query} result: {e}")))
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TopologySummary {
    pub nodes: usize,
    pub services: usize,
    pub actions: usize,
    pub events: usize,
}

/// Gauges written by one refresh, resolved before the first write.
struct TopologyGauges<'a> {
    nodes_total: &'a Gauge,
    nodes: &'a GaugeVec,
    services_total: &'a Gauge,
    service_endpoints: &'a GaugeVec,
    actions_total: &'a Gauge,
    action_endpoints: &'a GaugeVec,
    events_total: &'a Gauge,
    event_endpoints: &'a GaugeVec,
}

impl<'a> TopologyGauges<'a> {
    fn resolve(registry: &'a MetricRegistry) -> Result<Self> {
        Ok(Self {
            nodes_total: registry.gauge(NODES_TOTAL)?,
            nodes: registry.gauge_vec(NODES)?,
            services_total: registry.gauge(SERVICES_TOTAL)?,
            service_endpoints: registry.gauge_vec(SERVICE_ENDPOINTS_TOTAL)?,
            actions_total: registry.gauge(ACTIONS_TOTAL)?,
            action_endpoints: registry.gauge_vec(ACTION_ENDPOINTS_TOTAL)?,
            events_total: registry.gauge(EVENTS_TOTAL)?,
            event_endpoints: registry.gauge_vec(EVENT_ENDPOINTS_TOTAL)?,
        })
    }
}

fn set_labeled(vec: &GaugeVec, labels: &[(&str, &str)], value: f64) -> Result<()> {
    let labels: HashMap<&str, &str> = labels.iter().copied().collect();
    vec.get_metric_with(&labels)?.set(value);
    Ok(())
}

/// Full-resync topology aggregator.
pub struct TopologyAggregator {
    registry: Arc<MetricRegistry>,
    broker: Arc<dyn Broker>,
    timeout: Duration,
    update_lock: Mutex<()>,
}

impl TopologyAggregator {
    pub fn new(registry: Arc<MetricRegistry>, broker: Arc<dyn Broker>, timeout: Duration) -> Self {
        Self {
            registry,
            broker,
            timeout,
            update_lock: Mutex::new(()),
        }
    }

    /// The four introspection queries issued by every refresh.
    pub fn queries() -> BTreeMap<String, CallSpec> {
        BTreeMap::from([
            (
                NODES_QUERY.to_string(),
                CallSpec::new(
                    "$node.list",
                    json!({ "withServices": false, "onlyAvailable": true }),
                ),
            ),
            (
                SERVICES_QUERY.to_string(),
                CallSpec::new(
                    "$node.services",
                    json!({ "withActions": false, "withEndpoints": true, "skipInternal": true }),
                ),
            ),
            (
                ACTIONS_QUERY.to_string(),
                CallSpec::new(
                    "$node.actions",
                    json!({ "withEndpoints": true, "skipInternal": true, "onlyAvailable": true }),
                ),
            ),
            (
                EVENTS_QUERY.to_string(),
                CallSpec::new(
                    "$node.events",
                    json!({ "withEndpoints": true, "skipInternal": true, "onlyAvailable": true }),
                ),
            ),
        ])
    }

    /// Query the cluster and set every topology gauge from the result.
    ///
    /// Waits for the registry first. A failed or timed out gather leaves all
    /// gauges at their previous values.
    #[tracing::instrument(skip_all)]
    pub async fn refresh(&self) -> Result<TopologySummary> {
        if !self.registry.is_ready() {
            debug!("metrics not created yet; waiting for registry initialization");
            self.registry.ready().await;
        }

        let _guard = self.update_lock.lock().await;

        let results = self.broker.mcall(Self::queries(), self.timeout).await?;
        let snapshot = TopologySnapshot::from_results(results)?;
        let summary = self.apply(&snapshot)?;

        info!(
            nodes = summary.nodes,
            services = summary.services,
            actions = summary.actions,
            events = summary.events,
            "topology gauges refreshed"
        );
        Ok(summary)
    }

    /// Set the gauges from a decoded snapshot. Caller holds the update lock.
    fn apply(&self, snapshot: &TopologySnapshot) -> Result<TopologySummary> {
        let gauges = TopologyGauges::resolve(&self.registry)?;
        let summary = snapshot.summary();

        gauges.nodes_total.set(summary.nodes as f64);
        for node in &snapshot.nodes {
            let value = if node.available { 1.0 } else { 0.0 };
            set_labeled(
                gauges.nodes,
                &[
                    ("nodeID", node.id.as_str()),
                    ("type", node.client.kind.as_str()),
                    ("version", node.client.version.as_str()),
                    ("langVersion", node.client.lang_version.as_str()),
                ],
                value,
            )?;
        }

        gauges.services_total.set(summary.services as f64);
        for service in &snapshot.services {
            set_labeled(
                gauges.service_endpoints,
                &[
                    ("service", service.name.as_str()),
                    ("version", service.version.as_str()),
                ],
                service.endpoints.len() as f64,
            )?;
        }

        gauges.actions_total.set(summary.actions as f64);
        for action in &snapshot.actions {
            set_labeled(
                gauges.action_endpoints,
                &[("action", action.name.as_str())],
                action.endpoints.len() as f64,
            )?;
        }

        gauges.events_total.set(summary.events as f64);
        for event in &snapshot.events {
            set_labeled(
                gauges.event_endpoints,
                &[("event", event.name.as_str()), ("group", event.group.as_str())],
                event.endpoints.len() as f64,
            )?;
        }

        Ok(summary)
    }
}
