// Metrics service
// Wires the registry and both aggregators to the mesh event stream:
// startup builds the registry, the event loop dispatches each event to
// its aggregator on its own task
//
// Numan Thabit 2025 Nov

use crate::aggregator::{self, TopologyAggregator, TopologySummary, TraceAggregator};
use crate::collectors::MetricSpec;
use crate::errors::Result;
use crate::events::{EventEnvelope, MeshEvent};
use crate::registry::MetricRegistry;
use crate::transport::Broker;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

pub struct MetricsService {
    registry: Arc<MetricRegistry>,
    topology: TopologyAggregator,
    trace: TraceAggregator,
}

impl MetricsService {
    pub fn new(registry: Arc<MetricRegistry>, broker: Arc<dyn Broker>, timeout: Duration) -> Self {
        Self {
            topology: TopologyAggregator::new(Arc::clone(&registry), broker, timeout),
            trace: TraceAggregator::new(Arc::clone(&registry)),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Event names this service subscribes to.
    pub fn subscriptions() -> Vec<&'static str> {
        MeshEvent::ALL.iter().map(MeshEvent::name).collect()
    }

    /// Validate the configured table against what the aggregators need, then
    /// build the registry. Any error here must halt startup.
    pub fn start(&self, specs: &[MetricSpec]) -> Result<()> {
        aggregator::check_required(specs)?;
        self.registry.initialize(specs)?;
        info!(subscriptions = ?Self::subscriptions(), "metrics service started");
        Ok(())
    }

    pub async fn refresh_topology(&self) -> Result<TopologySummary> {
        self.topology.refresh().await
    }

    /// Route one event to its aggregator.
    pub async fn dispatch(&self, event: MeshEvent, payload: &Value) -> Result<()> {
        if event.is_topology() {
            self.topology.refresh().await.map(|_| ())
        } else {
            self.trace.record_payload(payload).await
        }
    }

    /// Dispatch and log; steady-state errors stay inside this event.
    pub async fn handle_event(&self, envelope: EventEnvelope) {
        let event = envelope.event;
        debug!(event = %event, "handling mesh event");
        if let Err(err) = self.dispatch(event, &envelope.payload).await {
            if err.is_fatal() {
                error!(event = %event, error = %err, "metric configuration does not match aggregator");
            } else {
                warn!(event = %event, error = %err, "event skipped");
            }
        }
    }

    /// Consume events until every sender is dropped, one task per event.
    ///
    /// May be spawned before [`MetricsService::start`]; handlers wait on the
    /// registry gate.
    pub fn spawn_event_loop(self: Arc<Self>, mut rx: mpsc::Receiver<EventEnvelope>) -> JoinHandle<()> {
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let service = Arc::clone(&self);
                tokio::spawn(async move { service.handle_event(envelope).await });
            }
            info!("event stream closed; event loop exiting");
        })
    }
}
