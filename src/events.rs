// Mesh events consumed by the collector
// This file maps event-bus names to the aggregator that handles them
//
// Numan Thabit 2025 Nov

use serde_json::Value;
use std::fmt;

pub const NODE_CONNECTED: &str = "$node.connected";
pub const NODE_DISCONNECTED: &str = "$node.disconnected";
pub const SERVICE_ADDED: &str = "$registry.service.added";
pub const SERVICE_REMOVED: &str = "$registry.service.removed";
pub const TRACE_SPAN_FINISHED: &str = "metrics.trace.span.finish";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshEvent {
    NodeConnected,
    NodeDisconnected,
    ServiceAdded,
    ServiceRemoved,
    TraceSpanFinished,
}

impl MeshEvent {
    pub const ALL: [MeshEvent; 5] = [
        MeshEvent::NodeConnected,
        MeshEvent::NodeDisconnected,
        MeshEvent::ServiceAdded,
        MeshEvent::ServiceRemoved,
        MeshEvent::TraceSpanFinished,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            NODE_CONNECTED => Some(MeshEvent::NodeConnected),
            NODE_DISCONNECTED => Some(MeshEvent::NodeDisconnected),
            SERVICE_ADDED => Some(MeshEvent::ServiceAdded),
            SERVICE_REMOVED => Some(MeshEvent::ServiceRemoved),
            TRACE_SPAN_FINISHED => Some(MeshEvent::TraceSpanFinished),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            MeshEvent::NodeConnected => NODE_CONNECTED,
            MeshEvent::NodeDisconnected => NODE_DISCONNECTED,
            MeshEvent::ServiceAdded => SERVICE_ADDED,
            MeshEvent::ServiceRemoved => SERVICE_REMOVED,
            MeshEvent::TraceSpanFinished => TRACE_SPAN_FINISHED,
        }
    }

    /// Topology events carry no payload the collector reads; only their
    /// occurrence triggers a resync.
    pub fn is_topology(&self) -> bool {
        !matches!(self, MeshEvent::TraceSpanFinished)
    }
}

impl fmt::Display for MeshEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// An event delivered by the bus, queued for the event loop.
#[derive(Debug, Clone, PartialEq)]
pub struct EventEnvelope {
    pub event: MeshEvent,
    pub payload: Value,
}

impl EventEnvelope {
    pub fn new(event: MeshEvent, payload: Value) -> Self {
        Self { event, payload }
    }
}
