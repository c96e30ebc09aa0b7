// Trace aggregator
// Folds finished request spans into the request counters and duration
// histograms, partitioned by action, service and node
//
// Numan Thabit 2025 Nov

use super::{
    ALL_REQ_DURATION_MS, ALL_REQ_ERRORS_TOTAL, ALL_REQ_TOTAL, REQ_DURATION_MS, REQ_ERRORS_TOTAL,
    REQ_TOTAL,
};
use crate::errors::{MetricsError, Result};
use crate::registry::MetricRegistry;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// A finished request span.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceEvent {
    pub service: String,
    pub action: String,
    pub node_id: String,
    pub duration_ms: f64,
    /// Error message when the request failed
    pub error: Option<String>,
}

impl TraceEvent {
    pub fn new(
        service: impl Into<String>,
        action: impl Into<String>,
        node_id: impl Into<String>,
        duration_ms: f64,
    ) -> Self {
        Self {
            service: service.into(),
            action: action.into(),
            node_id: node_id.into(),
            duration_ms,
            error: None,
        }
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    /// Decode a span-finished payload.
    ///
    /// `service` and `action` may be `{ "name": .. }` objects or plain strings.
    /// An `error` key with any non-null value marks the request as failed.
    pub fn from_payload(payload: &Value) -> Result<Self> {
        let raw = RawSpan::deserialize(payload)
            .map_err(|e| MetricsError::MalformedPayload(format!("trace span: {e}")))?;

        if !raw.duration.is_finite() || raw.duration < 0.0 {
            return Err(MetricsError::MalformedPayload(format!(
                "trace span duration must be a non-negative number, got {}",
                raw.duration
            )));
        }

        Ok(Self {
            service: raw.service.into_name(),
            action: raw.action.into_name(),
            node_id: raw.node_id,
            duration_ms: raw.duration,
            error: raw.error.and_then(error_message),
        })
    }
}

#[derive(Deserialize)]
struct RawSpan {
    service: NameRef,
    action: NameRef,
    #[serde(rename = "nodeID")]
    node_id: String,
    duration: f64,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NameRef {
    Plain(String),
    Named { name: String },
}

impl NameRef {
    fn into_name(self) -> String {
        match self {
            NameRef::Plain(name) | NameRef::Named { name } => name,
        }
    }
}

/// Any non-null `error` marks a failed request. The label is its `message`
/// when that is a string, the error itself when it is a bare string, and
/// empty otherwise.
fn error_message(error: Value) -> Option<String> {
    match error {
        Value::Null => None,
        Value::String(message) => Some(message),
        Value::Object(mut fields) => match fields.remove("message") {
            Some(Value::String(message)) => Some(message),
            _ => Some(String::new()),
        },
        _ => Some(String::new()),
    }
}

pub struct TraceAggregator {
    registry: Arc<MetricRegistry>,
}

impl TraceAggregator {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    /// Decode and record one span-finished payload.
    pub async fn record_payload(&self, payload: &Value) -> Result<()> {
        let event = TraceEvent::from_payload(payload)?;
        self.record(&event).await
    }

    /// Count the request, observe its duration, and count the error if any.
    pub async fn record(&self, event: &TraceEvent) -> Result<()> {
        self.registry.ready().await;

        let all_total = self.registry.counter(ALL_REQ_TOTAL)?;
        let req_total = self.registry.counter_vec(REQ_TOTAL)?;
        let all_duration = self.registry.histogram(ALL_REQ_DURATION_MS)?;
        let req_duration = self.registry.histogram_vec(REQ_DURATION_MS)?;
        let all_errors = self.registry.counter(ALL_REQ_ERRORS_TOTAL)?;
        let req_errors = self.registry.counter_vec(REQ_ERRORS_TOTAL)?;

        let mut labels: HashMap<&str, &str> = HashMap::from([
            ("action", event.action.as_str()),
            ("service", event.service.as_str()),
            ("nodeID", event.node_id.as_str()),
        ]);

        all_total.inc();
        req_total.get_metric_with(&labels)?.inc();
        all_duration.observe(event.duration_ms);
        req_duration.get_metric_with(&labels)?.observe(event.duration_ms);

        if let Some(message) = event.error.as_deref() {
            labels.insert("errorMessage", message);
            all_errors.inc();
            req_errors.get_metric_with(&labels)?.inc();
        }

        debug!(
            action = %event.action,
            service = %event.service,
            node = %event.node_id,
            duration_ms = event.duration_ms,
            failed = event.error.is_some(),
            "trace span recorded"
        );
        Ok(())
    }
}
