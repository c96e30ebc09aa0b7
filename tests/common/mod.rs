#![allow(dead_code)]

use async_trait::async_trait;
use mesh_metrics::config::default_metric_specs;
use mesh_metrics::errors::{MetricsError, Result};
use mesh_metrics::registry::MetricRegistry;
use mesh_metrics::transport::Broker;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// In-process broker answering each action with a canned result.
#[derive(Default)]
pub struct MockBroker {
    responses: Mutex<HashMap<String, Value>>,
    failing: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockBroker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, action: &str, result: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(action.to_string(), result);
    }

    pub fn fail(&self, action: &str) {
        self.failing.lock().unwrap().insert(action.to_string());
    }

    pub fn delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Broker for MockBroker {
    async fn call(&self, action: &str, _params: Value) -> Result<Value> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.failing.lock().unwrap().contains(action) {
            return Err(MetricsError::Transport(format!("{action} unavailable")));
        }
        self.responses
            .lock()
            .unwrap()
            .get(action)
            .cloned()
            .ok_or_else(|| MetricsError::Transport(format!("no handler for {action}")))
    }
}

/// Two nodes, one service with three endpoints, no actions, one event with
/// two subscribers.
pub fn small_cluster() -> Arc<MockBroker> {
    let broker = MockBroker::new();
    broker.respond(
        "$node.list",
        json!([
            { "id": "N1", "available": true,
              "client": { "type": "go", "version": "1.0.0", "langVersion": "1.21" } },
            { "id": "N2", "available": false,
              "client": { "type": "nodejs", "version": "0.14.0", "langVersion": "v18" } }
        ]),
    );
    broker.respond(
        "$node.services",
        json!([
            { "name": "music", "version": "2", "endpoints": [{ "nodeID": "N1" }, { "nodeID": "N2" }, { "nodeID": "N3" }] }
        ]),
    );
    broker.respond("$node.actions", json!([]));
    broker.respond(
        "$node.events",
        json!([
            { "name": "song.played", "group": "music", "endpoints": [{ "nodeID": "N1" }, { "nodeID": "N2" }] }
        ]),
    );
    Arc::new(broker)
}

/// Registry built from the default metric table.
pub fn default_registry() -> Arc<MetricRegistry> {
    let registry = MetricRegistry::new();
    registry
        .initialize(&default_metric_specs().unwrap())
        .unwrap();
    Arc::new(registry)
}

pub fn labels<'a>(pairs: &[(&'a str, &'a str)]) -> HashMap<&'a str, &'a str> {
    pairs.iter().copied().collect()
}

pub fn gauge_value(registry: &MetricRegistry, name: &str, pairs: &[(&str, &str)]) -> f64 {
    registry
        .gauge_vec(name)
        .unwrap()
        .get_metric_with(&labels(pairs))
        .unwrap()
        .get()
}

pub fn counter_value(registry: &MetricRegistry, name: &str, pairs: &[(&str, &str)]) -> f64 {
    registry
        .counter_vec(name)
        .unwrap()
        .get_metric_with(&labels(pairs))
        .unwrap()
        .get()
}
