mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use mesh_metrics::config::default_metric_specs;
use mesh_metrics::events::{EventEnvelope, MeshEvent};
use mesh_metrics::registry::MetricRegistry;
use mesh_metrics::server::{create_router, ServerState};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::ServiceExt;

fn state(registry: Arc<MetricRegistry>) -> (ServerState, mpsc::Receiver<EventEnvelope>) {
    let (events, rx) = mpsc::channel(8);
    (ServerState { registry, events }, rx)
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

fn post(uri: &str, body: &'static str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body))
        .unwrap()
}

#[tokio::test]
async fn exposition_serves_text_format() {
    let registry = common::default_registry();
    registry.counter("moleculer_all_req_total").unwrap().inc_by(3.0);
    let (state, _rx) = state(registry);

    let response = create_router("/metrics", state)
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        prometheus::TEXT_FORMAT
    );
    let text = body_text(response).await;
    assert!(text.contains("moleculer_all_req_total 3"), "{text}");
    assert!(text.contains("# HELP moleculer_nodes_total Moleculer nodes count"), "{text}");
}

#[tokio::test]
async fn exposition_path_follows_configuration() {
    let (state, _rx) = state(common::default_registry());
    let router = create_router("/prom", state);

    let custom = router
        .clone()
        .oneshot(Request::get("/prom").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(custom.status(), StatusCode::OK);

    let default = router
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(default.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_registry_readiness() {
    let registry = Arc::new(MetricRegistry::new());
    let (state, _rx) = state(Arc::clone(&registry));
    let router = create_router("/metrics", state);

    let before = router
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(before.status(), StatusCode::SERVICE_UNAVAILABLE);

    registry.initialize(&default_metric_specs().unwrap()).unwrap();

    let after = router
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(after.status(), StatusCode::OK);
}

#[tokio::test]
async fn known_event_is_queued() {
    let (state, mut rx) = state(common::default_registry());
    let router = create_router("/metrics", state);

    let response = router
        .clone()
        .oneshot(post(
            "/events/metrics.trace.span.finish",
            r#"{"service":{"name":"music"},"action":{"name":"start"},"nodeID":"N1","duration":12.5}"#,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(accepted, json!({ "event": "metrics.trace.span.finish" }));

    let envelope = rx.recv().await.unwrap();
    assert_eq!(envelope.event, MeshEvent::TraceSpanFinished);
    assert_eq!(envelope.payload["nodeID"], "N1");

    let response = router
        .oneshot(post("/events/$node.connected", ""))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let envelope = rx.recv().await.unwrap();
    assert_eq!(envelope.event, MeshEvent::NodeConnected);
    assert_eq!(envelope.payload, Value::Null);
}

#[tokio::test]
async fn rejected_events() {
    let (state, rx) = state(common::default_registry());
    let router = create_router("/metrics", state);

    let unknown = router
        .clone()
        .oneshot(post("/events/$node.list", "{}"))
        .await
        .unwrap();
    assert_eq!(unknown.status(), StatusCode::NOT_FOUND);

    let bad_json = router
        .clone()
        .oneshot(post("/events/metrics.trace.span.finish", "{not json"))
        .await
        .unwrap();
    assert_eq!(bad_json.status(), StatusCode::BAD_REQUEST);

    drop(rx);
    let closed = router
        .oneshot(post("/events/$node.connected", ""))
        .await
        .unwrap();
    assert_eq!(closed.status(), StatusCode::SERVICE_UNAVAILABLE);
}
