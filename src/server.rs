// HTTP server
// Serves the prometheus exposition endpoint for scrapers, a readiness
// probe, and an ingest route that queues mesh events for the event loop
//
// Numan Thabit 2025 Nov

use crate::events::{EventEnvelope, MeshEvent};
use crate::registry::MetricRegistry;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router as AxumRouter,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct ServerState {
    pub registry: Arc<MetricRegistry>,
    pub events: mpsc::Sender<EventEnvelope>,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct AcceptedResponse {
    pub event: &'static str,
}

/// Build the router; `endpoint` is the exposition path, e.g. `/metrics`.
pub fn create_router(endpoint: &str, state: ServerState) -> AxumRouter {
    AxumRouter::new()
        .route(endpoint, get(exposition))
        .route("/health", get(health_check))
        .route("/events/:name", post(ingest_event))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (status, Json(ErrorResponse { error: error.into() })).into_response()
}

async fn exposition(State(state): State<ServerState>) -> Response {
    match state.registry.encode_text() {
        Ok(body) => (
            [(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)],
            body,
        )
            .into_response(),
        Err(err) => {
            warn!(error = %err, "metric exposition failed");
            error_response(StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

/// 200 once the registry is built, 503 before.
async fn health_check(State(state): State<ServerState>) -> StatusCode {
    if state.registry.is_ready() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn ingest_event(
    State(state): State<ServerState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Response {
    let Some(event) = MeshEvent::from_name(&name) else {
        return error_response(StatusCode::NOT_FOUND, format!("unknown event: {name}"));
    };

    let payload = if body.is_empty() {
        Value::Null
    } else {
        match serde_json::from_slice::<Value>(&body) {
            Ok(value) => value,
            Err(err) => {
                return error_response(StatusCode::BAD_REQUEST, format!("invalid json: {err}"))
            }
        }
    };

    if state
        .events
        .send(EventEnvelope::new(event, payload))
        .await
        .is_err()
    {
        return error_response(StatusCode::SERVICE_UNAVAILABLE, "event loop stopped");
    }

    debug!(event = %event, "event queued");
    (
        StatusCode::ACCEPTED,
        Json(AcceptedResponse {
            event: event.name(),
        }),
    )
        .into_response()
}
