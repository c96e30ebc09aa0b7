// Error types and error handling module
// This file defines the error taxonomy shared by the registry, the collector
// factory, the aggregators and the broker transport
//
// Numan Thabit 2025 Nov

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("unknown metric: {0}")]
    UnknownMetric(String),
    #[error("metric {name} is not a {expected}")]
    KindMismatch { name: String, expected: &'static str },
    #[error("metric registry already initialized")]
    AlreadyInitialized,
    #[error("metric registry not initialized")]
    NotInitialized,
    #[error("fan-out timed out after {0:?}")]
    FanOutTimeout(Duration),
    #[error("fan-out query {query} failed: {reason}")]
    FanOutFailure { query: String, reason: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("gateway answered http {0}")]
    Status(u16),
    #[error("encoding error: {0}")]
    Encoding(String),
    #[error("malformed payload: {0}")]
    MalformedPayload(String),
    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),
}

impl MetricsError {
    /// Startup-time errors that must halt the process.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            MetricsError::Configuration(_)
                | MetricsError::UnknownMetric(_)
                | MetricsError::KindMismatch { .. }
        )
    }
}

pub type Result<T, E = MetricsError> = std::result::Result<T, E>;
