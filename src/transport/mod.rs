// Transport layer - request/response calls into the service mesh
// This file defines the broker seam the aggregators call through and the
// structured fan-out/gather used for multi-target cluster queries
//
// Numan Thabit 2025 Nov

pub mod http;

use crate::errors::{MetricsError, Result};
use async_trait::async_trait;
use futures::future::try_join_all;
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::Duration;

/// One named sub-query of a fan-out: target action plus its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSpec {
    pub action: String,
    pub params: Value,
}

impl CallSpec {
    pub fn new(action: impl Into<String>, params: Value) -> Self {
        Self {
            action: action.into(),
            params,
        }
    }
}

/// Request/response call primitive offered by the mesh.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Call a single action and return its raw result.
    async fn call(&self, action: &str, params: Value) -> Result<Value>;

    /// Issue every call concurrently and gather all results.
    ///
    /// Either every query yields a value or the whole gather fails; the first
    /// failing query or the timeout aborts it.
    async fn mcall(
        &self,
        calls: BTreeMap<String, CallSpec>,
        timeout: Duration,
    ) -> Result<BTreeMap<String, Value>> {
        fan_out(self, calls, timeout).await
    }
}

/// Concurrent gather over `calls`, bounded by `timeout`.
pub async fn fan_out<B>(
    broker: &B,
    calls: BTreeMap<String, CallSpec>,
    timeout: Duration,
) -> Result<BTreeMap<String, Value>>
where
    B: Broker + ?Sized,
{
    let pending = calls.into_iter().map(|(query, spec)| async move {
        match broker.call(&spec.action, spec.params).await {
            Ok(value) => Ok((query, value)),
            Err(err) => Err(MetricsError::FanOutFailure {
                query,
                reason: err.to_string(),
            }),
        }
    });

    let gathered = tokio::time::timeout(timeout, try_join_all(pending))
        .await
        .map_err(|_| MetricsError::FanOutTimeout(timeout))??;

    Ok(gathered.into_iter().collect())
}
