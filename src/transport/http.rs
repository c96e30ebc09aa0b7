// HTTP broker implementation
// Calls mesh actions through an HTTP API gateway: params are POSTed as JSON
// to <base>/<action> and the JSON response body is the action result
//
// Numan Thabit 2025 Nov

use super::Broker;
use crate::errors::{MetricsError, Result};
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoff};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

#[derive(Debug, Clone)]
pub struct HttpBroker {
    http: Client,
    base: Url,
    retry_window: Duration,
}

impl HttpBroker {
    /// `timeout` bounds each HTTP request and the retry window for
    /// connection failures.
    pub fn new(base: Url, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .build()
            .map_err(|e| MetricsError::Transport(format!("build http client: {e}")))?;
        Ok(Self {
            http,
            base: with_trailing_slash(base),
            retry_window: timeout,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.base
    }

    fn action_url(&self, action: &str) -> Result<Url> {
        self.base
            .join(action.trim_start_matches('/'))
            .map_err(|e| MetricsError::Transport(format!("action url for {action}: {e}")))
    }

    async fn post_once(&self, url: &Url, params: &Value) -> Result<Value, backoff::Error<MetricsError>> {
        let resp = self
            .http
            .post(url.clone())
            .json(params)
            .send()
            .await
            .map_err(|e| {
                let err = MetricsError::Transport(format!("http send: {e}"));
                if e.is_connect() {
                    backoff::Error::transient(err)
                } else {
                    backoff::Error::permanent(err)
                }
            })?;

        let status = resp.status();
        if !status.is_success() {
            return Err(backoff::Error::permanent(MetricsError::Status(
                status.as_u16(),
            )));
        }

        resp.json::<Value>()
            .await
            .map_err(|e| backoff::Error::permanent(MetricsError::Transport(format!("json parse: {e}"))))
    }
}

#[async_trait]
impl Broker for HttpBroker {
    async fn call(&self, action: &str, params: Value) -> Result<Value> {
        let url = self.action_url(action)?;
        debug!(action = %action, url = %url, "calling mesh action");

        let backoff = ExponentialBackoff {
            initial_interval: Duration::from_millis(50),
            max_interval: Duration::from_secs(1),
            max_elapsed_time: Some(self.retry_window),
            multiplier: 2.0,
            ..Default::default()
        };

        retry(backoff, || self.post_once(&url, &params)).await
    }
}

fn with_trailing_slash(mut url: Url) -> Url {
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_resolve_under_base_path() {
        let broker = HttpBroker::new(
            Url::parse("http://gateway:3000/api").unwrap(),
            Duration::from_secs(1),
        )
        .unwrap();
        assert_eq!(broker.endpoint().as_str(), "http://gateway:3000/api/");
        assert_eq!(
            broker.action_url("$node.list").unwrap().as_str(),
            "http://gateway:3000/api/$node.list"
        );
        assert_eq!(
            broker.action_url("/music.start").unwrap().as_str(),
            "http://gateway:3000/api/music.start"
        );
    }
}
