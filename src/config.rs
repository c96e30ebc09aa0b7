// Configuration management module
// This file handles loading and parsing of configuration settings
// from the built-in defaults, an optional config file and environment variables
//
// Numan Thabit 2025 Nov

use crate::collectors::MetricSpec;
use crate::errors::{MetricsError, Result};
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use url::Url;

/// Built-in defaults, including the full default metric set.
pub const DEFAULT_CONFIG: &str = include_str!("../config/default.yaml");

/// Environment variable naming an optional YAML override file.
pub const CONFIG_PATH_ENV: &str = "MESH_METRICS_CONFIG";

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// HTTP listen port for the exposition endpoint
    #[serde(default = "default_port")]
    pub port: u16,
    /// URL path the exposition endpoint is served on
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Register the process collector alongside the configured metrics
    #[serde(default = "default_collect_default_metrics")]
    pub collect_default_metrics: bool,
    /// Upper bound for one topology fan-out, in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    /// Gateway used for cluster introspection calls, e.g. http://gateway:3000/api/
    #[serde(default = "default_broker_url")]
    pub broker_url: Url,
    /// Capacity of the event ingestion channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
    /// Metric name -> declarative parameters. Read with `serde_yaml` rather
    /// than through `config`, which folds key case.
    #[serde(skip)]
    pub metrics: BTreeMap<String, MetricParams>,
}

#[derive(Deserialize)]
struct MetricsDocument {
    #[serde(default)]
    metrics: Option<BTreeMap<String, MetricParams>>,
}

/// Declarative description of one metric, as written in configuration.
/// The kind string is resolved once by [`MetricSpec::from_params`].
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MetricParams {
    #[serde(default, alias = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
    #[serde(default, alias = "labelNames")]
    pub label_names: Vec<String>,
    #[serde(default)]
    pub buckets: Option<Vec<f64>>,
}

impl MetricParams {
    pub fn new(kind: impl Into<String>, help: impl Into<String>) -> Self {
        Self {
            kind: Some(kind.into()),
            help: Some(help.into()),
            ..Default::default()
        }
    }

    pub fn with_labels<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.label_names = labels.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_buckets(mut self, buckets: Vec<f64>) -> Self {
        self.buckets = Some(buckets);
        self
    }
}

impl AppConfig {
    /// Load defaults, then the optional file named by `MESH_METRICS_CONFIG`,
    /// then `MESH_*` environment variables.
    ///
    /// Metrics named in the file replace the built-in entry of the same name.
    pub fn load() -> Result<Self> {
        let mut builder = Self::defaults_builder();
        let mut metrics = metrics_table(DEFAULT_CONFIG, "built-in defaults")?.unwrap_or_default();
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
            let text = std::fs::read_to_string(&path)
                .map_err(|e| MetricsError::Configuration(format!("read {path}: {e}")))?;
            if let Some(overrides) = metrics_table(&text, &path)? {
                metrics.extend(overrides);
            }
            builder = builder.add_source(File::from_str(&text, FileFormat::Yaml));
        }
        builder = builder.add_source(
            Environment::with_prefix("MESH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );
        Self::finish(builder, metrics)
    }

    /// Built-in defaults only.
    pub fn embedded() -> Result<Self> {
        let metrics = metrics_table(DEFAULT_CONFIG, "built-in defaults")?.unwrap_or_default();
        Self::finish(Self::defaults_builder(), metrics)
    }

    /// Parse a standalone YAML document. Scalar keys fall back to their
    /// defaults; `metrics` must be present.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let metrics = metrics_table(yaml, "yaml document")?.ok_or_else(|| {
            MetricsError::Configuration("missing metrics table".to_string())
        })?;
        let builder = Config::builder().add_source(File::from_str(yaml, FileFormat::Yaml));
        Self::finish(builder, metrics)
    }

    fn defaults_builder() -> ConfigBuilder<DefaultState> {
        Config::builder().add_source(File::from_str(DEFAULT_CONFIG, FileFormat::Yaml))
    }

    fn finish(
        builder: ConfigBuilder<DefaultState>,
        metrics: BTreeMap<String, MetricParams>,
    ) -> Result<Self> {
        let cfg = builder
            .build()
            .map_err(|e| MetricsError::Configuration(format!("read configuration: {e}")))?;
        let mut parsed: Self = cfg
            .try_deserialize()
            .map_err(|e| MetricsError::Configuration(format!("invalid configuration: {e}")))?;
        parsed.metrics = metrics;
        parsed.validate()?;
        Ok(parsed)
    }

    fn validate(&self) -> Result<()> {
        if !self.endpoint.starts_with('/') {
            return Err(MetricsError::Configuration(format!(
                "endpoint must start with '/': {}",
                self.endpoint
            )));
        }
        if self.endpoint == "/health" || self.endpoint.starts_with("/events/") {
            return Err(MetricsError::Configuration(format!(
                "endpoint {} collides with a built-in route",
                self.endpoint
            )));
        }
        if self.timeout_ms == 0 {
            return Err(MetricsError::Configuration(
                "timeout_ms must be positive".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(MetricsError::Configuration(
                "event_buffer must be positive".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Resolve every configured metric into a [`MetricSpec`].
    pub fn metric_specs(&self) -> Result<Vec<MetricSpec>> {
        if self.metrics.is_empty() {
            return Err(MetricsError::Configuration(
                "no metrics configured".to_string(),
            ));
        }
        self.metrics
            .iter()
            .map(|(name, params)| MetricSpec::from_params(name, params))
            .collect()
    }
}

/// The `metrics` table of a YAML document, keys exactly as written.
fn metrics_table(yaml: &str, origin: &str) -> Result<Option<BTreeMap<String, MetricParams>>> {
    let document: MetricsDocument = serde_yaml::from_str(yaml)
        .map_err(|e| MetricsError::Configuration(format!("metrics in {origin}: {e}")))?;
    Ok(document.metrics)
}

/// The default metric set shipped with the collector.
pub fn default_metric_specs() -> Result<Vec<MetricSpec>> {
    AppConfig::embedded()?.metric_specs()
}

fn default_port() -> u16 {
    3030
}

fn default_endpoint() -> String {
    "/metrics".to_string()
}

fn default_collect_default_metrics() -> bool {
    true
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_broker_url() -> Url {
    Url::parse("http://127.0.0.1:3000/api/").expect("static broker url")
}

fn default_event_buffer() -> usize {
    1024
}
