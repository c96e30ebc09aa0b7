use anyhow::{anyhow, Context, Result};
use mesh_metrics::config::AppConfig;
use mesh_metrics::events::EventEnvelope;
use mesh_metrics::registry::MetricRegistry;
use mesh_metrics::server::{create_router, ServerState};
use mesh_metrics::service::MetricsService;
use mesh_metrics::transport::http::HttpBroker;
use mesh_metrics::transport::Broker;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal metrics collector error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;
    let specs = config.metric_specs().context("resolve metric table")?;

    let broker: Arc<dyn Broker> = Arc::new(
        HttpBroker::new(config.broker_url.clone(), config.timeout())
            .context("initialize mesh gateway client")?,
    );
    let registry = Arc::new(MetricRegistry::new());
    let service = Arc::new(MetricsService::new(
        Arc::clone(&registry),
        broker,
        config.timeout(),
    ));

    // Events are accepted before the registry exists; handlers wait on its gate.
    let (events_tx, events_rx) = mpsc::channel::<EventEnvelope>(config.event_buffer);
    let _event_loop = Arc::clone(&service).spawn_event_loop(events_rx);

    service
        .start(&specs)
        .context("build metric registry from configuration")?;

    if config.collect_default_metrics {
        registry
            .register_process_collector()
            .context("register process metrics")?;
    }

    let resync = Arc::clone(&service);
    tokio::spawn(async move {
        if let Err(err) = resync.refresh_topology().await {
            warn!(error = %err, "initial topology resync failed; waiting for topology events");
        }
    });

    let app = App {
        config: Arc::new(config),
        registry,
        events: events_tx,
    };
    app.run().await
}

struct App {
    config: Arc<AppConfig>,
    registry: Arc<MetricRegistry>,
    events: mpsc::Sender<EventEnvelope>,
}

impl App {
    async fn run(self) -> Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .with_context(|| format!("bind exposition address {addr}"))?;

        let router = create_router(
            &self.config.endpoint,
            ServerState {
                registry: Arc::clone(&self.registry),
                events: self.events.clone(),
            },
        );

        info!(
            address = %addr,
            endpoint = %self.config.endpoint,
            broker = %self.config.broker_url,
            metrics = self.registry.len(),
            "metrics collector online"
        );

        let _server = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, router).await {
                warn!(error = %e, "exposition server error");
            }
        });

        let mut ticker = tokio::time::interval(Duration::from_secs(30));
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    info!(
                        metrics = self.registry.len(),
                        families = self.registry.gather().len(),
                        queued_capacity = self.events.capacity(),
                        "collector heartbeat"
                    );
                }
                res = tokio::signal::ctrl_c() => {
                    if let Err(err) = res {
                        warn!(error = %err, "ctrl_c listener error");
                    }
                    info!("Shutdown signal received, exiting");
                    break;
                }
            }
        }
        Ok(())
    }
}

fn init_tracing() -> Result<()> {
    let env_filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn,tower_http=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
