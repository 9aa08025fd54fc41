//! Dovecot quota exporter binary

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dovecot_exporter::{
    http, metrics_registry, ExporterConfig, QuotaPoller, QuotaRegistry, RedisStore,
};
use dovecot_exporter_common::VERSION;

/// Command-line flags; each one overrides the environment
#[derive(Debug, Parser)]
#[command(name = "dovecot-exporter", version, about = "Dovecot quota exporter")]
struct Cli {
    /// Metrics path
    #[arg(long = "metrics")]
    metrics_path: Option<String>,

    /// Metrics listen address
    #[arg(long = "listen")]
    listen_addr: Option<String>,

    /// Redis address
    #[arg(long = "redis")]
    redis_addr: Option<String>,

    /// Redis database ID
    #[arg(long = "db")]
    redis_db: Option<i64>,

    /// Seconds between quota polls
    #[arg(long = "interval")]
    poll_interval_secs: Option<u64>,
}

impl Cli {
    fn apply(self, cfg: &mut ExporterConfig) {
        if let Some(path) = self.metrics_path {
            cfg.metrics_path = path;
        }
        if let Some(addr) = self.listen_addr {
            cfg.listen_addr = addr;
        }
        if let Some(addr) = self.redis_addr {
            cfg.redis_addr = addr;
        }
        if let Some(db) = self.redis_db {
            cfg.redis_db = db;
        }
        if let Some(secs) = self.poll_interval_secs {
            cfg.poll_interval_secs = secs;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let mut config = ExporterConfig::load()?;
    cli.apply(&mut config);
    config.validate()?;

    info!(version = VERSION, "Exporter starting");
    info!(config = %serde_json::to_string(&config)?, "Loaded configuration");

    let store = Arc::new(RedisStore::new(&config.redis_addr, config.redis_db)?);
    let registry = Arc::new(QuotaRegistry::new());
    let metrics = metrics_registry(registry.clone())?;

    let shutdown = CancellationToken::new();
    let poller = QuotaPoller::new(store, registry, config.poller()).start(shutdown.clone());

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    let app = http::router(metrics, &config.metrics_path);
    let server = tokio::spawn(http::serve(listener, app, shutdown.clone()));

    wait_for_signal().await?;
    info!("Exporter stopping");
    shutdown.cancel();

    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!(error = %e, "Listen error"),
        Err(e) => error!(error = %e, "Server task failed"),
    }
    poller.stopped().await?;

    Ok(())
}

#[cfg(unix)]
async fn wait_for_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res,
        _ = sigterm.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
