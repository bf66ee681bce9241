//! # depot-api — Binary Entry Point
//!
//! Starts the Axum HTTP server for the depot custody API. Configuration
//! comes from flags with environment fallbacks.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::EnvFilter;

use depot_api::state::{AppConfig, AppState, LogFormat};
use depot_core::Timestamp;

/// Depot custody API server.
#[derive(Debug, Parser)]
#[command(name = "depot-api", version, about)]
struct Args {
    /// Port to bind the HTTP server to.
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,

    /// Shared bearer secret. Authentication is disabled when unset.
    #[arg(long, env = "AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Postgres URL for write-through persistence. In-memory only when unset.
    #[arg(long, env = "DATABASE_URL", hide_env_values = true)]
    database_url: Option<String>,

    /// Seconds between overdue sweeps. Zero disables the sweep.
    #[arg(long, env = "OVERDUE_SWEEP_SECS", default_value_t = 300)]
    overdue_sweep_secs: u64,

    /// Log output format.
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    match format {
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.log_format);

    let prometheus = PrometheusBuilder::new()
        .install_recorder()
        .context("failed to install Prometheus recorder")?;

    let config = AppConfig {
        port: args.port,
        auth_token: args.auth_token.filter(|t| !t.is_empty()),
        log_format: args.log_format,
    };
    if config.auth_token.is_none() {
        tracing::warn!("AUTH_TOKEN not set, authentication disabled; every request runs as admin");
    }
    tracing::info!(config = ?config, "configuration loaded");

    let db_pool = depot_api::db::init_pool(args.database_url.as_deref())
        .await
        .context("database initialization failed")?;

    let state = AppState::with_config(config, db_pool).with_metrics(prometheus);
    state
        .hydrate_from_db()
        .await
        .context("database hydration failed")?;

    if args.overdue_sweep_secs > 0 {
        let deployments = state.custody.deployments.clone();
        let period = Duration::from_secs(args.overdue_sweep_secs);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            loop {
                interval.tick().await;
                let flagged = deployments.flag_overdue(Timestamp::now());
                if !flagged.is_empty() {
                    tracing::info!(count = flagged.len(), "overdue sweep flagged deployments");
                }
            }
        });
    }

    let app = depot_api::app(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], args.port));
    tracing::info!("depot API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}
