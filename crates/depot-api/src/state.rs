//! # Application State
//!
//! Shared state handed to every handler: the custody services, the optional
//! Postgres pool and the write-through built on it, the optional Prometheus
//! handle, and the resolved configuration.

use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::PgPool;

use depot_custody::Custody;

use crate::db::{PgWriteThrough, WriteThrough};

/// Output format of the log subscriber.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Application configuration.
///
/// Custom `Debug` redacts the `auth_token` to prevent credential leakage in logs.
#[derive(Clone)]
pub struct AppConfig {
    /// Port to bind the HTTP server to.
    pub port: u16,
    /// Shared bearer secret. If `None`, authentication is disabled.
    pub auth_token: Option<String>,
    pub log_format: LogFormat,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("port", &self.port)
            .field(
                "auth_token",
                &self.auth_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("log_format", &self.log_format)
            .finish()
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            port: 8080,
            auth_token: None,
            log_format: LogFormat::Text,
        }
    }
}

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub custody: Custody,

    /// PostgreSQL pool, used for hydration. When `None`, the API runs
    /// in-memory only.
    pub db_pool: Option<PgPool>,

    /// Where handlers write committed deployments. Built on `db_pool`
    /// unless replaced with [`AppState::with_write_through`].
    pub write_through: Option<Arc<dyn WriteThrough>>,

    /// Renders the Prometheus exposition at `/metrics`. Only the binary
    /// installs a global recorder.
    pub metrics: Option<PrometheusHandle>,

    pub config: AppConfig,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("deployments", &self.custody.store.len())
            .field("db_pool", &self.db_pool.is_some())
            .field("write_through", &self.write_through.is_some())
            .field("metrics", &self.metrics.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl AppState {
    /// In-memory state with default configuration.
    pub fn new() -> Self {
        Self::with_config(AppConfig::default(), None)
    }

    pub fn with_config(config: AppConfig, db_pool: Option<PgPool>) -> Self {
        let write_through = db_pool
            .clone()
            .map(|pool| Arc::new(PgWriteThrough::new(pool)) as Arc<dyn WriteThrough>);
        Self {
            custody: Custody::default(),
            db_pool,
            write_through,
            metrics: None,
            config,
        }
    }

    /// Replace the destination of committed deployments.
    pub fn with_write_through(mut self, write_through: Arc<dyn WriteThrough>) -> Self {
        self.write_through = Some(write_through);
        self
    }

    /// Attach the handle that renders `/metrics`.
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Load every persisted deployment into the in-memory store.
    ///
    /// Called once on startup, before the server accepts requests.
    pub async fn hydrate_from_db(&self) -> Result<usize, sqlx::Error> {
        let Some(pool) = &self.db_pool else {
            return Ok(0);
        };
        let deployments = crate::db::deployments::load_all(pool).await?;
        let count = deployments.len();
        for deployment in deployments {
            self.custody
                .store
                .insert(*deployment.id.as_uuid(), deployment);
        }
        tracing::info!(deployments = count, "hydrated in-memory store from database");
        Ok(count)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_debug_redacts_token() {
        let config = AppConfig {
            auth_token: Some("super-secret".into()),
            ..Default::default()
        };
        let debug = format!("{config:?}");
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("super-secret"));
    }

    #[test]
    fn new_state_is_in_memory() {
        let state = AppState::new();
        assert!(state.db_pool.is_none());
        assert!(state.write_through.is_none());
        assert!(state.metrics.is_none());
        assert!(state.custody.store.is_empty());
    }

    #[tokio::test]
    async fn hydrate_without_pool_is_noop() {
        let state = AppState::new();
        assert_eq!(state.hydrate_from_db().await.unwrap(), 0);
    }
}
