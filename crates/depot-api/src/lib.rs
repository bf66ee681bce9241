//! # depot-api — Axum API Services for the Depot Custody Service
//!
//! HTTP surface over the custody services in `depot-custody`: equipment
//! deployments to field tellers, asset registration with QR identity
//! tokens, scan-based returns, dashboards, bulk operations and exports.
//!
//! ## API Surface
//!
//! | Prefix                          | Module                    | Domain            |
//! |---------------------------------|---------------------------|-------------------|
//! | `/v1/deployments`, `/{id}/*`    | [`routes::deployments`]   | Lifecycle         |
//! | `/v1/deployments/bulk-*`        | [`routes::deployments`]   | Bulk operations   |
//! | `/v1/deployments/{id}/assets/*` | [`routes::assets`]        | Assets & QR       |
//! | `/v1/deployments/assets/scan`   | [`routes::assets`]        | Scan returns      |
//! | `/openapi.json`                 | [`openapi`]               | API document      |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AuthMiddleware → Handler
//! ```
//!
//! Health checks and `/metrics` sit outside the stack and need no credentials.

pub mod auth;
pub mod db;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod openapi;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::AuthConfig;
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let auth_config = AuthConfig {
        token: state.config.auth_token.clone(),
    };
    let prometheus = state.metrics.clone();

    // Authenticated API routes.
    let api = Router::new()
        .merge(routes::deployments::router())
        .merge(routes::assets::router())
        .merge(openapi::router())
        .layer(from_fn(auth::auth_middleware))
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(auth_config))
        .with_state(state);

    // Unauthenticated health checks.
    let mut open = Router::new()
        .route("/health/liveness", get(liveness))
        .route("/health/readiness", get(readiness));

    // Prometheus scrape endpoint, only when a recorder is installed.
    if let Some(handle) = prometheus {
        open = open.route(
            "/metrics",
            get(move || {
                let handle = handle.clone();
                async move { handle.render() }
            }),
        );
    }

    Router::new().merge(open).merge(api)
}

/// Liveness check: always returns 200 if the process is running.
async fn liveness() -> &'static str {
    "ok"
}

/// Readiness check: returns 200 when the application is ready to serve.
async fn readiness() -> &'static str {
    "ready"
}
