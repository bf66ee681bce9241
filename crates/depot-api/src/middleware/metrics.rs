//! # Request Metrics
//!
//! Counts requests and client/server errors through the `metrics` facade.
//! The binary installs a Prometheus recorder and serves it at `/metrics`;
//! without a recorder the counters are no-ops.

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Middleware that increments request and error counters.
pub async fn metrics_middleware(request: Request, next: Next) -> Response {
    let method = request.method().to_string();

    let response = next.run(request).await;

    let status = response.status();
    ::metrics::counter!(
        "depot_http_requests_total",
        "method" => method.clone(),
        "status" => status.as_u16().to_string()
    )
    .increment(1);
    if status.is_server_error() || status.is_client_error() {
        ::metrics::counter!("depot_http_errors_total", "method" => method).increment(1);
    }

    response
}
