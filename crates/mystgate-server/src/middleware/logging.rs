//! Request logging middleware.

use std::time::Instant;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Log method, path, status and latency of every request.
pub(crate) async fn log_requests(req: Request, next: Next) -> Response {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();
    let start = Instant::now();

    let response = next.run(req).await;

    let status = response.status().as_u16();
    let latency_ms = start.elapsed().as_secs_f64() * 1000.0;

    if status >= 500 {
        tracing::error!(%method, %path, status, latency_ms, "Request failed");
    } else if status >= 400 {
        tracing::warn!(%method, %path, status, latency_ms, "Request rejected");
    } else {
        tracing::info!(%method, %path, status, latency_ms, "Request served");
    }

    response
}
