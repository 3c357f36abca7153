//! Prometheus metrics for the API server.

use axum::body::Body;
use axum::http::{Request, Response};
use axum::middleware::Next;
use metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Instant;

/// Initialize the Prometheus metrics recorder.
/// Returns a handle that can be used to render metrics.
pub fn init_metrics() -> PrometheusHandle {
    PrometheusBuilder::new()
        .install_recorder()
        .expect("Failed to install Prometheus recorder")
}

/// Metric names as constants for consistency.
pub mod names {
    // HTTP metrics
    pub const HTTP_REQUESTS_TOTAL: &str = "ephem_http_requests_total";
    pub const HTTP_REQUEST_DURATION_SECONDS: &str = "ephem_http_request_duration_seconds";
    pub const HTTP_REQUESTS_IN_FLIGHT: &str = "ephem_http_requests_in_flight";

    // Ingestion metrics
    pub const ASSETS_INGESTED_TOTAL: &str = "ephem_assets_ingested_total";
    pub const ASSETS_REJECTED_TOTAL: &str = "ephem_assets_rejected_total";
    pub const INGEST_DURATION_SECONDS: &str = "ephem_ingest_duration_seconds";
    pub const TRANSIENT_RESIZES_TOTAL: &str = "ephem_transient_resizes_total";
}

/// Record an HTTP request.
pub fn record_http_request(method: &str, path: &str, status: u16, duration_secs: f64) {
    let labels = [
        ("method", method.to_string()),
        ("path", sanitize_path(path)),
        ("status", status.to_string()),
    ];

    counter!(names::HTTP_REQUESTS_TOTAL, &labels).increment(1);
    histogram!(names::HTTP_REQUEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a successful ingestion.
pub fn record_asset_ingested(format: &str, duration_secs: f64) {
    let labels = [("format", format.to_string())];
    counter!(names::ASSETS_INGESTED_TOTAL, &labels).increment(1);
    histogram!(names::INGEST_DURATION_SECONDS, &labels).record(duration_secs);
}

/// Record a rejected upload.
pub fn record_asset_rejected(reason: &str) {
    let labels = [("reason", reason.to_string())];
    counter!(names::ASSETS_REJECTED_TOTAL, &labels).increment(1);
}

/// Record an on-demand resize.
pub fn record_transient_resize() {
    counter!(names::TRANSIENT_RESIZES_TOTAL).increment(1);
}

/// Sanitize path for metrics labels (remove IDs, etc.).
fn sanitize_path(path: &str) -> String {
    let path = regex_lite::Regex::new(r"/assets/[a-zA-Z0-9_-]+")
        .unwrap()
        .replace_all(path, "/assets/:asset_id");
    let path = regex_lite::Regex::new(r"/posts/[a-zA-Z0-9_-]+")
        .unwrap()
        .replace_all(&path, "/posts/:post_id");
    // Anything else that looks like a UUID
    let path = regex_lite::Regex::new(
        r"[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}",
    )
    .unwrap()
    .replace_all(&path, ":id");
    path.to_string()
}

/// Metrics middleware for HTTP requests.
pub async fn metrics_middleware(request: Request<Body>, next: Next) -> Response<Body> {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let start = Instant::now();

    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).increment(1.0);
    let response = next.run(request).await;
    gauge!(names::HTTP_REQUESTS_IN_FLIGHT).decrement(1.0);

    let status = response.status().as_u16();
    let duration = start.elapsed().as_secs_f64();
    record_http_request(&method, &path, status, duration);

    response
}
