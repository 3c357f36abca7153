//! API routes.

use axum::extract::DefaultBodyLimit;
use axum::middleware;
use axum::routing::{delete, get, post};
use axum::Router;
use metrics_exporter_prometheus::PrometheusHandle;
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::assets::{delete_asset, get_asset, resize_asset, upload_asset};
use crate::handlers::lifecycle::{lifecycle_stats, sweep_now};
use crate::handlers::posts::delete_post;
use crate::handlers::{health, ready};
use crate::metrics::metrics_middleware;
use crate::middleware::{cors_layer, request_id, request_logging, security_headers};
use crate::state::AppState;

/// Create the API router.
pub fn create_router(state: AppState, metrics_handle: Option<PrometheusHandle>) -> Router {
    let asset_routes = Router::new()
        .route("/assets", post(upload_asset))
        .route("/assets/:asset_id", get(get_asset))
        .route("/assets/:asset_id", delete(delete_asset))
        .route("/assets/:asset_id/resize", get(resize_asset));

    let post_routes = Router::new().route("/posts/:post_id", delete(delete_post));

    let lifecycle_routes = Router::new()
        .route("/lifecycle/sweep", post(sweep_now))
        .route("/lifecycle/stats", get(lifecycle_stats));

    let api_routes = Router::new()
        .merge(asset_routes)
        .merge(post_routes)
        .merge(lifecycle_routes);

    let health_routes = Router::new()
        .route("/health", get(health))
        .route("/healthz", get(health))
        .route("/ready", get(ready));

    let metrics_routes = if let Some(handle) = metrics_handle {
        Router::new().route("/metrics", get(move || async move { handle.render() }))
    } else {
        Router::new()
    };

    Router::new()
        .nest("/api", api_routes)
        .merge(health_routes)
        .merge(metrics_routes)
        // Uploads must fit the configured envelope
        .layer(DefaultBodyLimit::max(state.config.max_body_size))
        .layer(RequestBodyLimitLayer::new(state.config.max_body_size))
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(security_headers))
        .layer(middleware::from_fn(request_id))
        .layer(middleware::from_fn(request_logging))
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}
