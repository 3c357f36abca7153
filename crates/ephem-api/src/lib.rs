//! Axum HTTP API server.
//!
//! This crate provides:
//! - Multipart image ingestion with derivative generation
//! - Asset registry, on-demand resize and deletion endpoints
//! - Post deletion and lifecycle administration
//! - Prometheus metrics and security headers

pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod services;
pub mod state;

pub use config::{ApiConfig, StoreBackend};
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use services::AssetIngestor;
pub use state::AppState;
