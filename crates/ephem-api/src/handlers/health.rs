//! Health and readiness checks.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use serde::Serialize;

use crate::state::AppState;

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub timestamp: String,
}

/// Liveness check.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now().to_rfc3339(),
    })
}

/// Readiness check response.
#[derive(Serialize)]
pub struct ReadinessResponse {
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Serialize)]
pub struct ReadinessChecks {
    pub storage: CheckStatus,
    pub store: CheckStatus,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckStatus {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            error: None,
        }
    }

    fn failed(e: impl ToString) -> Self {
        Self {
            status: "failed".to_string(),
            error: Some(e.to_string()),
        }
    }
}

/// Readiness check: storage root reachable, metadata store answering.
pub async fn ready(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let storage = match tokio::fs::metadata(state.disk.root()).await {
        Ok(_) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(e),
    };
    let store = match state
        .posts
        .count_by_state(ephem_models::PostState::Active)
        .await
    {
        Ok(_) => CheckStatus::ok(),
        Err(e) => CheckStatus::failed(e),
    };

    let all_ok = storage.error.is_none() && store.error.is_none();
    let status = if all_ok { "ready" } else { "not_ready" };
    let code = if all_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(ReadinessResponse {
            status: status.to_string(),
            checks: ReadinessChecks { storage, store },
        }),
    )
}
