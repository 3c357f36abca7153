//! Lifecycle admin handlers.

use axum::extract::State;
use axum::Json;

use ephem_models::{LifecycleStats, SweepReport};

use crate::error::ApiResult;
use crate::state::AppState;

/// Run one sweep pass immediately.
pub async fn sweep_now(State(state): State<AppState>) -> ApiResult<Json<SweepReport>> {
    let report = state.sweeper.sweep().await?;
    Ok(Json(report))
}

/// Point-in-time lifecycle statistics.
pub async fn lifecycle_stats(State(state): State<AppState>) -> ApiResult<Json<LifecycleStats>> {
    let stats = state.sweeper.stats().await?;
    Ok(Json(stats))
}
