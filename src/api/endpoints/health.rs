//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub active_workers: usize,
    pub tracked_fall_states: usize,
}

/// `GET /api/health`: liveness plus a few engine gauges.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    // Store reachability
    ctx.core.db.lock()?.query_row("SELECT 1", [], |_| Ok(()))?;

    Ok(Json(HealthResponse {
        status: "ok",
        version: crate::config::APP_VERSION,
        uptime_secs: ctx.core.uptime_secs(),
        active_workers: ctx.core.router.active_workers(),
        tracked_fall_states: ctx.core.coordinator.tracked_fall_states(),
    }))
}
