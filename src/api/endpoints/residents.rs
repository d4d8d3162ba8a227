//! Per-resident threshold profiles and deactivation.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;
use crate::models::{ThresholdProfile, ThresholdUpdate};

/// `GET /api/residents/:id/thresholds`
pub async fn get_thresholds(
    State(ctx): State<ApiContext>,
    Path(resident_id): Path<Uuid>,
) -> Result<Json<ThresholdProfile>, ApiError> {
    Ok(Json(ctx.core.coordinator.thresholds(&resident_id)?))
}

/// `PUT /api/residents/:id/thresholds`: full override, validated.
pub async fn put_thresholds(
    State(ctx): State<ApiContext>,
    Path(resident_id): Path<Uuid>,
    payload: Result<Json<ThresholdUpdate>, JsonRejection>,
) -> Result<Json<ThresholdProfile>, ApiError> {
    let Json(update) = payload?;
    let profile = ctx
        .core
        .coordinator
        .update_thresholds(&resident_id, &update, Utc::now())?;
    Ok(Json(profile))
}

/// `POST /api/residents/:id/deactivate`
pub async fn deactivate(
    State(ctx): State<ApiContext>,
    Path(resident_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    ctx.core.coordinator.deactivate_resident(&resident_id)?;
    Ok(StatusCode::NO_CONTENT)
}
