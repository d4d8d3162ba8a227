//! Alert queries and staff actions.
//!
//! The listing is the pull-based reconciliation path for clients that
//! missed WebSocket events.

use std::str::FromStr;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::{
    AcknowledgeRequest, AlertDetail, AlertList, AlertListQuery, ApiContext, ResolveRequest,
    DEFAULT_ALERT_LIMIT, MAX_ALERT_LIMIT,
};
use crate::db;
use crate::models::{Alert, AlertStatus};
use crate::monitoring::{AlertAction, AlertMetrics};

/// `GET /api/facilities/:id/alerts?status=&limit=`
pub async fn list(
    State(ctx): State<ApiContext>,
    Path(facility_id): Path<Uuid>,
    Query(query): Query<AlertListQuery>,
) -> Result<Json<AlertList>, ApiError> {
    let status = query
        .status
        .as_deref()
        .map(AlertStatus::from_str)
        .transpose()
        .map_err(|_| ApiError::BadRequest("Unknown alert status".into()))?;
    let limit = query.limit.unwrap_or(DEFAULT_ALERT_LIMIT).clamp(1, MAX_ALERT_LIMIT);

    let alerts = {
        let conn = ctx.core.db.lock()?;
        db::list_facility_alerts(&conn, &facility_id, status, limit)?
    };
    Ok(Json(AlertList {
        facility_id,
        alerts,
    }))
}

/// `GET /api/alerts/:id`
pub async fn detail(
    State(ctx): State<ApiContext>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<AlertDetail>, ApiError> {
    let alert = {
        let conn = ctx.core.db.lock()?;
        db::get_alert(&conn, &alert_id)?
    }
    .ok_or_else(|| ApiError::NotFound(format!("Alert {alert_id} not found")))?;

    let metrics = AlertMetrics::of(&alert);
    Ok(Json(AlertDetail { alert, metrics }))
}

/// `POST /api/alerts/:id/acknowledge`: `{ "userId": "..." }`
pub async fn acknowledge(
    State(ctx): State<ApiContext>,
    Path(alert_id): Path<Uuid>,
    payload: Result<Json<AcknowledgeRequest>, JsonRejection>,
) -> Result<Json<Alert>, ApiError> {
    let Json(req) = payload?;
    let by = required_user(&req.user_id)?;
    transition(&ctx, alert_id, AlertAction::Acknowledge { by })
}

/// `POST /api/alerts/:id/resolve`: `{ "userId": "...", "notes": "..." }`
pub async fn resolve(
    State(ctx): State<ApiContext>,
    Path(alert_id): Path<Uuid>,
    payload: Result<Json<ResolveRequest>, JsonRejection>,
) -> Result<Json<Alert>, ApiError> {
    let Json(req) = payload?;
    let by = required_user(&req.user_id)?;
    transition(
        &ctx,
        alert_id,
        AlertAction::Resolve {
            by,
            notes: req.notes,
        },
    )
}

/// `POST /api/alerts/:id/escalate`
pub async fn escalate(
    State(ctx): State<ApiContext>,
    Path(alert_id): Path<Uuid>,
) -> Result<Json<Alert>, ApiError> {
    transition(&ctx, alert_id, AlertAction::Escalate)
}

fn transition(ctx: &ApiContext, alert_id: Uuid, action: AlertAction) -> Result<Json<Alert>, ApiError> {
    let alert = ctx
        .core
        .coordinator
        .transition_alert(&alert_id, &action, Utc::now())?;
    Ok(Json(alert))
}

fn required_user(user_id: &str) -> Result<String, ApiError> {
    let trimmed = user_id.trim();
    if trimmed.is_empty() {
        return Err(ApiError::BadRequest("userId is required".into()));
    }
    Ok(trimmed.to_string())
}
