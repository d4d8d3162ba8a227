//! Shared types for the HTTP layer.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_state::CoreState;
use crate::models::Alert;
use crate::monitoring::{AlertMetrics, IngestOutcome};

/// Largest accepted `/api/vitals/batch` payload.
pub const MAX_BATCH_SIZE: usize = 1000;

/// Default and maximum page size for alert listings.
pub const DEFAULT_ALERT_LIMIT: u32 = 100;
pub const MAX_ALERT_LIMIT: u32 = 500;

// ═══════════════════════════════════════════════════════════
// API context: shared state for the router
// ═══════════════════════════════════════════════════════════

#[derive(Clone)]
pub struct ApiContext {
    pub core: Arc<CoreState>,
}

impl ApiContext {
    pub fn new(core: Arc<CoreState>) -> Self {
        Self { core }
    }
}

// ═══════════════════════════════════════════════════════════
// Request bodies and queries
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct IngestQuery {
    /// Process synchronously and return the outcome instead of 202.
    #[serde(default)]
    pub wait: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct AlertListQuery {
    pub status: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcknowledgeRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveRequest {
    pub user_id: String,
    #[serde(default)]
    pub notes: Option<String>,
}

// ═══════════════════════════════════════════════════════════
// Responses
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestAccepted {
    pub accepted: bool,
    pub resident_id: Uuid,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RejectedSample {
    pub index: usize,
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchAccepted {
    pub accepted: usize,
    pub rejected: Vec<RejectedSample>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResult {
    pub resident_id: Uuid,
    #[serde(flatten)]
    pub outcome: IngestOutcome,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertDetail {
    pub alert: Alert,
    pub metrics: AlertMetrics,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertList {
    pub facility_id: Uuid,
    pub alerts: Vec<Alert>,
}
