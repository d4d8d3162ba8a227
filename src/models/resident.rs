use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The slice of a resident record the alerting engine needs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Resident {
    pub id: Uuid,
    pub facility_id: Uuid,
    pub name: String,
    /// Room or bed label, reported as the location of a fall.
    pub room: Option<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}
