use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{AlertCategory, AlertSeverity, AlertStatus};

/// A raised alert. Mutated only through the lifecycle transitions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub id: Uuid,
    pub resident_id: Uuid,
    pub facility_id: Uuid,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub message: String,
    /// Snapshot of the vitals (or fall event) that raised the alert.
    pub vital_data: serde_json::Value,
    pub status: AlertStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub acknowledged_by: Option<String>,
    pub acknowledged_at: Option<DateTime<Utc>>,
    pub resolved_by: Option<String>,
    pub resolved_at: Option<DateTime<Utc>>,
    pub resolution_notes: Option<String>,
    pub escalated_at: Option<DateTime<Utc>>,
}

/// An alert that has not yet passed duplicate suppression.
#[derive(Debug, Clone, PartialEq)]
pub struct AlertCandidate {
    pub resident_id: Uuid,
    pub facility_id: Uuid,
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub message: String,
    pub vital_data: serde_json::Value,
}

impl AlertCandidate {
    /// Materialize as a fresh `active` alert raised at `now`.
    pub fn into_alert(self, now: DateTime<Utc>) -> Alert {
        Alert {
            id: Uuid::new_v4(),
            resident_id: self.resident_id,
            facility_id: self.facility_id,
            category: self.category,
            severity: self.severity,
            message: self.message,
            vital_data: self.vital_data,
            status: AlertStatus::Active,
            created_at: now,
            updated_at: now,
            acknowledged_by: None,
            acknowledged_at: None,
            resolved_by: None,
            resolved_at: None,
            resolution_notes: None,
            escalated_at: None,
        }
    }
}
