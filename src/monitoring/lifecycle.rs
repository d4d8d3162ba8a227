//! Alert lifecycle state machine.
//!
//! ```text
//!   active ──acknowledge──▶ acknowledged ──resolve──▶ resolved
//!     │                                                  ▲
//!     └──escalate──▶ escalated ──────resolve─────────────┘
//! ```
//!
//! `resolved` is terminal. Alerts are never cancelled automatically; every
//! transition is a staff action.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::db::{self, DatabaseError};
use crate::models::{Alert, AlertStatus};

#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("cannot {action} an alert that is {from}")]
    InvalidStateTransition {
        from: AlertStatus,
        action: &'static str,
    },

    #[error("alert {0} not found")]
    NotFound(Uuid),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),
}

impl From<rusqlite::Error> for LifecycleError {
    fn from(e: rusqlite::Error) -> Self {
        LifecycleError::Database(e.into())
    }
}

/// A staff action on an alert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum AlertAction {
    Acknowledge { by: String },
    Resolve { by: String, notes: Option<String> },
    Escalate,
}

impl AlertAction {
    pub fn verb(&self) -> &'static str {
        match self {
            Self::Acknowledge { .. } => "acknowledge",
            Self::Resolve { .. } => "resolve",
            Self::Escalate => "escalate",
        }
    }
}

/// Allowed only from `active`.
pub fn acknowledge(alert: &mut Alert, by: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    if alert.status != AlertStatus::Active {
        return Err(LifecycleError::InvalidStateTransition {
            from: alert.status,
            action: "acknowledge",
        });
    }
    alert.status = AlertStatus::Acknowledged;
    alert.acknowledged_by = Some(by.to_string());
    alert.acknowledged_at = Some(now);
    alert.updated_at = now;
    Ok(())
}

/// Allowed from any state except `resolved`.
pub fn resolve(
    alert: &mut Alert,
    by: &str,
    notes: Option<String>,
    now: DateTime<Utc>,
) -> Result<(), LifecycleError> {
    if alert.status == AlertStatus::Resolved {
        return Err(LifecycleError::InvalidStateTransition {
            from: alert.status,
            action: "resolve",
        });
    }
    alert.status = AlertStatus::Resolved;
    alert.resolved_by = Some(by.to_string());
    alert.resolved_at = Some(now);
    alert.resolution_notes = notes.filter(|n| !n.trim().is_empty());
    alert.updated_at = now;
    Ok(())
}

/// Allowed from `active` or `acknowledged`.
pub fn escalate(alert: &mut Alert, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    if matches!(alert.status, AlertStatus::Resolved | AlertStatus::Escalated) {
        return Err(LifecycleError::InvalidStateTransition {
            from: alert.status,
            action: "escalate",
        });
    }
    alert.status = AlertStatus::Escalated;
    alert.escalated_at = Some(now);
    alert.updated_at = now;
    Ok(())
}

pub fn apply(alert: &mut Alert, action: &AlertAction, now: DateTime<Utc>) -> Result<(), LifecycleError> {
    match action {
        AlertAction::Acknowledge { by } => acknowledge(alert, by, now),
        AlertAction::Resolve { by, notes } => resolve(alert, by, notes.clone(), now),
        AlertAction::Escalate => escalate(alert, now),
    }
}

/// Load, transition and persist a stored alert in one transaction.
pub fn apply_to_stored(
    conn: &Connection,
    alert_id: &Uuid,
    action: &AlertAction,
    now: DateTime<Utc>,
) -> Result<Alert, LifecycleError> {
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let mut alert = db::get_alert(&tx, alert_id)?.ok_or(LifecycleError::NotFound(*alert_id))?;
    apply(&mut alert, action, now)?;
    db::update_alert_lifecycle(&tx, &alert)?;
    tx.commit()?;
    Ok(alert)
}

/// Time from raise to acknowledgement.
pub fn response_time(alert: &Alert) -> Option<Duration> {
    alert.acknowledged_at.map(|at| at - alert.created_at)
}

/// Time from raise to resolution.
pub fn resolution_time(alert: &Alert) -> Option<Duration> {
    alert.resolved_at.map(|at| at - alert.created_at)
}

/// Reporting view of the two derived durations.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertMetrics {
    pub response_time_secs: Option<i64>,
    pub resolution_time_secs: Option<i64>,
}

impl AlertMetrics {
    pub fn of(alert: &Alert) -> Self {
        Self {
            response_time_secs: response_time(alert).map(|d| d.num_seconds()),
            resolution_time_secs: resolution_time(alert).map(|d| d.num_seconds()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::{AlertCandidate, AlertCategory, AlertSeverity};
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 6, 20, 22, 15, 0).unwrap()
    }

    fn active_alert() -> Alert {
        AlertCandidate {
            resident_id: Uuid::new_v4(),
            facility_id: Uuid::new_v4(),
            category: AlertCategory::FallDetected,
            severity: AlertSeverity::Critical,
            message: "Fall detected".into(),
            vital_data: serde_json::json!({}),
        }
        .into_alert(t0())
    }

    #[test]
    fn acknowledge_active_sets_fields() {
        let mut alert = active_alert();
        let at = t0() + Duration::seconds(45);
        acknowledge(&mut alert, "nurse-ana", at).unwrap();
        assert_eq!(alert.status, AlertStatus::Acknowledged);
        assert_eq!(alert.acknowledged_at, Some(at));
        assert_eq!(alert.acknowledged_by.as_deref(), Some("nurse-ana"));
        assert_eq!(response_time(&alert), Some(Duration::seconds(45)));
    }

    #[test]
    fn acknowledge_twice_fails() {
        let mut alert = active_alert();
        acknowledge(&mut alert, "nurse-ana", t0()).unwrap();
        let err = acknowledge(&mut alert, "nurse-ben", t0()).unwrap_err();
        assert!(matches!(
            err,
            LifecycleError::InvalidStateTransition { from: AlertStatus::Acknowledged, action: "acknowledge" }
        ));
        assert_eq!(alert.acknowledged_by.as_deref(), Some("nurse-ana"));
    }

    #[test]
    fn resolving_escalated_alert_succeeds() {
        let mut alert = active_alert();
        escalate(&mut alert, t0() + Duration::minutes(2)).unwrap();
        assert_eq!(alert.status, AlertStatus::Escalated);

        resolve(&mut alert, "dr-kim", Some("Resident assisted to bed".into()), t0() + Duration::minutes(9))
            .unwrap();
        assert_eq!(alert.status, AlertStatus::Resolved);
        assert_eq!(alert.resolution_notes.as_deref(), Some("Resident assisted to bed"));
        assert_eq!(resolution_time(&alert), Some(Duration::minutes(9)));
    }

    #[test]
    fn cannot_acknowledge_escalated() {
        let mut alert = active_alert();
        escalate(&mut alert, t0()).unwrap();
        assert!(acknowledge(&mut alert, "nurse-ana", t0()).is_err());
    }

    #[test]
    fn escalate_from_acknowledged_but_not_twice() {
        let mut alert = active_alert();
        acknowledge(&mut alert, "nurse-ana", t0()).unwrap();
        escalate(&mut alert, t0()).unwrap();
        assert!(matches!(
            escalate(&mut alert, t0()),
            Err(LifecycleError::InvalidStateTransition { action: "escalate", .. })
        ));
    }

    #[test]
    fn resolved_is_terminal() {
        let mut alert = active_alert();
        resolve(&mut alert, "nurse-ana", None, t0()).unwrap();
        for action in [
            AlertAction::Acknowledge { by: "x".into() },
            AlertAction::Resolve { by: "x".into(), notes: None },
            AlertAction::Escalate,
        ] {
            assert!(apply(&mut alert, &action, t0()).is_err(), "{}", action.verb());
        }
    }

    #[test]
    fn blank_notes_are_dropped() {
        let mut alert = active_alert();
        resolve(&mut alert, "nurse-ana", Some("   ".into()), t0()).unwrap();
        assert!(alert.resolution_notes.is_none());
    }

    #[test]
    fn stored_transition_persists() {
        let conn = open_memory_database().unwrap();
        let alert = active_alert();
        db::insert_alert(&conn, &alert).unwrap();

        let at = t0() + Duration::seconds(30);
        let updated = apply_to_stored(&conn, &alert.id, &AlertAction::Acknowledge { by: "nurse-ana".into() }, at)
            .unwrap();
        assert_eq!(updated.status, AlertStatus::Acknowledged);

        let loaded = db::get_alert(&conn, &alert.id).unwrap().unwrap();
        assert_eq!(loaded.status, AlertStatus::Acknowledged);
        assert_eq!(loaded.acknowledged_at, Some(at));
        assert_eq!(AlertMetrics::of(&loaded).response_time_secs, Some(30));
    }

    #[test]
    fn stored_invalid_transition_leaves_row_untouched() {
        let conn = open_memory_database().unwrap();
        let mut alert = active_alert();
        resolve(&mut alert, "nurse-ana", None, t0()).unwrap();
        db::insert_alert(&conn, &alert).unwrap();

        let result = apply_to_stored(&conn, &alert.id, &AlertAction::Escalate, t0());
        assert!(matches!(result, Err(LifecycleError::InvalidStateTransition { .. })));
        let loaded = db::get_alert(&conn, &alert.id).unwrap().unwrap();
        assert_eq!(loaded.status, AlertStatus::Resolved);
        assert!(loaded.escalated_at.is_none());
    }

    #[test]
    fn stored_unknown_alert_is_not_found() {
        let conn = open_memory_database().unwrap();
        let id = Uuid::new_v4();
        let result = apply_to_stored(&conn, &id, &AlertAction::Escalate, t0());
        assert!(matches!(result, Err(LifecycleError::NotFound(x)) if x == id));
    }
}
