use std::str::FromStr;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_ts, parse_ts, DatabaseError};
use crate::models::*;

use super::resident::parse_uuid;

const ALERT_COLUMNS: &str = "id, resident_id, facility_id, category, severity, message,
    vital_data, status, created_at, updated_at, acknowledged_by, acknowledged_at,
    resolved_by, resolved_at, resolution_notes, escalated_at";

/// Insert a newly raised alert.
pub fn insert_alert(conn: &Connection, alert: &Alert) -> Result<(), DatabaseError> {
    let vital_json =
        serde_json::to_string(&alert.vital_data).unwrap_or_else(|_| "{}".to_string());

    conn.execute(
        &format!(
            "INSERT INTO alerts ({ALERT_COLUMNS})
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
        ),
        params![
            alert.id.to_string(),
            alert.resident_id.to_string(),
            alert.facility_id.to_string(),
            alert.category.as_str(),
            alert.severity.as_str(),
            alert.message,
            vital_json,
            alert.status.as_str(),
            format_ts(&alert.created_at),
            format_ts(&alert.updated_at),
            alert.acknowledged_by,
            alert.acknowledged_at.as_ref().map(format_ts),
            alert.resolved_by,
            alert.resolved_at.as_ref().map(format_ts),
            alert.resolution_notes,
            alert.escalated_at.as_ref().map(format_ts),
        ],
    )?;
    Ok(())
}

pub fn get_alert(conn: &Connection, id: &Uuid) -> Result<Option<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!("SELECT {ALERT_COLUMNS} FROM alerts WHERE id = ?1"))?;
    let raw = stmt
        .query_row(params![id.to_string()], read_raw_alert)
        .optional()?;
    raw.map(RawAlert::into_alert).transpose()
}

/// Newest open (`active` or `acknowledged`) alert for a resident and category
/// raised at or after `since`.
pub fn find_open_alert_since(
    conn: &Connection,
    resident_id: &Uuid,
    category: AlertCategory,
    since: &DateTime<Utc>,
) -> Result<Option<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE resident_id = ?1
           AND category = ?2
           AND status IN ('active', 'acknowledged')
           AND created_at >= ?3
         ORDER BY created_at DESC
         LIMIT 1"
    ))?;
    let raw = stmt
        .query_row(
            params![resident_id.to_string(), category.as_str(), format_ts(since)],
            read_raw_alert,
        )
        .optional()?;
    raw.map(RawAlert::into_alert).transpose()
}

/// Persist the lifecycle fields of an alert after a transition.
pub fn update_alert_lifecycle(conn: &Connection, alert: &Alert) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE alerts SET status = ?1, updated_at = ?2,
            acknowledged_by = ?3, acknowledged_at = ?4,
            resolved_by = ?5, resolved_at = ?6, resolution_notes = ?7,
            escalated_at = ?8
         WHERE id = ?9",
        params![
            alert.status.as_str(),
            format_ts(&alert.updated_at),
            alert.acknowledged_by,
            alert.acknowledged_at.as_ref().map(format_ts),
            alert.resolved_by,
            alert.resolved_at.as_ref().map(format_ts),
            alert.resolution_notes,
            alert.escalated_at.as_ref().map(format_ts),
            alert.id.to_string(),
        ],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "alert".into(),
            id: alert.id.to_string(),
        });
    }
    Ok(())
}

/// Alerts for a facility, newest first, optionally filtered by status.
pub fn list_facility_alerts(
    conn: &Connection,
    facility_id: &Uuid,
    status: Option<AlertStatus>,
    limit: u32,
) -> Result<Vec<Alert>, DatabaseError> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ALERT_COLUMNS} FROM alerts
         WHERE facility_id = ?1 AND (?2 IS NULL OR status = ?2)
         ORDER BY created_at DESC
         LIMIT ?3"
    ))?;
    let rows = stmt.query_map(
        params![facility_id.to_string(), status.map(|s| s.as_str()), limit],
        read_raw_alert,
    )?;

    let mut alerts = Vec::new();
    for row in rows {
        alerts.push(row?.into_alert()?);
    }
    Ok(alerts)
}

/// Column values as stored, before enum and timestamp parsing.
struct RawAlert {
    id: String,
    resident_id: String,
    facility_id: String,
    category: String,
    severity: String,
    message: String,
    vital_data: String,
    status: String,
    created_at: String,
    updated_at: String,
    acknowledged_by: Option<String>,
    acknowledged_at: Option<String>,
    resolved_by: Option<String>,
    resolved_at: Option<String>,
    resolution_notes: Option<String>,
    escalated_at: Option<String>,
}

fn read_raw_alert(row: &rusqlite::Row) -> Result<RawAlert, rusqlite::Error> {
    Ok(RawAlert {
        id: row.get(0)?,
        resident_id: row.get(1)?,
        facility_id: row.get(2)?,
        category: row.get(3)?,
        severity: row.get(4)?,
        message: row.get(5)?,
        vital_data: row.get(6)?,
        status: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        acknowledged_by: row.get(10)?,
        acknowledged_at: row.get(11)?,
        resolved_by: row.get(12)?,
        resolved_at: row.get(13)?,
        resolution_notes: row.get(14)?,
        escalated_at: row.get(15)?,
    })
}

impl RawAlert {
    fn into_alert(self) -> Result<Alert, DatabaseError> {
        let opt_ts = |raw: Option<String>| raw.as_deref().map(parse_ts).transpose();
        Ok(Alert {
            id: parse_uuid(&self.id)?,
            resident_id: parse_uuid(&self.resident_id)?,
            facility_id: parse_uuid(&self.facility_id)?,
            category: AlertCategory::from_str(&self.category)?,
            severity: AlertSeverity::from_str(&self.severity)?,
            message: self.message,
            vital_data: serde_json::from_str(&self.vital_data)
                .map_err(|e| DatabaseError::ConstraintViolation(format!("Invalid vital data: {e}")))?,
            status: AlertStatus::from_str(&self.status)?,
            created_at: parse_ts(&self.created_at)?,
            updated_at: parse_ts(&self.updated_at)?,
            acknowledged_by: self.acknowledged_by,
            acknowledged_at: opt_ts(self.acknowledged_at)?,
            resolved_by: self.resolved_by,
            resolved_at: opt_ts(self.resolved_at)?,
            resolution_notes: self.resolution_notes,
            escalated_at: opt_ts(self.escalated_at)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 2, 14, 0, 0).unwrap()
    }

    fn make_alert(resident: Uuid, facility: Uuid, category: AlertCategory, at: DateTime<Utc>) -> Alert {
        AlertCandidate {
            resident_id: resident,
            facility_id: facility,
            category,
            severity: AlertSeverity::Warning,
            message: "Heart rate 130 BPM is out of range (Normal: 50-120 BPM)".into(),
            vital_data: serde_json::json!({ "heartRate": 130 }),
        }
        .into_alert(at)
    }

    #[test]
    fn insert_and_get_round_trip() {
        let conn = open_memory_database().unwrap();
        let alert = make_alert(Uuid::new_v4(), Uuid::new_v4(), AlertCategory::HeartRate, t0());
        insert_alert(&conn, &alert).unwrap();

        let loaded = get_alert(&conn, &alert.id).unwrap().unwrap();
        assert_eq!(loaded, alert);
    }

    #[test]
    fn find_open_respects_window_and_category() {
        let conn = open_memory_database().unwrap();
        let resident = Uuid::new_v4();
        let facility = Uuid::new_v4();
        let alert = make_alert(resident, facility, AlertCategory::HeartRate, t0());
        insert_alert(&conn, &alert).unwrap();

        let hit = find_open_alert_since(&conn, &resident, AlertCategory::HeartRate, &(t0() - Duration::minutes(5)))
            .unwrap();
        assert_eq!(hit.map(|a| a.id), Some(alert.id));

        let other_category =
            find_open_alert_since(&conn, &resident, AlertCategory::Spo2, &(t0() - Duration::minutes(5))).unwrap();
        assert!(other_category.is_none());

        let too_late = find_open_alert_since(&conn, &resident, AlertCategory::HeartRate, &(t0() + Duration::seconds(1)))
            .unwrap();
        assert!(too_late.is_none());
    }

    #[test]
    fn find_open_ignores_resolved() {
        let conn = open_memory_database().unwrap();
        let resident = Uuid::new_v4();
        let mut alert = make_alert(resident, Uuid::new_v4(), AlertCategory::HeartRate, t0());
        insert_alert(&conn, &alert).unwrap();

        alert.status = AlertStatus::Resolved;
        alert.resolved_at = Some(t0() + Duration::seconds(30));
        alert.resolved_by = Some("nurse-7".into());
        update_alert_lifecycle(&conn, &alert).unwrap();

        let hit = find_open_alert_since(&conn, &resident, AlertCategory::HeartRate, &(t0() - Duration::minutes(5)))
            .unwrap();
        assert!(hit.is_none());
    }

    #[test]
    fn update_unknown_alert_fails() {
        let conn = open_memory_database().unwrap();
        let alert = make_alert(Uuid::new_v4(), Uuid::new_v4(), AlertCategory::Spo2, t0());
        let result = update_alert_lifecycle(&conn, &alert);
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn list_filters_by_facility_and_status() {
        let conn = open_memory_database().unwrap();
        let facility = Uuid::new_v4();
        let resident = Uuid::new_v4();

        let first = make_alert(resident, facility, AlertCategory::HeartRate, t0());
        let mut second = make_alert(resident, facility, AlertCategory::Spo2, t0() + Duration::minutes(1));
        let elsewhere = make_alert(Uuid::new_v4(), Uuid::new_v4(), AlertCategory::Spo2, t0());
        insert_alert(&conn, &first).unwrap();
        insert_alert(&conn, &second).unwrap();
        insert_alert(&conn, &elsewhere).unwrap();

        second.status = AlertStatus::Acknowledged;
        update_alert_lifecycle(&conn, &second).unwrap();

        let all = list_facility_alerts(&conn, &facility, None, 50).unwrap();
        assert_eq!(all.iter().map(|a| a.id).collect::<Vec<_>>(), vec![second.id, first.id]);

        let active = list_facility_alerts(&conn, &facility, Some(AlertStatus::Active), 50).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, first.id);
    }
}
