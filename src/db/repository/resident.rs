use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_ts, parse_ts, DatabaseError};
use crate::models::{Resident, ThresholdProfile};

use super::threshold::upsert_threshold_profile;

/// Insert a resident together with its default threshold profile.
pub fn insert_resident(conn: &Connection, resident: &Resident) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO residents (id, facility_id, name, room, active, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            resident.id.to_string(),
            resident.facility_id.to_string(),
            resident.name,
            resident.room,
            resident.active as i32,
            format_ts(&resident.created_at),
        ],
    )?;
    upsert_threshold_profile(&tx, &ThresholdProfile::defaults_for(resident.id))?;
    tx.commit()?;
    Ok(())
}

pub fn get_resident(conn: &Connection, id: &Uuid) -> Result<Option<Resident>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, facility_id, name, room, active, created_at FROM residents WHERE id = ?1",
            params![id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, Option<String>>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, String>(5)?,
                ))
            },
        )
        .optional()?;

    let Some((id_str, facility_str, name, room, active, created_at)) = row else {
        return Ok(None);
    };
    Ok(Some(Resident {
        id: parse_uuid(&id_str)?,
        facility_id: parse_uuid(&facility_str)?,
        name,
        room,
        active: active != 0,
        created_at: parse_ts(&created_at)?,
    }))
}

/// Flip a resident's active flag. Inactive residents are ignored by ingestion.
pub fn set_resident_active(conn: &Connection, id: &Uuid, active: bool) -> Result<(), DatabaseError> {
    let affected = conn.execute(
        "UPDATE residents SET active = ?1 WHERE id = ?2",
        params![active as i32, id.to_string()],
    )?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "resident".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Delete a resident. Threshold profile and vital samples cascade; alerts are kept.
pub fn delete_resident(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let affected = conn.execute("DELETE FROM residents WHERE id = ?1", params![id.to_string()])?;
    if affected == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "resident".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

pub(crate) fn parse_uuid(raw: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(raw).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}
