use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_ts, parse_ts, DatabaseError};
use crate::models::ThresholdProfile;

/// Insert or replace a resident's threshold profile after validating it.
pub fn upsert_threshold_profile(
    conn: &Connection,
    profile: &ThresholdProfile,
) -> Result<(), DatabaseError> {
    profile
        .validate()
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    conn.execute(
        "INSERT INTO threshold_profiles
         (resident_id, heart_rate_min, heart_rate_max, spo2_min,
          respiration_min, respiration_max, stress_max, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
         ON CONFLICT(resident_id) DO UPDATE SET
            heart_rate_min = excluded.heart_rate_min,
            heart_rate_max = excluded.heart_rate_max,
            spo2_min = excluded.spo2_min,
            respiration_min = excluded.respiration_min,
            respiration_max = excluded.respiration_max,
            stress_max = excluded.stress_max,
            updated_at = excluded.updated_at",
        params![
            profile.resident_id.to_string(),
            profile.heart_rate_min,
            profile.heart_rate_max,
            profile.spo2_min,
            profile.respiration_min,
            profile.respiration_max,
            profile.stress_max,
            format_ts(&profile.updated_at),
        ],
    )?;
    Ok(())
}

pub fn get_threshold_profile(
    conn: &Connection,
    resident_id: &Uuid,
) -> Result<Option<ThresholdProfile>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT heart_rate_min, heart_rate_max, spo2_min,
                    respiration_min, respiration_max, stress_max, updated_at
             FROM threshold_profiles WHERE resident_id = ?1",
            params![resident_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, i32>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, i32>(2)?,
                    row.get::<_, i32>(3)?,
                    row.get::<_, i32>(4)?,
                    row.get::<_, i32>(5)?,
                    row.get::<_, String>(6)?,
                ))
            },
        )
        .optional()?;

    let Some((hr_min, hr_max, spo2_min, rr_min, rr_max, stress_max, updated)) = row else {
        return Ok(None);
    };
    Ok(Some(ThresholdProfile {
        resident_id: *resident_id,
        heart_rate_min: hr_min,
        heart_rate_max: hr_max,
        spo2_min,
        respiration_min: rr_min,
        respiration_max: rr_max,
        stress_max,
        updated_at: parse_ts(&updated)?,
    }))
}
