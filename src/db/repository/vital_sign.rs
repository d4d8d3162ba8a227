use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{format_ts, parse_ts, DatabaseError};
use crate::models::{AccelerometerReading, VitalSample};

/// Record one raw sample. Returns the row id.
pub fn insert_vital_sample(conn: &Connection, sample: &VitalSample) -> Result<i64, DatabaseError> {
    let acc = sample.accelerometer.unwrap_or_default();
    conn.execute(
        "INSERT INTO vital_samples
         (resident_id, recorded_at, heart_rate, spo2, respiration_rate, stress_level,
          accel_x, accel_y, accel_z, accel_timestamp, battery_level)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            sample.resident_id.to_string(),
            format_ts(&sample.timestamp),
            sample.heart_rate,
            sample.spo2,
            sample.respiration_rate,
            sample.stress_level,
            acc.x,
            acc.y,
            acc.z,
            acc.timestamp,
            sample.battery_level,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Most recent sample for a resident, used by clients reconciling after reconnect.
pub fn get_latest_vital_sample(
    conn: &Connection,
    resident_id: &Uuid,
) -> Result<Option<VitalSample>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT recorded_at, heart_rate, spo2, respiration_rate, stress_level,
                accel_x, accel_y, accel_z, accel_timestamp, battery_level
         FROM vital_samples
         WHERE resident_id = ?1
         ORDER BY recorded_at DESC, id DESC
         LIMIT 1",
    )?;
    let row = stmt
        .query_row(params![resident_id.to_string()], |row| {
            let x: Option<f64> = row.get(5)?;
            let y: Option<f64> = row.get(6)?;
            let z: Option<f64> = row.get(7)?;
            let t: Option<i64> = row.get(8)?;
            let accelerometer = if x.is_none() && y.is_none() && z.is_none() && t.is_none() {
                None
            } else {
                Some(AccelerometerReading { x, y, z, timestamp: t })
            };
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, Option<i32>>(1)?,
                row.get::<_, Option<i32>>(2)?,
                row.get::<_, Option<i32>>(3)?,
                row.get::<_, Option<i32>>(4)?,
                accelerometer,
                row.get::<_, Option<i32>>(9)?,
            ))
        })
        .optional()?;

    let Some((recorded, heart_rate, spo2, respiration_rate, stress_level, accelerometer, battery_level)) =
        row
    else {
        return Ok(None);
    };
    Ok(Some(VitalSample {
        resident_id: *resident_id,
        timestamp: parse_ts(&recorded)?,
        heart_rate,
        spo2,
        respiration_rate,
        stress_level,
        accelerometer,
        battery_level,
    }))
}
