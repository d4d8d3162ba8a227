use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Raw accelerometer payload as delivered by a wearable.
///
/// Axes are optional on the wire: a device that drops an axis produces a
/// partial reading, which is kept on the sample but ignored by fall
/// detection.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AccelerometerReading {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
    /// Device clock, epoch milliseconds.
    pub timestamp: Option<i64>,
}

/// A complete accelerometer reading with all three axes present.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AxisReading {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub timestamp_ms: i64,
}

impl AxisReading {
    /// Vector magnitude in g.
    pub fn magnitude(&self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }
}

impl AccelerometerReading {
    /// Returns the reading when every axis is present.
    ///
    /// A missing device timestamp falls back to `fallback_ms` (the sample's
    /// own timestamp).
    pub fn complete(&self, fallback_ms: i64) -> Option<AxisReading> {
        Some(AxisReading {
            x: self.x?,
            y: self.y?,
            z: self.z?,
            timestamp_ms: self.timestamp.unwrap_or(fallback_ms),
        })
    }
}

/// One device tick for one resident. Immutable once received.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VitalSample {
    pub resident_id: Uuid,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub heart_rate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spo2: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub respiration_rate: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stress_level: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accelerometer: Option<AccelerometerReading>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub battery_level: Option<i32>,
}

#[derive(Debug, Error, PartialEq)]
pub enum SampleValidationError {
    #[error("{field} value {value} outside allowed range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: i32,
        min: i32,
        max: i32,
    },
    #[error("accelerometer axis {0} is not a finite number")]
    NonFiniteAxis(&'static str),
}

impl VitalSample {
    /// A sample carrying only a resident and a timestamp.
    pub fn empty(resident_id: Uuid, timestamp: DateTime<Utc>) -> Self {
        Self {
            resident_id,
            timestamp,
            heart_rate: None,
            spo2: None,
            respiration_rate: None,
            stress_level: None,
            accelerometer: None,
            battery_level: None,
        }
    }

    /// Check the ingestion schema ranges.
    pub fn validate(&self) -> Result<(), SampleValidationError> {
        check_range("heartRate", self.heart_rate, 20, 300)?;
        check_range("spo2", self.spo2, 0, 100)?;
        check_range("respirationRate", self.respiration_rate, 0, 100)?;
        check_range("stressLevel", self.stress_level, 0, 100)?;
        check_range("batteryLevel", self.battery_level, 0, 100)?;
        if let Some(acc) = &self.accelerometer {
            for (name, axis) in [("x", acc.x), ("y", acc.y), ("z", acc.z)] {
                if axis.is_some_and(|v| !v.is_finite()) {
                    return Err(SampleValidationError::NonFiniteAxis(name));
                }
            }
        }
        Ok(())
    }

    pub fn timestamp_ms(&self) -> i64 {
        self.timestamp.timestamp_millis()
    }

    /// Complete accelerometer reading, if present and all axes are set.
    pub fn axis_reading(&self) -> Option<AxisReading> {
        self.accelerometer
            .as_ref()
            .and_then(|acc| acc.complete(self.timestamp_ms()))
    }

    /// JSON snapshot of the measured fields, used for `vital_update`
    /// payloads and as an alert's `vitalData`.
    pub fn data_snapshot(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

fn check_range(
    field: &'static str,
    value: Option<i32>,
    min: i32,
    max: i32,
) -> Result<(), SampleValidationError> {
    match value {
        Some(v) if v < min || v > max => Err(SampleValidationError::OutOfRange {
            field,
            value: v,
            min,
            max,
        }),
        _ => Ok(()),
    }
}
