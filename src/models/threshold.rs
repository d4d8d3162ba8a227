use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const DEFAULT_HEART_RATE_MIN: i32 = 50;
pub const DEFAULT_HEART_RATE_MAX: i32 = 120;
pub const DEFAULT_SPO2_MIN: i32 = 90;
pub const DEFAULT_RESPIRATION_MIN: i32 = 12;
pub const DEFAULT_RESPIRATION_MAX: i32 = 25;
pub const DEFAULT_STRESS_MAX: i32 = 80;

/// SpO2 below this percentage is critical regardless of the profile, so a
/// profile floor may not sit beneath it.
pub const SPO2_CRITICAL_FLOOR: i32 = 85;

/// Profile bands stay inside what a device can report.
const HEART_RATE_BOUNDS: (i32, i32) = (20, 300);
const RESPIRATION_BOUNDS: (i32, i32) = (0, 100);

/// Per-resident normal ranges for each monitored metric.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdProfile {
    pub resident_id: Uuid,
    pub heart_rate_min: i32,
    pub heart_rate_max: i32,
    pub spo2_min: i32,
    pub respiration_min: i32,
    pub respiration_max: i32,
    pub stress_max: i32,
    pub updated_at: DateTime<Utc>,
}

/// Staff-supplied override of a profile. Every field is required so that a
/// write always leaves a complete, validated profile behind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdUpdate {
    pub heart_rate_min: i32,
    pub heart_rate_max: i32,
    pub spo2_min: i32,
    pub respiration_min: i32,
    pub respiration_max: i32,
    pub stress_max: i32,
}

#[derive(Debug, Error, PartialEq)]
pub enum ThresholdError {
    #[error("{field}: min {min} must be below max {max}")]
    InvalidRange {
        field: &'static str,
        min: i32,
        max: i32,
    },
    #[error("{field}: {value} is not a valid percentage")]
    InvalidPercentage { field: &'static str, value: i32 },
    #[error("{field}: {value} outside allowed range [{lo}, {hi}]")]
    OutOfBounds {
        field: &'static str,
        value: i32,
        lo: i32,
        hi: i32,
    },
}

impl ThresholdProfile {
    /// Profile created alongside a new resident.
    pub fn defaults_for(resident_id: Uuid) -> Self {
        Self {
            resident_id,
            heart_rate_min: DEFAULT_HEART_RATE_MIN,
            heart_rate_max: DEFAULT_HEART_RATE_MAX,
            spo2_min: DEFAULT_SPO2_MIN,
            respiration_min: DEFAULT_RESPIRATION_MIN,
            respiration_max: DEFAULT_RESPIRATION_MAX,
            stress_max: DEFAULT_STRESS_MAX,
            updated_at: Utc::now(),
        }
    }

    pub fn validate(&self) -> Result<(), ThresholdError> {
        check_band("heartRate", self.heart_rate_min, self.heart_rate_max)?;
        check_bounds("heartRateMin", self.heart_rate_min, HEART_RATE_BOUNDS)?;
        check_bounds("heartRateMax", self.heart_rate_max, HEART_RATE_BOUNDS)?;
        check_band("respiration", self.respiration_min, self.respiration_max)?;
        check_bounds("respirationMin", self.respiration_min, RESPIRATION_BOUNDS)?;
        check_bounds("respirationMax", self.respiration_max, RESPIRATION_BOUNDS)?;
        check_bounds("spo2Min", self.spo2_min, (SPO2_CRITICAL_FLOOR, 100))?;
        check_percentage("stressMax", self.stress_max)?;
        Ok(())
    }

    /// Apply an override, returning the new profile if it is valid.
    pub fn apply(&self, update: &ThresholdUpdate, now: DateTime<Utc>) -> Result<Self, ThresholdError> {
        let next = Self {
            resident_id: self.resident_id,
            heart_rate_min: update.heart_rate_min,
            heart_rate_max: update.heart_rate_max,
            spo2_min: update.spo2_min,
            respiration_min: update.respiration_min,
            respiration_max: update.respiration_max,
            stress_max: update.stress_max,
            updated_at: now,
        };
        next.validate()?;
        Ok(next)
    }
}

fn check_band(field: &'static str, min: i32, max: i32) -> Result<(), ThresholdError> {
    if min >= max {
        return Err(ThresholdError::InvalidRange { field, min, max });
    }
    Ok(())
}

fn check_bounds(field: &'static str, value: i32, (lo, hi): (i32, i32)) -> Result<(), ThresholdError> {
    if !(lo..=hi).contains(&value) {
        return Err(ThresholdError::OutOfBounds { field, value, lo, hi });
    }
    Ok(())
}

fn check_percentage(field: &'static str, value: i32) -> Result<(), ThresholdError> {
    if !(0..=100).contains(&value) {
        return Err(ThresholdError::InvalidPercentage { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update() -> ThresholdUpdate {
        ThresholdUpdate {
            heart_rate_min: 45,
            heart_rate_max: 110,
            spo2_min: 92,
            respiration_min: 10,
            respiration_max: 22,
            stress_max: 70,
        }
    }

    #[test]
    fn defaults_match_deployment_baseline() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        assert_eq!((p.heart_rate_min, p.heart_rate_max), (50, 120));
        assert_eq!(p.spo2_min, 90);
        assert_eq!((p.respiration_min, p.respiration_max), (12, 25));
        assert_eq!(p.stress_max, 80);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn apply_replaces_all_fields() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        let next = p.apply(&update(), Utc::now()).unwrap();
        assert_eq!(next.heart_rate_min, 45);
        assert_eq!(next.stress_max, 70);
        assert_eq!(next.resident_id, p.resident_id);
    }

    #[test]
    fn inverted_heart_rate_band_rejected() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        let mut u = update();
        u.heart_rate_min = 120;
        u.heart_rate_max = 120;
        assert_eq!(
            p.apply(&u, Utc::now()),
            Err(ThresholdError::InvalidRange { field: "heartRate", min: 120, max: 120 })
        );
    }

    #[test]
    fn spo2_above_hundred_rejected() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        let mut u = update();
        u.spo2_min = 101;
        assert!(matches!(
            p.apply(&u, Utc::now()),
            Err(ThresholdError::OutOfBounds { field: "spo2Min", .. })
        ));
    }

    #[test]
    fn spo2_floor_below_critical_floor_rejected() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        let mut u = update();
        u.spo2_min = 80;
        assert_eq!(
            p.apply(&u, Utc::now()),
            Err(ThresholdError::OutOfBounds { field: "spo2Min", value: 80, lo: 85, hi: 100 })
        );
        u.spo2_min = 85;
        assert!(p.apply(&u, Utc::now()).is_ok());
    }

    #[test]
    fn heart_rate_band_outside_device_range_rejected() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        let mut u = update();
        u.heart_rate_min = i32::MIN + 5;
        assert!(matches!(
            p.apply(&u, Utc::now()),
            Err(ThresholdError::OutOfBounds { field: "heartRateMin", .. })
        ));

        let mut u = update();
        u.heart_rate_max = 400;
        assert!(matches!(
            p.apply(&u, Utc::now()),
            Err(ThresholdError::OutOfBounds { field: "heartRateMax", .. })
        ));
    }

    #[test]
    fn respiration_band_outside_device_range_rejected() {
        let p = ThresholdProfile::defaults_for(Uuid::new_v4());
        let mut u = update();
        u.respiration_min = -3;
        assert!(matches!(
            p.apply(&u, Utc::now()),
            Err(ThresholdError::OutOfBounds { field: "respirationMin", .. })
        ));
    }
}
