//! Per-metric threshold evaluation.
//!
//! Pure: a sample and a profile in, zero or more violations out. Each metric
//! is judged independently, so one sample can yield several violations.
//! The critical offsets (`min − 10`, `max + 20`, absolute SpO2 85%) are
//! fixed clinical escalation points, not derived from the profile width.

use serde::Serialize;

use crate::models::{AlertCategory, AlertSeverity, ThresholdProfile, VitalSample};

/// Heart rate this far below the profile minimum is critical.
pub const HEART_RATE_CRITICAL_BELOW: i32 = 10;
/// Heart rate this far above the profile maximum is critical.
pub const HEART_RATE_CRITICAL_ABOVE: i32 = 20;
/// SpO2 below this percentage is critical regardless of the profile.
pub use crate::models::SPO2_CRITICAL_FLOOR;

/// The threshold band a metric was judged against.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThresholdBand {
    Range { min: i32, max: i32 },
    Floor { min: i32 },
    Ceiling { max: i32 },
}

/// One metric's out-of-range finding. Not yet deduplicated or persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub category: AlertCategory,
    pub severity: AlertSeverity,
    pub message: String,
    pub value: i32,
    pub threshold: ThresholdBand,
}

/// Evaluate every metric present on `sample` against `profile`.
pub fn evaluate(sample: &VitalSample, profile: &ThresholdProfile) -> Vec<Violation> {
    [
        sample.heart_rate.and_then(|v| check_heart_rate(v, profile)),
        sample.spo2.and_then(|v| check_spo2(v, profile)),
        sample.respiration_rate.and_then(|v| check_respiration(v, profile)),
        sample.stress_level.and_then(|v| check_stress(v, profile)),
    ]
    .into_iter()
    .flatten()
    .collect()
}

fn check_heart_rate(value: i32, p: &ThresholdProfile) -> Option<Violation> {
    let (min, max) = (p.heart_rate_min, p.heart_rate_max);
    if (min..=max).contains(&value) {
        return None;
    }
    let critical = value < min.saturating_sub(HEART_RATE_CRITICAL_BELOW)
        || value > max.saturating_add(HEART_RATE_CRITICAL_ABOVE);
    let (severity, message) = if critical {
        (
            AlertSeverity::Critical,
            format!("Heart rate {value} BPM is severely out of range (Normal: {min}-{max} BPM)"),
        )
    } else {
        (
            AlertSeverity::Warning,
            format!("Heart rate {value} BPM is out of range (Normal: {min}-{max} BPM)"),
        )
    };
    Some(Violation {
        category: AlertCategory::HeartRate,
        severity,
        message,
        value,
        threshold: ThresholdBand::Range { min, max },
    })
}

fn check_spo2(value: i32, p: &ThresholdProfile) -> Option<Violation> {
    let min = p.spo2_min;
    let (severity, message) = if value < SPO2_CRITICAL_FLOOR {
        (
            AlertSeverity::Critical,
            format!("Blood oxygen {value}% is critically low (Normal: {min}% or above)"),
        )
    } else if value < min {
        (
            AlertSeverity::Warning,
            format!("Blood oxygen {value}% is below normal (Normal: {min}% or above)"),
        )
    } else {
        return None;
    };
    Some(Violation {
        category: AlertCategory::Spo2,
        severity,
        message,
        value,
        threshold: ThresholdBand::Floor { min },
    })
}

fn check_respiration(value: i32, p: &ThresholdProfile) -> Option<Violation> {
    let (min, max) = (p.respiration_min, p.respiration_max);
    if (min..=max).contains(&value) {
        return None;
    }
    Some(Violation {
        category: AlertCategory::RespirationRate,
        severity: AlertSeverity::Warning,
        message: format!(
            "Respiration rate {value} breaths/min is out of range (Normal: {min}-{max} breaths/min)"
        ),
        value,
        threshold: ThresholdBand::Range { min, max },
    })
}

fn check_stress(value: i32, p: &ThresholdProfile) -> Option<Violation> {
    let max = p.stress_max;
    if value <= max {
        return None;
    }
    Some(Violation {
        category: AlertCategory::StressLevel,
        severity: AlertSeverity::Warning,
        message: format!("Stress level {value} is elevated (Normal: up to {max})"),
        value,
        threshold: ThresholdBand::Ceiling { max },
    })
}
