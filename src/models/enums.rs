use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }
    };
}

str_enum!(AlertCategory {
    HeartRate => "heart_rate",
    Spo2 => "spo2",
    RespirationRate => "respiration_rate",
    StressLevel => "stress_level",
    FallDetected => "fall_detected",
    DeviceDisconnected => "device_disconnected",
    LowBattery => "low_battery",
});

str_enum!(AlertSeverity {
    Critical => "critical",
    Warning => "warning",
    Info => "info",
});

str_enum!(AlertStatus {
    Active => "active",
    Acknowledged => "acknowledged",
    Resolved => "resolved",
    Escalated => "escalated",
});

impl AlertStatus {
    /// Statuses that still count as "open" for duplicate suppression.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Active | Self::Acknowledged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn category_round_trips_through_str() {
        for cat in [
            AlertCategory::HeartRate,
            AlertCategory::Spo2,
            AlertCategory::RespirationRate,
            AlertCategory::StressLevel,
            AlertCategory::FallDetected,
            AlertCategory::DeviceDisconnected,
            AlertCategory::LowBattery,
        ] {
            assert_eq!(AlertCategory::from_str(cat.as_str()).unwrap(), cat);
        }
    }

    #[test]
    fn unknown_status_is_invalid_enum() {
        let err = AlertStatus::from_str("snoozed").unwrap_err();
        assert!(matches!(err, DatabaseError::InvalidEnum { .. }));
    }

    #[test]
    fn serde_uses_snake_case() {
        let json = serde_json::to_string(&AlertCategory::FallDetected).unwrap();
        assert_eq!(json, "\"fall_detected\"");
        let sev: AlertSeverity = serde_json::from_str("\"warning\"").unwrap();
        assert_eq!(sev, AlertSeverity::Warning);
    }

    #[test]
    fn open_statuses() {
        assert!(AlertStatus::Active.is_open());
        assert!(AlertStatus::Acknowledged.is_open());
        assert!(!AlertStatus::Escalated.is_open());
        assert!(!AlertStatus::Resolved.is_open());
    }
}
