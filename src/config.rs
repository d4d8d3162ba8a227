use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::monitoring::{
    FallConfig, DEFAULT_DEDUP_WINDOW_SECS, DEFAULT_DEVICE_TIMEOUT_SECS,
};

/// Application-level constants
pub const APP_NAME: &str = "CareWatch";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8420";

/// Battery percentage below which a `low_battery` alert is raised.
pub const DEFAULT_LOW_BATTERY_PERCENT: i32 = 20;

/// Fall state not fed for this long is dropped.
pub const DEFAULT_FALL_STATE_TTL_HOURS: i64 = 24;

/// Per-resident ingest workers retire after this much silence.
pub const DEFAULT_WORKER_IDLE_SECS: u64 = 300;

/// Interval of the watchdog / eviction sweep.
pub const DEFAULT_MAINTENANCE_INTERVAL_SECS: u64 = 30;

/// Default tracing filter when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "carewatch=info,carewatch_lib=info,tower_http=warn"
}

/// Get the application data directory.
/// `~/CareWatch/`, or `./CareWatch` when no home directory is known.
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}

pub fn default_db_path() -> PathBuf {
    app_data_dir().join("carewatch.db")
}

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("{var}: cannot parse {value:?} ({reason})")]
    Invalid {
        var: &'static str,
        value: String,
        reason: String,
    },
}

/// Deployment configuration for the monitoring service.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub bind_addr: SocketAddr,
    pub db_path: PathBuf,
    pub fall: FallConfig,
    pub dedup_window_secs: i64,
    pub device_timeout_secs: i64,
    pub low_battery_percent: i32,
    pub fall_state_ttl_hours: i64,
    pub worker_idle: Duration,
    pub maintenance_interval: Duration,
    /// When set, critical alerts are POSTed here instead of only logged.
    pub notify_webhook: Option<String>,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8420)),
            db_path: default_db_path(),
            fall: FallConfig::default(),
            dedup_window_secs: DEFAULT_DEDUP_WINDOW_SECS,
            device_timeout_secs: DEFAULT_DEVICE_TIMEOUT_SECS,
            low_battery_percent: DEFAULT_LOW_BATTERY_PERCENT,
            fall_state_ttl_hours: DEFAULT_FALL_STATE_TTL_HOURS,
            worker_idle: Duration::from_secs(DEFAULT_WORKER_IDLE_SECS),
            maintenance_interval: Duration::from_secs(DEFAULT_MAINTENANCE_INTERVAL_SECS),
            notify_webhook: None,
        }
    }
}

impl MonitorConfig {
    /// Defaults overridden by `CAREWATCH_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(v) = lookup("CAREWATCH_BIND") {
            config.bind_addr = parse("CAREWATCH_BIND", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_DB_PATH") {
            config.db_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("CAREWATCH_FALL_IMPACT_G") {
            config.fall.impact_threshold_g = parse("CAREWATCH_FALL_IMPACT_G", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_FALL_INACTIVITY_G") {
            config.fall.inactivity_threshold_g = parse("CAREWATCH_FALL_INACTIVITY_G", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_FALL_INACTIVITY_MS") {
            config.fall.inactivity_duration_ms = parse("CAREWATCH_FALL_INACTIVITY_MS", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_DEDUP_WINDOW_SECS") {
            config.dedup_window_secs = parse("CAREWATCH_DEDUP_WINDOW_SECS", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_DEVICE_TIMEOUT_SECS") {
            config.device_timeout_secs = parse("CAREWATCH_DEVICE_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_LOW_BATTERY_PERCENT") {
            config.low_battery_percent = parse("CAREWATCH_LOW_BATTERY_PERCENT", &v)?;
        }
        if let Some(v) = lookup("CAREWATCH_NOTIFY_WEBHOOK") {
            let v = v.trim();
            config.notify_webhook = (!v.is_empty()).then(|| v.to_string());
        }

        config.check()?;
        Ok(config)
    }

    fn check(&self) -> Result<(), ConfigError> {
        let invalid = |var: &'static str, value: String, reason: &str| ConfigError::Invalid {
            var,
            value,
            reason: reason.into(),
        };
        if self.fall.inactivity_threshold_g >= self.fall.impact_threshold_g {
            return Err(invalid(
                "CAREWATCH_FALL_INACTIVITY_G",
                self.fall.inactivity_threshold_g.to_string(),
                "must be below the impact threshold",
            ));
        }
        if self.dedup_window_secs <= 0 {
            return Err(invalid(
                "CAREWATCH_DEDUP_WINDOW_SECS",
                self.dedup_window_secs.to_string(),
                "must be positive",
            ));
        }
        if self.device_timeout_secs <= 0 {
            return Err(invalid(
                "CAREWATCH_DEVICE_TIMEOUT_SECS",
                self.device_timeout_secs.to_string(),
                "must be positive",
            ));
        }
        if !(0..=100).contains(&self.low_battery_percent) {
            return Err(invalid(
                "CAREWATCH_LOW_BATTERY_PERCENT",
                self.low_battery_percent.to_string(),
                "must be a percentage",
            ));
        }
        Ok(())
    }

    pub fn dedup_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.dedup_window_secs)
    }

    pub fn device_timeout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.device_timeout_secs)
    }

    pub fn fall_state_ttl(&self) -> chrono::Duration {
        chrono::Duration::hours(self.fall_state_ttl_hours)
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn app_data_dir_named_after_app() {
        assert!(app_data_dir().ends_with("CareWatch"));
        assert!(default_db_path().starts_with(app_data_dir()));
    }

    #[test]
    fn app_name_is_carewatch() {
        assert_eq!(APP_NAME, "CareWatch");
    }

    #[test]
    fn defaults_without_env() {
        let config = MonitorConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, MonitorConfig::default());
        assert_eq!(config.fall.impact_threshold_g, 2.5);
        assert_eq!(config.fall.inactivity_threshold_g, 0.5);
        assert_eq!(config.fall.inactivity_duration_ms, 10_000);
        assert_eq!(config.dedup_window(), chrono::Duration::minutes(5));
        assert_eq!(config.bind_addr.to_string(), DEFAULT_BIND_ADDR);
        assert!(config.notify_webhook.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let config = MonitorConfig::from_lookup(lookup(&[
            ("CAREWATCH_BIND", "127.0.0.1:9000"),
            ("CAREWATCH_DB_PATH", "/var/lib/carewatch/care.db"),
            ("CAREWATCH_FALL_IMPACT_G", "3.0"),
            ("CAREWATCH_FALL_INACTIVITY_MS", "8000"),
            ("CAREWATCH_DEDUP_WINDOW_SECS", "120"),
            ("CAREWATCH_LOW_BATTERY_PERCENT", "15"),
            ("CAREWATCH_NOTIFY_WEBHOOK", "https://pager.example/hook"),
        ]))
        .unwrap();
        assert_eq!(config.bind_addr.port(), 9000);
        assert_eq!(config.db_path, PathBuf::from("/var/lib/carewatch/care.db"));
        assert_eq!(config.fall.impact_threshold_g, 3.0);
        assert_eq!(config.fall.inactivity_duration_ms, 8000);
        assert_eq!(config.dedup_window_secs, 120);
        assert_eq!(config.low_battery_percent, 15);
        assert_eq!(config.notify_webhook.as_deref(), Some("https://pager.example/hook"));
    }

    #[test]
    fn blank_webhook_is_unset() {
        let config = MonitorConfig::from_lookup(lookup(&[("CAREWATCH_NOTIFY_WEBHOOK", "  ")])).unwrap();
        assert!(config.notify_webhook.is_none());
    }

    #[test]
    fn unparsable_value_names_variable() {
        let err = MonitorConfig::from_lookup(lookup(&[("CAREWATCH_FALL_IMPACT_G", "hard")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CAREWATCH_FALL_IMPACT_G", .. }));
    }

    #[test]
    fn inconsistent_fall_thresholds_rejected() {
        let err = MonitorConfig::from_lookup(lookup(&[("CAREWATCH_FALL_INACTIVITY_G", "3.0")])).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { var: "CAREWATCH_FALL_INACTIVITY_G", .. }));
    }

    #[test]
    fn battery_threshold_must_be_percentage() {
        assert!(MonitorConfig::from_lookup(lookup(&[("CAREWATCH_LOW_BATTERY_PERCENT", "120")])).is_err());
    }
}
