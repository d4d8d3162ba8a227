//! Device silence tracking.
//!
//! Remembers when each resident's device last reported. A sweep hands back
//! every resident silent for longer than the timeout and forgets them, so a
//! disconnect is reported once until the device reports again.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

pub const DEFAULT_DEVICE_TIMEOUT_SECS: i64 = 300;

/// A resident whose device stopped reporting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SilentDevice {
    pub resident_id: Uuid,
    pub facility_id: Uuid,
    pub last_seen: DateTime<Utc>,
}

impl SilentDevice {
    pub fn silent_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.last_seen
    }
}

#[derive(Debug)]
pub struct DeviceWatchdog {
    timeout: Duration,
    last_seen: HashMap<Uuid, (Uuid, DateTime<Utc>)>,
}

impl Default for DeviceWatchdog {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_DEVICE_TIMEOUT_SECS))
    }
}

impl DeviceWatchdog {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            last_seen: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Note a sample. Out-of-order samples never move `last_seen` backwards.
    pub fn record(&mut self, resident_id: Uuid, facility_id: Uuid, at: DateTime<Utc>) {
        let entry = self.last_seen.entry(resident_id).or_insert((facility_id, at));
        entry.0 = facility_id;
        entry.1 = entry.1.max(at);
    }

    pub fn forget(&mut self, resident_id: &Uuid) -> bool {
        self.last_seen.remove(resident_id).is_some()
    }

    /// Remove and return every device silent for longer than the timeout.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<SilentDevice> {
        let timeout = self.timeout;
        let mut silent = Vec::new();
        self.last_seen.retain(|&resident_id, &mut (facility_id, last_seen)| {
            if now - last_seen > timeout {
                silent.push(SilentDevice {
                    resident_id,
                    facility_id,
                    last_seen,
                });
                false
            } else {
                true
            }
        });
        silent
    }

    pub fn tracked(&self) -> usize {
        self.last_seen.len()
    }
}
