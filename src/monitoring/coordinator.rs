//! Per-sample orchestration.
//!
//! `on_sample` runs one vital sample through the whole engine:
//!
//! 1. load resident + threshold profile (missing or inactive ⇒ skipped)
//! 2. record the raw sample
//! 3. publish `vital_update`
//! 4. evaluate thresholds → dedup → `alert_created` → notify if critical
//! 5. fall detection on a complete accelerometer reading, same alert path
//! 6. low battery, same alert path
//!
//! Alert creation, the dedup window and device last-seen use the server's
//! ingestion time; the device clock only drives the fall timers.
//!
//! Every side effect returns a `Result`. A failed sample insert aborts the
//! sample. A failed alert write is held while the remaining stages run, then
//! returned. Broadcast and notify failures are logged and counted in the
//! report.
//! Callers must not run two samples for the same resident concurrently;
//! `IngestRouter` provides that ordering.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::config::MonitorConfig;
use crate::core_state::{CoreError, Database};
use crate::db::{self, DatabaseError};
use crate::models::{
    Alert, AlertCandidate, AlertCategory, AlertSeverity, Resident, SampleValidationError,
    ThresholdError, ThresholdProfile, ThresholdUpdate, VitalSample,
};

use super::broadcast::Broadcaster;
use super::dedup::{Admission, AlertDeduplicator};
use super::fall::{FallEvent, FallStateStore};
use super::lifecycle::{self, AlertAction, LifecycleError};
use super::notify::Notifier;
use super::thresholds::{self, Violation};
use super::watchdog::{DeviceWatchdog, SilentDevice};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Invalid sample: {0}")]
    InvalidSample(#[from] SampleValidationError),

    #[error("Invalid thresholds: {0}")]
    InvalidThresholds(#[from] ThresholdError),

    #[error("Resident {0} not found")]
    ResidentNotFound(Uuid),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Store unavailable: {0}")]
    Store(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("Fall state lock poisoned")]
    StateLockPoisoned,
}

/// Why a sample was not processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    UnknownResident,
    InactiveResident,
}

/// What one sample did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestReport {
    pub created: Vec<Alert>,
    /// Ids of the existing alerts that absorbed a suppressed candidate.
    pub suppressed: Vec<Uuid>,
    pub fall: Option<FallEvent>,
    /// No threshold profile was stored, so thresholds were not evaluated.
    pub evaluation_skipped: bool,
    pub broadcast_failures: usize,
    pub notify_failures: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum IngestOutcome {
    Skipped { reason: SkipReason },
    Processed(IngestReport),
}

impl IngestOutcome {
    pub fn report(&self) -> Option<&IngestReport> {
        match self {
            Self::Processed(r) => Some(r),
            Self::Skipped { .. } => None,
        }
    }
}

/// Result of one maintenance sweep.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MaintenanceReport {
    pub disconnected: Vec<Alert>,
    pub evicted_fall_states: usize,
    /// Silent devices whose alert could not be written. They stay tracked
    /// and are retried on the next sweep.
    pub failed: usize,
}

pub struct VitalIngestCoordinator {
    db: Arc<Database>,
    broadcaster: Arc<dyn Broadcaster>,
    notifier: Arc<dyn Notifier>,
    falls: Mutex<FallStateStore>,
    watchdog: Mutex<DeviceWatchdog>,
    dedup: AlertDeduplicator,
    low_battery_percent: i32,
    fall_state_ttl: chrono::Duration,
}

impl VitalIngestCoordinator {
    pub fn new(
        db: Arc<Database>,
        broadcaster: Arc<dyn Broadcaster>,
        notifier: Arc<dyn Notifier>,
        config: &MonitorConfig,
    ) -> Self {
        Self {
            db,
            broadcaster,
            notifier,
            falls: Mutex::new(FallStateStore::new(config.fall)),
            watchdog: Mutex::new(DeviceWatchdog::new(config.device_timeout())),
            dedup: AlertDeduplicator::new(config.dedup_window()),
            low_battery_percent: config.low_battery_percent,
            fall_state_ttl: config.fall_state_ttl(),
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    fn falls(&self) -> Result<MutexGuard<'_, FallStateStore>, MonitorError> {
        self.falls.lock().map_err(|_| MonitorError::StateLockPoisoned)
    }

    fn watchdog(&self) -> Result<MutexGuard<'_, DeviceWatchdog>, MonitorError> {
        self.watchdog.lock().map_err(|_| MonitorError::StateLockPoisoned)
    }

    // ── Ingestion ───────────────────────────────────────────

    pub fn on_sample(&self, sample: &VitalSample) -> Result<IngestOutcome, MonitorError> {
        self.on_sample_at(sample, Utc::now())
    }

    /// Process a sample received at `received_at` (server clock).
    pub fn on_sample_at(
        &self,
        sample: &VitalSample,
        received_at: DateTime<Utc>,
    ) -> Result<IngestOutcome, MonitorError> {
        sample.validate()?;
        let resident_id = sample.resident_id;

        let (resident, profile) = {
            let conn = self.db.lock()?;
            let resident = match db::get_resident(&conn, &resident_id)? {
                Some(r) if r.active => r,
                found => {
                    drop(conn);
                    let reason = if found.is_some() {
                        SkipReason::InactiveResident
                    } else {
                        SkipReason::UnknownResident
                    };
                    tracing::info!(%resident_id, ?reason, "Sample skipped");
                    self.forget_resident(&resident_id)?;
                    return Ok(IngestOutcome::Skipped { reason });
                }
            };
            let profile = db::get_threshold_profile(&conn, &resident_id)?;
            db::insert_vital_sample(&conn, sample)?;
            (resident, profile)
        };

        self.watchdog()?
            .record(resident_id, resident.facility_id, received_at);

        let mut report = IngestReport::default();
        let mut held: Option<MonitorError> = None;

        if let Err(e) = self.broadcaster.publish_vital_update(
            resident.facility_id,
            resident_id,
            sample.data_snapshot(),
            sample.timestamp,
        ) {
            tracing::warn!(%resident_id, error = %e, "vital_update broadcast failed");
            report.broadcast_failures += 1;
        }

        match &profile {
            Some(profile) => {
                for violation in thresholds::evaluate(sample, profile) {
                    let candidate = violation_candidate(&resident, sample, violation);
                    hold_first(&mut held, self.raise(candidate, received_at, &mut report));
                }
            }
            None => {
                tracing::warn!(%resident_id, "No threshold profile, evaluation skipped");
                report.evaluation_skipped = true;
            }
        }

        if let Some(reading) = sample.axis_reading() {
            let event = self.falls()?.process(resident_id, &reading, received_at);
            if let Some(mut event) = event {
                event.location = resident.room.clone();
                tracing::warn!(
                    %resident_id,
                    impact_g = event.impact_magnitude,
                    "Fall detected"
                );
                let candidate = fall_candidate(&resident, &event);
                report.fall = Some(event);
                hold_first(&mut held, self.raise(candidate, received_at, &mut report));
            }
        }

        if let Some(level) = sample.battery_level {
            if level < self.low_battery_percent {
                let candidate = AlertCandidate {
                    resident_id,
                    facility_id: resident.facility_id,
                    category: AlertCategory::LowBattery,
                    severity: AlertSeverity::Info,
                    message: format!(
                        "Device battery at {level}% (charge below {}%)",
                        self.low_battery_percent
                    ),
                    vital_data: serde_json::json!({ "batteryLevel": level }),
                };
                hold_first(&mut held, self.raise(candidate, received_at, &mut report));
            }
        }

        if let Some(e) = held {
            return Err(e);
        }

        tracing::debug!(
            %resident_id,
            created = report.created.len(),
            suppressed = report.suppressed.len(),
            "Sample processed"
        );
        Ok(IngestOutcome::Processed(report))
    }

    /// Process a batch in order. One sample failing does not stop the rest.
    pub fn ingest_batch(&self, samples: &[VitalSample]) -> Vec<Result<IngestOutcome, MonitorError>> {
        samples
            .iter()
            .map(|sample| {
                let result = self.on_sample(sample);
                if let Err(e) = &result {
                    tracing::error!(resident_id = %sample.resident_id, error = %e, "Sample failed");
                }
                result
            })
            .collect()
    }

    /// Admit a candidate, then publish and notify if it is new.
    fn raise(
        &self,
        candidate: AlertCandidate,
        now: DateTime<Utc>,
        report: &mut IngestReport,
    ) -> Result<(), MonitorError> {
        let admission = {
            let conn = self.db.lock()?;
            self.dedup.admit(&conn, candidate, now)?
        };

        let alert = match admission {
            Admission::Suppressed(existing) => {
                tracing::debug!(
                    alert_id = %existing.id,
                    category = existing.category.as_str(),
                    "Duplicate alert suppressed"
                );
                report.suppressed.push(existing.id);
                return Ok(());
            }
            Admission::Created(alert) => alert,
        };

        tracing::info!(
            alert_id = %alert.id,
            resident_id = %alert.resident_id,
            category = alert.category.as_str(),
            severity = alert.severity.as_str(),
            "Alert raised"
        );

        if let Err(e) = self.broadcaster.publish_alert_created(alert.facility_id, &alert) {
            tracing::warn!(alert_id = %alert.id, error = %e, "alert_created broadcast failed");
            report.broadcast_failures += 1;
        }
        if alert.severity == AlertSeverity::Critical {
            if let Err(e) = self.notifier.notify_critical(&alert) {
                tracing::warn!(alert_id = %alert.id, error = %e, "Critical notification failed");
                report.notify_failures += 1;
            }
        }
        report.created.push(alert);
        Ok(())
    }

    // ── Staff actions ───────────────────────────────────────

    /// Apply a lifecycle action to a stored alert and publish the update.
    pub fn transition_alert(
        &self,
        alert_id: &Uuid,
        action: &AlertAction,
        now: DateTime<Utc>,
    ) -> Result<Alert, MonitorError> {
        let alert = {
            let conn = self.db.lock()?;
            lifecycle::apply_to_stored(&conn, alert_id, action, now)?
        };
        tracing::info!(%alert_id, action = action.verb(), status = alert.status.as_str(), "Alert updated");
        if let Err(e) = self.broadcaster.publish_alert_updated(alert.facility_id, &alert) {
            tracing::warn!(%alert_id, error = %e, "alert_updated broadcast failed");
        }
        Ok(alert)
    }

    pub fn thresholds(&self, resident_id: &Uuid) -> Result<ThresholdProfile, MonitorError> {
        let conn = self.db.lock()?;
        if db::get_resident(&conn, resident_id)?.is_none() {
            return Err(MonitorError::ResidentNotFound(*resident_id));
        }
        Ok(db::get_threshold_profile(&conn, resident_id)?
            .unwrap_or_else(|| ThresholdProfile::defaults_for(*resident_id)))
    }

    /// Replace a resident's profile. Takes effect from the next sample.
    pub fn update_thresholds(
        &self,
        resident_id: &Uuid,
        update: &ThresholdUpdate,
        now: DateTime<Utc>,
    ) -> Result<ThresholdProfile, MonitorError> {
        let conn = self.db.lock()?;
        if db::get_resident(&conn, resident_id)?.is_none() {
            return Err(MonitorError::ResidentNotFound(*resident_id));
        }
        let current = db::get_threshold_profile(&conn, resident_id)?
            .unwrap_or_else(|| ThresholdProfile::defaults_for(*resident_id));
        let next = current.apply(update, now)?;
        db::upsert_threshold_profile(&conn, &next)?;
        tracing::info!(%resident_id, "Threshold profile updated");
        Ok(next)
    }

    /// Mark a resident inactive and drop its in-memory state.
    pub fn deactivate_resident(&self, resident_id: &Uuid) -> Result<(), MonitorError> {
        {
            let conn = self.db.lock()?;
            match db::set_resident_active(&conn, resident_id, false) {
                Err(DatabaseError::NotFound { .. }) => {
                    return Err(MonitorError::ResidentNotFound(*resident_id))
                }
                other => other?,
            }
        }
        self.forget_resident(resident_id)?;
        tracing::info!(%resident_id, "Resident deactivated");
        Ok(())
    }

    fn forget_resident(&self, resident_id: &Uuid) -> Result<(), MonitorError> {
        if self.falls()?.evict(resident_id) {
            tracing::debug!(%resident_id, "Fall state evicted");
        }
        self.watchdog()?.forget(resident_id);
        Ok(())
    }

    // ── Maintenance ─────────────────────────────────────────

    /// Raise `device_disconnected` for silent devices and evict idle fall state.
    pub fn run_maintenance(&self, now: DateTime<Utc>) -> Result<MaintenanceReport, MonitorError> {
        let silent = self.watchdog()?.sweep(now);
        let evicted_fall_states = self.falls()?.evict_idle(now, self.fall_state_ttl);

        let mut report = IngestReport::default();
        let mut failed = 0;
        for device in silent {
            tracing::warn!(
                resident_id = %device.resident_id,
                last_seen = %device.last_seen,
                "Device stopped reporting"
            );
            if let Err(e) = self.raise(disconnect_candidate(&device, now), now, &mut report) {
                tracing::error!(
                    resident_id = %device.resident_id,
                    error = %e,
                    "device_disconnected alert failed, retrying next sweep"
                );
                self.watchdog()?
                    .record(device.resident_id, device.facility_id, device.last_seen);
                failed += 1;
            }
        }

        Ok(MaintenanceReport {
            disconnected: report.created,
            evicted_fall_states,
            failed,
        })
    }

    pub fn tracked_fall_states(&self) -> usize {
        self.falls().map(|f| f.len()).unwrap_or(0)
    }
}

/// Keep the first alert-write failure; later stages still run.
fn hold_first(held: &mut Option<MonitorError>, result: Result<(), MonitorError>) {
    if let Err(e) = result {
        tracing::error!(error = %e, "Alert write failed");
        held.get_or_insert(e);
    }
}

fn violation_candidate(resident: &Resident, sample: &VitalSample, v: Violation) -> AlertCandidate {
    AlertCandidate {
        resident_id: resident.id,
        facility_id: resident.facility_id,
        category: v.category,
        severity: v.severity,
        message: v.message,
        vital_data: sample.data_snapshot(),
    }
}

fn fall_candidate(resident: &Resident, event: &FallEvent) -> AlertCandidate {
    let message = match &event.location {
        Some(room) => format!(
            "Fall detected in {room} (impact {:.1} g, no movement for {} s)",
            event.impact_magnitude,
            event.inactivity_duration_ms / 1000
        ),
        None => format!(
            "Fall detected (impact {:.1} g, no movement for {} s)",
            event.impact_magnitude,
            event.inactivity_duration_ms / 1000
        ),
    };
    AlertCandidate {
        resident_id: resident.id,
        facility_id: resident.facility_id,
        category: AlertCategory::FallDetected,
        severity: AlertSeverity::Critical,
        message,
        vital_data: serde_json::to_value(event).unwrap_or(serde_json::Value::Null),
    }
}

fn disconnect_candidate(device: &SilentDevice, now: DateTime<Utc>) -> AlertCandidate {
    AlertCandidate {
        resident_id: device.resident_id,
        facility_id: device.facility_id,
        category: AlertCategory::DeviceDisconnected,
        severity: AlertSeverity::Warning,
        message: format!(
            "No data from device for {} minutes",
            device.silent_for(now).num_minutes()
        ),
        vital_data: serde_json::json!({ "lastSeen": device.last_seen }),
    }
}
