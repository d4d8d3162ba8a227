//! Fall detection over accelerometer magnitude.
//!
//! Per-resident state machine:
//!
//! ```text
//!   Idle ──(magnitude > impact)──▶ ImpactPending
//!   ImpactPending ──(still < inactivity for ≥ duration)──▶ Idle + FallEvent
//!   ImpactPending ──(movement within 5s of impact)──▶ Idle   (false positive)
//!   ImpactPending ──(> 60s since impact)──▶ Idle             (timeout)
//! ```
//!
//! All timers use the device's own millisecond timestamps, evaluated per
//! reading. State lives in memory only; `FallStateStore` owns one entry per
//! resident, created on first reading and evicted on deactivation or after
//! an idle TTL.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::AxisReading;

/// Readings older than this are dropped from the rolling buffer.
const BUFFER_WINDOW_MS: i64 = 30_000;

/// Movement this soon after an impact means the impact was not a fall.
const FALSE_POSITIVE_WINDOW_MS: i64 = 5_000;

/// A pending impact with no resolution is abandoned after this long.
const PENDING_TIMEOUT_MS: i64 = 60_000;

/// Deployment-level fall detection parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FallConfig {
    /// Magnitude (g) above which a reading counts as an impact.
    pub impact_threshold_g: f64,
    /// Magnitude (g) below which the wearer counts as motionless.
    pub inactivity_threshold_g: f64,
    /// How long the wearer must stay motionless after an impact.
    pub inactivity_duration_ms: i64,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            impact_threshold_g: 2.5,
            inactivity_threshold_g: 0.5,
            inactivity_duration_ms: 10_000,
        }
    }
}

/// A confirmed fall: impact followed by prolonged inactivity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FallEvent {
    pub impact_magnitude: f64,
    /// Device time of the impact, epoch milliseconds.
    pub impact_time: i64,
    pub inactivity_duration_ms: i64,
    pub location: Option<String>,
}

/// Mutable detection state for one resident.
#[derive(Debug, Clone, Default)]
pub struct FallDetectionState {
    pub impact_detected: bool,
    pub impact_time: Option<i64>,
    pub impact_magnitude: f64,
    pub inactivity_start_time: Option<i64>,
    /// `(magnitude, timestamp_ms)` for the last 30 seconds.
    pub recent_buffer: VecDeque<(f64, i64)>,
}

impl FallDetectionState {
    pub fn is_pending(&self) -> bool {
        self.impact_detected
    }

    fn reset(&mut self) {
        self.impact_detected = false;
        self.impact_time = None;
        self.impact_magnitude = 0.0;
        self.inactivity_start_time = None;
        self.recent_buffer.clear();
    }

    fn push_reading(&mut self, magnitude: f64, now: i64) {
        self.recent_buffer.push_back((magnitude, now));
        while let Some(&(_, ts)) = self.recent_buffer.front() {
            if now - ts > BUFFER_WINDOW_MS {
                self.recent_buffer.pop_front();
            } else {
                break;
            }
        }
    }

    /// Advance the state machine by one reading.
    pub fn process(&mut self, config: &FallConfig, reading: &AxisReading) -> Option<FallEvent> {
        let magnitude = reading.magnitude();
        let now = reading.timestamp_ms;
        self.push_reading(magnitude, now);

        if !self.impact_detected {
            if magnitude > config.impact_threshold_g {
                self.impact_detected = true;
                self.impact_time = Some(now);
                self.impact_magnitude = magnitude;
                tracing::debug!(magnitude, "Impact detected, watching for inactivity");
            }
            return None;
        }

        let impact_time = self.impact_time.unwrap_or(now);

        if now - impact_time > PENDING_TIMEOUT_MS {
            tracing::debug!("Pending impact timed out without a fall");
            self.reset();
            return None;
        }

        if magnitude < config.inactivity_threshold_g {
            let started = *self.inactivity_start_time.get_or_insert(now);
            let inactive_for = now - started;
            if inactive_for >= config.inactivity_duration_ms {
                let event = FallEvent {
                    impact_magnitude: self.impact_magnitude,
                    impact_time,
                    inactivity_duration_ms: inactive_for,
                    location: None,
                };
                self.reset();
                return Some(event);
            }
        } else {
            self.inactivity_start_time = None;
            if now - impact_time < FALSE_POSITIVE_WINDOW_MS {
                tracing::debug!(magnitude, "Movement right after impact, discarding");
                self.reset();
            }
        }
        None
    }
}

struct TrackedState {
    state: FallDetectionState,
    last_seen: DateTime<Utc>,
}

/// Owns fall detection state for every resident with a live accelerometer.
pub struct FallStateStore {
    config: FallConfig,
    states: HashMap<Uuid, TrackedState>,
}

impl FallStateStore {
    pub fn new(config: FallConfig) -> Self {
        Self {
            config,
            states: HashMap::new(),
        }
    }

    pub fn config(&self) -> &FallConfig {
        &self.config
    }

    /// Feed one reading for `resident_id`, creating its state on first use.
    /// `seen_at` is the ingestion time used for idle eviction.
    pub fn process(
        &mut self,
        resident_id: Uuid,
        reading: &AxisReading,
        seen_at: DateTime<Utc>,
    ) -> Option<FallEvent> {
        let tracked = self.states.entry(resident_id).or_insert_with(|| TrackedState {
            state: FallDetectionState::default(),
            last_seen: seen_at,
        });
        tracked.last_seen = tracked.last_seen.max(seen_at);
        tracked.state.process(&self.config, reading)
    }

    pub fn state(&self, resident_id: &Uuid) -> Option<&FallDetectionState> {
        self.states.get(resident_id).map(|t| &t.state)
    }

    /// Drop a resident's state (deactivation). Returns whether one existed.
    pub fn evict(&mut self, resident_id: &Uuid) -> bool {
        self.states.remove(resident_id).is_some()
    }

    /// Drop every state not fed since `now - ttl`. Returns how many were dropped.
    pub fn evict_idle(&mut self, now: DateTime<Utc>, ttl: chrono::Duration) -> usize {
        let before = self.states.len();
        self.states.retain(|_, t| now - t.last_seen < ttl);
        before - self.states.len()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(magnitude: f64, t: i64) -> AxisReading {
        AxisReading { x: 0.0, y: 0.0, z: magnitude, timestamp_ms: t }
    }

    fn run(state: &mut FallDetectionState, seq: &[(f64, i64)]) -> Vec<(i64, FallEvent)> {
        let config = FallConfig::default();
        seq.iter()
            .filter_map(|&(m, t)| state.process(&config, &reading(m, t)).map(|e| (t, e)))
            .collect()
    }

    #[test]
    fn impact_then_stillness_is_a_fall_at_ten_seconds() {
        let mut state = FallDetectionState::default();
        let mut seq = vec![(3.0, 0)];
        seq.extend((0..=10).map(|i| (0.2, i * 1000)));

        let events = run(&mut state, &seq);
        assert_eq!(events.len(), 1);
        let (at, event) = &events[0];
        assert_eq!(*at, 10_000);
        assert!((event.impact_magnitude - 3.0).abs() < 1e-9);
        assert_eq!(event.impact_time, 0);
        assert_eq!(event.inactivity_duration_ms, 10_000);

        assert!(!state.is_pending());
        assert!(state.impact_time.is_none());
        assert!(state.inactivity_start_time.is_none());
    }

    #[test]
    fn no_second_event_after_reset() {
        let mut state = FallDetectionState::default();
        let mut seq = vec![(3.0, 0)];
        seq.extend((0..=20).map(|i| (0.2, i * 1000)));
        assert_eq!(run(&mut state, &seq).len(), 1);
    }

    #[test]
    fn movement_within_five_seconds_is_false_positive() {
        let mut state = FallDetectionState::default();
        let events = run(&mut state, &[(3.0, 0), (0.2, 1000), (1.0, 2000)]);
        assert!(events.is_empty());
        assert!(!state.is_pending());

        // Stillness afterwards does not resurrect the impact
        let later: Vec<_> = (3..=20).map(|i| (0.2, i * 1000)).collect();
        assert!(run(&mut state, &later).is_empty());
    }

    #[test]
    fn late_movement_only_restarts_inactivity_timer() {
        let mut state = FallDetectionState::default();
        let mut seq = vec![(3.0, 0), (0.2, 1000), (0.2, 5000), (1.0, 6000)];
        assert!(run(&mut state, &seq).is_empty());
        assert!(state.is_pending());
        assert!(state.inactivity_start_time.is_none());

        // Inactivity restarts at 7000, fall confirmed at 17000
        seq = (7..=17).map(|i| (0.2, i * 1000)).collect();
        let events = run(&mut state, &seq);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].0, 17_000);
    }

    #[test]
    fn pending_impact_times_out_after_sixty_seconds() {
        let mut state = FallDetectionState::default();
        // Moving around (not still, not within false-positive window)
        let mut seq = vec![(3.0, 0)];
        seq.extend((6..=60).step_by(6).map(|s| (1.0, s * 1000)));
        assert!(run(&mut state, &seq).is_empty());
        assert!(state.is_pending());

        assert!(run(&mut state, &[(1.0, 60_001)]).is_empty());
        assert!(!state.is_pending());
    }

    #[test]
    fn below_impact_threshold_stays_idle() {
        let mut state = FallDetectionState::default();
        assert!(run(&mut state, &[(2.5, 0), (0.1, 1000)]).is_empty());
        assert!(!state.is_pending());
    }

    #[test]
    fn buffer_keeps_last_thirty_seconds() {
        let mut state = FallDetectionState::default();
        let seq: Vec<_> = (0..=40).map(|s| (1.0, s * 1000)).collect();
        run(&mut state, &seq);
        let oldest = state.recent_buffer.front().unwrap().1;
        assert_eq!(oldest, 10_000);
        assert_eq!(state.recent_buffer.len(), 31);
    }

    #[test]
    fn custom_config_changes_thresholds() {
        let config = FallConfig {
            impact_threshold_g: 1.8,
            inactivity_threshold_g: 0.3,
            inactivity_duration_ms: 3_000,
        };
        let mut state = FallDetectionState::default();
        assert!(state.process(&config, &reading(2.0, 0)).is_none());
        assert!(state.process(&config, &reading(0.1, 0)).is_none());
        assert!(state.process(&config, &reading(0.1, 3000)).is_some());
    }

    #[test]
    fn store_isolates_residents() {
        let mut store = FallStateStore::new(FallConfig::default());
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let now = Utc::now();

        store.process(a, &reading(3.0, 0), now);
        store.process(b, &reading(1.0, 0), now);
        assert!(store.state(&a).unwrap().is_pending());
        assert!(!store.state(&b).unwrap().is_pending());
        assert_eq!(store.len(), 2);

        assert!(store.evict(&a));
        assert!(!store.evict(&a));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn store_evicts_idle_states() {
        let mut store = FallStateStore::new(FallConfig::default());
        let stale = Uuid::new_v4();
        let fresh = Uuid::new_v4();
        let now = Utc::now();

        store.process(stale, &reading(1.0, 0), now - chrono::Duration::hours(25));
        store.process(fresh, &reading(1.0, 0), now - chrono::Duration::minutes(1));

        let evicted = store.evict_idle(now, chrono::Duration::hours(24));
        assert_eq!(evicted, 1);
        assert!(store.state(&stale).is_none());
        assert!(store.state(&fresh).is_some());
    }
}
