//! Real-time vital-sign alerting engine.
//!
//! Leaf-first: `thresholds` and `fall` are pure evaluators, `dedup` and
//! `lifecycle` own the alert rows, `broadcast` and `notify` are the outward
//! seams, `coordinator` ties them together per sample and `ingest` orders
//! samples per resident.

pub mod broadcast;
pub mod coordinator;
pub mod dedup;
pub mod fall;
pub mod ingest;
pub mod lifecycle;
pub mod notify;
pub mod thresholds;
pub mod watchdog;

pub use broadcast::{BroadcastError, Broadcaster, MonitorEvent, Subscription, Topic, TopicBroadcaster};
pub use coordinator::{
    IngestOutcome, IngestReport, MaintenanceReport, MonitorError, SkipReason, VitalIngestCoordinator,
};
pub use dedup::{Admission, AlertDeduplicator, DEFAULT_DEDUP_WINDOW_SECS};
pub use fall::{FallConfig, FallDetectionState, FallEvent, FallStateStore};
pub use ingest::{IngestRouter, RouterError};
pub use lifecycle::{AlertAction, AlertMetrics, LifecycleError};
pub use notify::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
pub use thresholds::{evaluate, ThresholdBand, Violation};
pub use watchdog::{DeviceWatchdog, SilentDevice, DEFAULT_DEVICE_TIMEOUT_SECS};
