//! Shared service state.
//!
//! `CoreState` is built once at startup, wrapped in `Arc`, and handed to
//! the HTTP layer and the maintenance loop. It owns the care store, the
//! topic broadcaster, and the ingest pipeline.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

use rusqlite::Connection;

use crate::config::MonitorConfig;
use crate::db;
use crate::monitoring::{
    IngestRouter, LogNotifier, Notifier, NotifyError, TopicBroadcaster, VitalIngestCoordinator,
    WebhookNotifier,
};

// ═══════════════════════════════════════════════════════════
// Database: single shared SQLite connection
// ═══════════════════════════════════════════════════════════

/// The care store. One connection behind a mutex; every caller holds the
/// guard only for the duration of its statements.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) and migrate the database at `path`.
    pub fn open(path: &Path) -> Result<Self, CoreError> {
        let conn = db::open_database(path)?;
        tracing::info!(path = %path.display(), "Care store opened");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> Result<Self, CoreError> {
        Ok(Self {
            conn: Mutex::new(db::open_memory_database()?),
        })
    }

    pub fn lock(&self) -> Result<MutexGuard<'_, Connection>, CoreError> {
        self.conn.lock().map_err(|_| CoreError::LockPoisoned)
    }
}

// ═══════════════════════════════════════════════════════════
// CoreState
// ═══════════════════════════════════════════════════════════

pub struct CoreState {
    pub config: MonitorConfig,
    pub db: Arc<Database>,
    pub broadcaster: Arc<TopicBroadcaster>,
    pub coordinator: Arc<VitalIngestCoordinator>,
    pub router: IngestRouter,
    started_at: Instant,
}

impl CoreState {
    /// Build the state, picking the notifier from the configuration.
    ///
    /// A webhook notifier needs a running tokio runtime.
    pub fn new(config: MonitorConfig, db: Database) -> Result<Self, CoreError> {
        let notifier: Arc<dyn Notifier> = match &config.notify_webhook {
            Some(url) => {
                tracing::info!(%url, "Critical alerts forwarded to webhook");
                Arc::new(WebhookNotifier::new(url.clone())?)
            }
            None => Arc::new(LogNotifier),
        };
        Ok(Self::with_notifier(config, db, notifier))
    }

    pub fn with_notifier(config: MonitorConfig, db: Database, notifier: Arc<dyn Notifier>) -> Self {
        let db = Arc::new(db);
        let broadcaster = Arc::new(TopicBroadcaster::default());
        let coordinator = Arc::new(VitalIngestCoordinator::new(
            db.clone(),
            broadcaster.clone(),
            notifier,
            &config,
        ));
        let router = IngestRouter::new(coordinator.clone(), config.worker_idle);
        Self {
            config,
            db,
            broadcaster,
            coordinator,
            router,
            started_at: Instant::now(),
        }
    }

    /// In-memory store, log notifier, default config.
    pub fn in_memory() -> Result<Self, CoreError> {
        Ok(Self::with_notifier(
            MonitorConfig::default(),
            Database::in_memory()?,
            Arc::new(LogNotifier),
        ))
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

// ═══════════════════════════════════════════════════════════
// Error types
// ═══════════════════════════════════════════════════════════

/// Errors from CoreState operations.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Internal lock error")]
    LockPoisoned,
    #[error("Database error: {0}")]
    Database(#[from] db::DatabaseError),
    #[error("Notifier setup failed: {0}")]
    Notifier(#[from] NotifyError),
}
