//! Duplicate alert suppression.
//!
//! Policy: an alert candidate is suppressed when an open (`active` or
//! `acknowledged`) alert with the same resident and category was raised
//! within the window (default 5 minutes) before the candidate's evaluation
//! time. The lookup and the insert run in one `IMMEDIATE` transaction, so
//! two connections racing on the same resident cannot both insert.

use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, Transaction, TransactionBehavior};

use crate::db::{self, DatabaseError};
use crate::models::{Alert, AlertCandidate};

pub const DEFAULT_DEDUP_WINDOW_SECS: i64 = 300;

/// Result of running a candidate through the deduplicator.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// No open duplicate existed; the alert was persisted.
    Created(Alert),
    /// An open alert already covers this resident and category.
    Suppressed(Alert),
}

impl Admission {
    pub fn alert(&self) -> &Alert {
        match self {
            Self::Created(a) | Self::Suppressed(a) => a,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AlertDeduplicator {
    window: Duration,
}

impl Default for AlertDeduplicator {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_DEDUP_WINDOW_SECS))
    }
}

impl AlertDeduplicator {
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Atomically check for an open duplicate and insert `candidate` if none.
    pub fn admit(
        &self,
        conn: &Connection,
        candidate: AlertCandidate,
        now: DateTime<Utc>,
    ) -> Result<Admission, DatabaseError> {
        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

        let since = now - self.window;
        if let Some(existing) =
            db::find_open_alert_since(&tx, &candidate.resident_id, candidate.category, &since)?
        {
            tx.commit()?;
            return Ok(Admission::Suppressed(existing));
        }

        let alert = candidate.into_alert(now);
        db::insert_alert(&tx, &alert)?;
        tx.commit()?;
        Ok(Admission::Created(alert))
    }
}
