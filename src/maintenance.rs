//! Background maintenance sweep.
//!
//! A dedicated thread wakes every `maintenance_interval` and asks the
//! coordinator to raise `device_disconnected` alerts for silent devices and
//! to drop idle fall-detection state.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::monitoring::VitalIngestCoordinator;

/// Sleep granularity for shutdown responsiveness.
const SLEEP_GRANULARITY: Duration = Duration::from_millis(250);

/// Handle for the maintenance thread. Dropping it stops and joins the thread.
pub struct MaintenanceHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<std::thread::JoinHandle<()>>,
}

impl MaintenanceHandle {
    /// Request shutdown. A sweep in progress completes first.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl Drop for MaintenanceHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }
}

pub fn start_maintenance(
    coordinator: Arc<VitalIngestCoordinator>,
    interval: Duration,
) -> MaintenanceHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = std::thread::spawn(move || {
        tracing::info!(interval_secs = interval.as_secs(), "Maintenance sweep started");
        maintenance_loop(&coordinator, interval, &flag);
        tracing::info!("Maintenance sweep shutting down");
    });

    MaintenanceHandle {
        shutdown,
        handle: Some(handle),
    }
}

fn maintenance_loop(coordinator: &VitalIngestCoordinator, interval: Duration, shutdown: &AtomicBool) {
    loop {
        let mut slept = Duration::ZERO;
        while slept < interval {
            if shutdown.load(Ordering::Relaxed) {
                return;
            }
            let step = SLEEP_GRANULARITY.min(interval - slept);
            std::thread::sleep(step);
            slept += step;
        }

        match coordinator.run_maintenance(Utc::now()) {
            Ok(report) => {
                if !report.disconnected.is_empty()
                    || report.evicted_fall_states > 0
                    || report.failed > 0
                {
                    tracing::info!(
                        disconnected = report.disconnected.len(),
                        evicted_fall_states = report.evicted_fall_states,
                        failed = report.failed,
                        "Maintenance sweep"
                    );
                }
            }
            Err(e) => tracing::error!(error = %e, "Maintenance sweep failed"),
        }
    }
}
