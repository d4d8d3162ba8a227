//! Per-resident ingest serialization.
//!
//! Each resident with traffic gets one worker task fed by an unbounded
//! channel. A worker runs its resident's samples strictly in arrival order
//! (the coordinator itself runs on the blocking pool), while different
//! residents proceed in parallel. Workers retire after an idle period.
//!
//! Sends and retirement both happen under the registry lock: a retiring
//! worker re-checks its queue while holding the lock, so a sample is either
//! seen by the old worker or dispatched to a fresh one, never both.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use uuid::Uuid;

use crate::models::VitalSample;

use super::coordinator::{IngestOutcome, MonitorError, VitalIngestCoordinator};

#[derive(Debug, Error)]
pub enum RouterError {
    #[error("Worker registry lock poisoned")]
    LockPoisoned,
    #[error("No async runtime available")]
    NoRuntime,
    #[error("Ingest worker stopped before replying")]
    WorkerGone,
    #[error(transparent)]
    Monitor(#[from] MonitorError),
}

struct Job {
    sample: VitalSample,
    reply: Option<oneshot::Sender<Result<IngestOutcome, RouterError>>>,
}

struct Worker {
    tx: mpsc::UnboundedSender<Job>,
    generation: u64,
}

#[derive(Default)]
struct Registry {
    workers: HashMap<Uuid, Worker>,
    next_generation: u64,
}

#[derive(Clone)]
pub struct IngestRouter {
    coordinator: Arc<VitalIngestCoordinator>,
    registry: Arc<Mutex<Registry>>,
    idle: Duration,
}

impl IngestRouter {
    pub fn new(coordinator: Arc<VitalIngestCoordinator>, idle: Duration) -> Self {
        Self {
            coordinator,
            registry: Arc::new(Mutex::new(Registry::default())),
            idle,
        }
    }

    pub fn coordinator(&self) -> &Arc<VitalIngestCoordinator> {
        &self.coordinator
    }

    /// Queue a sample without waiting for it to be processed.
    pub fn submit(&self, sample: VitalSample) -> Result<(), RouterError> {
        self.dispatch(Job { sample, reply: None })
    }

    /// Queue a sample and wait for its outcome.
    pub async fn process(&self, sample: VitalSample) -> Result<IngestOutcome, RouterError> {
        let (tx, rx) = oneshot::channel();
        self.dispatch(Job {
            sample,
            reply: Some(tx),
        })?;
        rx.await.map_err(|_| RouterError::WorkerGone)?
    }

    pub fn active_workers(&self) -> usize {
        self.registry.lock().map(|r| r.workers.len()).unwrap_or(0)
    }

    fn dispatch(&self, job: Job) -> Result<(), RouterError> {
        let resident_id = job.sample.resident_id;
        let mut registry = self.registry.lock().map_err(|_| RouterError::LockPoisoned)?;

        let job = match registry.workers.get(&resident_id) {
            Some(worker) => match worker.tx.send(job) {
                Ok(()) => return Ok(()),
                // Worker exited without deregistering; replace it.
                Err(mpsc::error::SendError(job)) => job,
            },
            None => job,
        };

        let runtime = Handle::try_current().map_err(|_| RouterError::NoRuntime)?;
        let (tx, rx) = mpsc::unbounded_channel();
        if tx.send(job).is_err() {
            return Err(RouterError::WorkerGone);
        }
        let generation = registry.next_generation;
        registry.next_generation += 1;
        registry.workers.insert(resident_id, Worker { tx, generation });
        drop(registry);

        tracing::debug!(%resident_id, "Ingest worker started");
        runtime.spawn(worker_loop(
            resident_id,
            generation,
            rx,
            self.coordinator.clone(),
            self.registry.clone(),
            self.idle,
        ));
        Ok(())
    }
}

async fn worker_loop(
    resident_id: Uuid,
    generation: u64,
    mut rx: mpsc::UnboundedReceiver<Job>,
    coordinator: Arc<VitalIngestCoordinator>,
    registry: Arc<Mutex<Registry>>,
    idle: Duration,
) {
    loop {
        let job = match tokio::time::timeout(idle, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => break,
            Err(_) => match retire_or_take(&registry, resident_id, generation, &mut rx) {
                Some(job) => job,
                None => break,
            },
        };
        run_job(&coordinator, job).await;
    }
}

/// Called after an idle timeout. Under the registry lock, either take a
/// sample that raced in or deregister this worker.
fn retire_or_take(
    registry: &Mutex<Registry>,
    resident_id: Uuid,
    generation: u64,
    rx: &mut mpsc::UnboundedReceiver<Job>,
) -> Option<Job> {
    let mut registry = registry.lock().ok()?;
    if let Ok(job) = rx.try_recv() {
        return Some(job);
    }
    if registry
        .workers
        .get(&resident_id)
        .is_some_and(|w| w.generation == generation)
    {
        registry.workers.remove(&resident_id);
    }
    tracing::debug!(%resident_id, "Ingest worker retired");
    None
}

async fn run_job(coordinator: &Arc<VitalIngestCoordinator>, job: Job) {
    let Job { sample, reply } = job;
    let resident_id = sample.resident_id;
    let coordinator = coordinator.clone();

    let result = match tokio::task::spawn_blocking(move || coordinator.on_sample(&sample)).await {
        Ok(result) => result.map_err(RouterError::Monitor),
        Err(e) => {
            tracing::error!(%resident_id, error = %e, "Ingest task panicked");
            Err(RouterError::WorkerGone)
        }
    };

    match reply {
        Some(reply) => {
            let _ = reply.send(result);
        }
        None => {
            if let Err(e) = result {
                tracing::error!(%resident_id, error = %e, "Sample dropped");
            }
        }
    }
}
