use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::{Orchestrator, RunOutcome};
use crate::model::ComplianceLevel;

/// Everything a worker needs to run one admitted scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanJob {
    pub scan_id: String,
    pub url: String,
    pub level: ComplianceLevel,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub capacity: usize,
    pub queued: usize,
    pub active: usize,
    pub completed: u64,
    pub failed: u64,
}

#[derive(Default)]
struct Counters {
    queued: AtomicUsize,
    active: AtomicUsize,
    completed: AtomicU64,
    failed: AtomicU64,
}

/// Bounded hand-off between admission and the worker pool.
///
/// Admission takes a [`JobSlot`] before spending a credit, so a full queue
/// is refused without side effects.
pub struct ScanQueue {
    sender: mpsc::Sender<ScanJob>,
    capacity: usize,
    counters: Arc<Counters>,
}

/// A reserved place in the queue. Dropping it releases the place unused.
pub struct JobSlot {
    permit: mpsc::OwnedPermit<ScanJob>,
    counters: Arc<Counters>,
}

impl JobSlot {
    pub fn submit(self, job: ScanJob) {
        self.counters.queued.fetch_add(1, Ordering::SeqCst);
        debug!("Queued scan {}", job.scan_id);
        self.permit.send(job);
    }
}

impl ScanQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ScanJob>) {
        let capacity = capacity.max(1);
        let (sender, receiver) = mpsc::channel(capacity);
        (
            Self {
                sender,
                capacity,
                counters: Arc::new(Counters::default()),
            },
            receiver,
        )
    }

    /// `None` when the queue is full or the dispatcher has stopped.
    pub fn try_reserve(&self) -> Option<JobSlot> {
        let permit = self.sender.clone().try_reserve_owned().ok()?;
        Some(JobSlot {
            permit,
            counters: self.counters.clone(),
        })
    }

    pub fn stats(&self) -> QueueStats {
        QueueStats {
            capacity: self.capacity,
            queued: self.counters.queued.load(Ordering::SeqCst),
            active: self.counters.active.load(Ordering::SeqCst),
            completed: self.counters.completed.load(Ordering::SeqCst),
            failed: self.counters.failed.load(Ordering::SeqCst),
        }
    }

    /// Drain the queue, running at most `workers` scans at once. Jobs are
    /// never retried.
    pub fn spawn_dispatcher(
        &self,
        mut receiver: mpsc::Receiver<ScanJob>,
        orchestrator: Arc<Orchestrator>,
        workers: usize,
    ) -> JoinHandle<()> {
        let counters = self.counters.clone();
        let workers = workers.max(1);

        tokio::spawn(async move {
            info!("Scan dispatcher started with {} workers", workers);
            let semaphore = Arc::new(Semaphore::new(workers));

            while let Some(job) = receiver.recv().await {
                let permit = match semaphore.clone().acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => break,
                };
                counters.queued.fetch_sub(1, Ordering::SeqCst);
                let active = ActiveGuard::enter(counters.clone());
                let orchestrator = orchestrator.clone();

                tokio::spawn(async move {
                    let _permit = permit;
                    let outcome = orchestrator.run(&job).await;
                    active.finish(&outcome);
                });
            }

            info!("Scan dispatcher stopped");
        })
    }
}

/// Keeps the active count honest even if a run panics.
struct ActiveGuard {
    counters: Arc<Counters>,
}

impl ActiveGuard {
    fn enter(counters: Arc<Counters>) -> Self {
        counters.active.fetch_add(1, Ordering::SeqCst);
        Self { counters }
    }

    fn finish(self, outcome: &RunOutcome) {
        let counter = if outcome.is_completed() {
            &self.counters.completed
        } else {
            &self.counters.failed
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.counters.active.fetch_sub(1, Ordering::SeqCst);
    }
}
