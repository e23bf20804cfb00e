//! Execution scheduling
//!
//! A fixed pool of workers pulls jobs from one shared bounded queue,
//! capping concurrent browser instances at the configured worker count.
//! The queue holds `2 x max_workers` entries; a full queue suspends the
//! submitting caller, which is the system's backpressure mechanism and
//! not an error.

use crate::driver::StepDriver;
use parking_lot::{Mutex as SyncMutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uireplay_common::{Error, ExecutionJob, ExecutionResult, Result};

struct QueuedJob {
    job: ExecutionJob,
    cancel: CancellationToken,
    result_tx: oneshot::Sender<ExecutionResult>,
}

/// Execution ids currently in flight, each with its cancellation token.
/// Presence in this map is the sole source of truth for "still running".
type RunningSet = Arc<RwLock<HashMap<u64, CancellationToken>>>;

/// Bounded worker pool for test execution jobs.
pub struct Scheduler {
    queue_tx: SyncMutex<Option<mpsc::Sender<QueuedJob>>>,
    running: RunningSet,
    workers: SyncMutex<Vec<JoinHandle<()>>>,
}

impl Scheduler {
    /// Start `max_workers` persistent workers sharing one bounded queue.
    pub fn start(max_workers: usize, driver: Arc<StepDriver>) -> Result<Self> {
        if max_workers == 0 {
            return Err(Error::InvalidConfig(
                "scheduler requires at least one worker".to_string(),
            ));
        }

        let (queue_tx, queue_rx) = mpsc::channel::<QueuedJob>(max_workers * 2);
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let running: RunningSet = Arc::new(RwLock::new(HashMap::new()));

        let mut workers = Vec::with_capacity(max_workers);
        for worker_id in 0..max_workers {
            workers.push(tokio::spawn(worker_loop(
                worker_id,
                Arc::clone(&queue_rx),
                Arc::clone(&running),
                Arc::clone(&driver),
            )));
        }

        info!("Test executor initialized with {} workers", max_workers);

        Ok(Self {
            queue_tx: SyncMutex::new(Some(queue_tx)),
            running,
            workers: SyncMutex::new(workers),
        })
    }

    /// Submit a job, returning the single-use channel its result arrives
    /// on.
    ///
    /// Suspends while the queue is full; wrap in `tokio::time::timeout`
    /// for a bounded wait. The job enters the running set once queue
    /// capacity is secured and leaves it when its worker publishes the
    /// result, so an abandoned submission leaves no bookkeeping behind.
    pub async fn submit(&self, job: ExecutionJob) -> Result<oneshot::Receiver<ExecutionResult>> {
        let tx = self
            .queue_tx
            .lock()
            .clone()
            .ok_or(Error::ShuttingDown)?;

        // Backpressure point: waits for a queue slot.
        let permit = tx.reserve().await.map_err(|_| Error::ShuttingDown)?;

        let cancel = CancellationToken::new();
        let execution_id = job.execution_id;
        self.running.write().insert(execution_id, cancel.clone());

        let (result_tx, result_rx) = oneshot::channel();
        permit.send(QueuedJob {
            job,
            cancel,
            result_tx,
        });

        debug!(execution_id, "job enqueued");
        Ok(result_rx)
    }

    /// Whether an execution id is still in flight.
    pub fn is_running(&self, execution_id: u64) -> bool {
        self.running.read().contains_key(&execution_id)
    }

    /// Point-in-time count of in-flight executions.
    pub fn running_count(&self) -> usize {
        self.running.read().len()
    }

    /// Best-effort cancellation: deregisters the id and fires its
    /// cancellation token.
    ///
    /// Returns true if the id was in flight. The job's worker observes
    /// the token at its next suspension point and publishes a
    /// cancelled-flavoured failed result; callers must not assume the
    /// browser has terminated by the time this returns.
    pub fn cancel(&self, execution_id: u64) -> bool {
        let token = self.running.write().remove(&execution_id);
        match token {
            Some(token) => {
                token.cancel();
                info!(execution_id, "execution cancelled");
                true
            }
            None => false,
        }
    }

    /// Stop accepting jobs and wait for in-flight work to finish.
    pub async fn shutdown(&self) {
        // Dropping the sender closes the queue; workers exit when it
        // drains.
        let tx = self.queue_tx.lock().take();
        drop(tx);

        let workers = std::mem::take(&mut *self.workers.lock());
        for worker in workers {
            if let Err(e) = worker.await {
                warn!("Worker terminated abnormally: {}", e);
            }
        }
        info!("Test executor stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue_rx: Arc<Mutex<mpsc::Receiver<QueuedJob>>>,
    running: RunningSet,
    driver: Arc<StepDriver>,
) {
    loop {
        // Hold the receiver lock only while waiting for the next job so
        // idle workers queue up fairly behind it.
        let queued = queue_rx.lock().await.recv().await;
        let Some(QueuedJob {
            job,
            cancel,
            result_tx,
        }) = queued
        else {
            debug!(worker_id, "queue closed, worker exiting");
            return;
        };

        let execution_id = job.execution_id;
        debug!(worker_id, execution_id, "job dequeued");

        let result = driver.run(&job, &cancel).await;

        running.write().remove(&execution_id);

        // The receiver may be gone if the caller lost interest; the
        // result is complete either way and is never modified again.
        if result_tx.send(result).is_err() {
            debug!(execution_id, "result receiver dropped");
        }
    }
}
