//! Background fetch queue: bounded channel plus a worker pool.
//!
//! Submission never blocks. A full queue rejects the job and the caller
//! decides what to do; a rejected fetch is simply retried by a later request.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use thiserror::Error;
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;

use mediasync_core::FetchConfig;

use crate::context::FetchHandler;

/// A media path to resolve in the background.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchJob {
    pub remote_key: String,
    pub local_path: String,
    pub store_code: String,
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("{0} queue is full, please try again later")]
    Full(&'static str),

    #[error("{0} queue is closed")]
    Closed(&'static str),
}

/// Non-blocking hand-off of background fetches.
pub trait FetchDispatcher: Send + Sync {
    fn dispatch(&self, job: FetchJob) -> Result<(), QueueError>;
}

#[derive(Debug, Clone, Copy)]
pub struct FetchQueueConfig {
    pub queue_size: usize,
    pub max_workers: usize,
}

impl Default for FetchQueueConfig {
    fn default() -> Self {
        Self {
            queue_size: 1000,
            max_workers: 4,
        }
    }
}

impl From<&FetchConfig> for FetchQueueConfig {
    fn from(config: &FetchConfig) -> Self {
        Self {
            queue_size: config.queue_size,
            max_workers: config.max_workers,
        }
    }
}

/// Jobs submitted but not finished, with a wake-up for [`FetchQueue::wait_idle`].
#[derive(Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn finish(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

#[derive(Clone)]
pub struct FetchQueue {
    tx: mpsc::Sender<FetchJob>,
    in_flight: Arc<InFlight>,
}

/// Receiving half of a [`FetchQueue`], not yet attached to a handler.
pub struct FetchQueueWorker {
    rx: mpsc::Receiver<FetchJob>,
    max_workers: usize,
    in_flight: Arc<InFlight>,
}

impl FetchQueueWorker {
    /// Spawn the worker pool. It runs until every queue handle is dropped.
    pub fn spawn(self, handler: Weak<dyn FetchHandler>) -> JoinHandle<()> {
        tokio::spawn(FetchQueue::worker_pool(
            self.rx,
            handler,
            Arc::new(Semaphore::new(self.max_workers)),
            self.in_flight,
        ))
    }
}

impl FetchQueue {
    /// Create the queue and spawn its worker pool.
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(config: FetchQueueConfig, handler: Weak<dyn FetchHandler>) -> Self {
        let (queue, worker) = Self::channel(config);
        worker.spawn(handler);
        queue
    }

    /// Create the queue without starting workers, for handlers that own the queue.
    pub fn channel(config: FetchQueueConfig) -> (Self, FetchQueueWorker) {
        let queue_size = config.queue_size.max(1);
        let max_workers = config.max_workers.max(1);
        let (tx, rx) = mpsc::channel(queue_size);
        let in_flight = Arc::new(InFlight::default());

        tracing::info!(
            queue_size = queue_size,
            max_workers = max_workers,
            "Fetch queue initialized with bounded channel"
        );

        let worker = FetchQueueWorker {
            rx,
            max_workers,
            in_flight: in_flight.clone(),
        };
        (Self { tx, in_flight }, worker)
    }

    #[tracing::instrument(skip(self), fields(job.type = "fetch"))]
    pub fn submit(&self, job: FetchJob) -> Result<(), QueueError> {
        tracing::info!(
            remote_key = %job.remote_key,
            local_path = %job.local_path,
            store_code = %job.store_code,
            "Enqueuing background fetch"
        );

        self.in_flight.count.fetch_add(1, Ordering::SeqCst);
        self.tx.try_send(job).map_err(|e| {
            self.in_flight.finish();
            match e {
                mpsc::error::TrySendError::Full(_) => {
                    tracing::warn!("Fetch queue is full, rejecting job");
                    QueueError::Full("Fetch")
                }
                mpsc::error::TrySendError::Closed(_) => QueueError::Closed("Fetch"),
            }
        })
    }

    /// Jobs submitted and not yet finished.
    pub fn pending(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every submitted job has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }

    async fn worker_pool(
        mut rx: mpsc::Receiver<FetchJob>,
        handler: Weak<dyn FetchHandler>,
        semaphore: Arc<Semaphore>,
        in_flight: Arc<InFlight>,
    ) {
        while let Some(job) = rx.recv().await {
            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                tracing::error!(
                    remote_key = %job.remote_key,
                    "Worker semaphore closed, dropping queued background fetches"
                );
                in_flight.finish();
                rx.close();
                while rx.recv().await.is_some() {
                    in_flight.finish();
                }
                break;
            };
            let handler = handler.clone();
            let in_flight = in_flight.clone();

            tokio::spawn(async move {
                let _permit = permit;
                if let Err(e) = Self::process_job(&job, handler).await {
                    tracing::error!(
                        error = %e,
                        remote_key = %job.remote_key,
                        "Background fetch failed"
                    );
                }
                in_flight.finish();
            });
        }

        tracing::debug!("Fetch queue closed, worker pool exiting");
    }

    #[tracing::instrument(skip(handler), fields(job.type = "fetch", job.status = tracing::field::Empty))]
    async fn process_job(job: &FetchJob, handler: Weak<dyn FetchHandler>) -> anyhow::Result<()> {
        let Some(handler) = handler.upgrade() else {
            tracing::warn!(
                remote_key = %job.remote_key,
                "Fetch handler dropped, skipping background fetch"
            );
            return Ok(());
        };

        let start = std::time::Instant::now();
        let result = handler.handle_fetch(job).await;

        let status = if result.is_ok() { "success" } else { "failed" };
        tracing::Span::current().record("job.status", status);
        tracing::debug!(
            remote_key = %job.remote_key,
            duration_ms = start.elapsed().as_millis(),
            "Background fetch finished"
        );

        result
    }
}

impl FetchDispatcher for FetchQueue {
    fn dispatch(&self, job: FetchJob) -> Result<(), QueueError> {
        self.submit(job)
    }
}
