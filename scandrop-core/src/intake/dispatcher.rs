//! Bounded worker pool with non-blocking submission.
//!
//! Workers share one bounded queue. A submission that finds the queue full is
//! not retried: the file goes straight to `failed` as `queue_full`, which
//! keeps the watch loop from ever blocking on slow documents.

use std::fmt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use futures::future::join_all;
use tokio::sync::Mutex;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::intake::config::PoolConfig;
use crate::intake::naming::FailureReason;
use crate::intake::task::{IntakeContext, IntakeTask, file_failure, panic_message};

type TaskQueue = Arc<Mutex<mpsc::Receiver<IntakeTask>>>;

/// Result of handing a file to the pool.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Queued for a worker.
    Accepted,
    /// The queue was saturated; the file was moved to this path under `failed`
    /// (`None` if the move itself failed).
    QueueFull(Option<PathBuf>),
    /// The pool is shutting down. The file was left where it is.
    Closed,
}

/// Cheap, cloneable submission handle.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::Sender<IntakeTask>,
    ctx: Arc<IntakeContext>,
    shutdown: CancellationToken,
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("capacity", &self.tx.max_capacity())
            .field("available", &self.tx.capacity())
            .field("closed", &self.shutdown.is_cancelled())
            .finish()
    }
}

impl Dispatcher {
    /// Queue `path` for processing without waiting.
    pub fn submit(&self, path: PathBuf) -> SubmitOutcome {
        if self.shutdown.is_cancelled() {
            debug!(path = %path.display(), "pool is shutting down; submission refused");
            return SubmitOutcome::Closed;
        }

        let task = IntakeTask::new(path);
        let task_id = task.id();
        match self.tx.try_send(task) {
            Ok(()) => {
                debug!(%task_id, "task queued");
                SubmitOutcome::Accepted
            }
            Err(TrySendError::Full(task)) => {
                warn!(path = %task.source().display(), "worker queue full");
                SubmitOutcome::QueueFull(file_failure(
                    self.ctx.layout(),
                    task.source(),
                    task.source(),
                    FailureReason::QueueFull,
                ))
            }
            Err(TrySendError::Closed(task)) => {
                debug!(path = %task.source().display(), "worker queue closed");
                SubmitOutcome::Closed
            }
        }
    }

    /// Free queue slots right now.
    pub fn available(&self) -> usize {
        self.tx.capacity()
    }
}

/// What happened to the workers during shutdown.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Workers that finished their queue within the grace period.
    pub drained: usize,
    /// Workers still busy at the deadline and aborted.
    pub aborted: usize,
}

impl DrainReport {
    pub fn is_clean(&self) -> bool {
        self.aborted == 0
    }
}

/// Fixed set of workers draining a bounded queue.
pub struct WorkerPool {
    dispatcher: Dispatcher,
    workers: Vec<JoinHandle<()>>,
    grace: Duration,
}

impl fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let running = self
            .workers
            .iter()
            .filter(|worker| !worker.is_finished())
            .count();
        f.debug_struct("WorkerPool")
            .field("dispatcher", &self.dispatcher)
            .field("workers", &self.workers.len())
            .field("running", &running)
            .field("grace", &self.grace)
            .finish()
    }
}

impl WorkerPool {
    /// Spawn `config.workers` workers on the current runtime.
    pub fn start(ctx: Arc<IntakeContext>, config: PoolConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let queue: TaskQueue = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();

        let workers = (0..config.workers.max(1))
            .map(|worker| {
                tokio::spawn(worker_loop(
                    worker,
                    Arc::clone(&queue),
                    Arc::clone(&ctx),
                    shutdown.clone(),
                ))
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            queue_capacity = config.queue_capacity,
            "worker pool started"
        );

        Self {
            dispatcher: Dispatcher { tx, ctx, shutdown },
            workers,
            grace: config.shutdown_grace(),
        }
    }

    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Refuse new work, let workers finish what is queued or in flight for up
    /// to the grace period, then abort whatever is left.
    pub async fn shutdown(self) -> DrainReport {
        let WorkerPool {
            dispatcher,
            mut workers,
            grace,
        } = self;

        dispatcher.shutdown.cancel();
        drop(dispatcher);
        info!(grace_ms = grace.as_millis() as u64, "draining worker pool");

        let total = workers.len();
        let finished_in_time = tokio::time::timeout(grace, join_all(workers.iter_mut()))
            .await
            .is_ok();

        let mut report = DrainReport {
            drained: total,
            aborted: 0,
        };

        if !finished_in_time {
            for worker in &workers {
                if !worker.is_finished() {
                    worker.abort();
                    report.aborted += 1;
                }
            }
            report.drained = total - report.aborted;
            warn!(
                aborted = report.aborted,
                "grace period elapsed; aborting busy workers"
            );
            for worker in workers {
                if let Err(err) = worker.await
                    && !err.is_cancelled()
                {
                    error!(error = %err, "worker ended abnormally");
                }
            }
        }

        info!(drained = report.drained, aborted = report.aborted, "worker pool stopped");
        report
    }
}

async fn worker_loop(
    worker: usize,
    queue: TaskQueue,
    ctx: Arc<IntakeContext>,
    shutdown: CancellationToken,
) {
    debug!(worker, "worker started");

    loop {
        let next = {
            let mut rx = queue.lock().await;
            let received = tokio::select! {
                biased;
                task = rx.recv() => Some(task),
                _ = shutdown.cancelled() => None,
            };
            // Once shutdown starts, drain without waiting for more.
            match received {
                Some(task) => task,
                None => rx.try_recv().ok(),
            }
        };

        let Some(task) = next else {
            break;
        };

        let source = task.source().to_path_buf();
        let task_id = task.id();
        if let Err(panic) = AssertUnwindSafe(task.run(Arc::clone(&ctx)))
            .catch_unwind()
            .await
        {
            error!(
                worker,
                %task_id,
                path = %source.display(),
                panic = %panic_message(panic.as_ref()),
                "task panicked"
            );
            file_failure(ctx.layout(), &source, &source, FailureReason::Exception);
        }
    }

    debug!(worker, "worker stopped");
}
