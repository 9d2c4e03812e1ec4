//! Worker pool draining the work queue
//!
//! Workers share one receiver behind an async mutex; each dequeued path is
//! handled to completion by a single worker. Workers hold only a weak handle
//! to the queue for re-injected paths, so the pool drains and exits once
//! every producer has dropped its sender. Cancelling the token stops workers
//! after their in-flight file; paths still queued are picked up by the next
//! startup sweep.

use crate::services::triage_engine::TriageEngine;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Create the bounded work queue
pub fn work_queue(capacity: usize) -> (mpsc::Sender<PathBuf>, mpsc::Receiver<PathBuf>) {
    mpsc::channel(capacity.max(1))
}

pub struct WorkerPool {
    handles: Vec<JoinHandle<usize>>,
}

impl WorkerPool {
    /// Start `workers` tasks draining `receiver`.
    ///
    /// `requeue` is used to offer re-injected repair output back to the
    /// queue; the upgrade fails once all producers are gone.
    pub fn spawn(
        engine: Arc<TriageEngine>,
        receiver: mpsc::Receiver<PathBuf>,
        requeue: mpsc::WeakSender<PathBuf>,
        workers: usize,
        cancel: CancellationToken,
    ) -> Self {
        let receiver = Arc::new(Mutex::new(receiver));
        let handles = (0..workers.max(1))
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    Arc::clone(&engine),
                    Arc::clone(&receiver),
                    requeue.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        info!(workers, "Worker pool started");
        Self { handles }
    }

    /// Wait for every worker to exit; returns the number of paths handled
    pub async fn join(self) -> usize {
        let mut handled = 0;
        for handle in self.handles {
            match handle.await {
                Ok(count) => handled += count,
                Err(e) => error!("Worker task failed: {}", e),
            }
        }
        info!(handled, "Worker pool stopped");
        handled
    }
}

async fn worker_loop(
    worker_id: usize,
    engine: Arc<TriageEngine>,
    receiver: Arc<Mutex<mpsc::Receiver<PathBuf>>>,
    requeue: mpsc::WeakSender<PathBuf>,
    cancel: CancellationToken,
) -> usize {
    debug!(worker_id, "Worker started");
    let mut handled = 0;

    loop {
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            message = async {
                let mut rx = receiver.lock().await;
                rx.recv().await
            } => message,
        };
        let Some(path) = next else {
            break;
        };

        let outcome = AssertUnwindSafe(engine.handle(&path)).catch_unwind().await;
        handled += 1;

        match outcome {
            Ok(outcome) => {
                debug!(worker_id, path = %path.display(), ?outcome, "File handled");
                if let Some(new_path) = outcome.reinjected_path() {
                    offer(&requeue, new_path.to_path_buf());
                }
            }
            Err(_panic) => {
                error!(worker_id, path = %path.display(), "Triage panicked; worker continues");
            }
        }
    }

    debug!(worker_id, handled, "Worker stopped");
    handled
}

/// Best-effort enqueue of a re-injected path.
///
/// A full or closed queue is not an error: the filesystem event for the new
/// file, or the next sweep, delivers it instead.
fn offer(requeue: &mpsc::WeakSender<PathBuf>, path: PathBuf) {
    let Some(sender) = requeue.upgrade() else {
        debug!(path = %path.display(), "Queue closed, re-injected file left for next sweep");
        return;
    };
    match sender.try_send(path) {
        Ok(()) => {}
        Err(TrySendError::Full(path)) => {
            debug!(path = %path.display(), "Queue full, re-injected file left to watcher");
        }
        Err(TrySendError::Closed(path)) => {
            debug!(path = %path.display(), "Queue closed, re-injected file left for next sweep");
        }
    }
}
