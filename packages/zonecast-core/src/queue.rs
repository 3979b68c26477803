//! FIFO queue for stackable actions.
//!
//! A single worker task drains the queue, so actions execute one at a time in
//! the order they were accepted. Enqueueing never blocks the HTTP handler.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::action::{Action, ActionState};
use crate::lifecycle::Lifecycle;
use crate::pipeline::{Completion, ExecutionPipeline};

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Action queue is not accepting requests")]
    Closed,
}

struct QueueEntry {
    seq: u64,
    action: Action,
    enqueued_at: Instant,
}

/// Handle to the queue and its worker.
pub struct ActionQueue {
    tx: mpsc::UnboundedSender<QueueEntry>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    next_seq: AtomicU64,
    cancel: CancellationToken,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl ActionQueue {
    /// Spawns the worker.
    ///
    /// Fatal errors raised by queued actions go to `lifecycle`. Cancelling
    /// `cancel` stops the worker once the action in flight is done.
    pub fn start(
        pipeline: Arc<ExecutionPipeline>,
        lifecycle: Arc<dyn Lifecycle>,
        cancel: CancellationToken,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let worker = Worker {
            rx,
            pipeline,
            lifecycle,
            pending: Arc::clone(&pending),
            idle: Arc::clone(&idle),
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(worker.run());

        Self {
            tx,
            pending,
            idle,
            next_seq: AtomicU64::new(1),
            cancel,
            handle: Mutex::new(Some(handle)),
        }
    }

    /// Appends a validated action. Returns its sequence number.
    pub fn enqueue(&self, mut action: Action) -> Result<u64, QueueError> {
        if self.cancel.is_cancelled() {
            return Err(QueueError::Closed);
        }
        let (base, _) = action.parts_mut();
        base.set_state(ActionState::Queued);

        let seq = self.next_seq.fetch_add(1, Ordering::SeqCst);
        self.pending.fetch_add(1, Ordering::SeqCst);
        let entry = QueueEntry {
            seq,
            action,
            enqueued_at: Instant::now(),
        };
        if self.tx.send(entry).is_err() {
            self.finish_one();
            return Err(QueueError::Closed);
        }
        log::debug!("[Queue] Accepted request #{} ({} pending)", seq, self.len());
        Ok(seq)
    }

    /// Actions accepted but not yet finished, including the one in flight.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Resolves once every accepted action has finished.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.is_empty() || self.cancel.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Stops the worker and waits for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                log::warn!("[Queue] Worker ended abnormally: {}", e);
            }
        }
        self.idle.notify_waiters();
    }

    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

struct Worker {
    rx: mpsc::UnboundedReceiver<QueueEntry>,
    pipeline: Arc<ExecutionPipeline>,
    lifecycle: Arc<dyn Lifecycle>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
    cancel: CancellationToken,
}

impl Worker {
    async fn run(mut self) {
        log::debug!("[Queue] Worker started");
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                entry = self.rx.recv() => match entry {
                    Some(entry) => self.process(entry).await,
                    None => break,
                },
            }
        }
        let dropped = self.pending.load(Ordering::SeqCst);
        if dropped > 0 {
            log::info!("[Queue] Worker stopped with {} requests left unprocessed", dropped);
        } else {
            log::debug!("[Queue] Worker stopped");
        }
    }

    async fn process(&self, mut entry: QueueEntry) {
        log::trace!(
            "[Queue] Running request #{} after {}ms in queue",
            entry.seq,
            entry.enqueued_at.elapsed().as_millis()
        );
        match self.pipeline.execute(&mut entry.action).await {
            Ok(Completion::Completed { .. }) => {}
            Ok(Completion::Failed) => log::warn!(
                "[Queue] Request #{} failed: {}",
                entry.seq,
                entry.action.base().error_text()
            ),
            Err(fatal) => self.lifecycle.crash(&fatal),
        }
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}
