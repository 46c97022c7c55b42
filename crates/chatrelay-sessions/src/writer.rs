//! Background history persistence.
//!
//! Saving history must never hold up a reply, but unbounded `tokio::spawn`
//! per message would let background work pile up under load. Jobs go through
//! a bounded queue and at most `concurrency` saves run at once. Delivery is
//! best-effort: a full queue drops the job and logs it.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use chatrelay_core::Turn;
use tokio::sync::{mpsc, Notify, Semaphore};
use tracing::{debug, warn};

use crate::error::{Result, SessionError};
use crate::history::ConversationHistoryStore;
use crate::types::ConversationKey;

/// One pending history write: the full turn sequence to store under `key`.
#[derive(Debug, Clone)]
pub struct SaveJob {
    pub key: ConversationKey,
    pub turns: Vec<Turn>,
}

/// Handle to the background writer. Cheap to clone.
#[derive(Clone)]
pub struct HistoryWriter {
    tx: mpsc::Sender<SaveJob>,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl HistoryWriter {
    /// Start the dispatcher task on the current runtime.
    pub fn spawn(history: Arc<ConversationHistoryStore>, concurrency: usize, queue: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<SaveJob>(queue.max(1));
        let permits = Arc::new(Semaphore::new(concurrency.max(1)));
        let pending = Arc::new(AtomicUsize::new(0));
        let idle = Arc::new(Notify::new());

        let pending_bg = Arc::clone(&pending);
        let idle_bg = Arc::clone(&idle);
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let history = Arc::clone(&history);
                let pending = Arc::clone(&pending_bg);
                let idle = Arc::clone(&idle_bg);
                tokio::spawn(async move {
                    if let Err(e) = history.save(&job.key, &job.turns).await {
                        warn!(key = %job.key, error = %e, "history save failed");
                    }
                    drop(permit);
                    if pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                        idle.notify_waiters();
                    }
                });
            }
            debug!("history writer stopped");
        });

        Self { tx, pending, idle }
    }

    /// Queue a write without waiting for it.
    pub fn submit(&self, job: SaveJob) -> Result<()> {
        self.pending.fetch_add(1, Ordering::AcqRel);
        match self.tx.try_send(job) {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.pending.fetch_sub(1, Ordering::AcqRel) == 1 {
                    self.idle.notify_waiters();
                }
                match e {
                    mpsc::error::TrySendError::Full(_) => Err(SessionError::QueueFull),
                    mpsc::error::TrySendError::Closed(_) => Err(SessionError::WriterClosed),
                }
            }
        }
    }

    /// Number of queued or running writes.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::Acquire)
    }

    /// Wait until every submitted write has finished. Used on shutdown and in tests.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            if self.pending() == 0 {
                return;
            }
            notified.await;
        }
    }
}
