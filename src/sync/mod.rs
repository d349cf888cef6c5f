use crate::engine::PhaseLabel;
use crate::records::{storage_date, DailyRecordStore, StoreResult};
use chrono::NaiveDate;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

/// One store call. Carries the day it was produced on, so a call that runs
/// after midnight still lands on the right record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOp {
    /// Session start
    EnsureDay { day: NaiveDate },
    IncrementTime { day: NaiveDate, label: PhaseLabel },
    SetTaskCounts {
        day: NaiveDate,
        completed: u32,
        total: u32,
    },
}

impl SyncOp {
    pub fn kind(&self) -> &'static str {
        match self {
            SyncOp::EnsureDay { .. } => "ensure_day",
            SyncOp::IncrementTime { .. } => "increment_time",
            SyncOp::SetTaskCounts { .. } => "set_task_counts",
        }
    }

    pub fn apply(&self, store: &dyn DailyRecordStore) -> StoreResult<()> {
        match *self {
            SyncOp::EnsureDay { day } => store.ensure_day_exists(day).map(|_| ()),
            SyncOp::IncrementTime { day, label } => store.increment_time(day, label),
            SyncOp::SetTaskCounts {
                day,
                completed,
                total,
            } => store.set_task_counts(day, completed, total),
        }
    }
}

impl fmt::Display for SyncOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncOp::EnsureDay { day } => write!(f, "ensure_day({})", storage_date(*day)),
            SyncOp::IncrementTime { day, label } => {
                write!(f, "increment_time({}, {})", storage_date(*day), label)
            }
            SyncOp::SetTaskCounts {
                day,
                completed,
                total,
            } => write!(
                f,
                "set_task_counts({}, {}/{})",
                storage_date(*day),
                completed,
                total
            ),
        }
    }
}

enum Envelope {
    Op(SyncOp),
    /// Answered once everything queued before it has been applied
    Flush(oneshot::Sender<()>),
}

#[derive(Default)]
struct SyncCounters {
    submitted: AtomicU64,
    applied: AtomicU64,
    failed: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub submitted: u64,
    pub applied: u64,
    pub failed: u64,
}

/// Fire-and-forget front of the Daily Record Synchronizer.
///
/// `submit` never blocks and never awaits: ops go onto an unbounded channel
/// drained by [`SyncWorker`]. Failed calls are logged and dropped, never
/// retried (an increment applied twice would double-count).
#[derive(Clone)]
pub struct DailyRecordSync {
    tx: mpsc::UnboundedSender<Envelope>,
    counters: Arc<SyncCounters>,
}

pub struct SyncWorker {
    rx: mpsc::UnboundedReceiver<Envelope>,
    store: Arc<dyn DailyRecordStore>,
    counters: Arc<SyncCounters>,
}

impl DailyRecordSync {
    pub fn new(store: Arc<dyn DailyRecordStore>) -> (Self, SyncWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        let counters = Arc::new(SyncCounters::default());
        (
            Self {
                tx,
                counters: counters.clone(),
            },
            SyncWorker {
                rx,
                store,
                counters,
            },
        )
    }

    pub fn submit(&self, op: SyncOp) {
        self.counters.submitted.fetch_add(1, Ordering::Relaxed);
        if let Err(e) = self.tx.send(Envelope::Op(op)) {
            self.counters.failed.fetch_add(1, Ordering::Relaxed);
            error!("[SYNC] Worker is gone, dropping {}", e.0.describe());
        }
    }

    /// Wait until every op submitted so far has been attempted
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(tx)).is_err() {
            warn!("[SYNC] Worker is gone, nothing to flush");
            return;
        }
        let _ = rx.await;
    }

    pub fn stats(&self) -> SyncStats {
        SyncStats {
            submitted: self.counters.submitted.load(Ordering::Relaxed),
            applied: self.counters.applied.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }
}

impl Envelope {
    fn describe(&self) -> String {
        match self {
            Envelope::Op(op) => op.to_string(),
            Envelope::Flush(_) => "flush".to_string(),
        }
    }
}

impl SyncWorker {
    /// Drain the channel until every `DailyRecordSync` handle is dropped
    pub async fn run(mut self) {
        info!("[SYNC] Daily record worker started");
        while let Some(envelope) = self.rx.recv().await {
            match envelope {
                Envelope::Op(op) => self.apply(op).await,
                Envelope::Flush(done) => {
                    let _ = done.send(());
                }
            }
        }
        info!("[SYNC] Daily record worker stopped");
    }

    async fn apply(&self, op: SyncOp) {
        let store = self.store.clone();
        // rusqlite is blocking; keep it off the async workers
        let result = tokio::task::spawn_blocking(move || op.apply(store.as_ref())).await;
        match result {
            Ok(Ok(())) => {
                self.counters.applied.fetch_add(1, Ordering::Relaxed);
                debug!("[SYNC] {} applied", op);
            }
            Ok(Err(e)) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("[SYNC] {} failed: {} (not retried)", op, e);
            }
            Err(e) => {
                self.counters.failed.fetch_add(1, Ordering::Relaxed);
                error!("[SYNC] {} panicked in store: {}", op.kind(), e);
            }
        }
    }
}
