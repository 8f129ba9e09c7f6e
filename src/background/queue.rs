//! Background transfer queue
//!
//! Server-wide FIFO of transfers that finish after their command has already
//! replied, e.g. committing a spooled upload into place. One lock guards the
//! pending entries together with the entry currently running; each entry's
//! progress sits behind its own lock so status queries never wait on the
//! queue.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::TransferError;

/// A unit of work executed by the background worker.
#[async_trait]
pub trait BackgroundTransfer: Send {
    /// Identifier shown in status listings.
    fn id(&self) -> &str;

    /// Runs the transfer, reporting transferred bytes through `progress`.
    async fn start(
        &mut self,
        progress: ProgressReporter,
        cancel: CancellationToken,
    ) -> Result<(), TransferError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferStatus {
    Enqueued,
    Transferring,
    Finished,
}

#[derive(Debug)]
struct EntryProgress {
    status: TransferStatus,
    transferred: Option<u64>,
}

/// Bookkeeping for one enqueued transfer.
#[derive(Debug)]
pub struct TransferEntry {
    id: String,
    sequence: u64,
    progress: Mutex<EntryProgress>,
}

impl TransferEntry {
    pub(crate) fn new(id: String, sequence: u64) -> Self {
        Self {
            id,
            sequence,
            progress: Mutex::new(EntryProgress {
                status: TransferStatus::Enqueued,
                transferred: None,
            }),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn status(&self) -> TransferStatus {
        self.progress.lock().status
    }

    pub(crate) fn set_status(&self, status: TransferStatus) {
        self.progress.lock().status = status;
    }

    pub fn snapshot(&self) -> TransferSnapshot {
        let progress = self.progress.lock();
        TransferSnapshot {
            id: self.id.clone(),
            sequence: self.sequence,
            status: progress.status,
            transferred: progress.transferred,
        }
    }
}

/// Point-in-time view of an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSnapshot {
    pub id: String,
    pub sequence: u64,
    pub status: TransferStatus,
    pub transferred: Option<u64>,
}

/// Progress callback handed to a running transfer.
#[derive(Clone)]
pub struct ProgressReporter {
    entry: Arc<TransferEntry>,
}

impl ProgressReporter {
    pub(crate) fn new(entry: Arc<TransferEntry>) -> Self {
        Self { entry }
    }

    /// Records the total number of bytes transferred so far.
    pub fn report(&self, transferred: u64) {
        self.entry.progress.lock().transferred = Some(transferred);
    }
}

pub(crate) struct QueuedTransfer {
    pub(crate) entry: Arc<TransferEntry>,
    pub(crate) transfer: Box<dyn BackgroundTransfer>,
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<QueuedTransfer>,
    current: Option<Arc<TransferEntry>>,
    next_sequence: u64,
    closed: bool,
}

#[derive(Default)]
pub struct BackgroundTransferQueue {
    state: Mutex<QueueState>,
    notify: Notify,
}

impl BackgroundTransferQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a transfer and wakes the worker.
    pub fn enqueue(
        &self,
        transfer: Box<dyn BackgroundTransfer>,
    ) -> Result<TransferSnapshot, TransferError> {
        let snapshot = {
            let mut state = self.state.lock();
            if state.closed {
                return Err(TransferError::QueueClosed);
            }
            state.next_sequence += 1;
            let entry = Arc::new(TransferEntry::new(
                transfer.id().to_string(),
                state.next_sequence,
            ));
            let snapshot = entry.snapshot();
            state.pending.push_back(QueuedTransfer { entry, transfer });
            snapshot
        };
        self.notify.notify_one();
        Ok(snapshot)
    }

    /// The running entry (if any) followed by the queued ones, in order.
    pub fn entries(&self) -> Vec<TransferSnapshot> {
        let state = self.state.lock();
        state
            .current
            .iter()
            .map(|entry| entry.snapshot())
            .chain(state.pending.iter().map(|q| q.entry.snapshot()))
            .collect()
    }

    /// Number of entries not yet finished.
    pub fn len(&self) -> usize {
        let state = self.state.lock();
        state.pending.len() + usize::from(state.current.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub(crate) async fn wait(&self) {
        self.notify.notified().await;
    }

    /// Pops the next entry and exposes it as the current one.
    pub(crate) fn dequeue(&self) -> Option<QueuedTransfer> {
        let mut state = self.state.lock();
        let next = state.pending.pop_front()?;
        state.current = Some(Arc::clone(&next.entry));
        Some(next)
    }

    pub(crate) fn finish(&self, entry: &Arc<TransferEntry>) {
        let mut state = self.state.lock();
        if state
            .current
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, entry))
        {
            state.current = None;
        }
    }

    /// Refuses further entries and hands back the ones never started.
    pub(crate) fn close(&self) -> Vec<QueuedTransfer> {
        let mut state = self.state.lock();
        state.closed = true;
        state.pending.drain(..).collect()
    }
}
