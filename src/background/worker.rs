//! Background transfer worker
//!
//! A single task drains the queue in FIFO order. A failing transfer is logged
//! and the worker moves on to the next entry. Stopping lets the running
//! transfer finish and discards everything that never started; a bounded stop
//! cancels the running transfer once its grace period is over.

use log::{error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::background::queue::{
    BackgroundTransferQueue, ProgressReporter, QueuedTransfer, TransferStatus,
};

pub struct BackgroundTransferWorker {
    stop: CancellationToken,
    abort: CancellationToken,
    done: oneshot::Receiver<()>,
}

impl BackgroundTransferWorker {
    /// Spawns the worker task on the current runtime.
    pub fn start(queue: Arc<BackgroundTransferQueue>) -> Self {
        let stop = CancellationToken::new();
        let abort = CancellationToken::new();
        let (done_tx, done) = oneshot::channel();

        tokio::spawn(run(queue, stop.clone(), abort.clone(), done_tx));

        Self { stop, abort, done }
    }

    /// Stops the worker, giving the running transfer `grace` to finish before
    /// it is cancelled.
    pub async fn stop_within(mut self, grace: Duration) {
        self.stop.cancel();
        if tokio::time::timeout(grace, &mut self.done).await.is_ok() {
            return;
        }
        warn!(
            "Background transfer still running after {:?}, cancelling it",
            grace
        );
        self.abort.cancel();
        let _ = self.done.await;
    }
}

async fn run(
    queue: Arc<BackgroundTransferQueue>,
    stop: CancellationToken,
    abort: CancellationToken,
    done: oneshot::Sender<()>,
) {
    info!("Background transfer worker started");

    loop {
        while !stop.is_cancelled() {
            let Some(item) = queue.dequeue() else { break };
            execute(&queue, item, &abort).await;
        }

        tokio::select! {
            biased;
            _ = stop.cancelled() => break,
            _ = queue.wait() => {}
        }
    }

    for item in queue.close() {
        warn!(
            "Discarding background transfer {} (#{}) that never started",
            item.entry.id(),
            item.entry.sequence()
        );
    }

    info!("Background transfer worker stopped");
    let _ = done.send(());
}

async fn execute(queue: &BackgroundTransferQueue, item: QueuedTransfer, abort: &CancellationToken) {
    let QueuedTransfer {
        entry,
        mut transfer,
    } = item;

    entry.set_status(TransferStatus::Transferring);
    info!(
        "Starting background transfer {} (#{})",
        entry.id(),
        entry.sequence()
    );

    let progress = ProgressReporter::new(Arc::clone(&entry));
    let cancel = abort.child_token();
    let task = tokio::spawn(async move { transfer.start(progress, cancel).await });

    match task.await {
        Ok(Ok(())) => info!("Background transfer {} finished", entry.id()),
        Ok(Err(e)) => error!("Background transfer {} failed: {}", entry.id(), e),
        Err(e) => error!("Background transfer {} panicked: {}", entry.id(), e),
    }

    entry.set_status(TransferStatus::Finished);
    queue.finish(&entry);
}
