//! Deferred transfer execution
//!
//! Transfers enqueued here outlive the command that created them and run one
//! at a time on a dedicated worker.

pub mod queue;
pub mod worker;

pub use queue::{
    BackgroundTransfer, BackgroundTransferQueue, ProgressReporter, TransferEntry,
    TransferSnapshot, TransferStatus,
};
pub use worker::BackgroundTransferWorker;
