//! Serialized reply writer
//!
//! Every reply of a connection goes through one task that owns the write half
//! of the control stream. The driver can borrow the write half back (to
//! reunite the stream for a TLS change) by queueing a swap; anything queued
//! before the swap is flushed first.

use log::{debug, warn};
use tokio::io::{AsyncWriteExt, WriteHalf};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::protocol::{Reply, SharedEncoding};
use crate::tls::ControlStream;

pub type ControlWriteHalf = WriteHalf<ControlStream>;

pub enum WriterMessage {
    Reply(Reply),
    /// Hand the write half over through `current` and wait for a new one on
    /// `replacement`.
    Swap {
        current: oneshot::Sender<ControlWriteHalf>,
        replacement: oneshot::Receiver<ControlWriteHalf>,
    },
    Close,
}

/// Cloneable handle for queueing replies.
#[derive(Clone)]
pub struct ReplySender {
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl ReplySender {
    /// A sender whose messages land on the returned receiver instead of a
    /// socket.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WriterMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, reply: Reply) {
        if self.tx.send(WriterMessage::Reply(reply)).is_err() {
            debug!("Reply dropped, writer already gone");
        }
    }

    /// Flushes everything queued so far and closes the write side.
    pub fn close(&self) {
        let _ = self.tx.send(WriterMessage::Close);
    }

    /// Waits until everything queued so far is written, then takes the write
    /// half. The writer stays parked until a half is sent on the returned
    /// sender; dropping that sender ends the writer.
    pub async fn pause(&self) -> Option<(ControlWriteHalf, oneshot::Sender<ControlWriteHalf>)> {
        let (current_tx, current_rx) = oneshot::channel();
        let (replacement_tx, replacement_rx) = oneshot::channel();
        self.tx
            .send(WriterMessage::Swap {
                current: current_tx,
                replacement: replacement_rx,
            })
            .ok()?;
        let half = current_rx.await.ok()?;
        Some((half, replacement_tx))
    }
}

/// Starts the writer task for one connection.
pub fn spawn_writer(
    half: ControlWriteHalf,
    encoding: SharedEncoding,
    cancel: CancellationToken,
    session_id: u64,
) -> (ReplySender, JoinHandle<()>) {
    let (sender, rx) = ReplySender::channel();
    let handle = tokio::spawn(run_writer(half, rx, encoding, cancel, session_id));
    (sender, handle)
}

async fn run_writer(
    mut half: ControlWriteHalf,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
    encoding: SharedEncoding,
    cancel: CancellationToken,
    session_id: u64,
) {
    while let Some(message) = rx.recv().await {
        match message {
            WriterMessage::Reply(reply) => {
                debug!("Session {}: -> {}", session_id, reply);
                let bytes = encoding.encode(&reply.to_wire());
                let written = async {
                    half.write_all(&bytes).await?;
                    half.flush().await
                }
                .await;
                if let Err(e) = written {
                    warn!("Session {}: failed to write reply: {}", session_id, e);
                    cancel.cancel();
                    return;
                }
                if reply.is_terminal() {
                    let _ = half.shutdown().await;
                    cancel.cancel();
                    return;
                }
            }
            WriterMessage::Swap {
                current,
                replacement,
            } => {
                if current.send(half).is_err() {
                    return;
                }
                match replacement.await {
                    Ok(resumed) => half = resumed,
                    Err(_) => {
                        debug!("Session {}: writer not resumed", session_id);
                        return;
                    }
                }
            }
            WriterMessage::Close => {
                let _ = half.shutdown().await;
                return;
            }
        }
    }
}
