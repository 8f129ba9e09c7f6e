//! Control connection driver
//!
//! Owns the read half of one control connection: feeds received bytes to the
//! command collector, dispatches commands one at a time, reports background
//! command completion and performs AUTH TLS / CCC transport switches once
//! their replies have been flushed.

use log::{debug, info, warn};
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, ReadHalf};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::client::session::{Session, TransportChange};
use crate::client::writer::spawn_writer;
use crate::error::CommandError;
use crate::protocol::{CommandCollector, Reply, SharedEncoding, codes};
use crate::server::dispatcher::{BackgroundCommand, wait_background};
use crate::server::{Dispatcher, ServerServices};
use crate::tls::{
    ControlStream, Rewind, SecureStream, UpgradeFailure, shutdown_tls, upgrade_stream,
};

const READ_BUFFER_SIZE: usize = 4096;
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

type ControlReadHalf = ReadHalf<ControlStream>;

enum Event {
    Cancelled,
    BackgroundDone(Reply),
    Read(io::Result<usize>),
}

/// Serves one control connection until the client leaves, the connection
/// fails or `shutdown` is cancelled.
pub async fn handle_client(
    stream: TcpStream,
    session_id: u64,
    services: Arc<ServerServices>,
    dispatcher: Arc<Dispatcher>,
    shutdown: CancellationToken,
) -> io::Result<()> {
    let peer = stream.peer_addr()?;
    let local = stream.local_addr()?;
    let cancel = shutdown.child_token();
    let encoding = SharedEncoding::default();

    let control: ControlStream = SecureStream::Plain(Rewind::new(stream));
    let (mut reader, write_half) = tokio::io::split(control);
    let (replies, writer) =
        spawn_writer(write_half, encoding.clone(), cancel.clone(), session_id);

    let session = Arc::new(Session::new(
        session_id,
        peer,
        local,
        Arc::clone(&services),
        replies,
        encoding.clone(),
        cancel.clone(),
    ));
    info!("Session {}: connected from {}", session_id, peer);
    session.reply(Reply::new(codes::READY, services.config.greeting.clone()));

    let mut collector =
        CommandCollector::with_max_line_length(services.config.max_command_length);
    let mut background: Option<BackgroundCommand> = None;
    let mut buf = vec![0u8; READ_BUFFER_SIZE];

    'connection: loop {
        while let Some(next) = collector.next_command(encoding.get()) {
            let command = match next {
                Ok(command) => command,
                Err(e) => {
                    warn!("Session {}: {}", session_id, e);
                    session.reply(CommandError::from(e).reply());
                    continue;
                }
            };

            if command.is("ABOR") {
                if let Some(running) = background.take() {
                    info!("Session {}: aborting {}", session_id, running.verb());
                    running.abort();
                    session.reply(running.join().await);
                }
            }

            dispatcher.dispatch(&session, command, &mut background).await;

            if session.close_requested() {
                break 'connection;
            }
            if let Some(change) = session.take_transport_change() {
                reader = match change_transport(&session, reader, &mut collector, change).await {
                    Some(reader) => reader,
                    None => break 'connection,
                };
            }
        }

        let event = tokio::select! {
            biased;
            _ = cancel.cancelled() => Event::Cancelled,
            reply = wait_background(&mut background) => Event::BackgroundDone(reply),
            read = reader.read(&mut buf) => Event::Read(read),
        };

        match event {
            Event::Cancelled => break,
            Event::BackgroundDone(reply) => session.reply(reply),
            Event::Read(Ok(0)) => {
                info!("Session {}: connection closed by client", session_id);
                break;
            }
            Event::Read(Ok(n)) => collector.push(&buf[..n]),
            Event::Read(Err(e)) => {
                warn!("Session {}: read failed: {}", session_id, e);
                break;
            }
        }
    }

    if let Some(running) = background.take() {
        running.abort();
        let _ = running.join().await;
    }
    session.replace_data_connection(None).await;

    if shutdown.is_cancelled() {
        session.reply(Reply::new(
            codes::SERVICE_NOT_AVAILABLE,
            "Server shutting down.",
        ));
    }
    session.replies().close();
    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, writer).await.is_err() {
        warn!("Session {}: reply writer did not drain in time", session_id);
    }
    cancel.cancel();

    info!("Session {}: disconnected from {}", session_id, peer);
    Ok(())
}

/// Reunites the control stream, switches its transport and splits it again.
/// Returns `None` when the connection cannot continue.
async fn change_transport(
    session: &Session,
    reader: ControlReadHalf,
    collector: &mut CommandCollector,
    change: TransportChange,
) -> Option<ControlReadHalf> {
    let session_id = session.id();
    let (write_half, resume) = session.replies().pause().await?;
    let mut stream = reader.unsplit(write_half);
    let buffered = collector.take_buffered();

    let switched = match change {
        TransportChange::Upgrade => {
            stream.rewind(buffered.bytes, buffered.pending_lf);
            let acceptor = session.services().tls.clone()?;
            let timeout = session.services().config.tls_handshake_timeout();
            match upgrade_stream(stream, &acceptor, timeout).await {
                Ok(secure) => {
                    session.set_secure(true);
                    info!("Session {}: control connection secured", session_id);
                    secure
                }
                Err(UpgradeFailure { error, stream }) => {
                    warn!("Session {}: {}, closing control connection", session_id, error);
                    let (_, write_half) = tokio::io::split(stream);
                    if resume.send(write_half).is_ok() {
                        session.reply(CommandError::from(error).reply());
                    }
                    return None;
                }
            }
        }
        TransportChange::Downgrade => {
            if !buffered.bytes.is_empty() {
                debug!(
                    "Session {}: discarding {} bytes received before CCC completed",
                    session_id,
                    buffered.bytes.len()
                );
            }
            match shutdown_tls(stream).await {
                Ok(plain) => {
                    session.set_secure(false);
                    session.set_protect_data(false);
                    info!("Session {}: control connection back to plaintext", session_id);
                    plain
                }
                Err(e) => {
                    warn!("Session {}: {}", session_id, e);
                    return None;
                }
            }
        }
    };

    let (reader, write_half) = tokio::io::split(switched);
    resume.send(write_half).ok()?;
    Some(reader)
}
