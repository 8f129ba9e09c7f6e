//! In-place transport changes
//!
//! Upgrades an open plaintext stream to TLS and shuts the TLS layer down again
//! without closing the transport underneath.

use log::{debug, info};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_rustls::TlsAcceptor;

use crate::error::TlsError;
use crate::tls::{Rewind, SecureStream};

const CLOSE_NOTIFY_TIMEOUT: Duration = Duration::from_secs(5);

/// A failed upgrade. The plaintext transport is handed back so the caller can
/// still report the failure before closing.
pub struct UpgradeFailure<S> {
    pub error: TlsError,
    pub stream: SecureStream<Rewind<S>>,
}

/// Runs the server side of a TLS handshake over an open plaintext stream.
/// The handshake must complete within `timeout`.
pub async fn upgrade_stream<S>(
    stream: SecureStream<Rewind<S>>,
    acceptor: &TlsAcceptor,
    timeout: Duration,
) -> Result<SecureStream<Rewind<S>>, UpgradeFailure<S>>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut plain = match stream {
        SecureStream::Plain(plain) => plain,
        secure @ SecureStream::Tls(_) => {
            return Err(UpgradeFailure {
                error: TlsError::AlreadySecure,
                stream: secure,
            });
        }
    };

    plain.set_timeout(Some(timeout));
    match acceptor.accept(plain).into_fallible().await {
        Ok(mut tls) => {
            tls.get_mut().0.set_timeout(None);
            debug!("TLS handshake completed");
            Ok(SecureStream::Tls(Box::new(tls)))
        }
        Err((e, mut plain)) => {
            plain.set_timeout(None);
            let error = if e.kind() == io::ErrorKind::TimedOut {
                TlsError::HandshakeTimeout(timeout)
            } else {
                TlsError::Handshake(e)
            };
            Err(UpgradeFailure {
                error,
                stream: SecureStream::Plain(plain),
            })
        }
    }
}

/// Accepts TLS on a freshly opened stream. The stream is dropped on failure.
pub async fn accept_tls<S>(
    stream: S,
    acceptor: &TlsAcceptor,
    timeout: Duration,
) -> Result<SecureStream<S>, TlsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match tokio::time::timeout(timeout, acceptor.accept(stream)).await {
        Ok(Ok(tls)) => Ok(SecureStream::Tls(Box::new(tls))),
        Ok(Err(e)) => Err(TlsError::Handshake(e)),
        Err(_) => Err(TlsError::HandshakeTimeout(timeout)),
    }
}

/// Sends close_notify, waits for the peer's, and returns the plaintext
/// transport. Plain streams are returned unchanged.
pub async fn shutdown_tls<S>(stream: SecureStream<S>) -> Result<SecureStream<S>, TlsError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut tls = match stream {
        SecureStream::Plain(plain) => return Ok(SecureStream::Plain(plain)),
        SecureStream::Tls(tls) => tls,
    };

    tls.get_mut().1.send_close_notify();
    tls.flush().await.map_err(TlsError::Handshake)?;

    let mut sink = [0u8; 512];
    loop {
        match tokio::time::timeout(CLOSE_NOTIFY_TIMEOUT, tls.read(&mut sink)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => debug!("Discarding {} bytes received before close_notify", n),
            Ok(Err(e)) => return Err(TlsError::Handshake(e)),
            Err(_) => return Err(TlsError::HandshakeTimeout(CLOSE_NOTIFY_TIMEOUT)),
        }
    }

    let (plain, _) = (*tls).into_inner();
    info!("TLS layer shut down, continuing in plaintext");
    Ok(SecureStream::Plain(plain))
}
