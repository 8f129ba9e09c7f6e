//! Stream adapters used by control and data connections.

use bytes::{Buf, Bytes};
use std::future::Future;
use std::io;
use std::pin::Pin;
use std::task::{Context, Poll, ready};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::TcpStream;
use tokio::time::Sleep;
use tokio_rustls::server::TlsStream;

/// Replays bytes that were read ahead of a transport change before reading
/// from the inner stream again.
#[derive(Debug)]
pub struct Rewind<S> {
    prefix: Bytes,
    skip_lf: bool,
    deadline: Option<Pin<Box<Sleep>>>,
    inner: S,
}

impl<S> Rewind<S> {
    pub fn new(inner: S) -> Self {
        Self {
            prefix: Bytes::new(),
            skip_lf: false,
            deadline: None,
            inner,
        }
    }

    /// Fails reads and writes with `TimedOut` once `timeout` has elapsed.
    /// `None` clears the deadline.
    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.deadline = timeout.map(|timeout| Box::pin(tokio::time::sleep(timeout)));
    }

    fn poll_deadline(&mut self, cx: &mut Context<'_>) -> io::Result<()> {
        let Some(deadline) = self.deadline.as_mut() else {
            return Ok(());
        };
        if deadline.as_mut().poll(cx).is_ready() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "deadline elapsed"));
        }
        Ok(())
    }

    /// Drops the next byte read from the inner stream if it is an LF.
    pub fn skip_leading_lf(&mut self) {
        self.skip_lf = true;
    }

    /// Queues `bytes` in front of whatever is still unread.
    pub fn rewind(&mut self, bytes: Bytes) {
        if bytes.is_empty() {
            return;
        }
        if self.prefix.is_empty() {
            self.prefix = bytes;
        } else {
            let mut joined = bytes.to_vec();
            joined.extend_from_slice(&self.prefix);
            self.prefix = Bytes::from(joined);
        }
    }
}

impl<S: AsyncRead + Unpin> AsyncRead for Rewind<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.poll_deadline(cx)?;
        if !this.prefix.is_empty() {
            let n = this.prefix.len().min(buf.remaining());
            buf.put_slice(&this.prefix[..n]);
            this.prefix.advance(n);
            return Poll::Ready(Ok(()));
        }
        while this.skip_lf {
            let before = buf.filled().len();
            ready!(Pin::new(&mut this.inner).poll_read(cx, buf))?;
            let after = buf.filled().len();
            if after == before {
                return Poll::Ready(Ok(()));
            }
            this.skip_lf = false;
            if buf.filled()[before] != b'\n' {
                return Poll::Ready(Ok(()));
            }
            buf.filled_mut().copy_within(before + 1..after, before);
            buf.set_filled(after - 1);
            if after - 1 > before {
                return Poll::Ready(Ok(()));
            }
        }
        Pin::new(&mut this.inner).poll_read(cx, buf)
    }
}

impl<S: AsyncWrite + Unpin> AsyncWrite for Rewind<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let this = self.get_mut();
        this.poll_deadline(cx)?;
        Pin::new(&mut this.inner).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        this.poll_deadline(cx)?;
        Pin::new(&mut this.inner).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Pin::new(&mut self.get_mut().inner).poll_shutdown(cx)
    }
}

/// A stream that is either plaintext or wrapped in server-side TLS.
#[derive(Debug)]
pub enum SecureStream<S> {
    Plain(S),
    Tls(Box<TlsStream<S>>),
}

/// The control connection transport.
pub type ControlStream = SecureStream<Rewind<TcpStream>>;

/// A data connection transport.
pub type DataStream = SecureStream<TcpStream>;

impl<S> SecureStream<S> {
    /// The underlying transport.
    pub fn transport(&self) -> &S {
        match self {
            SecureStream::Plain(s) => s,
            SecureStream::Tls(s) => s.get_ref().0,
        }
    }
}

impl SecureStream<Rewind<TcpStream>> {
    /// Replays `bytes` into a plaintext control stream ahead of a handshake.
    /// With `pending_lf`, an LF arriving first is treated as the tail of the
    /// last command line.
    pub fn rewind(&mut self, bytes: Bytes, pending_lf: bool) {
        if let SecureStream::Plain(inner) = self {
            inner.rewind(bytes);
            if pending_lf {
                inner.skip_leading_lf();
            }
        }
    }
}

impl DataStream {
    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.transport().peer_addr()
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncRead for SecureStream<S> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Plain(s) => Pin::new(s).poll_read(cx, buf),
            SecureStream::Tls(s) => Pin::new(s.as_mut()).poll_read(cx, buf),
        }
    }
}

impl<S: AsyncRead + AsyncWrite + Unpin> AsyncWrite for SecureStream<S> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match self.get_mut() {
            SecureStream::Plain(s) => Pin::new(s).poll_write(cx, buf),
            SecureStream::Tls(s) => Pin::new(s.as_mut()).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Plain(s) => Pin::new(s).poll_flush(cx),
            SecureStream::Tls(s) => Pin::new(s.as_mut()).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match self.get_mut() {
            SecureStream::Plain(s) => Pin::new(s).poll_shutdown(cx),
            SecureStream::Tls(s) => Pin::new(s.as_mut()).poll_shutdown(cx),
        }
    }
}
