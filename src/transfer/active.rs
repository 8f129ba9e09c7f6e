//! Active mode (PORT/EPRT): the server connects out to the client.
//!
//! Connection attempts are retried until either [`MAX_CONNECT_ATTEMPTS`]
//! attempts have failed or the overall timeout has elapsed, whichever comes
//! first. At least one attempt is always made.

use async_trait::async_trait;
use log::{debug, info, warn};
use std::io::{self, ErrorKind};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpSocket, TcpStream};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::DataConnectionError;
use crate::transfer::establisher::DataConnectionEstablisher;

pub const MAX_CONNECT_ATTEMPTS: usize = 5;
pub const RETRY_DELAY: Duration = Duration::from_millis(100);

pub struct ActiveEstablisher {
    target: SocketAddr,
    source_port: Option<u16>,
}

impl ActiveEstablisher {
    pub fn new(target: SocketAddr) -> Self {
        Self {
            target,
            source_port: None,
        }
    }

    /// Connects from a fixed local port (traditionally 20).
    pub fn with_source_port(mut self, port: Option<u16>) -> Self {
        self.source_port = port;
        self
    }

    fn source(&self) -> Option<SocketAddr> {
        let port = self.source_port?;
        let ip = match self.target {
            SocketAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            SocketAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
        };
        Some(SocketAddr::new(ip, port))
    }

    async fn connect_once(&self) -> io::Result<TcpStream> {
        let Some(source) = self.source() else {
            return TcpStream::connect(self.target).await;
        };
        let socket = match self.target {
            SocketAddr::V4(_) => TcpSocket::new_v4()?,
            SocketAddr::V6(_) => TcpSocket::new_v6()?,
        };
        socket.set_reuseaddr(true)?;
        socket.bind(source)?;
        socket.connect(self.target).await
    }
}

#[async_trait]
impl DataConnectionEstablisher for ActiveEstablisher {
    fn local_endpoint(&self) -> Option<SocketAddr> {
        self.source()
    }

    async fn establish(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, DataConnectionError> {
        let deadline = Instant::now() + timeout;
        let mut failures = Vec::new();

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            debug!(
                "Active mode: connecting to {} (attempt {})",
                self.target,
                failures.len() + 1
            );

            let attempt = tokio::select! {
                _ = cancel.cancelled() => return Err(DataConnectionError::Cancelled),
                result = tokio::time::timeout(remaining, self.connect_once()) => result,
            };

            match attempt {
                Ok(Ok(stream)) => {
                    info!("Active mode: connected to {}", self.target);
                    return Ok(stream);
                }
                Ok(Err(e)) => {
                    warn!("Active mode: connecting to {} failed: {}", self.target, e);
                    failures.push(e);
                }
                Err(_) => {
                    warn!("Active mode: connecting to {} timed out", self.target);
                    failures.push(io::Error::new(ErrorKind::TimedOut, "connect timed out"));
                }
            }

            let remaining = deadline.saturating_duration_since(Instant::now());
            if failures.len() >= MAX_CONNECT_ATTEMPTS || remaining.is_zero() {
                break;
            }

            tokio::select! {
                _ = cancel.cancelled() => return Err(DataConnectionError::Cancelled),
                _ = tokio::time::sleep(RETRY_DELAY.min(remaining)) => {}
            }
            if Instant::now() >= deadline {
                break;
            }
        }

        Err(DataConnectionError::Exhausted {
            target: self.target,
            failures,
        })
    }
}
