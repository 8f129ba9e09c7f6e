//! Data connection establishment contract

use async_trait::async_trait;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use crate::error::DataConnectionError;

/// Produces the TCP stream behind one data connection.
#[async_trait]
pub trait DataConnectionEstablisher: Send {
    /// Local address the data connection uses, when known up front.
    fn local_endpoint(&self) -> Option<SocketAddr>;

    /// Opens the connection. Called at most once per establisher.
    async fn establish(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, DataConnectionError>;
}
