//! Data connection validators

use std::net::IpAddr;
use tokio::net::TcpStream;

use crate::error::DataConnectionError;

/// Check applied to every freshly established data connection.
pub trait DataConnectionValidator: Send + Sync {
    fn validate(&self, stream: &TcpStream) -> Result<(), DataConnectionError>;
}

/// Rejects data connections whose peer is not the control connection's peer.
pub struct PeerAddressValidator {
    control_peer: IpAddr,
}

impl PeerAddressValidator {
    pub fn new(control_peer: IpAddr) -> Self {
        Self { control_peer }
    }

    /// Whether `ip` is the control connection's peer.
    pub fn matches(&self, ip: IpAddr) -> bool {
        ip.to_canonical() == self.control_peer.to_canonical()
    }
}

impl DataConnectionValidator for PeerAddressValidator {
    fn validate(&self, stream: &TcpStream) -> Result<(), DataConnectionError> {
        let peer = stream.peer_addr()?;
        if self.matches(peer.ip()) {
            Ok(())
        } else {
            Err(DataConnectionError::Validation {
                peer,
                reason: format!("expected peer {}", self.control_peer),
            })
        }
    }
}
