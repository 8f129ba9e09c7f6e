//! Passive mode (PASV/EPSV): the client connects to a listener we announce.

use async_trait::async_trait;
use log::{debug, info};
use std::io::ErrorKind;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;

use crate::error::DataConnectionError;
use crate::transfer::establisher::DataConnectionEstablisher;

pub struct PassiveEstablisher {
    listener: Option<TcpListener>,
    local: SocketAddr,
}

impl PassiveEstablisher {
    /// Binds the first free port in `min..=max` on `ip`. A `0..=0` range
    /// lets the OS pick.
    pub async fn bind(ip: IpAddr, min: u16, max: u16) -> Result<Self, DataConnectionError> {
        if min == 0 && max == 0 {
            let addr = SocketAddr::new(ip, 0);
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|e| DataConnectionError::Bind(addr, e))?;
            return Self::from_listener(listener);
        }

        for port in min..=max {
            let addr = SocketAddr::new(ip, port);
            match TcpListener::bind(addr).await {
                Ok(listener) => return Self::from_listener(listener),
                Err(e) if e.kind() == ErrorKind::AddrInUse => {
                    debug!("Passive port {} in use, trying next", port);
                }
                Err(e) => return Err(DataConnectionError::Bind(addr, e)),
            }
        }

        Err(DataConnectionError::NoAvailablePort { min, max })
    }

    fn from_listener(listener: TcpListener) -> Result<Self, DataConnectionError> {
        let local = listener.local_addr()?;
        info!("Passive listener bound on {}", local);
        Ok(Self {
            listener: Some(listener),
            local,
        })
    }

    pub fn port(&self) -> u16 {
        self.local.port()
    }
}

#[async_trait]
impl DataConnectionEstablisher for PassiveEstablisher {
    fn local_endpoint(&self) -> Option<SocketAddr> {
        Some(self.local)
    }

    async fn establish(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<TcpStream, DataConnectionError> {
        // The listener goes away with this call whatever the outcome.
        let listener = self
            .listener
            .take()
            .ok_or(DataConnectionError::ListenerConsumed)?;

        tokio::select! {
            _ = cancel.cancelled() => Err(DataConnectionError::Cancelled),
            accepted = tokio::time::timeout(timeout, listener.accept()) => match accepted {
                Ok(Ok((stream, peer))) => {
                    info!("Passive mode: accepted data connection from {} on {}", peer, self.local);
                    Ok(stream)
                }
                Ok(Err(e)) => Err(DataConnectionError::Io(e)),
                Err(_) => Err(DataConnectionError::Timeout(timeout)),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn test_accepts_exactly_one_connection() {
        let mut passive = PassiveEstablisher::bind(LOCALHOST, 0, 0).await.unwrap();
        let endpoint = passive.local_endpoint().unwrap();
        let client = tokio::spawn(async move { TcpStream::connect(endpoint).await });

        let stream = passive
            .establish(Duration::from_secs(5), &CancellationToken::new())
            .await
            .unwrap();
        let client = client.await.unwrap().unwrap();
        assert_eq!(stream.peer_addr().unwrap(), client.local_addr().unwrap());

        let again = passive
            .establish(Duration::from_secs(5), &CancellationToken::new())
            .await;
        assert!(matches!(again, Err(DataConnectionError::ListenerConsumed)));
        assert!(TcpStream::connect(endpoint).await.is_err());
    }

    #[tokio::test]
    async fn test_times_out_without_client() {
        let mut passive = PassiveEstablisher::bind(LOCALHOST, 0, 0).await.unwrap();
        let err = passive
            .establish(Duration::from_millis(50), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataConnectionError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_skips_ports_in_use() {
        let taken = TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let port = taken.local_addr().unwrap().port();
        if port == u16::MAX {
            return;
        }

        let passive = PassiveEstablisher::bind(LOCALHOST, port, port + 1).await;
        if let Ok(passive) = passive {
            assert_eq!(passive.port(), port + 1);
        }

        let exhausted = PassiveEstablisher::bind(LOCALHOST, port, port).await;
        assert!(matches!(
            exhausted,
            Err(DataConnectionError::NoAvailablePort { .. })
        ));
    }
}
