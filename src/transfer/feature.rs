//! Data connection feature
//!
//! Wraps one establisher and yields exactly one logical data connection.
//! Repeated requests while open return the same stream; once closed (or once
//! establishing it failed) the feature stays closed.

use log::{debug, info};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::error::DataConnectionError;
use crate::tls::{DataStream, SecureStream, accept_tls};
use crate::transfer::establisher::DataConnectionEstablisher;
use crate::transfer::validation::DataConnectionValidator;

enum FeatureState {
    Unopened,
    Open(DataStream),
    Closed,
}

pub struct DataConnectionFeature {
    establisher: Box<dyn DataConnectionEstablisher>,
    validators: Vec<Arc<dyn DataConnectionValidator>>,
    protection: Option<TlsAcceptor>,
    state: FeatureState,
}

impl DataConnectionFeature {
    pub fn new(establisher: Box<dyn DataConnectionEstablisher>) -> Self {
        Self {
            establisher,
            validators: Vec::new(),
            protection: None,
            state: FeatureState::Unopened,
        }
    }

    /// Appends a validator; validators run in insertion order.
    pub fn with_validator(mut self, validator: Arc<dyn DataConnectionValidator>) -> Self {
        self.validators.push(validator);
        self
    }

    /// TLS-wraps the stream before handing it out (PROT P).
    pub fn set_protection(&mut self, acceptor: Option<TlsAcceptor>) {
        self.protection = acceptor;
    }

    pub fn local_endpoint(&self) -> Option<SocketAddr> {
        self.establisher.local_endpoint()
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.state, FeatureState::Closed)
    }

    /// Returns the data stream, establishing it on first use.
    pub async fn get_connection(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<&mut DataStream, DataConnectionError> {
        match self.state {
            FeatureState::Closed => return Err(DataConnectionError::Closed),
            FeatureState::Open(_) => {}
            FeatureState::Unopened => match self.open(timeout, cancel).await {
                Ok(stream) => self.state = FeatureState::Open(stream),
                Err(e) => {
                    self.state = FeatureState::Closed;
                    return Err(e);
                }
            },
        }

        match &mut self.state {
            FeatureState::Open(stream) => Ok(stream),
            _ => Err(DataConnectionError::Closed),
        }
    }

    async fn open(
        &mut self,
        timeout: Duration,
        cancel: &CancellationToken,
    ) -> Result<DataStream, DataConnectionError> {
        let stream = self.establisher.establish(timeout, cancel).await?;
        for validator in &self.validators {
            validator.validate(&stream)?;
        }

        let Some(acceptor) = &self.protection else {
            return Ok(SecureStream::Plain(stream));
        };

        debug!("Negotiating TLS on data connection");
        tokio::select! {
            _ = cancel.cancelled() => Err(DataConnectionError::Cancelled),
            upgraded = accept_tls(stream, acceptor, timeout) => {
                upgraded.map_err(DataConnectionError::Tls)
            }
        }
    }

    /// Shuts the stream down. Safe to call any number of times.
    pub async fn close(&mut self) {
        let previous = std::mem::replace(&mut self.state, FeatureState::Closed);
        if let FeatureState::Open(mut stream) = previous {
            if let Err(e) = stream.shutdown().await {
                debug!("Data connection shutdown: {}", e);
            }
            info!("Data connection closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transfer::passive::PassiveEstablisher;
    use crate::transfer::validation::PeerAddressValidator;
    use std::net::{IpAddr, Ipv4Addr};
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpStream;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);
    const TIMEOUT: Duration = Duration::from_secs(5);

    async fn passive_feature() -> (DataConnectionFeature, SocketAddr) {
        let passive = PassiveEstablisher::bind(LOCALHOST, 0, 0).await.unwrap();
        let endpoint = passive.local_endpoint().unwrap();
        (DataConnectionFeature::new(Box::new(passive)), endpoint)
    }

    #[tokio::test]
    async fn test_repeated_requests_return_the_same_stream() {
        let (mut feature, endpoint) = passive_feature().await;
        let cancel = CancellationToken::new();
        let client = tokio::spawn(async move { TcpStream::connect(endpoint).await });

        let first_peer = feature
            .get_connection(TIMEOUT, &cancel)
            .await
            .unwrap()
            .peer_addr()
            .unwrap();
        let mut client = client.await.unwrap().unwrap();

        let stream = feature.get_connection(TIMEOUT, &cancel).await.unwrap();
        assert_eq!(stream.peer_addr().unwrap(), first_peer);
        stream.write_all(b"same").await.unwrap();
        feature.close().await;

        let mut received = Vec::new();
        client.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, b"same");
    }

    #[tokio::test]
    async fn test_close_is_idempotent_and_final() {
        let (mut feature, endpoint) = passive_feature().await;
        let cancel = CancellationToken::new();
        let _client = tokio::spawn(async move { TcpStream::connect(endpoint).await });

        feature.get_connection(TIMEOUT, &cancel).await.unwrap();
        feature.close().await;
        feature.close().await;

        assert!(feature.is_closed());
        assert!(matches!(
            feature.get_connection(TIMEOUT, &cancel).await,
            Err(DataConnectionError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_failed_establishment_closes_feature() {
        let (mut feature, _) = passive_feature().await;
        let cancel = CancellationToken::new();

        let err = feature
            .get_connection(Duration::from_millis(50), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, DataConnectionError::Timeout(_)));
        assert!(feature.is_closed());
    }

    #[tokio::test]
    async fn test_validator_rejects_foreign_peer() {
        let (feature, endpoint) = passive_feature().await;
        let validator = PeerAddressValidator::new(IpAddr::V4(Ipv4Addr::new(192, 0, 2, 1)));
        let mut feature = feature.with_validator(Arc::new(validator));
        let _client = tokio::spawn(async move { TcpStream::connect(endpoint).await });

        let err = feature
            .get_connection(TIMEOUT, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, DataConnectionError::Validation { .. }));
        assert!(feature.is_closed());
    }

    #[tokio::test]
    async fn test_cancellation_while_waiting() {
        let (mut feature, _) = passive_feature().await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            trigger.cancel();
        });

        let err = feature.get_connection(TIMEOUT, &cancel).await.unwrap_err();
        assert!(matches!(err, DataConnectionError::Cancelled));
    }
}
