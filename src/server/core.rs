use anyhow::{Context, Result};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::background::{BackgroundTransferQueue, BackgroundTransferWorker};
use crate::client::handle_client;
use crate::config::ServerConfig;
use crate::server::dispatcher::Dispatcher;
use crate::server::services::ServerServices;
use crate::tls::load_acceptor;

const TOO_MANY_CLIENTS: &[u8] = b"421 Too many connections. Try again later.\r\n";

pub struct Server {
    listener: TcpListener,
    services: Arc<ServerServices>,
    dispatcher: Arc<Dispatcher>,
    worker: BackgroundTransferWorker,
    shutdown: CancellationToken,
    connections: TaskTracker,
    active_clients: Arc<AtomicUsize>,
    next_session_id: AtomicU64,
}

/// Decrements the active client count when a connection ends.
struct ClientSlot(Arc<AtomicUsize>);

impl Drop for ClientSlot {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl Server {
    /// Binds the control listener, loading TLS material from the configured
    /// certificate and key when both are set.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let acceptor = match (&config.startup.tls_cert_path, &config.startup.tls_key_path) {
            (Some(cert), Some(key)) => {
                Some(load_acceptor(cert, key).context("Failed to load TLS configuration")?)
            }
            _ => None,
        };
        Self::bind_with_acceptor(config, acceptor).await
    }

    /// Binds the control listener with an already-built TLS acceptor.
    pub async fn bind_with_acceptor(
        config: ServerConfig,
        tls: Option<TlsAcceptor>,
    ) -> Result<Self> {
        config.validate()?;
        let (startup, runtime) = config.split();

        let server_root = startup.server_root_path();
        tokio::fs::create_dir_all(&server_root)
            .await
            .with_context(|| format!("Failed to create server root {}", server_root.display()))?;
        info!("Server root directory: {}", server_root.display());

        let socket = startup.control_socket();
        let listener = TcpListener::bind(&socket)
            .await
            .with_context(|| format!("Failed to bind to {}", socket))?;
        info!("Server bound to {}", listener.local_addr()?);

        let transfers = Arc::new(BackgroundTransferQueue::new());
        let worker = BackgroundTransferWorker::start(Arc::clone(&transfers));
        if tls.is_some() {
            info!("Explicit TLS (AUTH TLS) enabled");
        }
        let services = ServerServices::new(startup, runtime, transfers).with_tls(tls);

        Ok(Self {
            listener,
            services: Arc::new(services),
            dispatcher: Arc::new(Dispatcher::default()),
            worker,
            shutdown: CancellationToken::new(),
            connections: TaskTracker::new(),
            active_clients: Arc::new(AtomicUsize::new(0)),
            next_session_id: AtomicU64::new(1),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Cancelling this token stops the server and closes every connection.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn services(&self) -> &Arc<ServerServices> {
        &self.services
    }

    /// Accepts connections until the shutdown token is cancelled, then waits
    /// for open connections and the transfer worker to finish.
    pub async fn run(self) {
        info!(
            "Starting Rax FTP server on {} (max {} clients)",
            self.listener
                .local_addr()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            self.services.runtime.read().await.max_clients
        );

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, addr)) => self.accept(stream, addr).await,
                    Err(e) => error!("Error accepting connection: {}", e),
                },
            }
        }

        info!("Shutting down, closing {} connection(s)", self.connections.len());
        drop(self.listener);
        self.connections.close();
        self.connections.wait().await;
        self.worker
            .stop_within(self.services.config.transfer_drain_timeout())
            .await;
        info!("Server stopped");
    }

    async fn accept(&self, mut stream: TcpStream, addr: SocketAddr) {
        let max_clients = self.services.runtime.read().await.max_clients;
        let active = self.active_clients.fetch_add(1, Ordering::SeqCst) + 1;
        let slot = ClientSlot(Arc::clone(&self.active_clients));

        if active > max_clients {
            warn!("Rejecting {}: {} clients already connected", addr, max_clients);
            self.connections.spawn(async move {
                let _ = stream.write_all(TOO_MANY_CLIENTS).await;
                let _ = stream.shutdown().await;
                drop(slot);
            });
            return;
        }

        let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
        info!(
            "Accepted {} as session {} ({}/{} clients)",
            addr, session_id, active, max_clients
        );

        let services = Arc::clone(&self.services);
        let dispatcher = Arc::clone(&self.dispatcher);
        let shutdown = self.shutdown.clone();
        self.connections.spawn(async move {
            let _slot = slot;
            if let Err(e) = handle_client(stream, session_id, services, dispatcher, shutdown).await {
                warn!("Session {} ({}) ended with error: {}", session_id, addr, e);
            }
        });
    }
}
