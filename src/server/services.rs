//! Server-wide services shared by every connection.

use std::sync::Arc;
use tokio_rustls::TlsAcceptor;

use crate::auth::{Authenticator, MemoryAuthenticator};
use crate::background::BackgroundTransferQueue;
use crate::config::{SharedRuntimeConfig, StartupConfig};
use crate::storage::{DiskFileSystem, FileSystem};

pub struct ServerServices {
    pub config: Arc<StartupConfig>,
    pub runtime: SharedRuntimeConfig,
    pub file_system: Arc<dyn FileSystem>,
    pub authenticator: Arc<dyn Authenticator>,
    pub tls: Option<TlsAcceptor>,
    pub transfers: Arc<BackgroundTransferQueue>,
}

impl ServerServices {
    /// Disk storage under `server_root` and the configured user table.
    pub fn new(
        config: StartupConfig,
        runtime: SharedRuntimeConfig,
        transfers: Arc<BackgroundTransferQueue>,
    ) -> Self {
        let file_system = DiskFileSystem::new(config.server_root_path())
            .with_deferred_commit(config.deferred_commit);
        let authenticator =
            MemoryAuthenticator::new(config.users.clone(), config.allow_anonymous);

        Self {
            config: Arc::new(config),
            runtime,
            file_system: Arc::new(file_system),
            authenticator: Arc::new(authenticator),
            tls: None,
            transfers,
        }
    }

    pub fn with_tls(mut self, acceptor: Option<TlsAcceptor>) -> Self {
        self.tls = acceptor;
        self
    }
}
