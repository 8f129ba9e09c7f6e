//! Per-connection session state
//!
//! Shared between the connection driver and the command handlers it runs
//! (including an abortable command running in the background), so every
//! field sits behind its own lock or atomic.

use parking_lot::Mutex;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_rustls::TlsAcceptor;
use tokio_util::sync::CancellationToken;

use crate::auth::{AuthorizationState, AuthorizationStatus, Principal};
use crate::client::writer::ReplySender;
use crate::protocol::{Reply, SharedEncoding};
use crate::server::ServerServices;
use crate::transfer::DataConnectionFeature;

/// A control-connection transport switch requested by a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportChange {
    /// AUTH TLS: handshake right after the reply is flushed.
    Upgrade,
    /// CCC: shut down TLS right after the reply is flushed.
    Downgrade,
}

pub struct Session {
    id: u64,
    peer: SocketAddr,
    local: SocketAddr,
    services: Arc<ServerServices>,
    replies: ReplySender,
    cancel: CancellationToken,
    encoding: SharedEncoding,
    auth: Mutex<AuthorizationState>,
    cwd: Mutex<String>,
    data_connection: tokio::sync::Mutex<Option<DataConnectionFeature>>,
    transport_change: Mutex<Option<TransportChange>>,
    secure: AtomicBool,
    pbsz_set: AtomicBool,
    protect_data: AtomicBool,
    close_requested: AtomicBool,
}

impl Session {
    pub fn new(
        id: u64,
        peer: SocketAddr,
        local: SocketAddr,
        services: Arc<ServerServices>,
        replies: ReplySender,
        encoding: SharedEncoding,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            peer,
            local,
            services,
            replies,
            cancel,
            encoding,
            auth: Mutex::new(AuthorizationState::default()),
            cwd: Mutex::new("/".to_string()),
            data_connection: tokio::sync::Mutex::new(None),
            transport_change: Mutex::new(None),
            secure: AtomicBool::new(false),
            pbsz_set: AtomicBool::new(false),
            protect_data: AtomicBool::new(false),
            close_requested: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn local(&self) -> SocketAddr {
        self.local
    }

    pub fn services(&self) -> &ServerServices {
        &self.services
    }

    /// Master token; cancelling it tears down everything scoped to the
    /// connection.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn encoding(&self) -> &SharedEncoding {
        &self.encoding
    }

    /// Queues a reply on the connection's writer.
    pub fn reply(&self, reply: Reply) {
        self.replies.send(reply);
    }

    pub fn replies(&self) -> &ReplySender {
        &self.replies
    }

    // --------------------
    // Login state
    // --------------------

    pub fn auth_status(&self) -> AuthorizationStatus {
        self.auth.lock().status()
    }

    pub fn is_authorized(&self) -> bool {
        self.auth.lock().is_authorized()
    }

    /// Feeds a login reply into the authorization state machine.
    pub fn advance_login(&self, verb: &str, code: u16) -> AuthorizationStatus {
        self.auth.lock().apply(verb, code)
    }

    pub fn username(&self) -> Option<String> {
        self.auth.lock().username().map(str::to_string)
    }

    pub fn set_username(&self, username: Option<String>) {
        self.auth.lock().set_username(username);
    }

    pub fn principal(&self) -> Option<Principal> {
        self.auth.lock().principal().cloned()
    }

    pub fn set_principal(&self, principal: Principal) {
        self.auth.lock().set_principal(principal);
    }

    /// REIN: forget the login and the working directory.
    pub async fn reinitialize(&self) {
        self.auth.lock().reset();
        *self.cwd.lock() = "/".to_string();
        self.replace_data_connection(None).await;
    }

    // --------------------
    // Navigation
    // --------------------

    pub fn cwd(&self) -> String {
        self.cwd.lock().clone()
    }

    pub fn set_cwd(&self, path: String) {
        *self.cwd.lock() = path;
    }

    // --------------------
    // Data connection
    // --------------------

    /// Installs a freshly negotiated data connection, closing any previous one.
    pub async fn replace_data_connection(&self, feature: Option<DataConnectionFeature>) {
        let previous = {
            let mut slot = self.data_connection.lock().await;
            std::mem::replace(&mut *slot, feature)
        };
        if let Some(mut previous) = previous {
            previous.close().await;
        }
    }

    /// Takes the negotiated data connection for exclusive use by a command.
    pub async fn take_data_connection(&self) -> Option<DataConnectionFeature> {
        self.data_connection.lock().await.take()
    }

    /// TLS acceptor for data connections when PROT P is in effect.
    pub fn data_protection(&self) -> Option<TlsAcceptor> {
        if self.protect_data.load(Ordering::SeqCst) {
            self.services.tls.clone()
        } else {
            None
        }
    }

    // --------------------
    // Security
    // --------------------

    pub fn is_secure(&self) -> bool {
        self.secure.load(Ordering::SeqCst)
    }

    pub fn set_secure(&self, secure: bool) {
        self.secure.store(secure, Ordering::SeqCst);
        if !secure {
            self.pbsz_set.store(false, Ordering::SeqCst);
        }
    }

    pub fn pbsz_set(&self) -> bool {
        self.pbsz_set.load(Ordering::SeqCst)
    }

    pub fn set_pbsz(&self) {
        self.pbsz_set.store(true, Ordering::SeqCst);
    }

    pub fn set_protect_data(&self, protect: bool) {
        self.protect_data.store(protect, Ordering::SeqCst);
    }

    pub fn protect_data(&self) -> bool {
        self.protect_data.load(Ordering::SeqCst)
    }

    pub fn request_transport_change(&self, change: TransportChange) {
        *self.transport_change.lock() = Some(change);
    }

    pub fn take_transport_change(&self) -> Option<TransportChange> {
        self.transport_change.lock().take()
    }

    // --------------------
    // Lifecycle
    // --------------------

    pub fn request_close(&self) {
        self.close_requested.store(true, Ordering::SeqCst);
    }

    pub fn close_requested(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }
}
