//! Error types
//!
//! Defines domain-specific error types for each module of the FTP server.
//! Every variant that can reach a client is converted to a reply exactly once,
//! in `error::handlers`.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while turning raw control-connection bytes into commands.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("Command line too long (limit is {limit} bytes)")]
    LineTooLong { limit: usize },

    #[error("Syntax error in parameters or arguments: {0}")]
    MalformedArgument(String),
}

/// Authentication module errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid username: {0}")]
    InvalidUsername(String),

    #[error("Invalid password for user: {0}")]
    InvalidPassword(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("Anonymous login is disabled")]
    AnonymousDisabled,
}

/// Storage module errors. Each kind carries the reply code sent to the client.
#[derive(Debug, Error)]
pub enum FileSystemError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("File already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Not a regular file: {0}")]
    NotAFile(String),

    #[error("File name not allowed: {0}")]
    InvalidPath(String),

    #[error("Insufficient storage space")]
    InsufficientStorage,

    #[error("Local error in processing: {0}")]
    Io(#[from] io::Error),
}

impl FileSystemError {
    /// Reply code carried by this error.
    pub fn code(&self) -> u16 {
        match self {
            FileSystemError::NotFound(_)
            | FileSystemError::PermissionDenied(_)
            | FileSystemError::AlreadyExists(_)
            | FileSystemError::NotADirectory(_)
            | FileSystemError::NotAFile(_) => 550,
            FileSystemError::InvalidPath(_) => 553,
            FileSystemError::InsufficientStorage => 552,
            FileSystemError::Io(_) => 451,
        }
    }
}

/// TLS negotiation and shutdown errors.
#[derive(Debug, Error)]
pub enum TlsError {
    #[error("TLS is not configured on this server")]
    NotConfigured,

    #[error("Connection is already secured")]
    AlreadySecure,

    #[error("Connection is not secured")]
    NotSecure,

    #[error("TLS handshake failed: {0}")]
    Handshake(#[source] io::Error),

    #[error("TLS handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("Invalid TLS configuration: {0}")]
    Config(#[from] rustls::Error),
}

/// Data connection errors, surfaced to clients as 425.
#[derive(Debug, Error)]
pub enum DataConnectionError {
    #[error("No data connection negotiated; use PORT, EPRT, PASV or EPSV first")]
    NotConfigured,

    #[error("Data connection already closed")]
    Closed,

    #[error("Passive listener already consumed")]
    ListenerConsumed,

    #[error("No available passive port in range {min}-{max}")]
    NoAvailablePort { min: u16, max: u16 },

    #[error("Failed to bind data socket {0}: {1}")]
    Bind(SocketAddr, #[source] io::Error),

    #[error("Timed out after {0:?} waiting for data connection")]
    Timeout(Duration),

    #[error("Data connection cancelled")]
    Cancelled,

    #[error("Data connection from {peer} rejected: {reason}")]
    Validation { peer: SocketAddr, reason: String },

    #[error("Could not connect to {target} after {} attempts", .failures.len())]
    Exhausted {
        target: SocketAddr,
        failures: Vec<io::Error>,
    },

    #[error("Data connection TLS negotiation failed: {0}")]
    Tls(#[from] TlsError),

    #[error("Data connection I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Background transfer errors. Never reported to a specific client.
#[derive(Debug, Error)]
pub enum TransferError {
    #[error("Transfer queue is closed")]
    QueueClosed,

    #[error("Transfer cancelled")]
    Cancelled,

    #[error("Transfer I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Error returned by command handlers and middleware.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error(transparent)]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    DataConnection(#[from] DataConnectionError),

    #[error(transparent)]
    Tls(#[from] TlsError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("Command not implemented: {0}")]
    NotSupported(String),

    #[error("Command aborted")]
    Aborted,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Internal(String),
}
