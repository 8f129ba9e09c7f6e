//! Secure transport adapter
//!
//! Plain/TLS stream wrapper, handshake-in-place upgrade and graceful TLS
//! shutdown for control and data connections.

pub mod acceptor;
pub mod stream;
pub mod upgrade;

pub use acceptor::{acceptor_from_der, load_acceptor};
pub use stream::{ControlStream, DataStream, Rewind, SecureStream};
pub use upgrade::{UpgradeFailure, accept_tls, shutdown_tls, upgrade_stream};
