//! Control connections
//!
//! The per-connection driver, the session state it shares with command
//! handlers and the serialized reply writer.

pub mod handler;
pub mod session;
pub mod writer;

pub use handler::handle_client;
pub use session::{Session, TransportChange};
pub use writer::ReplySender;
