//! Error handling
//!
//! One error enum per subsystem, all funnelling into [`CommandError`], which
//! the dispatcher turns into a reply and logs.

pub mod handlers;
pub mod types;

pub use handlers::handle_error;
pub use types::{
    AuthError, CommandError, DataConnectionError, FileSystemError, ProtocolError, TlsError,
    TransferError,
};
