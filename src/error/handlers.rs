//! Error handlers
//!
//! Converts handler errors into protocol replies at the dispatcher boundary.

use crate::error::types::{CommandError, ProtocolError};
use crate::protocol::Reply;
use crate::protocol::responses::codes;
use log::{error, warn};

impl CommandError {
    /// Converts the error to the reply sent on the control connection.
    pub fn reply(&self) -> Reply {
        match self {
            CommandError::FileSystem(e) => Reply::new(e.code(), e.to_string()),
            CommandError::DataConnection(_) => Reply::new(
                codes::CANT_OPEN_DATA_CONNECTION,
                "Can't open data connection.",
            ),
            CommandError::Tls(_) => Reply::new(
                codes::SERVICE_NOT_AVAILABLE,
                "TLS negotiation failed, closing control connection.",
            ),
            CommandError::Auth(_) => Reply::new(codes::NOT_LOGGED_IN, "Not logged in."),
            CommandError::Protocol(ProtocolError::LineTooLong { .. }) => {
                Reply::new(codes::SYNTAX_ERROR, "Command line too long.")
            }
            CommandError::Protocol(ProtocolError::MalformedArgument(_)) => Reply::new(
                codes::SYNTAX_ERROR_IN_ARGUMENTS,
                "Syntax error in parameters or arguments.",
            ),
            CommandError::NotSupported(_) => {
                Reply::new(codes::NOT_IMPLEMENTED, "Command not implemented.")
            }
            CommandError::Aborted => Reply::new(
                codes::TRANSFER_ABORTED,
                "Connection closed; transfer aborted.",
            ),
            CommandError::Transfer(_) | CommandError::Io(_) | CommandError::Internal(_) => {
                Reply::new(
                    codes::SYNTAX_ERROR_IN_ARGUMENTS,
                    "Syntax error in parameters or arguments.",
                )
            }
        }
    }

    /// Whether the error is a fault rather than an expected protocol outcome.
    pub fn is_unexpected(&self) -> bool {
        matches!(
            self,
            CommandError::Transfer(_) | CommandError::Io(_) | CommandError::Internal(_)
        )
    }
}

/// Logs a handler error at a level matching its severity.
pub fn handle_error(session_id: u64, verb: &str, err: &CommandError) {
    if err.is_unexpected() {
        error!("Session {}: {} failed: {}", session_id, verb, err);
    } else {
        warn!("Session {}: {} rejected: {}", session_id, verb, err);
    }
}
