//! Command handler contract

use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::client::Session;
use crate::error::{CommandError, FileSystemError};
use crate::protocol::{Command, Reply};
use crate::storage::resolve_virtual_path;

/// Everything a handler gets to see about one command invocation.
pub struct CommandContext {
    pub session: Arc<Session>,
    pub command: Command,
    /// Child of the connection's master token. Abortable commands observe it
    /// being cancelled on ABOR.
    pub cancel: CancellationToken,
}

impl CommandContext {
    pub fn new(session: Arc<Session>, command: Command, cancel: CancellationToken) -> Self {
        Self {
            session,
            command,
            cancel,
        }
    }

    pub fn argument(&self) -> &str {
        self.command.argument()
    }

    /// Resolves a client path against the session's working directory.
    pub fn resolve_path(&self, target: &str) -> Result<String, FileSystemError> {
        resolve_virtual_path(&self.session.cwd(), target)
    }
}

#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError>;
}
