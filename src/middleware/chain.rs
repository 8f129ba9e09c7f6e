//! Middleware chain
//!
//! Middleware wrap command execution in registration order; the innermost
//! step calls the handler.

use async_trait::async_trait;
use std::sync::Arc;

use crate::commands::{CommandContext, CommandHandler};
use crate::error::CommandError;
use crate::protocol::Reply;

#[async_trait]
pub trait CommandMiddleware: Send + Sync {
    async fn handle(&self, ctx: &CommandContext, next: Next<'_>) -> Result<Reply, CommandError>;
}

/// The rest of the chain after the current middleware.
pub struct Next<'a> {
    middleware: &'a [Arc<dyn CommandMiddleware>],
    handler: &'a dyn CommandHandler,
}

impl<'a> Next<'a> {
    pub fn new(middleware: &'a [Arc<dyn CommandMiddleware>], handler: &'a dyn CommandHandler) -> Self {
        Self {
            middleware,
            handler,
        }
    }

    pub async fn run(self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        match self.middleware.split_first() {
            Some((first, rest)) => {
                first
                    .handle(
                        ctx,
                        Next {
                            middleware: rest,
                            handler: self.handler,
                        },
                    )
                    .await
            }
            None => self.handler.handle(ctx).await,
        }
    }
}
