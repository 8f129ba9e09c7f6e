//! Logging middleware
//!
//! Logs every command (passwords masked) and the outcome it produced.

use async_trait::async_trait;
use log::{debug, info};
use std::time::Instant;

use crate::commands::CommandContext;
use crate::error::CommandError;
use crate::middleware::chain::{CommandMiddleware, Next};
use crate::protocol::Reply;

pub struct LoggingMiddleware;

#[async_trait]
impl CommandMiddleware for LoggingMiddleware {
    async fn handle(&self, ctx: &CommandContext, next: Next<'_>) -> Result<Reply, CommandError> {
        let session_id = ctx.session.id();
        info!("Session {}: <- {}", session_id, ctx.command);

        let started = Instant::now();
        let result = next.run(ctx).await;
        let elapsed = started.elapsed().as_millis();

        match &result {
            Ok(reply) => info!(
                "Session {}: {} answered {} in {} ms",
                session_id,
                ctx.command.verb(),
                reply.code(),
                elapsed
            ),
            Err(e) => debug!(
                "Session {}: {} failed after {} ms: {}",
                session_id,
                ctx.command.verb(),
                elapsed,
                e
            ),
        }
        result
    }
}
