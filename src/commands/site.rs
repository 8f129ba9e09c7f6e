//! SITE and its extensions

use async_trait::async_trait;

use crate::background::TransferStatus;
use crate::commands::handler::{CommandContext, CommandHandler};
use crate::error::CommandError;
use crate::protocol::{Reply, codes};

/// SITE with a sub-command nobody registered.
pub struct Site;

#[async_trait]
impl CommandHandler for Site {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let name = ctx
            .command
            .extension()
            .map(|(name, _)| name)
            .unwrap_or_default();
        Ok(Reply::new(
            codes::PARAMETER_NOT_IMPLEMENTED,
            format!("SITE {} not implemented.", name),
        ))
    }
}

/// `SITE BLST`: lists the background transfer queue.
pub struct Blst;

#[async_trait]
impl CommandHandler for Blst {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let entries = ctx.session.services().transfers.entries();
        if entries.is_empty() {
            return Ok(Reply::new(codes::SYSTEM_STATUS, "No background transfers."));
        }

        let mut lines = vec![format!("{} background transfer(s):", entries.len())];
        lines.extend(entries.iter().map(|entry| {
            let status = match entry.status {
                TransferStatus::Enqueued => "enqueued",
                TransferStatus::Transferring => "transferring",
                TransferStatus::Finished => "finished",
            };
            match entry.transferred {
                Some(bytes) => format!(" #{} {} {} {} bytes", entry.sequence, status, entry.id, bytes),
                None => format!(" #{} {} {}", entry.sequence, status, entry.id),
            }
        }));
        lines.push("End".to_string());
        Ok(Reply::multiline(codes::SYSTEM_STATUS, lines))
    }
}
