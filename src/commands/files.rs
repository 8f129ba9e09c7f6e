//! File commands: LIST, NLST, RETR, STOR, DELE, MKD, RMD, ABOR
//!
//! Transfer commands resolve everything they need from storage before the
//! 150 preliminary reply, so lookup failures never open a data connection.
//! The data connection feature is taken out of the session for the duration
//! of the transfer and always closed afterwards.

use async_trait::async_trait;
use log::info;
use tokio::io::AsyncWriteExt;

use crate::commands::handler::{CommandContext, CommandHandler};
use crate::error::{CommandError, DataConnectionError};
use crate::protocol::{Reply, codes};
use crate::storage::FileEntry;
use crate::tls::DataStream;
use crate::transfer::DataConnectionFeature;

/// Takes the negotiated data connection and announces the transfer.
async fn begin_transfer(ctx: &CommandContext) -> Result<DataConnectionFeature, CommandError> {
    let mut feature = ctx
        .session
        .take_data_connection()
        .await
        .ok_or(DataConnectionError::NotConfigured)?;
    feature.set_protection(ctx.session.data_protection());
    ctx.session.reply(Reply::new(
        codes::OPENING_DATA_CONNECTION,
        "Opening data connection.",
    ));
    Ok(feature)
}

async fn connect<'a>(
    ctx: &CommandContext,
    feature: &'a mut DataConnectionFeature,
) -> Result<&'a mut DataStream, DataConnectionError> {
    let timeout = ctx.session.services().config.data_connection_timeout();
    feature.get_connection(timeout, &ctx.cancel).await
}

fn transfer_complete() -> Reply {
    Reply::new(codes::TRANSFER_COMPLETE, "Closing data connection.")
}

/// Sends `bytes` over a freshly opened data connection.
async fn send_bytes(ctx: &CommandContext, bytes: &[u8]) -> Result<Reply, CommandError> {
    let mut feature = begin_transfer(ctx).await?;
    let result = async {
        let stream = connect(ctx, &mut feature).await?;
        stream.write_all(bytes).await.map_err(DataConnectionError::Io)?;
        stream.flush().await.map_err(DataConnectionError::Io)
    }
    .await;
    feature.close().await;
    result?;
    Ok(transfer_complete())
}

/// Entries of a directory, or the entry itself for a file.
async fn listing(ctx: &CommandContext) -> Result<Vec<FileEntry>, CommandError> {
    let target = ctx
        .argument()
        .split_whitespace()
        .find(|word| !word.starts_with('-'))
        .unwrap_or(".");
    let path = ctx.resolve_path(target)?;
    let file_system = &ctx.session.services().file_system;

    let entry = file_system.metadata(&path).await?;
    if entry.is_dir {
        Ok(file_system.list(&path).await?)
    } else {
        Ok(vec![entry])
    }
}

fn encode_lines(ctx: &CommandContext, lines: impl Iterator<Item = String>) -> Vec<u8> {
    let text: String = lines.map(|line| line + "\r\n").collect();
    ctx.session.encoding().encode(&text)
}

pub struct List;

#[async_trait]
impl CommandHandler for List {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let entries = listing(ctx).await?;
        let bytes = encode_lines(ctx, entries.iter().map(FileEntry::to_list_line));
        send_bytes(ctx, &bytes).await
    }
}

pub struct Nlst;

#[async_trait]
impl CommandHandler for Nlst {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let entries = listing(ctx).await?;
        let bytes = encode_lines(ctx, entries.into_iter().map(|entry| entry.name));
        send_bytes(ctx, &bytes).await
    }
}

pub struct Retr;

#[async_trait]
impl CommandHandler for Retr {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let path = ctx.resolve_path(ctx.argument().trim())?;
        let mut reader = ctx.session.services().file_system.open_read(&path).await?;

        let mut feature = begin_transfer(ctx).await?;
        let result = async {
            let stream = connect(ctx, &mut feature).await?;
            let sent = tokio::io::copy(&mut reader, &mut *stream)
                .await
                .map_err(DataConnectionError::Io)?;
            stream.flush().await.map_err(DataConnectionError::Io)?;
            Ok::<u64, DataConnectionError>(sent)
        }
        .await;
        feature.close().await;

        let sent = result?;
        info!("Session {}: sent {} ({} bytes)", ctx.session.id(), path, sent);
        Ok(transfer_complete())
    }
}

pub struct Stor;

#[async_trait]
impl CommandHandler for Stor {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let services = ctx.session.services();
        let path = ctx.resolve_path(ctx.argument().trim())?;

        let mut feature = begin_transfer(ctx).await?;
        let result = async {
            let stream = connect(ctx, &mut feature).await?;
            Ok::<_, CommandError>(services.file_system.store(&path, stream).await?)
        }
        .await;
        feature.close().await;

        match result? {
            Some(commit) => {
                let queued = services.transfers.enqueue(commit)?;
                info!(
                    "Session {}: received {}, commit queued as #{}",
                    ctx.session.id(),
                    path,
                    queued.sequence
                );
            }
            None => info!("Session {}: received {}", ctx.session.id(), path),
        }
        Ok(transfer_complete())
    }
}

pub struct Dele;

#[async_trait]
impl CommandHandler for Dele {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let path = ctx.resolve_path(ctx.argument().trim())?;
        ctx.session.services().file_system.delete(&path).await?;
        Ok(Reply::new(codes::FILE_ACTION_OK, format!("Deleted {}.", path)))
    }
}

pub struct Mkd;

#[async_trait]
impl CommandHandler for Mkd {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let path = ctx.resolve_path(ctx.argument().trim())?;
        ctx.session.services().file_system.create_dir(&path).await?;
        Ok(Reply::new(
            codes::PATH_CREATED,
            format!("\"{}\" created.", path.replace('"', "\"\"")),
        ))
    }
}

pub struct Rmd;

#[async_trait]
impl CommandHandler for Rmd {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let path = ctx.resolve_path(ctx.argument().trim())?;
        ctx.session.services().file_system.remove_dir(&path).await?;
        Ok(Reply::new(
            codes::FILE_ACTION_OK,
            format!("Removed {}.", path),
        ))
    }
}

/// ABOR with no transfer running. The connection driver cancels a running
/// transfer (426) before this handler replies.
pub struct Abor;

#[async_trait]
impl CommandHandler for Abor {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        ctx.session.replace_data_connection(None).await;
        Ok(Reply::new(
            codes::TRANSFER_COMPLETE,
            "ABOR command successful.",
        ))
    }
}
