//! Session commands: NOOP, SYST, FEAT, OPTS, TYPE, PWD, CWD, CDUP, STAT

use async_trait::async_trait;
use encoding_rs::UTF_8;
use log::info;

use crate::commands::handler::{CommandContext, CommandHandler};
use crate::error::{CommandError, FileSystemError};
use crate::protocol::encoding::latin1;
use crate::protocol::{Reply, codes};

pub struct Noop;

#[async_trait]
impl CommandHandler for Noop {
    async fn handle(&self, _ctx: &CommandContext) -> Result<Reply, CommandError> {
        Ok(Reply::new(codes::OK, "NOOP ok."))
    }
}

pub struct Syst;

#[async_trait]
impl CommandHandler for Syst {
    async fn handle(&self, _ctx: &CommandContext) -> Result<Reply, CommandError> {
        Ok(Reply::new(codes::SYSTEM_TYPE, "UNIX Type: L8"))
    }
}

pub struct Feat;

#[async_trait]
impl CommandHandler for Feat {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let mut lines = vec!["Extensions supported:".to_string()];
        if ctx.session.services().tls.is_some() {
            lines.extend([" AUTH TLS", " PBSZ", " PROT", " CCC"].map(String::from));
        }
        lines.extend([" EPRT", " EPSV", " PASV", " UTF8", " SITE BLST"].map(String::from));
        lines.push("End".to_string());
        Ok(Reply::multiline(codes::SYSTEM_STATUS, lines))
    }
}

/// OPTS with an option nobody registered.
pub struct Opts;

#[async_trait]
impl CommandHandler for Opts {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        Ok(Reply::new(
            codes::SYNTAX_ERROR_IN_ARGUMENTS,
            format!("Option '{}' not understood.", ctx.argument().trim()),
        ))
    }
}

/// `OPTS UTF8 ON|OFF` switches the control connection encoding.
pub struct OptsUtf8;

#[async_trait]
impl CommandHandler for OptsUtf8 {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let value = ctx
            .command
            .extension()
            .map(|(_, rest)| rest.trim().to_ascii_uppercase())
            .unwrap_or_default();

        let (encoding, message) = match value.as_str() {
            "" | "ON" => (UTF_8, "UTF8 mode enabled."),
            "OFF" => (latin1(), "UTF8 mode disabled."),
            _ => {
                return Ok(Reply::new(
                    codes::SYNTAX_ERROR_IN_ARGUMENTS,
                    "OPTS UTF8 takes ON or OFF.",
                ));
            }
        };

        ctx.session.encoding().set(encoding);
        info!(
            "Session {}: control encoding is now {}",
            ctx.session.id(),
            encoding.name()
        );
        Ok(Reply::new(codes::OK, message))
    }
}

pub struct Type;

#[async_trait]
impl CommandHandler for Type {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let requested = ctx.argument().trim().to_ascii_uppercase();
        let accepted = match requested.as_str() {
            "A" | "A N" => "ASCII",
            "I" | "L 8" => "binary",
            _ => {
                return Ok(Reply::new(
                    codes::PARAMETER_NOT_IMPLEMENTED,
                    format!("Type '{}' not implemented.", requested),
                ));
            }
        };
        Ok(Reply::new(codes::OK, format!("Type set to {}.", accepted)))
    }
}

pub struct Pwd;

#[async_trait]
impl CommandHandler for Pwd {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let cwd = ctx.session.cwd().replace('"', "\"\"");
        Ok(Reply::new(
            codes::PATH_CREATED,
            format!("\"{}\" is the current directory.", cwd),
        ))
    }
}

async fn change_directory(ctx: &CommandContext, target: &str) -> Result<Reply, CommandError> {
    let path = ctx.resolve_path(target)?;
    let entry = ctx.session.services().file_system.metadata(&path).await?;
    if !entry.is_dir {
        return Err(FileSystemError::NotADirectory(path).into());
    }
    ctx.session.set_cwd(path.clone());
    Ok(Reply::new(
        codes::FILE_ACTION_OK,
        format!("Directory changed to {}.", path),
    ))
}

pub struct Cwd;

#[async_trait]
impl CommandHandler for Cwd {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let target = match ctx.argument().trim() {
            "" => "/",
            target => target,
        };
        change_directory(ctx, target).await
    }
}

pub struct Cdup;

#[async_trait]
impl CommandHandler for Cdup {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        change_directory(ctx, "..").await
    }
}

pub struct Stat;

#[async_trait]
impl CommandHandler for Stat {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let session = &ctx.session;
        let target = ctx.argument().trim();

        if target.is_empty() {
            let user = session
                .principal()
                .map(|p| p.name)
                .unwrap_or_else(|| "nobody".to_string());
            return Ok(Reply::multiline(
                codes::SYSTEM_STATUS,
                [
                    "rax-ftpd status:".to_string(),
                    format!(" Connected from {}", session.peer()),
                    format!(" Logged in as {}", user),
                    format!(" Working directory {}", session.cwd()),
                    format!(
                        " Control connection {}",
                        if session.is_secure() { "secured with TLS" } else { "in plaintext" }
                    ),
                    format!(
                        " Data protection level {}",
                        if session.protect_data() { "P" } else { "C" }
                    ),
                    format!(" Encoding {}", session.encoding().get().name()),
                    "End of status".to_string(),
                ],
            ));
        }

        let path = ctx.resolve_path(target)?;
        let file_system = &session.services().file_system;
        let entry = file_system.metadata(&path).await?;
        let mut lines = vec![format!("Status of {}:", path)];
        if entry.is_dir {
            lines.extend(
                file_system
                    .list(&path)
                    .await?
                    .iter()
                    .map(|e| e.to_list_line()),
            );
        } else {
            lines.push(entry.to_list_line());
        }
        lines.push("End of status".to_string());
        Ok(Reply::multiline(codes::FILE_STATUS, lines))
    }
}
