//! RFC 4217 commands: AUTH, PBSZ, PROT, CCC
//!
//! AUTH and CCC only request the transport change. The connection driver
//! performs it once the reply has been flushed to the client.

use async_trait::async_trait;

use crate::client::TransportChange;
use crate::commands::handler::{CommandContext, CommandHandler};
use crate::error::CommandError;
use crate::protocol::{Reply, codes};

pub struct Auth;

#[async_trait]
impl CommandHandler for Auth {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let mechanism = ctx.argument().trim().to_ascii_uppercase();
        if !matches!(mechanism.as_str(), "TLS" | "TLS-C" | "SSL") {
            return Ok(Reply::new(
                codes::PARAMETER_NOT_IMPLEMENTED,
                format!("Security mechanism '{}' not implemented.", mechanism),
            ));
        }
        if ctx.session.services().tls.is_none() {
            return Err(CommandError::NotSupported("AUTH TLS".into()));
        }
        if ctx.session.is_secure() {
            return Ok(Reply::new(codes::BAD_SEQUENCE, "Connection is already secured."));
        }

        ctx.session.request_transport_change(TransportChange::Upgrade);
        Ok(Reply::new(
            codes::SECURITY_EXCHANGE_OK,
            format!("AUTH {} successful.", mechanism),
        ))
    }
}

pub struct Pbsz;

#[async_trait]
impl CommandHandler for Pbsz {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        if !ctx.session.is_secure() {
            return Ok(Reply::new(
                codes::BAD_SEQUENCE,
                "PBSZ requires a secured control connection.",
            ));
        }
        if ctx.argument().trim().parse::<u64>().is_err() {
            return Ok(Reply::new(
                codes::SYNTAX_ERROR_IN_ARGUMENTS,
                "PBSZ takes a decimal buffer size.",
            ));
        }
        ctx.session.set_pbsz();
        Ok(Reply::new(codes::OK, "PBSZ=0"))
    }
}

pub struct Prot;

#[async_trait]
impl CommandHandler for Prot {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        if !ctx.session.pbsz_set() {
            return Ok(Reply::new(codes::BAD_SEQUENCE, "PROT must follow PBSZ."));
        }
        match ctx.argument().trim().to_ascii_uppercase().as_str() {
            "C" => {
                ctx.session.set_protect_data(false);
                Ok(Reply::new(codes::OK, "Protection level set to Clear."))
            }
            "P" => {
                ctx.session.set_protect_data(true);
                Ok(Reply::new(codes::OK, "Protection level set to Private."))
            }
            "S" | "E" => Ok(Reply::new(
                codes::PROTECTION_LEVEL_NOT_SUPPORTED,
                "Protection level not supported.",
            )),
            _ => Ok(Reply::new(
                codes::PARAMETER_NOT_IMPLEMENTED,
                "Unknown protection level.",
            )),
        }
    }
}

pub struct Ccc;

#[async_trait]
impl CommandHandler for Ccc {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        if !ctx.session.is_secure() {
            return Ok(Reply::new(
                codes::PROTECTION_DENIED,
                "Control connection is not secured.",
            ));
        }
        ctx.session.request_transport_change(TransportChange::Downgrade);
        Ok(Reply::new(codes::OK, "Clearing control channel protection."))
    }
}
