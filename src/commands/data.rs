//! Data connection negotiation: PORT, EPRT, PASV, EPSV
//!
//! Each command installs a fresh [`DataConnectionFeature`] on the session,
//! closing whatever the previous negotiation left behind. The connection
//! itself is only opened by the transfer command that follows.

use async_trait::async_trait;
use log::debug;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use crate::commands::handler::{CommandContext, CommandHandler};
use crate::error::CommandError;
use crate::protocol::{Reply, codes};
use crate::transfer::address::{
    epsv_reply, parse_eprt_argument, parse_port_argument, pasv_reply,
};
use crate::transfer::{
    ActiveEstablisher, DataConnectionFeature, PassiveEstablisher, PeerAddressValidator,
};

/// Attaches the peer check unless the server accepts data from anywhere.
fn with_peer_validation(
    ctx: &CommandContext,
    feature: DataConnectionFeature,
) -> DataConnectionFeature {
    if ctx.session.services().config.promiscuous_data {
        return feature;
    }
    let validator = PeerAddressValidator::new(ctx.session.peer().ip());
    feature.with_validator(Arc::new(validator))
}

async fn open_active(ctx: &CommandContext, target: SocketAddr) -> Result<Reply, CommandError> {
    let config = &ctx.session.services().config;
    if !config.promiscuous_data
        && !PeerAddressValidator::new(ctx.session.peer().ip()).matches(target.ip())
    {
        return Ok(Reply::new(
            codes::SYNTAX_ERROR_IN_ARGUMENTS,
            "Data connection target must be the control connection's address.",
        ));
    }

    let establisher = ActiveEstablisher::new(target).with_source_port(config.active_source_port);
    let feature = with_peer_validation(ctx, DataConnectionFeature::new(Box::new(establisher)));
    ctx.session.replace_data_connection(Some(feature)).await;

    debug!("Session {}: active data target {}", ctx.session.id(), target);
    Ok(Reply::new(
        codes::OK,
        format!("{} command successful.", ctx.command.verb()),
    ))
}

pub struct Port;

#[async_trait]
impl CommandHandler for Port {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let target = parse_port_argument(ctx.argument())?;
        open_active(ctx, target).await
    }
}

pub struct Eprt;

#[async_trait]
impl CommandHandler for Eprt {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let target = parse_eprt_argument(ctx.argument())?;
        open_active(ctx, target).await
    }
}

/// Binds a passive listener on the control connection's local address and
/// installs it. Returns the bound port.
async fn open_passive(ctx: &CommandContext) -> Result<u16, CommandError> {
    let config = &ctx.session.services().config;
    let ip = ctx.session.local().ip();

    // Drop the old listener first so its port is free for reuse.
    ctx.session.replace_data_connection(None).await;
    let establisher =
        PassiveEstablisher::bind(ip, config.passive_port_min, config.passive_port_max).await?;
    let port = establisher.port();

    let feature = with_peer_validation(ctx, DataConnectionFeature::new(Box::new(establisher)));
    ctx.session.replace_data_connection(Some(feature)).await;

    debug!(
        "Session {}: passive listener on {}:{}",
        ctx.session.id(),
        ip,
        port
    );
    Ok(port)
}

pub struct Pasv;

#[async_trait]
impl CommandHandler for Pasv {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let announced = ctx
            .session
            .services()
            .config
            .passive_address
            .unwrap_or_else(|| ctx.session.local().ip());
        let IpAddr::V4(announced) = announced.to_canonical() else {
            return Err(CommandError::NotSupported(
                "PASV on an IPv6 connection; use EPSV".into(),
            ));
        };

        let port = open_passive(ctx).await?;
        Ok(pasv_reply(announced, port))
    }
}

pub struct Epsv;

#[async_trait]
impl CommandHandler for Epsv {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        if ctx.argument().trim().eq_ignore_ascii_case("ALL") {
            return Ok(Reply::new(codes::OK, "EPSV ALL accepted."));
        }
        let port = open_passive(ctx).await?;
        Ok(epsv_reply(port))
    }
}
