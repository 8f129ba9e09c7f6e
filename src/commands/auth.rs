//! Login commands: USER, PASS, ACCT, REIN, QUIT
//!
//! These handlers only produce replies; the dispatcher feeds each reply code
//! into the session's authorization state machine.

use async_trait::async_trait;
use log::info;

use crate::auth::{AuthorizationStatus, validate_username};
use crate::commands::handler::{CommandContext, CommandHandler};
use crate::error::{CommandError, ProtocolError};
use crate::protocol::{Reply, codes};

pub struct User;

#[async_trait]
impl CommandHandler for User {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let username = ctx.argument().trim();
        if username.is_empty() {
            return Err(ProtocolError::MalformedArgument("USER requires a name".into()).into());
        }

        let max_length = ctx.session.services().config.max_username_length;
        ctx.session.set_username(None);
        validate_username(username, max_length)?;
        ctx.session.set_username(Some(username.to_string()));

        Ok(Reply::new(
            codes::PASSWORD_REQUIRED,
            format!("User {} OK. Password required.", username),
        ))
    }
}

pub struct Pass;

#[async_trait]
impl CommandHandler for Pass {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        let session = &ctx.session;
        let username = match (session.auth_status(), session.username()) {
            (AuthorizationStatus::NeedPassword, Some(username)) => username,
            _ => {
                return Ok(Reply::new(codes::BAD_SEQUENCE, "Login with USER first."));
            }
        };

        let principal = session
            .services()
            .authenticator
            .authenticate(&username, ctx.argument())
            .await?;

        info!(
            "Session {}: {} logged in{}",
            session.id(),
            principal.name,
            if principal.anonymous { " anonymously" } else { "" }
        );
        session.set_principal(principal);
        Ok(Reply::new(codes::LOGIN_SUCCESS, "User logged in, proceed."))
    }
}

pub struct Acct;

#[async_trait]
impl CommandHandler for Acct {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        match ctx.session.auth_status() {
            AuthorizationStatus::NeedAccount => {
                Ok(Reply::new(codes::LOGIN_SUCCESS, "Account accepted, proceed."))
            }
            AuthorizationStatus::Authorized => Ok(Reply::new(
                codes::COMMAND_SUPERFLUOUS,
                "Account not needed.",
            )),
            _ => Ok(Reply::new(codes::BAD_SEQUENCE, "Login with USER first.")),
        }
    }
}

pub struct Rein;

#[async_trait]
impl CommandHandler for Rein {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        ctx.session.reinitialize().await;
        Ok(Reply::new(codes::READY, "Service ready for new user."))
    }
}

pub struct Quit;

#[async_trait]
impl CommandHandler for Quit {
    async fn handle(&self, ctx: &CommandContext) -> Result<Reply, CommandError> {
        ctx.session.request_close();
        Ok(Reply::new(codes::CLOSING_CONTROL, "Goodbye."))
    }
}
