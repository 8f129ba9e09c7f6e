//! Command handlers
//!
//! One unit struct per verb, grouped by concern, plus the registry that maps
//! verbs to them.

pub mod auth;
pub mod data;
pub mod files;
pub mod general;
pub mod handler;
pub mod registry;
pub mod security;
pub mod site;

pub use handler::{CommandContext, CommandHandler};
pub use registry::{CommandRegistry, HandlerRegistration};

/// Registry with every command the server supports.
pub fn default_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();
    registry
        // Usable before login
        .register(HandlerRegistration::new("USER", auth::User).public())
        .register(HandlerRegistration::new("PASS", auth::Pass).public())
        .register(HandlerRegistration::new("ACCT", auth::Acct).public())
        .register(HandlerRegistration::new("REIN", auth::Rein).public())
        .register(HandlerRegistration::new("QUIT", auth::Quit).public())
        .register(HandlerRegistration::new("NOOP", general::Noop).public())
        .register(HandlerRegistration::new("SYST", general::Syst).public())
        .register(HandlerRegistration::new("FEAT", general::Feat).public())
        .register(HandlerRegistration::new("OPTS", general::Opts).public())
        .register_extension(
            "OPTS",
            HandlerRegistration::new("UTF8", general::OptsUtf8).public(),
        )
        .register(HandlerRegistration::new("AUTH", security::Auth).public())
        .register(HandlerRegistration::new("PBSZ", security::Pbsz).public())
        .register(HandlerRegistration::new("PROT", security::Prot).public())
        // Session
        .register(HandlerRegistration::new("CCC", security::Ccc))
        .register(HandlerRegistration::new("TYPE", general::Type))
        .register(HandlerRegistration::new("PWD", general::Pwd))
        .register(HandlerRegistration::new("CWD", general::Cwd))
        .register(HandlerRegistration::new("CDUP", general::Cdup))
        .register(HandlerRegistration::new("STAT", general::Stat))
        // Data connections
        .register(HandlerRegistration::new("PORT", data::Port))
        .register(HandlerRegistration::new("EPRT", data::Eprt))
        .register(HandlerRegistration::new("PASV", data::Pasv))
        .register(HandlerRegistration::new("EPSV", data::Epsv))
        // Files
        .register(HandlerRegistration::new("LIST", files::List).abortable())
        .register(HandlerRegistration::new("NLST", files::Nlst).abortable())
        .register(HandlerRegistration::new("RETR", files::Retr).abortable())
        .register(HandlerRegistration::new("STOR", files::Stor).abortable())
        .register(HandlerRegistration::new("DELE", files::Dele))
        .register(HandlerRegistration::new("MKD", files::Mkd))
        .register(HandlerRegistration::new("RMD", files::Rmd))
        .register(HandlerRegistration::new("ABOR", files::Abor))
        .register(HandlerRegistration::new("SITE", site::Site))
        .register_extension("SITE", HandlerRegistration::new("BLST", site::Blst));
    registry
}
