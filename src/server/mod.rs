//! Server core functionality
//!
//! The listener and accept loop, the command dispatcher and the services
//! shared by every connection.

pub mod core;
pub mod dispatcher;
pub mod services;

pub use self::core::Server;
pub use dispatcher::{BackgroundCommand, Dispatcher};
pub use services::ServerServices;
