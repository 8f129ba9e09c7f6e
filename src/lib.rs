//! RAX FTP Server
//!
//! An asynchronous FTP server core: control connection handling with
//! abortable commands, active and passive data connections, explicit TLS on
//! the control and data channels and a background transfer queue.

pub mod auth;
pub mod background;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod middleware;
pub mod protocol;
pub mod server;
pub mod storage;
pub mod tls;
pub mod transfer;

pub use config::ServerConfig;
pub use server::Server;
