//! FTP Protocol implementation
//!
//! Handles command collection, the session encoding and reply formatting.

pub mod collector;
pub mod commands;
pub mod encoding;
pub mod responses;

pub use collector::CommandCollector;
pub use commands::Command;
pub use encoding::SharedEncoding;
pub use responses::{Reply, codes};
