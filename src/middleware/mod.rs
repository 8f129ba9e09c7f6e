//! Command middleware
//!
//! Cross-cutting steps run around every dispatched command.

pub mod chain;
pub mod logging;

pub use chain::{CommandMiddleware, Next};
pub use logging::LoggingMiddleware;
