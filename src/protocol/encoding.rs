//! Session text encoding
//!
//! The control connection encoding can change mid-session (`OPTS UTF8`), so
//! readers and the reply writer share one handle and look it up on every use.

use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use parking_lot::RwLock;
use std::sync::Arc;

/// Encoding used once a client turns UTF-8 off. encoding_rs maps ISO-8859-1
/// to windows-1252 per the WHATWG encoding standard.
pub fn latin1() -> &'static Encoding {
    WINDOWS_1252
}

/// Shared, re-selectable encoding handle.
#[derive(Clone)]
pub struct SharedEncoding(Arc<RwLock<&'static Encoding>>);

impl SharedEncoding {
    pub fn new(encoding: &'static Encoding) -> Self {
        Self(Arc::new(RwLock::new(encoding)))
    }

    pub fn get(&self) -> &'static Encoding {
        *self.0.read()
    }

    pub fn set(&self, encoding: &'static Encoding) {
        *self.0.write() = encoding;
    }

    /// Encodes outbound text with the current encoding.
    pub fn encode(&self, text: &str) -> Vec<u8> {
        let (bytes, _, _) = self.get().encode(text);
        bytes.into_owned()
    }
}

impl Default for SharedEncoding {
    fn default() -> Self {
        Self::new(UTF_8)
    }
}

impl std::fmt::Debug for SharedEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SharedEncoding").field(&self.get().name()).finish()
    }
}
