//! FTP Response handling
//!
//! Defines FTP reply codes and the wire formatting of single and multi-line replies.

use std::fmt;

/// Standard FTP response codes
pub mod codes {
    pub const OPENING_DATA_CONNECTION: u16 = 150;
    pub const OK: u16 = 200;
    pub const COMMAND_SUPERFLUOUS: u16 = 202;
    pub const SYSTEM_STATUS: u16 = 211;
    pub const FILE_STATUS: u16 = 213;
    pub const HELP: u16 = 214;
    pub const SYSTEM_TYPE: u16 = 215;
    pub const READY: u16 = 220;
    pub const CLOSING_CONTROL: u16 = 221;
    pub const TRANSFER_COMPLETE: u16 = 226;
    pub const ENTERING_PASSIVE: u16 = 227;
    pub const ENTERING_EXTENDED_PASSIVE: u16 = 229;
    pub const LOGIN_SUCCESS: u16 = 230;
    pub const SECURITY_EXCHANGE_OK: u16 = 234;
    pub const FILE_ACTION_OK: u16 = 250;
    pub const PATH_CREATED: u16 = 257;
    pub const PASSWORD_REQUIRED: u16 = 331;
    pub const ACCOUNT_REQUIRED: u16 = 332;
    pub const SERVICE_NOT_AVAILABLE: u16 = 421;
    pub const CANT_OPEN_DATA_CONNECTION: u16 = 425;
    pub const TRANSFER_ABORTED: u16 = 426;
    pub const LOCAL_ERROR: u16 = 451;
    pub const SYNTAX_ERROR: u16 = 500;
    pub const SYNTAX_ERROR_IN_ARGUMENTS: u16 = 501;
    pub const NOT_IMPLEMENTED: u16 = 502;
    pub const BAD_SEQUENCE: u16 = 503;
    pub const PARAMETER_NOT_IMPLEMENTED: u16 = 504;
    pub const EXTENDED_PORT_FAILURE: u16 = 522;
    pub const NOT_LOGGED_IN: u16 = 530;
    pub const PROTECTION_DENIED: u16 = 533;
    pub const PROTECTION_LEVEL_NOT_SUPPORTED: u16 = 536;
    pub const FILE_NOT_FOUND: u16 = 550;
}

/// A reply sent on the control connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, message: impl Into<String>) -> Self {
        Self {
            code,
            lines: vec![message.into()],
        }
    }

    /// Builds a multi-line reply. The first line follows `DDD-`, the last `DDD `.
    pub fn multiline<I, S>(code: u16, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut lines: Vec<String> = lines.into_iter().map(Into::into).collect();
        if lines.is_empty() {
            lines.push(String::new());
        }
        Self { code, lines }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    pub fn message(&self) -> &str {
        &self.lines[0]
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// A 421 reply closes the control connection once written.
    pub fn is_terminal(&self) -> bool {
        self.code == codes::SERVICE_NOT_AVAILABLE
    }

    /// Formats the reply as it appears on the wire, CRLF terminated.
    pub fn to_wire(&self) -> String {
        let mut out = String::new();
        let last = self.lines.len() - 1;
        for (index, line) in self.lines.iter().enumerate() {
            if index == last {
                out.push_str(&format!("{} {}\r\n", self.code, line));
            } else if index == 0 {
                out.push_str(&format!("{}-{}\r\n", self.code, line));
            } else if line.starts_with(|c: char| c.is_ascii_digit()) {
                // Continuation lines must not look like a final line.
                out.push_str(&format!(" {}\r\n", line));
            } else {
                out.push_str(&format!("{}\r\n", line));
            }
        }
        out
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" | "))
    }
}
