//! Module `commands`
//!
//! Defines the parsed FTP command handed from the collector to the dispatcher.

use std::fmt;

/// Represents one FTP command line received from the client.
///
/// The verb is normalized to upper case so lookups are case-insensitive; the
/// argument is kept exactly as sent, including case and internal spaces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    verb: String,
    argument: String,
}

impl Command {
    pub fn new(verb: impl Into<String>, argument: impl Into<String>) -> Self {
        let mut verb = verb.into();
        verb.make_ascii_uppercase();
        Self {
            verb,
            argument: argument.into(),
        }
    }

    /// Splits a decoded line at its first space into verb and argument.
    pub fn parse(line: &str) -> Self {
        match line.split_once(' ') {
            Some((verb, argument)) => Self::new(verb, argument),
            None => Self::new(line, ""),
        }
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn argument(&self) -> &str {
        &self.argument
    }

    /// Case-insensitive verb comparison.
    pub fn is(&self, verb: &str) -> bool {
        self.verb.eq_ignore_ascii_case(verb)
    }

    /// Returns the extension name (first argument word, upper-cased) and the
    /// remaining text, e.g. `SITE BLST x` yields `("BLST", "x")`.
    pub fn extension(&self) -> Option<(String, &str)> {
        let trimmed = self.argument.trim_start();
        if trimmed.is_empty() {
            return None;
        }
        let (name, rest) = trimmed.split_once(' ').unwrap_or((trimmed, ""));
        Some((name.to_ascii_uppercase(), rest))
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.verb == "PASS" && !self.argument.is_empty() {
            return write!(f, "PASS ****");
        }
        if self.argument.is_empty() {
            write!(f, "{}", self.verb)
        } else {
            write!(f, "{} {}", self.verb, self.argument)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_basic_commands() {
        let cmd = Command::parse("quit");
        assert_eq!(cmd.verb(), "QUIT");
        assert_eq!(cmd.argument(), "");
        assert!(cmd.is("Quit"));
    }

    #[test]
    fn test_parse_commands_with_args() {
        let cmd = Command::parse("RETR My File.TXT");
        assert_eq!(cmd.verb(), "RETR");
        assert_eq!(cmd.argument(), "My File.TXT");

        let cmd = Command::parse("CWD  /some/path ");
        assert_eq!(cmd.argument(), " /some/path ");
    }

    #[test]
    fn test_extension_lookup_key() {
        let cmd = Command::parse("SITE blst now");
        assert_eq!(cmd.extension(), Some(("BLST".to_string(), "now")));
        assert_eq!(Command::parse("SITE").extension(), None);
    }

    #[test]
    fn test_password_is_masked() {
        assert_eq!(Command::parse("PASS secret").to_string(), "PASS ****");
        assert_eq!(Command::parse("USER bob").to_string(), "USER bob");
    }
}
