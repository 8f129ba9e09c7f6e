//! Command collector
//!
//! Turns arbitrarily chunked control-connection bytes into commands. Partial
//! lines and half-read Telnet sequences are kept between calls, so the output
//! only depends on the byte stream and never on where it was split.

use bytes::{Buf, Bytes, BytesMut};
use encoding_rs::Encoding;
use log::warn;

use crate::error::ProtocolError;
use crate::protocol::Command;

pub const DEFAULT_MAX_LINE_LENGTH: usize = 1024;

const IAC: u8 = 0xFF;
const WILL: u8 = 0xFB;
const DONT: u8 = 0xFE;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TelnetState {
    Data,
    /// Saw IAC, waiting for the command byte.
    Command,
    /// Saw IAC WILL/WONT/DO/DONT, waiting for the option byte.
    Option,
}

/// Raw bytes handed back by [`CommandCollector::take_buffered`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Buffered {
    pub bytes: Bytes,
    /// The last line ended on a CR whose LF has not been received yet.
    pub pending_lf: bool,
}

#[derive(Debug)]
pub struct CommandCollector {
    input: BytesMut,
    line: Vec<u8>,
    telnet: TelnetState,
    after_cr: bool,
    overflow: bool,
    max_line_length: usize,
}

impl Default for CommandCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandCollector {
    pub fn new() -> Self {
        Self::with_max_line_length(DEFAULT_MAX_LINE_LENGTH)
    }

    pub fn with_max_line_length(max_line_length: usize) -> Self {
        Self {
            input: BytesMut::new(),
            line: Vec::new(),
            telnet: TelnetState::Data,
            after_cr: false,
            overflow: false,
            max_line_length,
        }
    }

    /// True when no partial line is buffered.
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.line.is_empty() && self.telnet == TelnetState::Data
    }

    /// Feeds bytes and returns every command they complete. Over-long lines are
    /// dropped.
    pub fn collect(&mut self, bytes: &[u8], encoding: &'static Encoding) -> Vec<Command> {
        self.push(bytes);
        let mut commands = Vec::new();
        while let Some(next) = self.next_command(encoding) {
            match next {
                Ok(command) => commands.push(command),
                Err(e) => warn!("Dropping command line: {}", e),
            }
        }
        commands
    }

    /// Appends bytes without scanning them.
    pub fn push(&mut self, bytes: &[u8]) {
        self.input.extend_from_slice(bytes);
    }

    /// Scans buffered bytes up to the next complete command. Bytes after it stay
    /// raw until the next call, which lets the caller stop between commands
    /// (e.g. to switch the transport) without losing anything.
    pub fn next_command(
        &mut self,
        encoding: &'static Encoding,
    ) -> Option<Result<Command, ProtocolError>> {
        while self.input.has_remaining() {
            let byte = self.input.get_u8();
            if self.feed(byte) {
                if let Some(result) = self.finish_line(encoding) {
                    return Some(result);
                }
            }
        }
        None
    }

    /// Hands back bytes that were received but not yet scanned and resets the
    /// line state. `pending_lf` is set when the LF of a CRLF terminator is
    /// still to come, so the next transport can drop it.
    pub fn take_buffered(&mut self) -> Buffered {
        if self.after_cr && self.input.first() == Some(&b'\n') {
            self.input.advance(1);
            self.after_cr = false;
        }
        let pending_lf = self.after_cr && self.input.is_empty();
        self.line.clear();
        self.telnet = TelnetState::Data;
        self.after_cr = false;
        self.overflow = false;
        Buffered {
            bytes: self.input.split().freeze(),
            pending_lf,
        }
    }

    /// Returns true when `byte` terminates the current line.
    fn feed(&mut self, byte: u8) -> bool {
        match self.telnet {
            TelnetState::Command => {
                self.telnet = match byte {
                    IAC => {
                        self.after_cr = false;
                        self.push_data(IAC);
                        TelnetState::Data
                    }
                    WILL..=DONT => TelnetState::Option,
                    _ => TelnetState::Data,
                };
                return false;
            }
            TelnetState::Option => {
                self.telnet = TelnetState::Data;
                return false;
            }
            TelnetState::Data => {}
        }

        if byte == IAC {
            self.telnet = TelnetState::Command;
            return false;
        }

        let after_cr = std::mem::replace(&mut self.after_cr, false);
        match byte {
            b'\n' if after_cr => false,
            b'\r' => {
                self.after_cr = true;
                true
            }
            b'\n' => true,
            _ => {
                self.push_data(byte);
                false
            }
        }
    }

    fn push_data(&mut self, byte: u8) {
        if self.line.len() >= self.max_line_length {
            self.overflow = true;
        } else {
            self.line.push(byte);
        }
    }

    fn finish_line(&mut self, encoding: &'static Encoding) -> Option<Result<Command, ProtocolError>> {
        let line = std::mem::take(&mut self.line);
        if std::mem::replace(&mut self.overflow, false) {
            return Some(Err(ProtocolError::LineTooLong {
                limit: self.max_line_length,
            }));
        }
        if line.is_empty() {
            return None;
        }
        let (text, _) = encoding.decode_without_bom_handling(&line);
        Some(Ok(Command::parse(&text)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encoding::latin1;
    use encoding_rs::UTF_8;

    const STREAM: &[u8] =
        b"USER anonymous\r\nPASS x@y.com\nCWD My Dir\rLIST -la\r\n\r\nNOOP\r\nSITE BLST\r\n";

    fn collect_in_chunks(bytes: &[u8], chunk: usize) -> Vec<Command> {
        let mut collector = CommandCollector::new();
        let mut out = Vec::new();
        for part in bytes.chunks(chunk) {
            out.extend(collector.collect(part, UTF_8));
        }
        assert!(collector.is_empty());
        out
    }

    #[test]
    fn test_chunk_boundary_invariance() {
        let whole = collect_in_chunks(STREAM, STREAM.len());
        assert_eq!(whole.len(), 6);
        for chunk in 1..STREAM.len() {
            assert_eq!(collect_in_chunks(STREAM, chunk), whole, "chunk size {chunk}");
        }
    }

    #[test]
    fn test_every_split_point() {
        let whole = collect_in_chunks(STREAM, STREAM.len());
        for split in 0..=STREAM.len() {
            let mut collector = CommandCollector::new();
            let mut out = collector.collect(&STREAM[..split], UTF_8);
            out.extend(collector.collect(&STREAM[split..], UTF_8));
            assert_eq!(out, whole, "split at {split}");
        }
    }

    #[test]
    fn test_terminator_variants() {
        let expected = vec![Command::new("RETR", "a b.txt")];
        for input in [&b"RETR a b.txt\r"[..], b"RETR a b.txt\n", b"RETR a b.txt\r\n"] {
            let mut collector = CommandCollector::new();
            assert_eq!(collector.collect(input, UTF_8), expected);
        }

        let mut collector = CommandCollector::new();
        assert_eq!(collector.collect(b"RETR a b.txt\r", UTF_8), expected);
        assert!(collector.collect(b"\n", UTF_8).is_empty());
        assert!(collector.is_empty());
    }

    #[test]
    fn test_split_and_case_rules() {
        let mut collector = CommandCollector::new();
        let commands = collector.collect(b"pwd\r\nstor Some  File.TXT\r\n", UTF_8);
        assert_eq!(commands[0], Command::new("PWD", ""));
        assert_eq!(commands[1].verb(), "STOR");
        assert_eq!(commands[1].argument(), "Some  File.TXT");
    }

    #[test]
    fn test_empty_lines_yield_nothing() {
        let mut collector = CommandCollector::new();
        assert!(collector.collect(b"\r\n\n\r\r\n", UTF_8).is_empty());
    }

    #[test]
    fn test_partial_line_is_retained() {
        let mut collector = CommandCollector::new();
        assert!(collector.collect(b"NO", UTF_8).is_empty());
        assert!(!collector.is_empty());
        assert_eq!(collector.collect(b"OP\r\n", UTF_8), vec![Command::new("NOOP", "")]);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_telnet_sequences_are_stripped() {
        // IAC IP, IAC DM before ABOR, and IAC DO <opt> inside a line.
        let input = b"\xFF\xF4\xFF\xF2ABOR\r\nNO\xFF\xFD\x01OP\r\n";
        let whole = collect_in_chunks(input, input.len());
        assert_eq!(whole, vec![Command::new("ABOR", ""), Command::new("NOOP", "")]);
        assert_eq!(collect_in_chunks(input, 1), whole);
    }

    #[test]
    fn test_escaped_iac_is_data() {
        let mut collector = CommandCollector::new();
        let commands = collector.collect(b"STOR a\xFF\xFFb\r\n", latin1());
        assert_eq!(commands[0].argument(), "a\u{ff}b");
    }

    #[test]
    fn test_encoding_is_consulted_per_call() {
        let mut collector = CommandCollector::new();
        assert!(collector.collect(b"CWD caf", UTF_8).is_empty());
        let commands = collector.collect(b"\xE9\r\n", latin1());
        assert_eq!(commands[0].argument(), "café");

        let commands = collector.collect("CWD café\r\n".as_bytes(), UTF_8);
        assert_eq!(commands[0].argument(), "café");
    }

    #[test]
    fn test_over_long_line_is_reported() {
        let mut collector = CommandCollector::with_max_line_length(8);
        collector.push(b"RETR very-long-name\r\nNOOP\r\n");
        assert!(matches!(
            collector.next_command(UTF_8),
            Some(Err(ProtocolError::LineTooLong { limit: 8 }))
        ));
        assert_eq!(
            collector.next_command(UTF_8).unwrap().unwrap(),
            Command::new("NOOP", "")
        );
    }

    #[test]
    fn test_take_buffered_stops_after_command() {
        let mut collector = CommandCollector::new();
        collector.push(b"AUTH TLS\r\n\x16\x03\x01\x00\x05hello");
        assert_eq!(
            collector.next_command(UTF_8).unwrap().unwrap(),
            Command::new("AUTH", "TLS")
        );
        let rest = collector.take_buffered();
        assert_eq!(&rest.bytes[..], b"\x16\x03\x01\x00\x05hello");
        assert!(!rest.pending_lf);
        assert!(collector.is_empty());
    }

    #[test]
    fn test_take_buffered_skips_pending_lf() {
        let mut collector = CommandCollector::new();
        collector.push(b"AUTH TLS\r\n\x16");
        assert!(collector.next_command(UTF_8).is_some());
        let rest = collector.take_buffered();
        assert_eq!(&rest.bytes[..], b"\x16");
        assert!(!rest.pending_lf);

        let mut collector = CommandCollector::new();
        collector.push(b"AUTH TLS\r");
        assert!(collector.next_command(UTF_8).is_some());
        collector.push(b"\n\x16");
        let rest = collector.take_buffered();
        assert_eq!(&rest.bytes[..], b"\x16");
        assert!(!rest.pending_lf);
    }

    #[test]
    fn test_take_buffered_reports_lf_still_in_flight() {
        let mut collector = CommandCollector::new();
        collector.push(b"AUTH TLS\r");
        assert!(collector.next_command(UTF_8).is_some());
        assert_eq!(
            collector.take_buffered(),
            Buffered {
                bytes: Bytes::new(),
                pending_lf: true,
            }
        );

        // A bare CR followed by other bytes was the whole terminator.
        let mut collector = CommandCollector::new();
        collector.push(b"AUTH TLS\r\x16");
        assert!(collector.next_command(UTF_8).is_some());
        let rest = collector.take_buffered();
        assert_eq!(&rest.bytes[..], b"\x16");
        assert!(!rest.pending_lf);
    }
}
