//! The IAC command accumulator: a byte-fed state machine producing one
//! structured Telnet command at a time.

use std::fmt::{Display, Formatter};

use tracing::debug;

use crate::net::telnet::{code_name, command};

/// One Telnet command, as received from the wire.
///
/// Negotiation commands (WILL/WONT/DO/DONT) carry a single option byte in
/// `args`; subnegotiations carry the full payload between `IAC SB` and
/// `IAC SE`. Once [`IacMessage::scan`] reports completion the value is
/// frozen; feeding further bytes requires a [`IacMessage::reset`].
#[derive(Debug, Clone)]
pub struct IacMessage {
    stage: Stage,
    pub command: u8,
    pub args: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Cmd,
    Arg,
    Subneg,
    Done,
}

impl IacMessage {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stage: Stage::Cmd,
            command: 0,
            args: Vec::with_capacity(128),
        }
    }

    /// Discard any accumulated state and await a fresh command byte.
    pub fn reset(&mut self) {
        self.stage = Stage::Cmd;
        self.command = 0;
        self.args.clear();
    }

    /// Feed one byte, returning `true` once the command is complete.
    pub fn scan(&mut self, byte: u8) -> bool {
        match self.stage {
            Stage::Cmd => match byte {
                command::WILL | command::WONT | command::DO | command::DONT => {
                    self.command = byte;
                    self.stage = Stage::Arg;
                    false
                }
                command::SB => {
                    self.command = command::SB;
                    self.stage = Stage::Subneg;
                    false
                }
                command::SE | command::GA => {
                    self.command = byte;
                    self.stage = Stage::Done;
                    true
                }
                _ => {
                    debug!(command = byte, "unknown single-byte IAC command");
                    self.command = byte;
                    self.stage = Stage::Done;
                    true
                }
            },
            Stage::Arg => {
                self.args.push(byte);
                self.stage = Stage::Done;
                true
            }
            Stage::Subneg => {
                self.args.push(byte);
                false
            }
            Stage::Done => true,
        }
    }

    /// Mark an in-flight subnegotiation as terminated (`IAC SE` seen).
    ///
    /// Only meaningful while [`Self::in_subnegotiation`] is true; the scanner
    /// owns terminator detection because the escape byte is also the IAC
    /// sentinel.
    pub fn end_subnegotiation(&mut self) {
        self.stage = Stage::Done;
    }

    #[must_use]
    pub fn in_subnegotiation(&self) -> bool {
        self.stage == Stage::Subneg
    }

    #[must_use]
    pub fn awaiting_command(&self) -> bool {
        self.stage == Stage::Cmd
    }

    /// Compare against a command byte and exact argument bytes.
    #[must_use]
    pub fn eq_bytes(&self, command: u8, args: &[u8]) -> bool {
        self.command == command && self.args == args
    }
}

impl Default for IacMessage {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for IacMessage {
    fn eq(&self, other: &Self) -> bool {
        self.command == other.command && self.args == other.args
    }
}

impl Eq for IacMessage {}

impl Display for IacMessage {
    /// Renders as `IAC <cmd> <args>`, using option mnemonics where the first
    /// argument of a negotiation or subnegotiation is a known option code.
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let cmd_name = match code_name(self.command) {
            Some(name) => name.to_owned(),
            None => self.command.to_string(),
        };

        let named_arg = matches!(
            self.command,
            command::WILL | command::WONT | command::DO | command::DONT | command::SB
        )
        .then(|| self.args.first().copied())
        .flatten()
        .and_then(code_name);

        let arg_name = match named_arg {
            Some(name) => name.to_owned(),
            None => {
                let args = self
                    .args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                format!("[{args}]")
            }
        };

        write!(f, "IAC {cmd_name} {arg_name}")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::net::telnet::option;

    fn scan_all(bytes: &[u8]) -> (IacMessage, bool) {
        let mut iac = IacMessage::new();
        let mut done = false;
        for b in bytes {
            done = iac.scan(*b);
        }
        (iac, done)
    }

    #[test]
    fn will_takes_one_option_byte() {
        let (iac, done) = scan_all(&[command::WILL, option::ECHO]);
        assert!(done);
        assert!(iac.eq_bytes(command::WILL, &[option::ECHO]));
    }

    #[test]
    fn negotiation_incomplete_without_option() {
        let (iac, done) = scan_all(&[command::DO]);
        assert!(!done);
        assert_eq!(iac.command, command::DO);
        assert!(iac.args.is_empty());
    }

    #[test]
    fn ga_and_se_complete_immediately() {
        let (iac, done) = scan_all(&[command::GA]);
        assert!(done);
        assert!(iac.eq_bytes(command::GA, &[]));

        let (iac, done) = scan_all(&[command::SE]);
        assert!(done);
        assert!(iac.eq_bytes(command::SE, &[]));
    }

    #[test]
    fn unknown_command_completes_immediately() {
        let (iac, done) = scan_all(&[command::AYT]);
        assert!(done);
        assert_eq!(iac.command, command::AYT);
    }

    #[test]
    fn subnegotiation_accumulates_until_ended() {
        let mut iac = IacMessage::new();
        assert!(!iac.scan(command::SB));
        assert!(!iac.scan(option::TTYPE));
        assert!(!iac.scan(0x01));
        assert!(iac.in_subnegotiation());
        iac.end_subnegotiation();
        assert!(iac.eq_bytes(command::SB, &[option::TTYPE, 0x01]));
    }

    #[test]
    fn reset_clears_accumulated_state() {
        let (mut iac, _) = scan_all(&[command::WILL, option::ZMP]);
        iac.reset();
        assert!(iac.awaiting_command());
        assert!(iac.args.is_empty());
        assert_eq!(iac.command, 0);
    }

    #[test]
    fn equality_ignores_stage() {
        let (a, _) = scan_all(&[command::WILL, option::ECHO]);
        let mut b = IacMessage::new();
        b.command = command::WILL;
        b.args = vec![option::ECHO];
        assert_eq!(a, b);
    }

    #[test]
    fn render_uses_mnemonics() {
        let (iac, _) = scan_all(&[command::WILL, option::ECHO]);
        assert_eq!(iac.to_string(), "IAC WILL ECHO");

        let (iac, _) = scan_all(&[command::DO, option::TTYPE]);
        assert_eq!(iac.to_string(), "IAC DO TTYPE");
    }

    #[test]
    fn render_falls_back_to_numbers() {
        let (iac, _) = scan_all(&[command::WILL, 123]);
        assert_eq!(iac.to_string(), "IAC WILL [123]");

        let (iac, _) = scan_all(&[command::GA]);
        assert_eq!(iac.to_string(), "IAC GA []");
    }

    #[test]
    fn render_is_stable() {
        let (iac, _) = scan_all(&[command::WILL, option::ZMP]);
        let first = iac.to_string();
        assert_eq!(iac.to_string(), first);
    }
}
