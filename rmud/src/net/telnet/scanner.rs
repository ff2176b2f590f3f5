//! Demultiplexes a raw Telnet byte stream into lines, stalled partial lines,
//! and IAC commands.
//!
//! The scanner pulls bytes itself (1 KiB refills with a soft 1-second read
//! deadline) rather than being driven by a framed sink: MUD servers park a
//! prompt without a terminating LF, and the deadline is what lets the client
//! surface it as an [`Message::IncompleteLine`] instead of waiting forever.

use std::mem;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::time::timeout;
use tokio_util::bytes::{Buf, BytesMut};
use tracing::debug;

use crate::net::telnet::command;
use crate::net::telnet::iac::IacMessage;

const READ_DEADLINE: Duration = Duration::from_secs(1);
const REFILL_CHUNK: usize = 1024;

/// An item of demultiplexed Telnet data.
///
/// A closed sum: every consumer matches exhaustively.
#[derive(Debug, PartialEq, Eq)]
pub enum Message {
    /// A complete line, terminated by LF (CR bytes dropped, LF consumed).
    Line(Vec<u8>),

    /// Partial line content flushed early: either an IAC arrived mid-line or
    /// the read deadline expired with bytes pending (a parked prompt).
    IncompleteLine(Vec<u8>),

    /// One Telnet IAC command.
    Iac(IacMessage),

    /// The stream is gone. Terminal: every subsequent scan repeats it.
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    InIac,
}

/// Pull-based Telnet scanner over any async byte source.
#[derive(Debug)]
pub struct Scanner<R> {
    reader: R,
    buf: BytesMut,
    state: State,
    line: Vec<u8>,
    iac: IacMessage,
    /// An IAC byte was seen inside a subnegotiation; the next byte decides
    /// between terminator (SE) and escaped literal 0xFF.
    sub_escape: bool,
    done: bool,
}

enum ReadByte {
    Byte(u8),
    Timeout,
    Eof,
}

impl<R: AsyncRead + Unpin> Scanner<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: BytesMut::with_capacity(REFILL_CHUNK),
            state: State::Text,
            line: Vec::new(),
            iac: IacMessage::new(),
            sub_escape: false,
            done: false,
        }
    }

    /// Produce the next [`Message`].
    ///
    /// Blocks until a line, partial line, or IAC command can be emitted, or
    /// the stream ends. Read timeouts with nothing buffered loop silently.
    pub async fn scan(&mut self) -> Message {
        if self.done {
            return Message::Eof;
        }

        loop {
            let byte = match self.read_byte().await {
                ReadByte::Byte(byte) => byte,
                ReadByte::Timeout => {
                    if self.line.is_empty() {
                        continue;
                    }
                    return Message::IncompleteLine(mem::take(&mut self.line));
                }
                ReadByte::Eof => {
                    self.done = true;
                    return Message::Eof;
                }
            };

            match self.state {
                State::Text => match byte {
                    command::IAC => {
                        self.iac.reset();
                        self.state = State::InIac;
                        if !self.line.is_empty() {
                            return Message::IncompleteLine(mem::take(&mut self.line));
                        }
                    }
                    b'\r' => {}
                    b'\n' => return Message::Line(mem::take(&mut self.line)),
                    _ => self.line.push(byte),
                },
                State::InIac => {
                    if let Some(msg) = self.scan_iac(byte) {
                        return msg;
                    }
                }
            }
        }
    }

    fn scan_iac(&mut self, byte: u8) -> Option<Message> {
        if self.sub_escape {
            self.sub_escape = false;
            match byte {
                command::SE => {
                    self.iac.end_subnegotiation();
                    return Some(self.complete_iac());
                }
                command::IAC => {
                    // Escaped 0xFF payload byte.
                    self.iac.scan(command::IAC);
                }
                other => {
                    debug!(command = other, "stray IAC inside subnegotiation");
                    self.iac.scan(other);
                }
            }
            return None;
        }

        if self.iac.in_subnegotiation() && byte == command::IAC {
            self.sub_escape = true;
            return None;
        }

        if self.iac.awaiting_command() && byte == command::IAC {
            // IAC IAC in text is the escape for a literal 0xFF data byte.
            self.line.push(command::IAC);
            self.state = State::Text;
            return None;
        }

        match self.iac.scan(byte) {
            true => Some(self.complete_iac()),
            false => None,
        }
    }

    fn complete_iac(&mut self) -> Message {
        self.state = State::Text;
        Message::Iac(mem::take(&mut self.iac))
    }

    /// Read one byte, refilling from the reader when the buffer runs dry.
    ///
    /// Hard read errors collapse to [`ReadByte::Eof`]; the session treats
    /// the two identically.
    async fn read_byte(&mut self) -> ReadByte {
        if !self.buf.has_remaining() {
            let mut chunk = [0u8; REFILL_CHUNK];
            match timeout(READ_DEADLINE, self.reader.read(&mut chunk)).await {
                Err(_elapsed) => return ReadByte::Timeout,
                Ok(Ok(0)) => return ReadByte::Eof,
                Ok(Ok(n)) => self.buf.extend_from_slice(&chunk[..n]),
                Ok(Err(err)) => {
                    debug!(%err, "read error, treating as EOF");
                    return ReadByte::Eof;
                }
            }
        }
        ReadByte::Byte(self.buf.get_u8())
    }
}
