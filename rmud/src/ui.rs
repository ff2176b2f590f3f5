//! The console UI shim: a printer task draining the screen channel to
//! stdout, a reader task turning stdin lines into user commands, and the
//! East-Asian ambiguous-width beautifier.
//!
//! Anything resembling a real terminal UI (history scrollback, status
//! areas) is out of scope; the knobs for it ride along in [`UiConfig`] so
//! the surface stays stable for one.

use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::trace;
use unicode_width::UnicodeWidthChar;

use crate::config::{AmbiguousWidth, UiConfig};

/// The console: a line sink plus a source of user commands.
#[derive(Debug)]
pub struct Console {
    config: UiConfig,
    output_tx: UnboundedSender<String>,
    printer: JoinHandle<()>,
    reader: JoinHandle<()>,
}

impl Console {
    /// Spawn the printer and stdin reader tasks. The returned receiver
    /// yields user commands; it closes when stdin reaches EOF.
    #[must_use]
    pub fn spawn(config: UiConfig) -> (Self, UnboundedReceiver<String>) {
        let (output_tx, mut output_rx) = unbounded_channel::<String>();
        let printer = tokio::spawn(async move {
            let mut out = stdout();
            while let Some(line) = output_rx.recv().await {
                if out.write_all(line.as_bytes()).await.is_err() {
                    break;
                }
                if out.write_all(b"\n").await.is_err() {
                    break;
                }
                let _ = out.flush().await;
            }
            trace!("printer task finished");
        });

        let (cmd_tx, cmd_rx) = unbounded_channel();
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdin()).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if cmd_tx.send(line).is_err() {
                    break;
                }
            }
            trace!("stdin reader finished");
            // cmd_tx drops here; the client loop reads it as a quit.
        });

        (
            Self {
                config,
                output_tx,
                printer,
                reader,
            },
            cmd_rx,
        )
    }

    /// Cloneable sink handle for status messages from other components.
    #[must_use]
    pub fn sender(&self) -> UnboundedSender<String> {
        self.output_tx.clone()
    }

    pub fn println(&self, line: &str) {
        let _ = self.output_tx.send(line.to_owned());
    }

    /// Pad ambiguous-width glyphs according to the configured mode.
    #[must_use]
    pub fn beautify(&self, line: &str) -> String {
        pad_ambiguous(line, self.config.ambiguous_width)
    }

    #[must_use]
    pub fn history_lines(&self) -> usize {
        self.config.history_lines
    }

    /// Stop reading user input. Queued output keeps draining until the
    /// last sender is gone.
    pub fn stop(&self) {
        self.reader.abort();
        self.printer.abort();
    }
}

/// Terminals disagree about East-Asian ambiguous glyph widths; servers that
/// draw maps with them assume double width. Padding each such glyph keeps
/// the art aligned on single-width terminals.
#[must_use]
pub fn pad_ambiguous(line: &str, mode: AmbiguousWidth) -> String {
    let mode = match mode {
        AmbiguousWidth::Auto => match cfg!(windows) {
            true => AmbiguousWidth::Single,
            false => AmbiguousWidth::Double,
        },
        other => other,
    };

    match mode {
        AmbiguousWidth::Single | AmbiguousWidth::Auto => line.to_owned(),
        AmbiguousWidth::Double => {
            let mut out = String::with_capacity(line.len() * 2);
            for c in line.chars() {
                out.push(c);
                match c {
                    '┌' | '┬' | '├' | '┼' | '└' | '┴' | '─' | '╓' | '╥' | '╟' | '╫' | '╙'
                    | '╨' | '╭' | '╰' => out.push('─'),
                    '╔' | '╦' | '╠' | '╬' | '╚' | '╩' | '═' | '╒' | '╤' | '╞' | '╪' | '╘'
                    | '╧' => out.push('═'),
                    '█' | '▇' | '▆' | '▅' | '▄' | '▃' | '▂' | '▁' | '▀' => out.push(c),
                    _ => {
                        if is_ambiguous(c) {
                            out.push(' ');
                        }
                    }
                }
            }
            out
        }
        AmbiguousWidth::Space => {
            let mut out = String::with_capacity(line.len() * 2);
            for c in line.chars() {
                out.push(c);
                if is_ambiguous(c) {
                    out.push(' ');
                }
            }
            out
        }
    }
}

/// Ambiguous glyphs are the ones whose width flips between contexts: one
/// column normally, two in East-Asian context.
fn is_ambiguous(c: char) -> bool {
    c.width_cjk() == Some(2) && c.width() == Some(1)
}
