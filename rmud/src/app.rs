//! The client loop: one cooperative select over network input, user input,
//! script re-entries, and the quit signal.
//!
//! Every script invocation (receive hook, send hook, timer fire, Echo
//! re-entry) happens here, on this task. That is the whole serialization
//! story for the sandbox.

use std::sync::atomic::Ordering;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use tokio::select;
use tokio::sync::mpsc::{self, unbounded_channel};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::config::{version, Config};
use crate::error::Error;
use crate::net::session::Session;
use crate::script::{Bridge, Event};
use crate::ui::Console;

/// The exact escape-sequence shapes servers emit around colorized lines.
/// Applied to derive the `plain` argument of the receive hook.
fn ansi_pattern() -> &'static Regex {
    static ANSI: OnceLock<Regex> = OnceLock::new();
    ANSI.get_or_init(|| {
        Regex::new(r"\x1b\[\d*(?:;\d*(?:;\d*)?)?(?:A|D|K|m)").expect("static ANSI pattern")
    })
}

/// Strip ANSI escape sequences. Idempotent.
#[must_use]
pub fn strip_ansi(text: &str) -> String {
    ansi_pattern().replace_all(text, "").into_owned()
}

/// What to do with one line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
enum CommandAction {
    Quit,
    Version,
    ReloadScript,
    ToggleDebug,
    StressLines,
    /// Send to the server (after prefix rewriting), via the send hook.
    Send(String),
}

/// Classify a user command: control commands stay local, everything else is
/// rewritten and heads for the server.
fn classify_command(cmd: &str) -> CommandAction {
    match cmd {
        "exit" | "quit" => CommandAction::Quit,
        "/version" => CommandAction::Version,
        "/reload-lua" => CommandAction::ReloadScript,
        "/debug" => CommandAction::ToggleDebug,
        "/lines" => CommandAction::StressLines,
        _ => CommandAction::Send(rewrite_command(cmd)),
    }
}

/// The first-character rewrite table: shorthand prefixes for the common
/// chat channels.
fn rewrite_command(cmd: &str) -> String {
    if let Some(rest) = cmd.strip_prefix('\'') {
        return format!("say {rest}");
    }
    if let Some(rest) = cmd.strip_prefix('"') {
        return format!("chat {rest}");
    }
    if let Some(rest) = cmd.strip_prefix('*') {
        return format!("chat* {rest}");
    }
    if let Some(rest) = cmd.strip_prefix(';') {
        return format!("rumor {rest}");
    }
    cmd.to_owned()
}

/// The assembled client.
pub struct App {
    config: Config,
}

impl App {
    #[must_use]
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Connect, load the robot, and run the loop until quit or EOF.
    ///
    /// # Errors
    /// Currently none beyond the type signature; fatal I/O collapses to a
    /// normal loop exit.
    pub async fn run(&mut self) -> Result<(), Error> {
        let (ui, mut cmd_rx) = Console::spawn(self.config.ui.clone());
        let (mut session, mut input_rx) = Session::new(self.config.mud.clone(), ui.sender());

        let (event_tx, mut event_rx) = unbounded_channel();
        let mut bridge = Bridge::new(
            self.config.lua.clone(),
            ui.sender(),
            session.sender(),
            event_tx,
        );
        bridge.init();

        session.start().await;

        let (quit_tx, mut quit_rx) = mpsc::channel::<()>(1);
        let mut client = ClientLoop {
            ui,
            bridge,
            session,
            quit_tx,
        };

        loop {
            select! {
                _ = quit_rx.recv() => {
                    info!("quit signal received");
                    break;
                }
                line = input_rx.recv() => match line {
                    Some(line) => client.handle_line(&line),
                    None => {
                        client.ui.println("The client is about to exit.");
                        sleep(Duration::from_secs(3)).await;
                        break;
                    }
                },
                cmd = cmd_rx.recv() => match cmd {
                    Some(cmd) => client.handle_command(&cmd),
                    // Stdin EOF reads as a quit.
                    None => break,
                },
                event = event_rx.recv() => match event {
                    Some(event) => client.handle_event(event),
                    None => break,
                },
            }
        }

        client.shutdown();
        Ok(())
    }
}

struct ClientLoop {
    ui: Console,
    bridge: Bridge,
    session: Session,
    quit_tx: mpsc::Sender<()>,
}

impl ClientLoop {
    /// One inbound line: beautify for display, strip ANSI for the hook.
    fn handle_line(&self, line: &str) {
        let show = self.ui.beautify(line);
        let plain = strip_ansi(line);
        self.ui.println(&show);
        self.bridge.on_receive(line, &plain);
    }

    fn handle_command(&mut self, cmd: &str) {
        match classify_command(cmd) {
            CommandAction::Quit => {
                let _ = self.quit_tx.try_send(());
            }
            CommandAction::Version => self.ui.println(version()),
            CommandAction::ReloadScript => {
                let _ = self.bridge.reload();
            }
            CommandAction::ToggleDebug => {
                let flag = self.session.iac_debug();
                let enabled = !flag.load(Ordering::Relaxed);
                flag.store(enabled, Ordering::Relaxed);
                self.ui.println(match enabled {
                    true => "IAC debug enabled.",
                    false => "IAC debug disabled.",
                });
            }
            CommandAction::StressLines => {
                for n in 0..self.ui.history_lines() {
                    self.ui.println(&format!("synthetic line {n}"));
                }
            }
            CommandAction::Send(cmd) => {
                // The user sees the rewritten form whether or not the robot
                // lets it through.
                self.ui.println(&cmd);
                if self.bridge.on_send(&cmd) {
                    self.session.println(&cmd);
                }
            }
        }
    }

    /// Deferred script re-entries, serialized with everything else here.
    fn handle_event(&self, event: Event) {
        match event {
            Event::TimerTick(id) => {
                debug!(id, "timer tick");
                self.bridge.fire_timer(&id);
            }
            Event::Echo(text) => self.bridge.on_receive(&text, &text),
        }
    }

    fn shutdown(&mut self) {
        self.bridge.close();
        self.ui.stop();
        self.session.stop();
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn rewrite_table() {
        assert_eq!(rewrite_command("'hello"), "say hello");
        assert_eq!(rewrite_command("\"hello"), "chat hello");
        assert_eq!(rewrite_command("*hello"), "chat* hello");
        assert_eq!(rewrite_command(";hello"), "rumor hello");
        assert_eq!(rewrite_command("look"), "look");
        assert_eq!(rewrite_command(""), "");
    }

    #[test]
    fn control_commands_stay_local() {
        assert_eq!(classify_command("exit"), CommandAction::Quit);
        assert_eq!(classify_command("quit"), CommandAction::Quit);
        assert_eq!(classify_command("/version"), CommandAction::Version);
        assert_eq!(classify_command("/reload-lua"), CommandAction::ReloadScript);
        assert_eq!(classify_command("/debug"), CommandAction::ToggleDebug);
        assert_eq!(classify_command("/lines"), CommandAction::StressLines);
    }

    #[test]
    fn ordinary_commands_are_rewritten_sends() {
        assert_eq!(
            classify_command("\"hi all"),
            CommandAction::Send("chat hi all".to_owned())
        );
        assert_eq!(
            classify_command("go east"),
            CommandAction::Send("go east".to_owned())
        );
    }

    #[test]
    fn ansi_strip_removes_color_and_motion() {
        assert_eq!(strip_ansi("\x1b[1;33mhi\x1b[m"), "hi");
        assert_eq!(strip_ansi("\x1b[2Aup\x1b[K"), "up");
        assert_eq!(strip_ansi("\x1b[31;1;4mdeep\x1b[0m"), "deep");
        assert_eq!(strip_ansi("plain"), "plain");
    }

    #[test]
    fn ansi_strip_is_idempotent() {
        for input in ["\x1b[1;33mhi\x1b[m", "plain", "\x1b[mx\x1b[2D"] {
            let once = strip_ansi(input);
            assert_eq!(strip_ansi(&once), once);
        }
    }
}
