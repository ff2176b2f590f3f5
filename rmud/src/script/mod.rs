//! The bridge between the protocol loop and the user's Lua robot.
//!
//! The sandbox (an interpreter plus the registered host primitives) is owned
//! here and never leaks to other components. Hooks are resolved once per
//! load; all invocations are protected: script failures go to the status
//! sink and never propagate. Primitives that would re-enter the script
//! (`Echo`, timers) enqueue [`Event`]s instead, and the client loop performs
//! the re-entry, so every script call happens on one task.

pub mod timer;

use std::fs;
use std::sync::OnceLock;

use mlua::{Function, Lua, Table, Value, Variadic};
use regex::{Captures, Regex};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info, warn};

use crate::config::LuaConfig;
use crate::error::{Error, ErrorKind};
use crate::net::session::Outbound;
use crate::script::timer::Timers;

/// A deferred script re-entry, consumed by the client loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A timer fired; execute `call_timer_actions("<id>")` in the sandbox.
    TimerTick(String),

    /// `Echo` produced display text that must also re-enter the receive
    /// hook, with the translated text as both raw and plain argument.
    Echo(String),
}

/// The scripting bridge. Holds at most one sandbox.
pub struct Bridge {
    config: LuaConfig,
    screen: UnboundedSender<String>,
    outbound: UnboundedSender<Outbound>,
    events: UnboundedSender<Event>,
    timers: Timers,
    sandbox: Option<Sandbox>,
}

/// One loaded interpreter and its resolved hooks.
struct Sandbox {
    lua: Lua,
    on_receive: Option<Function>,
    on_send: Option<Function>,
}

impl Bridge {
    #[must_use]
    pub fn new(
        config: LuaConfig,
        screen: UnboundedSender<String>,
        outbound: UnboundedSender<Outbound>,
        events: UnboundedSender<Event>,
    ) -> Self {
        Self {
            config,
            screen,
            outbound,
            timers: Timers::new(events.clone()),
            events,
            sandbox: None,
        }
    }

    /// Load the robot at startup, if enabled. Failures leave the bridge in
    /// pass-through mode; they are reported, not returned.
    pub fn init(&mut self) {
        if !self.config.enable {
            return;
        }
        let _ = self.reload();
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.sandbox.is_some()
    }

    /// Discard the current sandbox (if any) and load `<lua-path>/main.lua`
    /// afresh. On failure the bridge is left empty: hooks are inactive and
    /// receive/send pass through.
    pub fn reload(&mut self) -> Result<(), Error> {
        if self.sandbox.take().is_some() {
            self.timers.clear();
            self.status("Lua environment closed.");
        }

        let main_file = self.config.path.join("main.lua");
        let source = match fs::read_to_string(&main_file) {
            Ok(source) => source,
            Err(err) => {
                self.status(&format!("Load error: {err}"));
                self.status("Cannot open the main lua script, check your configuration.");
                return Err(ErrorKind::ScriptUnreadable(main_file.display().to_string(), err).into());
            }
        };

        self.status("Initializing Lua environment...");
        let lua = Lua::new();
        let hooks = self.setup(&lua, &source, &main_file.display().to_string());
        match hooks {
            Ok((on_receive, on_send)) => {
                if on_receive.is_none() {
                    self.status("OnReceive is not defined; the robot will not see game output.");
                }
                if on_send.is_none() {
                    self.status("OnSend is not defined; the robot will not see sent commands.");
                }
                self.sandbox = Some(Sandbox {
                    lua,
                    on_receive,
                    on_send,
                });
                info!(script = %main_file.display(), "lua environment ready");
                self.status("Lua environment ready.");
                Ok(())
            }
            Err(err) => {
                warn!(%err, "lua init failed");
                self.status(&format!("Lua init failed: {err}"));
                Err(err)
            }
        }
    }

    /// Tear down the sandbox and cancel its timers.
    pub fn close(&mut self) {
        if self.sandbox.take().is_some() {
            self.timers.clear();
        }
    }

    /// Invoke the receive hook for one inbound line. Protected: script
    /// errors are reported and swallowed.
    pub fn on_receive(&self, raw: &str, plain: &str) {
        let Some(hook) = self.sandbox.as_ref().and_then(|sb| sb.on_receive.as_ref()) else {
            return;
        };
        if let Err(err) = hook.call::<()>((raw, plain)) {
            self.panic(&err);
        }
    }

    /// Invoke the send hook for one outbound command. Returns whether the
    /// command may go to the server: only an explicit `false` suppresses.
    #[must_use]
    pub fn on_send(&self, cmd: &str) -> bool {
        let Some(hook) = self.sandbox.as_ref().and_then(|sb| sb.on_send.as_ref()) else {
            return true;
        };
        match hook.call::<Value>((cmd,)) {
            Ok(value) => !matches!(value, Value::Boolean(false)),
            Err(err) => {
                self.panic(&err);
                true
            }
        }
    }

    /// Execute the timer convention contract for one fired timer.
    pub fn fire_timer(&self, id: &str) {
        let Some(sandbox) = &self.sandbox else {
            return;
        };
        let chunk = format!("call_timer_actions(\"{id}\")");
        if let Err(err) = sandbox.lua.load(chunk.as_str()).exec() {
            self.panic(&err);
        }
    }

    fn setup(
        &self,
        lua: &Lua,
        source: &str,
        chunk_name: &str,
    ) -> Result<(Option<Function>, Option<Function>), Error> {
        let globals = lua.globals();

        // `require "name"` resolves to `<lua-path>/name.lua`.
        let package: Table = globals.get("package").map_err(ErrorKind::from)?;
        package
            .set("path", format!("{}/?.lua;;", self.config.path.display()))
            .map_err(ErrorKind::from)?;

        self.register(lua).map_err(ErrorKind::from)?;

        lua.load(source)
            .set_name(chunk_name)
            .exec()
            .map_err(ErrorKind::from)?;

        Ok((
            global_function(&globals, "OnReceive").map_err(ErrorKind::from)?,
            global_function(&globals, "OnSend").map_err(ErrorKind::from)?,
        ))
    }

    /// Register the host primitives. None of them captures the interpreter
    /// or the bridge, only channel senders and the timer registry.
    fn register(&self, lua: &Lua) -> mlua::Result<()> {
        let globals = lua.globals();

        globals.set(
            "RegEx",
            lua.create_function(|_, (text, pattern): (String, String)| {
                Ok(Variadic::from_iter(regex_capture(&text, &pattern)))
            })?,
        )?;

        let screen = self.screen.clone();
        globals.set(
            "Print",
            lua.create_function(move |_, text: String| {
                let _ = screen.send(text);
                Ok(())
            })?,
        )?;

        let screen = self.screen.clone();
        let events = self.events.clone();
        globals.set(
            "Echo",
            lua.create_function(move |_, text: String| {
                let advise = |msg: String| {
                    let _ = screen.send(msg);
                };
                let translated = translate_colors(&text, advise);
                let _ = screen.send(translated.clone());
                // The receive hook must also see echoed text; re-entry is
                // queued so the dispatcher performs it outside this call.
                let _ = events.send(Event::Echo(translated));
                Ok(())
            })?,
        )?;

        // Reserved for local command execution; currently display-only.
        let screen = self.screen.clone();
        globals.set(
            "Run",
            lua.create_function(move |_, text: String| {
                let _ = screen.send(text);
                Ok(())
            })?,
        )?;

        let outbound = self.outbound.clone();
        globals.set(
            "Send",
            lua.create_function(move |_, text: String| {
                let _ = outbound.send(Outbound::Line(text));
                Ok(())
            })?,
        )?;

        for name in ["AddTimer", "AddMSTimer"] {
            let timers = self.timers.clone();
            globals.set(
                name,
                lua.create_function(move |_, args: (String, String, i64, i64)| {
                    let (id, code, delay_ms, max_fires) = args;
                    timers.add(
                        &id,
                        &code,
                        u64::try_from(delay_ms).unwrap_or(0),
                        u64::try_from(max_fires).unwrap_or(0),
                    );
                    Ok(())
                })?,
            )?;
        }

        for name in ["DelTimer", "DelMSTimer"] {
            let timers = self.timers.clone();
            globals.set(
                name,
                lua.create_function(move |_, id: String| {
                    timers.del(&id);
                    Ok(())
                })?,
            )?;
        }

        Ok(())
    }

    fn panic(&self, err: &mlua::Error) {
        debug!(%err, "lua runtime error");
        let _ = self.screen.send(format!("Lua error: {err}"));
    }

    fn status(&self, line: &str) {
        let _ = self.screen.send(line.to_owned());
    }
}

fn global_function(globals: &Table, name: &str) -> mlua::Result<Option<Function>> {
    match globals.get::<Value>(name)? {
        Value::Function(f) => Ok(Some(f)),
        _ => Ok(None),
    }
}

/// The `RegEx` primitive's capture semantics, preserved verbatim from the
/// robot API this client grew up with: `["0"]` for no match (or a bad
/// pattern), `["-1"]` for a match without capture groups, else the group
/// count followed by each captured group.
fn regex_capture(text: &str, pattern: &str) -> Vec<String> {
    let Ok(re) = Regex::new(pattern) else {
        return vec!["0".to_owned()];
    };
    let Some(caps) = re.captures(text) else {
        return vec!["0".to_owned()];
    };
    if caps.len() == 1 {
        return vec!["-1".to_owned()];
    }

    let mut out = Vec::with_capacity(caps.len());
    out.push((caps.len() - 1).to_string());
    for group in caps.iter().skip(1) {
        out.push(group.map_or_else(String::new, |m| m.as_str().to_owned()));
    }
    out
}

/// Translate `$XXX$` color tokens into display markup.
fn translate_colors(text: &str, mut advise: impl FnMut(String)) -> String {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    let token = TOKEN.get_or_init(|| {
        Regex::new(r"\$(BLK|NOR|RED|HIR|GRN|HIG|YEL|HIY|BLU|HIB|MAG|HIM|CYN|HIC|WHT|HIW|BNK|REV|U)\$")
            .expect("static color token pattern")
    });

    token
        .replace_all(text, |caps: &Captures| {
            let code = caps.get(0).map_or("", |m| m.as_str());
            match color_markup(code) {
                Some(markup) => markup,
                None => {
                    advise(format!("Find Unknown Color Code: {code}"));
                    ""
                }
            }
        })
        .into_owned()
}

fn color_markup(token: &str) -> Option<&'static str> {
    Some(match token {
        "$BLK$" => "[black::]",
        "$NOR$" => "[-:-:-]",
        "$RED$" => "[red::]",
        "$HIR$" => "[red::b]",
        "$GRN$" => "[green::]",
        "$HIG$" => "[green::b]",
        "$YEL$" => "[yellow::]",
        "$HIY$" => "[yellow::b]",
        "$BLU$" => "[blue::]",
        "$HIB$" => "[blue::b]",
        "$MAG$" => "[darkmagenta::]",
        "$HIM$" => "[#ff00ff::]",
        // Typo kept as-is: scripts in the wild depend on the exact output.
        "$CYN$" => "[dardcyan::]",
        "$HIC$" => "[#00ffff::]",
        "$WHT$" => "[white::]",
        "$HIW$" => "[#ffffff::]",
        "$BNK$" => "[::l]",
        "$REV$" => "[::7]",
        "$U$" => "[::u]",
        _ => return None,
    })
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use pretty_assertions::assert_eq;
    use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

    use super::*;

    #[test]
    fn regex_no_match_is_zero() {
        assert_eq!(regex_capture("abc", "xyz"), vec!["0"]);
    }

    #[test]
    fn regex_bad_pattern_is_zero() {
        assert_eq!(regex_capture("abc", "("), vec!["0"]);
    }

    #[test]
    fn regex_match_without_groups_is_minus_one() {
        assert_eq!(regex_capture("abc", "b"), vec!["-1"]);
        assert_eq!(regex_capture("abc", "abc"), vec!["-1"]);
    }

    #[test]
    fn regex_groups_are_counted_and_pushed() {
        assert_eq!(
            regex_capture("hp 120/200", r"hp (\d+)/(\d+)"),
            vec!["2", "120", "200"]
        );
    }

    #[test]
    fn regex_unmatched_group_is_empty() {
        assert_eq!(regex_capture("ab", "a(x)?(b)"), vec!["2", "", "b"]);
    }

    #[test]
    fn color_tokens_translate() {
        let mut advisories = Vec::new();
        let text = translate_colors("$HIR$hi$NOR$ $CYN$sea$NOR$", |msg| advisories.push(msg));
        assert_eq!(text, "[red::b]hi[-:-:-] [dardcyan::]sea[-:-:-]");
        assert!(advisories.is_empty());
    }

    #[test]
    fn unknown_tokens_pass_through_untouched() {
        // Not in the token alphabet, so the pattern leaves it alone.
        let text = translate_colors("$BOGUS$hi", |_| panic!("no advisory expected"));
        assert_eq!(text, "$BOGUS$hi");
    }

    struct Fixture {
        bridge: Bridge,
        screen_rx: UnboundedReceiver<String>,
        outbound_rx: UnboundedReceiver<Outbound>,
        events_rx: UnboundedReceiver<Event>,
        _dir: tempfile::TempDir,
    }

    fn fixture(script: &str) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("main.lua"), script).unwrap();

        let (screen_tx, screen_rx) = unbounded_channel();
        let (outbound_tx, outbound_rx) = unbounded_channel();
        let (events_tx, events_rx) = unbounded_channel();
        let config = LuaConfig {
            enable: true,
            path: dir.path().to_path_buf(),
        };
        let mut bridge = Bridge::new(config, screen_tx, outbound_tx, events_tx);
        bridge.init();
        Fixture {
            bridge,
            screen_rx,
            outbound_rx,
            events_rx,
            _dir: dir,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(line) = rx.try_recv() {
            out.push(line);
        }
        out
    }

    #[tokio::test]
    async fn hooks_resolve_and_gate_sends() {
        let mut fx = fixture(
            r#"
            received = {}
            function OnReceive(raw, plain)
                table.insert(received, plain)
            end
            function OnSend(cmd)
                if cmd == "stop" then
                    return false
                end
                return true
            end
            "#,
        );
        assert!(fx.bridge.is_loaded());
        assert!(fx.bridge.on_send("go"));
        assert!(!fx.bridge.on_send("stop"));
        fx.bridge.on_receive("raw", "plain");

        let status = drain(&mut fx.screen_rx);
        assert!(!status.iter().any(|l| l.contains("not defined")));
    }

    #[tokio::test]
    async fn nil_return_permits_send() {
        let fx = fixture("function OnSend(cmd) end");
        assert!(fx.bridge.on_send("anything"));
    }

    #[tokio::test]
    async fn absent_hooks_pass_through_with_advisory() {
        let mut fx = fixture("-- no hooks here");
        assert!(fx.bridge.is_loaded());
        assert!(fx.bridge.on_send("cmd"));
        fx.bridge.on_receive("raw", "plain");

        let status = drain(&mut fx.screen_rx);
        assert!(status.iter().any(|l| l.contains("OnReceive is not defined")));
        assert!(status.iter().any(|l| l.contains("OnSend is not defined")));
    }

    #[tokio::test]
    async fn hook_errors_are_reported_and_contained() {
        let mut fx = fixture(
            r#"
            function OnReceive(raw, plain)
                error("boom")
            end
            "#,
        );
        fx.bridge.on_receive("raw", "plain");
        let status = drain(&mut fx.screen_rx);
        assert!(status.iter().any(|l| l.starts_with("Lua error:")));

        // The bridge keeps working afterwards.
        assert!(fx.bridge.on_send("cmd"));
    }

    #[tokio::test]
    async fn send_primitive_bypasses_hook() {
        let mut fx = fixture(
            r#"
            function OnSend(cmd) return false end
            Send("direct")
            "#,
        );
        assert_eq!(
            fx.outbound_rx.try_recv().unwrap(),
            Outbound::Line("direct".to_owned())
        );
    }

    #[tokio::test]
    async fn echo_translates_and_queues_reentry() {
        let mut fx = fixture(r#"Echo("$GRN$ok$NOR$")"#);
        let status = drain(&mut fx.screen_rx);
        assert!(status.contains(&"[green::]ok[-:-:-]".to_owned()));
        assert_eq!(
            fx.events_rx.try_recv().unwrap(),
            Event::Echo("[green::]ok[-:-:-]".to_owned())
        );
    }

    #[tokio::test]
    async fn fire_timer_runs_convention_contract() {
        let mut fx = fixture(
            r#"
            function call_timer_actions(id)
                Print("tick " .. id)
            end
            "#,
        );
        drain(&mut fx.screen_rx);
        fx.bridge.fire_timer("heal");
        assert_eq!(drain(&mut fx.screen_rx), vec!["tick heal"]);
    }

    #[tokio::test(start_paused = true)]
    async fn add_timer_from_script_ticks() {
        let mut fx = fixture(r#"AddTimer("t", "noop()", 50, 2)"#);
        assert_eq!(
            fx.events_rx.recv().await.unwrap(),
            Event::TimerTick("t".to_owned())
        );
        assert_eq!(
            fx.events_rx.recv().await.unwrap(),
            Event::TimerTick("t".to_owned())
        );
    }

    #[tokio::test]
    async fn failed_load_leaves_pass_through() {
        let dir = tempfile::tempdir().unwrap();
        let (screen_tx, mut screen_rx) = unbounded_channel();
        let (outbound_tx, _outbound_rx) = unbounded_channel();
        let (events_tx, _events_rx) = unbounded_channel();
        let config = LuaConfig {
            enable: true,
            // No main.lua in there.
            path: dir.path().join("missing"),
        };
        let mut bridge = Bridge::new(config, screen_tx, outbound_tx, events_tx);
        bridge.init();

        assert!(!bridge.is_loaded());
        assert!(bridge.on_send("cmd"));
        bridge.on_receive("raw", "plain");
        let status = drain(&mut screen_rx);
        assert!(status.iter().any(|l| l.starts_with("Load error:")));
    }

    #[tokio::test]
    async fn syntax_error_leaves_pass_through() {
        let fx = fixture("function ( nope");
        assert!(!fx.bridge.is_loaded());
        assert!(fx.bridge.on_send("cmd"));
    }

    #[tokio::test]
    async fn reload_replaces_sandbox_and_clears_timers() {
        let mut fx = fixture(r#"AddTimer("t", "noop()", 50, 0)"#);
        assert!(fx.bridge.is_loaded());

        // Rewrite the script and reload: the timer from the first sandbox
        // must not survive.
        std::fs::write(fx._dir.path().join("main.lua"), "-- empty now").unwrap();
        fx.bridge.reload().unwrap();
        assert!(fx.bridge.is_loaded());

        while fx.events_rx.try_recv().is_ok() {}
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(fx.events_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn close_tears_down() {
        let mut fx = fixture("function OnSend(cmd) return false end");
        assert!(!fx.bridge.on_send("cmd"));
        fx.bridge.close();
        assert!(!fx.bridge.is_loaded());
        assert!(fx.bridge.on_send("cmd"));
    }

    #[test]
    fn require_path_points_at_lua_dir() {
        let config = LuaConfig {
            enable: true,
            path: PathBuf::from("robots"),
        };
        assert_eq!(
            format!("{}/?.lua;;", config.path.display()),
            "robots/?.lua;;"
        );
    }
}
