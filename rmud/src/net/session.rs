//! The session engine: owns the TCP connection, drives the scanner, answers
//! telnet negotiation, and bridges bytes to UTF-8 text lines.
//!
//! Two tasks serve a live session: a reader (scanner + negotiation policy,
//! producer of the inbound line channel) and a writer (single funnel for all
//! socket writes, wrapped in the encoding transcoder). Closing the inbound
//! channel is the EOF signal to the consumer.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use socket2::{Socket, TcpKeepalive};
use tokio::net::TcpStream;
use tokio::select;
use tokio::sync::mpsc::{
    channel, unbounded_channel, Receiver, Sender, UnboundedReceiver, UnboundedSender,
};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::MudConfig;
use crate::net::charset::{EncodingWriter, Transcoder};
use crate::net::telnet::iac::IacMessage;
use crate::net::telnet::scanner::{Message, Scanner};
use crate::net::telnet::{command, option};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(4);
const ZMP_HEARTBEAT: Duration = Duration::from_secs(10);
const INPUT_CAPACITY: usize = 1024;

/// Terminal type identifier sent in TTYPE subnegotiation replies.
const TERMINAL_TYPE: &[u8] = b"GoMud";

/// One outbound item for the writer task.
///
/// Text lines are re-encoded on the way out; raw bytes (negotiation replies,
/// heartbeats) are written verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Line(String),
    Raw(Vec<u8>),
}

/// A connection to one MUD server.
#[derive(Debug)]
pub struct Session {
    config: MudConfig,
    screen: UnboundedSender<String>,
    iac_debug: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    outbound_tx: UnboundedSender<Outbound>,
    outbound_rx: Option<UnboundedReceiver<Outbound>>,
    input_tx: Option<Sender<String>>,
    reader: Option<JoinHandle<()>>,
    writer: Option<JoinHandle<()>>,
}

impl Session {
    /// Create a session and the inbound line channel it will produce into.
    ///
    /// Status messages (connect progress, disconnects) go to `screen`.
    #[must_use]
    pub fn new(config: MudConfig, screen: UnboundedSender<String>) -> (Self, Receiver<String>) {
        let (input_tx, input_rx) = channel(INPUT_CAPACITY);
        let (outbound_tx, outbound_rx) = unbounded_channel();
        let iac_debug = Arc::new(AtomicBool::new(config.iac_debug));
        let session = Self {
            config,
            screen,
            iac_debug,
            live: Arc::new(AtomicBool::new(false)),
            cancel: CancellationToken::new(),
            outbound_tx,
            outbound_rx: Some(outbound_rx),
            input_tx: Some(input_tx),
            reader: None,
            writer: None,
        };
        (session, input_rx)
    }

    /// Shared IAC-debug flag; flipping it at runtime toggles negotiation
    /// traffic echoing.
    #[must_use]
    pub fn iac_debug(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.iac_debug)
    }

    /// Sender for outbound traffic. Cloneable; used by the scripting
    /// bridge's `Send` primitive.
    #[must_use]
    pub fn sender(&self) -> UnboundedSender<Outbound> {
        self.outbound_tx.clone()
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        self.live.load(Ordering::Relaxed)
    }

    /// Queue one command line for the server; the writer re-encodes it.
    pub fn println(&self, line: &str) {
        let _ = self.outbound_tx.send(Outbound::Line(line.to_owned()));
    }

    /// Idempotent close. The reader task ends, which closes the inbound
    /// channel.
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Connect and spawn the reader/writer tasks.
    ///
    /// On connect failure the inbound channel is closed (EOF to the
    /// consumer) and the failure is reported to the status sink.
    pub async fn start(&mut self) {
        let host = self.config.host.clone();
        let port = self.config.port;
        self.status(format!("Connecting to {host}:{port}..."));

        let connect = happy_eyeballs::tokio::connect((host.as_str(), port));
        let stream = match timeout(CONNECT_TIMEOUT, connect).await {
            Ok(Ok(stream)) => stream,
            Ok(Err(err)) => {
                self.connect_failed(&err.to_string());
                return;
            }
            Err(_elapsed) => {
                self.connect_failed("connect timed out");
                return;
            }
        };

        let stream = match configure_keepalive(stream) {
            Ok(stream) => stream,
            Err(err) => {
                self.connect_failed(&err.to_string());
                return;
            }
        };

        info!(host, port, "connected");
        self.status("Connected.".to_owned());
        self.live.store(true, Ordering::Relaxed);

        let (read_half, write_half) = stream.into_split();
        let transcoder = Transcoder::named(&self.config.encoding);

        // All socket writes funnel through this task.
        let mut writer = EncodingWriter::new(write_half, transcoder);
        let mut outbound_rx = self.outbound_rx.take().expect("session already started");
        let cancel = self.cancel.clone();
        self.writer = Some(tokio::spawn(async move {
            loop {
                let item = select! {
                    () = cancel.cancelled() => break,
                    item = outbound_rx.recv() => match item {
                        Some(item) => item,
                        None => break,
                    },
                };
                let res = match &item {
                    Outbound::Line(line) => writer.write_line(line).await,
                    Outbound::Raw(bytes) => writer.write_raw(bytes).await,
                };
                if let Err(err) = res {
                    // Best effort: the reader notices a dead peer via EOF.
                    warn!(%err, "outbound write failed");
                }
            }
            trace!("writer task finished");
        }));

        // Ask for GA-framed prompts before anything else arrives.
        let _ = self.outbound_tx.send(Outbound::Raw(vec![
            command::IAC,
            command::DONT,
            option::SGA,
        ]));

        let reader = ReaderTask {
            scanner: Scanner::new(read_half),
            transcoder,
            input_tx: self.input_tx.take().expect("session already started"),
            outbound_tx: self.outbound_tx.clone(),
            screen: self.screen.clone(),
            iac_debug: Arc::clone(&self.iac_debug),
            live: Arc::clone(&self.live),
            cancel: self.cancel.clone(),
            heartbeat: None,
        };
        self.reader = Some(tokio::spawn(reader.run()));
    }

    fn connect_failed(&mut self, reason: &str) {
        warn!(reason, "connection failed");
        self.status("Connection failed.".to_owned());
        self.status(format!("Reason: {reason}"));
        // Dropping the sender closes the inbound channel: EOF downstream.
        self.input_tx.take();
    }

    fn status(&self, line: String) {
        let _ = self.screen.send(line);
    }
}

struct ReaderTask {
    scanner: Scanner<tokio::net::tcp::OwnedReadHalf>,
    transcoder: Transcoder,
    input_tx: Sender<String>,
    outbound_tx: UnboundedSender<Outbound>,
    screen: UnboundedSender<String>,
    iac_debug: Arc<AtomicBool>,
    live: Arc<AtomicBool>,
    cancel: CancellationToken,
    heartbeat: Option<JoinHandle<()>>,
}

impl ReaderTask {
    async fn run(mut self) {
        trace!("reader task starting");
        loop {
            let msg = select! {
                () = self.cancel.cancelled() => break,
                msg = self.scanner.scan() => msg,
            };
            match msg {
                Message::Eof => break,
                Message::Line(bytes) | Message::IncompleteLine(bytes) => {
                    let text = self.transcoder.decode(&bytes);
                    if self.input_tx.send(text).await.is_err() {
                        break;
                    }
                }
                Message::Iac(iac) => {
                    if self.negotiate(&iac).await.is_err() {
                        break;
                    }
                }
            }
        }

        if let Some(heartbeat) = self.heartbeat.take() {
            heartbeat.abort();
        }
        self.live.store(false, Ordering::Relaxed);
        let _ = self.screen.send("Connection closed.".to_owned());
        let _ = self
            .screen
            .send("Automatic reconnect is not implemented yet.".to_owned());
        trace!("reader task finished");
        // input_tx drops here, closing the inbound channel.
    }

    async fn negotiate(&mut self, iac: &IacMessage) -> Result<(), ()> {
        debug!(iac = %iac, "incoming telnet command");
        let (replies, start_heartbeat) = negotiation_replies(iac);
        for reply in replies {
            let _ = self.outbound_tx.send(Outbound::Raw(reply));
        }

        if start_heartbeat && self.heartbeat.is_none() {
            self.heartbeat = Some(spawn_zmp_heartbeat(
                self.outbound_tx.clone(),
                self.cancel.clone(),
            ));
        }

        if self.iac_debug.load(Ordering::Relaxed) {
            self.input_tx.send(iac.to_string()).await.map_err(|_| ())?;
        }
        Ok(())
    }
}

/// The negotiation policy table.
///
/// Returns the raw byte sequences to write back, and whether a ZMP
/// heartbeat should be running afterwards. Only TTYPE and ZMP are
/// participated in; every other server-initiated option is refused.
fn negotiation_replies(iac: &IacMessage) -> (Vec<Vec<u8>>, bool) {
    if iac.eq_bytes(command::WILL, &[option::ZMP]) {
        return (vec![vec![command::IAC, command::DO, option::ZMP]], true);
    }
    if iac.eq_bytes(command::DO, &[option::TTYPE]) {
        return (vec![vec![command::IAC, command::WILL, option::TTYPE]], false);
    }
    if iac.eq_bytes(command::SB, &[option::TTYPE, 0x01]) {
        let mut reply = vec![command::IAC, command::SB, option::TTYPE, 0x00];
        reply.extend_from_slice(TERMINAL_TYPE);
        reply.extend_from_slice(&[command::IAC, command::SE]);
        return (vec![reply], false);
    }
    match (iac.command, iac.args.first()) {
        (command::WILL, Some(opt)) => (vec![vec![command::IAC, command::DONT, *opt]], false),
        (command::DO, Some(opt)) => (vec![vec![command::IAC, command::WONT, *opt]], false),
        // GA marks end-of-prompt; nothing to send back.
        _ => (Vec::new(), false),
    }
}

/// Periodic `zmp.ping` subnegotiation. Best effort: write failures are the
/// writer task's problem and disconnects are detected on the read path.
fn spawn_zmp_heartbeat(
    outbound_tx: UnboundedSender<Outbound>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    let mut ping = vec![command::IAC, command::SB, option::ZMP];
    ping.extend_from_slice(b"zmp.ping");
    ping.extend_from_slice(&[0, command::IAC, command::SE]);

    tokio::spawn(async move {
        loop {
            select! {
                () = cancel.cancelled() => break,
                () = sleep(ZMP_HEARTBEAT) => {}
            }
            if outbound_tx.send(Outbound::Raw(ping.clone())).is_err() {
                break;
            }
        }
        trace!("zmp heartbeat finished");
    })
}

/// TCP keepalive tuning, roughly matching what other MUD clients ship.
fn configure_keepalive(stream: TcpStream) -> std::io::Result<TcpStream> {
    let stream = stream.into_std()?;
    let sock = Socket::from(stream);

    let keepalive = TcpKeepalive::new()
        .with_time(Duration::from_secs(30))
        .with_interval(Duration::from_secs(10));
    sock.set_tcp_keepalive(&keepalive)?;

    let stream: std::net::TcpStream = sock.into();
    stream.set_nonblocking(true)?;
    TcpStream::from_std(stream)
}
