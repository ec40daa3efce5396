//! Synthetic market stream server.
//!
//! This binary hosts one dashboard session and streams its state to viewers. It wires
//! together:
//!
//! - `Session` — the single-threaded event loop owning the market stream generator,
//!   the telemetry log and the analysis/explanation request slots.
//! - `CommandReceiver` — accepts one JSON `Command` per TCP connection and forwards it
//!   with the peer IP.
//! - `ViewerStreams` — one forwarding thread per subscribed viewer that sends session
//!   frames as JSON datagrams to the viewer's UDP address.
//! - `UdpPingListener` + `PingMonitor` — keep-alives from viewers on the data socket;
//!   a viewer silent for longer than the timeout is dropped.
//!
//! Concurrency and shutdown:
//! - Crossbeam `select!` multiplexes incoming commands, finished viewer streams, ping
//!   timeouts and the Ctrl+C signal here, and commands, ticks and request settlements
//!   inside the session.
//! - A viewer stream ends on `unsubscribe`, on ping timeout, or when the session
//!   broadcasts `StreamEvent::Shutdown`. A frame that cannot be sent is logged and
//!   skipped.
//!
//! Network protocol (high-level):
//! - Commands on TCP `COMMAND_PORT`, frames from UDP `DATA_PORT`.
//! - `subscribe {port}` targets the TCP peer IP on the given UDP port; the viewer
//!   pings `DATA_PORT` from that same UDP port.
#![warn(missing_docs)]
use crate::args::Args;
use crate::llm::{GeminiClient, OfflineGenerator, TextGenerator};
use crate::model::ping_monitor::PingMonitor;
use crate::receiver::CommandReceiver;
use crate::session::{Session, SessionEvent, StreamEvent};
use crate::udp_listener::UdpPingListener;
use clap::Parser;
use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{error, info, warn};
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::net::{IpAddr, SocketAddr, UdpSocket};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use stream_common::command::Command;
use stream_common::instruments::{CatalogParser, Instrument, InstrumentRegistry};
use stream_common::net::{COMMAND_PORT, DATA_PORT, MAX_FRAME_BYTES, addr};
use stream_common::wire::Frame;
use stream_common::{Result, StreamConfig, StreamError};

mod args;
mod llm;
pub mod model;
mod receiver;
mod session;
mod udp_listener;

/// How often the ping monitor looks for silent viewers.
const PING_CHECK_INTERVAL: Duration = Duration::from_secs(1);

/// Stream task for a single viewer.
///
/// Listens for session events on `data_rx` and forwards every frame to `target_addr`
/// via the shared UDP `socket`. A frame that fails to encode or send is dropped with
/// a warning. The task terminates when either:
/// - a shutdown signal is received on `stop_rx`, or
/// - a `StreamEvent::Shutdown` is received from the session, or
/// - the session drops the subscription.
pub fn handle_client_stream(
    socket: Arc<UdpSocket>,
    target_addr: SocketAddr,
    data_rx: Receiver<StreamEvent>,
    stop_rx: Receiver<()>,
) {
    loop {
        select! {
            recv(stop_rx) -> _ => break,
            recv(data_rx) -> msg => match msg {
                Ok(StreamEvent::Frame(frame)) => {
                    if let Err(e) = send_frame(&socket, target_addr, &frame) {
                        warn!("Dropped frame for {}: {}", target_addr, e);
                    }
                },
                Ok(StreamEvent::Shutdown) | Err(_) => break,
            }
        }
    }
    info!("Stream for {} closed", target_addr);
}

/// Sends `frame` to `target` as one or more datagrams.
fn send_frame(socket: &UdpSocket, target: SocketAddr, frame: &Frame) -> Result<()> {
    for datagram in datagrams(frame)? {
        socket.send_to(&datagram, target)?;
    }
    Ok(())
}

/// Encodes `frame` into datagrams of at most `MAX_FRAME_BYTES`.
///
/// A log snapshot that does not fit is split into consecutive `Logs` frames that
/// keep the record order. Any other oversized frame is an error.
fn datagrams(frame: &Frame) -> Result<Vec<Vec<u8>>> {
    let bytes = frame.to_json_bytes()?;
    if bytes.len() <= MAX_FRAME_BYTES {
        return Ok(vec![bytes]);
    }
    match frame {
        Frame::Logs { records } if records.len() > 1 => {
            let (head, tail) = records.split_at(records.len() / 2);
            let mut out = datagrams(&Frame::Logs {
                records: head.to_vec(),
            })?;
            out.extend(datagrams(&Frame::Logs {
                records: tail.to_vec(),
            })?);
            Ok(out)
        }
        _ => Err(StreamError::Format(format!(
            "frame of {} bytes exceeds the {} byte datagram limit",
            bytes.len(),
            MAX_FRAME_BYTES
        ))),
    }
}

/// Forwarding thread of one subscribed viewer.
struct ActiveStream {
    id: u64,
    stop_tx: Sender<()>,
}

/// Subscribed viewers and their forwarding threads.
///
/// Every thread reports `(target, id)` on the closed channel when it ends, so entries
/// never outlive their thread; the id keeps a late report from removing a newer
/// subscription of the same address.
struct ViewerStreams {
    socket: Arc<UdpSocket>,
    session_tx: Sender<SessionEvent>,
    ping_monitor: Arc<Mutex<PingMonitor>>,
    closed_tx: Sender<(SocketAddr, u64)>,
    active: HashMap<SocketAddr, ActiveStream>,
    next_id: u64,
}

impl ViewerStreams {
    fn new(
        socket: Arc<UdpSocket>,
        session_tx: Sender<SessionEvent>,
        ping_monitor: Arc<Mutex<PingMonitor>>,
    ) -> (Self, Receiver<(SocketAddr, u64)>) {
        let (closed_tx, closed_rx) = unbounded();
        let streams = Self {
            socket,
            session_tx,
            ping_monitor,
            closed_tx,
            active: HashMap::new(),
            next_id: 1,
        };
        (streams, closed_rx)
    }

    /// Routes one viewer command: subscriptions are handled here, the rest go to the
    /// session.
    fn dispatch(&mut self, command: Command, peer: IpAddr) -> Result<()> {
        match command.udp_target(peer)? {
            Some(target) if matches!(command, Command::Subscribe { .. }) => {
                self.subscribe(target)
            }
            Some(target) => {
                if self.close(target) {
                    info!("Stream for {} unsubscribed", target);
                } else {
                    warn!("Unsubscribe from unknown viewer {}", target);
                }
                Ok(())
            }
            None => self
                .session_tx
                .send(SessionEvent::Command(command))
                .map_err(|e| StreamError::ChannelSend(e.to_string())),
        }
    }

    fn subscribe(&mut self, target: SocketAddr) -> Result<()> {
        if self.active.contains_key(&target) {
            self.ping_monitor.lock()?.track(target);
            warn!("{} is already subscribed", target);
            return Ok(());
        }
        let (stop_tx, stop_rx) = unbounded::<()>();
        let (client_tx, client_rx) = unbounded::<StreamEvent>();
        self.session_tx
            .send(SessionEvent::Subscribe(client_tx))
            .map_err(|e| StreamError::ChannelSend(e.to_string()))?;
        self.ping_monitor.lock()?.track(target);

        let id = self.next_id;
        self.next_id += 1;
        self.active.insert(target, ActiveStream { id, stop_tx });

        let socket = Arc::clone(&self.socket);
        let closed_tx = self.closed_tx.clone();
        thread::spawn(move || {
            handle_client_stream(socket, target, client_rx, stop_rx);
            let _ = closed_tx.send((target, id));
        });
        info!(
            "A stream has been created for the viewer on {} ({} active)",
            target,
            self.active.len()
        );
        Ok(())
    }

    /// Stops the stream of `target`. Returns `false` if none was active.
    fn close(&mut self, target: SocketAddr) -> bool {
        match self.active.remove(&target) {
            Some(stream) => {
                let _ = stream.stop_tx.send(());
                self.forget(target);
                true
            }
            None => false,
        }
    }

    /// Drops the entry of a thread that ended on its own.
    fn on_stream_closed(&mut self, target: SocketAddr, id: u64) {
        if self.active.get(&target).is_some_and(|stream| stream.id == id) {
            self.active.remove(&target);
            self.forget(target);
            info!("Stream for {} ended, {} active", target, self.active.len());
        }
    }

    fn forget(&self, target: SocketAddr) {
        match self.ping_monitor.lock() {
            Ok(mut monitor) => monitor.forget(&target),
            Err(e) => error!("Ping monitor unavailable: {}", e),
        }
    }
}

/// Periodically reports viewers whose keep-alives stopped on `timeout_tx`.
fn start_ping_monitor(
    ping_monitor: Arc<Mutex<PingMonitor>>,
    check_interval: Duration,
    timeout_tx: Sender<SocketAddr>,
) {
    thread::spawn(move || {
        loop {
            thread::sleep(check_interval);
            let timed_out = match ping_monitor.lock() {
                Ok(mut monitor) => monitor.check_timeouts(),
                Err(e) => {
                    error!("Ping monitor lock poisoned: {}", e);
                    return;
                }
            };
            for viewer in timed_out {
                if timeout_tx.send(viewer).is_err() {
                    return;
                }
            }
        }
    });
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();

    let registry = load_registry(args.catalog.as_deref())?;
    let config = StreamConfig::default()
        .with_tick_interval(Duration::from_millis(args.tick_ms.max(1)))
        .with_log_capacity(args.log_capacity);
    if config.log_capacity != args.log_capacity {
        warn!(
            "Log capacity {} is out of range, using {}",
            args.log_capacity, config.log_capacity
        );
    }
    let generator: Arc<dyn TextGenerator> = match GeminiClient::from_env(args.model.as_str())? {
        Some(client) => {
            info!("Text generation enabled with model {}", args.model);
            Arc::new(client)
        }
        None => {
            warn!("GEMINI_API_KEY is not set; analysis will return fallback text");
            Arc::new(OfflineGenerator)
        }
    };

    let mut session = Session::new(registry, &config, generator);
    if let Some(symbol) = args.symbol {
        session.apply(Command::Select { symbol });
    }
    let (session_tx, session_handle) = session.spawn()?;

    let udp_socket = Arc::new(UdpSocket::bind(addr(&args.bind_ip, DATA_PORT)?)?);
    info!("UDP socket created on: {}", udp_socket.local_addr()?);

    let ping_monitor = Arc::new(Mutex::new(PingMonitor::new(Duration::from_secs(
        args.viewer_timeout_secs.max(1),
    ))));
    UdpPingListener::start(Arc::clone(&udp_socket), Arc::clone(&ping_monitor))?;
    let (timeout_tx, timeout_rx) = unbounded::<SocketAddr>();
    start_ping_monitor(Arc::clone(&ping_monitor), PING_CHECK_INTERVAL, timeout_tx);

    let (cmd_tx, cmd_rx) = unbounded::<(Command, IpAddr)>();
    let tcp_receiver = CommandReceiver::new(addr(&args.bind_ip, COMMAND_PORT)?)?;
    thread::spawn(move || {
        if let Err(e) = tcp_receiver.receive_loop_with_channel(cmd_tx) {
            error!("Receiver loop failed: {:?}", e);
        }
    });

    let (ctrlc_tx, ctrlc_rx) = unbounded::<()>();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(());
    })
    .map_err(|e| StreamError::Format(format!("Error setting Ctrl+C handler: {e}")))?;

    let (mut streams, closed_rx) =
        ViewerStreams::new(Arc::clone(&udp_socket), session_tx.clone(), ping_monitor);
    loop {
        select! {
            recv(cmd_rx) -> msg => match msg {
                Ok((command, peer)) => {
                    if let Err(e) = streams.dispatch(command, peer) {
                        error!("Failed to handle command from {}: {}", peer, e);
                    }
                }
                Err(_) => break,
            },
            recv(closed_rx) -> msg => if let Ok((target, id)) = msg {
                streams.on_stream_closed(target, id);
            },
            recv(timeout_rx) -> msg => if let Ok(target) = msg {
                if streams.close(target) {
                    info!("Stream for {} closed: ping timeout", target);
                }
            },
            recv(ctrlc_rx) -> _ => {
                info!("Ctrl+C received. Shutting down server...");
                break;
            }
        }
    }

    let _ = session_tx.send(SessionEvent::Shutdown);
    session_handle
        .join()
        .map_err(|_| StreamError::Format(String::from("session thread panicked")))?;
    Ok(())
}

fn load_registry(catalog: Option<&Path>) -> Result<InstrumentRegistry> {
    let Some(path) = catalog else {
        return Ok(InstrumentRegistry::builtin());
    };
    let file = File::open(path)?;
    let instruments = Instrument::parse_from_reader(BufReader::new(file))?;
    let registry = InstrumentRegistry::new(instruments)?;
    info!(
        "Loaded {} instruments from {}",
        registry.list().len(),
        path.display()
    );
    Ok(registry)
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
