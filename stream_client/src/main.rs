//! Stream Viewer: a terminal presentation surface for the stream server. It
//! subscribes for frames over UDP, keeps the subscription alive with periodic
//! `PING`s, forwards typed actions as commands over TCP, and prints the price stream,
//! the simulated pipeline log and analysis results.
//!
//! Usage example (CLI):
//! ```bash
//! stream_client --server-ip 127.0.0.1 --listen-port 55555 --symbol nvda --start
//! ```
//!
//! Then type `start`, `stop`, `toggle`, `select <SYMBOL>`, `analyze`,
//! `explain <component>`, `list` or `quit`.
#![warn(missing_docs)]
mod args;
mod sender;
mod view;

use crate::args::Args;
use crate::sender::CommandSender;
use clap::Parser;
use log::{debug, error, info, warn};
use std::io::{BufRead, ErrorKind};
use std::net::{SocketAddr, UdpSocket};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread;
use std::time::Duration;
use stream_common::command::Command;
use stream_common::net::{
    COMMAND_PORT, DATA_PORT, MAX_DATAGRAM, PING_INTERVAL_MS, addr, unspecified_like,
};
use stream_common::wire::{Frame, PIPELINE_COMPONENTS};
use stream_common::{Result, StreamError};

/// Runs a blocking loop that receives frames from the given UDP `socket` and prints
/// them. Returns when `shutdown` is raised or on a receive error.
fn start_receiver_loop(socket: &UdpSocket, shutdown: &AtomicBool) -> Result<()> {
    info!("Frame receiver running on: {}", socket.local_addr()?);
    let mut buf = vec![0u8; MAX_DATAGRAM];

    while !shutdown.load(Ordering::Relaxed) {
        match socket.recv(&mut buf) {
            Ok(size) => match Frame::from_json_bytes(&buf[..size]) {
                Ok(frame) => {
                    for line in view::render(&frame) {
                        info!("{}", line);
                    }
                }
                Err(_) => {
                    debug!(
                        "Received non-frame message: {}",
                        String::from_utf8_lossy(&buf[..size])
                    );
                }
            },
            Err(e) => {
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::ConnectionReset
                ) {
                    continue;
                }
                error!("Receive data error: {}", e);
                return Err(StreamError::Io(e));
            }
        }
    }
    info!("Receiver loop stopping...");
    Ok(())
}

/// Reads viewer actions from stdin until `quit` or end of input.
fn start_input_thread(sender: Arc<CommandSender>, shutdown: Arc<AtomicBool>) {
    thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let Ok(line) = line else { break };
            match line.trim().to_ascii_lowercase().as_str() {
                "quit" | "exit" => break,
                "list" => {
                    info!("Components: {}", PIPELINE_COMPONENTS.join(", "));
                    continue;
                }
                _ => {}
            }
            match Command::parse_line(&line) {
                Ok(Some(command)) => {
                    if let Err(e) = sender.send(&command) {
                        error!("Sending error to server: {}", e);
                    }
                }
                Ok(None) => {}
                Err(e) => warn!("{}", e),
            }
        }
        shutdown.store(true, Ordering::SeqCst);
    });
}

fn main() -> Result<()> {
    init_logger();
    let args = Args::parse();
    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = shutdown.clone();
        ctrlc::set_handler(move || {
            info!("Ctrl+C received. Shutting down viewer...");
            shutdown.store(true, Ordering::SeqCst);
        })
        .map_err(|e| StreamError::Format(format!("Error setting Ctrl+C handler: {e}")))?;
    }

    let server_command = addr(&args.server_ip, COMMAND_PORT)?;
    let server_ip = server_command.ip();
    let sender = Arc::new(CommandSender::new(server_command));

    let socket = Arc::new(UdpSocket::bind(SocketAddr::new(
        unspecified_like(server_ip),
        args.listen_port,
    ))?);
    socket.set_read_timeout(Some(Duration::from_secs(1)))?;
    let local_port = socket.local_addr()?.port();
    info!("UDP viewer listening on: {}", socket.local_addr()?);

    sender.send(&Command::subscribe(local_port))?;
    info!("Subscribed to {}", server_ip);
    CommandSender::start_ping_thread(
        Arc::clone(&socket),
        SocketAddr::new(server_ip, DATA_PORT),
        Duration::from_millis(PING_INTERVAL_MS),
        Arc::clone(&shutdown),
    );
    if let Some(symbol) = args.symbol {
        sender.send(&Command::Select {
            symbol: symbol.to_ascii_uppercase(),
        })?;
    }
    if args.start {
        sender.send(&Command::Start)?;
    }

    start_input_thread(Arc::clone(&sender), Arc::clone(&shutdown));
    info!("Viewer is running. Type `quit` or press Ctrl+C to exit.");
    let result = start_receiver_loop(&socket, &shutdown);

    if let Err(e) = sender.send(&Command::unsubscribe(local_port)) {
        warn!("Failed to unsubscribe: {}", e);
    }
    result
}

fn init_logger() {
    env_logger::Builder::new()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();
}
