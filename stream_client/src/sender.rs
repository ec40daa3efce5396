//! Sending commands to the stream server over TCP, and keep-alives over UDP.
//!
//! Every command travels on its own short-lived connection: connect, write the JSON
//! payload, close the write half so the server sees the end of the command. The
//! keep-alive loop sends `PING` datagrams from the viewer's receiving socket so the
//! server can match them to the subscription.
use log::{debug, error, info};
use std::io::{ErrorKind, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, UdpSocket};
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use stream_common::command::Command;
use stream_common::net::PING;
use stream_common::{Result, StreamError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Helper type for sending commands to the server.
pub struct CommandSender {
    server_command_address: SocketAddr,
}

impl CommandSender {
    /// Sender targeting the server's command port.
    pub fn new(server_command_address: SocketAddr) -> Self {
        Self {
            server_command_address,
        }
    }

    /// Deliver one command.
    pub fn send(&self, command: &Command) -> Result<()> {
        let mut stream = TcpStream::connect_timeout(&self.server_command_address, CONNECT_TIMEOUT)
            .map_err(|e| StreamError::Format(format!("Failed to connect to server: {e}")))?;

        let payload = serde_json::to_vec(command)?;
        debug!("Sending command: {}", String::from_utf8_lossy(&payload));
        stream.write_all(&payload)?;
        stream.shutdown(Shutdown::Write)?;
        Ok(())
    }

    /// Sends `PING` to `target_addr` right away and then every `interval` until
    /// `shutdown` is raised.
    pub fn start_ping_thread(
        socket: Arc<UdpSocket>,
        target_addr: SocketAddr,
        interval: Duration,
        shutdown: Arc<AtomicBool>,
    ) -> JoinHandle<()> {
        info!("Ping thread started. Target: {}", target_addr);
        thread::spawn(move || {
            while !shutdown.load(Ordering::Relaxed) {
                match socket.send_to(PING, target_addr) {
                    Ok(_) => debug!("PING sent to {}", target_addr),
                    Err(ref e) if e.kind() == ErrorKind::ConnectionReset => {}
                    Err(e) => error!("Failed to send PING: {}", e),
                }
                thread::sleep(interval);
            }
            info!("Ping thread stopping...");
        })
    }
}
