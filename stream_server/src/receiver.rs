use crossbeam_channel::Sender;
use log::{debug, error, info, warn};
use std::io::Read;
use std::net::{IpAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::time::Duration;
use stream_common::command::Command;
use stream_common::{Result, StreamError};

/// How long a viewer may take to deliver its command.
const READ_TIMEOUT: Duration = Duration::from_secs(5);
/// Upper bound on a single command payload.
const MAX_COMMAND_BYTES: u64 = 4096;

/// TCP command receiver that accepts viewer commands.
///
/// Each connection carries exactly one JSON `Command`. Decoded commands are emitted
/// together with the peer IP, which subscription commands need to build the UDP
/// target. A bad connection is logged and skipped; it never stops the loop.
pub struct CommandReceiver {
    /// The underlying TCP listening socket.
    pub(crate) socket: TcpListener,
}

impl CommandReceiver {
    /// Bind a new TCP receiver to the provided `bind_addr` (e.g., `0.0.0.0:8080`).
    pub fn new<A: ToSocketAddrs>(bind_addr: A) -> Result<Self> {
        let socket = TcpListener::bind(bind_addr)?;
        Ok(Self { socket })
    }

    /// Blocking loop that accepts TCP connections and forwards each decoded command
    /// to `tx`. Returns when `tx` is disconnected.
    pub(crate) fn receive_loop_with_channel(self, tx: Sender<(Command, IpAddr)>) -> Result<()> {
        info!(
            "Command TCP server is started on {}",
            self.socket.local_addr()?
        );

        for stream in self.socket.incoming() {
            match stream {
                Ok(stream) => match read_command(stream) {
                    Ok((command, peer)) => {
                        info!("Received command {:?} from {}", command, peer);
                        tx.send((command, peer))
                            .map_err(|e| StreamError::ChannelSend(e.to_string()))?;
                    }
                    Err(e) => warn!("Rejected command connection: {}", e),
                },
                Err(e) => error!("TCP connection error: {}", e),
            }
        }
        Ok(())
    }
}

/// Read and decode the single command carried by `stream`.
fn read_command(stream: TcpStream) -> Result<(Command, IpAddr)> {
    let peer = stream.peer_addr()?;
    debug!("client_tcp_addr: {:?}", &peer);
    stream.set_read_timeout(Some(READ_TIMEOUT))?;

    let mut buf = Vec::new();
    stream.take(MAX_COMMAND_BYTES).read_to_end(&mut buf)?;
    let command: Command = serde_json::from_slice(&buf)?;
    Ok((command, peer.ip()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;
    use std::io::Write;
    use std::thread;

    #[test]
    fn decodes_one_command_per_connection_and_survives_garbage() {
        let receiver = CommandReceiver::new("127.0.0.1:0").unwrap();
        let addr = receiver.socket.local_addr().unwrap();
        let (tx, rx) = unbounded();
        thread::spawn(move || receiver.receive_loop_with_channel(tx));

        let mut garbage = TcpStream::connect(addr).unwrap();
        garbage.write_all(b"not json").unwrap();
        drop(garbage);

        let mut stream = TcpStream::connect(addr).unwrap();
        stream
            .write_all(&serde_json::to_vec(&Command::subscribe(55555)).unwrap())
            .unwrap();
        drop(stream);

        let (command, peer) = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(command, Command::subscribe(55555));
        assert!(peer.is_loopback());
    }
}
