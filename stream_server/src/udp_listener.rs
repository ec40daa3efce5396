use crate::model::ping_monitor::PingMonitor;
use log::{debug, error, warn};
use std::io::ErrorKind;
use std::net::UdpSocket;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use stream_common::Result;
use stream_common::net::PING;

/// UDP listener that receives `PING` datagrams from viewers on the data socket and
/// refreshes their entry in the shared `PingMonitor`.
pub struct UdpPingListener;

impl UdpPingListener {
    /// Spawn a background thread reading keep-alives from `socket`.
    ///
    /// The thread ends only if the monitor lock is poisoned.
    pub fn start(
        socket: Arc<UdpSocket>,
        ping_monitor: Arc<Mutex<PingMonitor>>,
    ) -> Result<JoinHandle<()>> {
        let handle = thread::Builder::new()
            .name(String::from("ping-listener"))
            .spawn(move || {
                let mut buf = [0u8; 128];
                loop {
                    match socket.recv_from(&mut buf) {
                        Ok((size, addr)) if buf[..size].starts_with(PING) => {
                            let Ok(mut monitor) = ping_monitor.lock() else {
                                error!("Ping monitor lock poisoned, keep-alives stop");
                                break;
                            };
                            if monitor.update_ping(addr) {
                                debug!("Received ping from {}", addr);
                            } else {
                                debug!("Ping from unsubscribed address {}", addr);
                            }
                        }
                        Ok((_, addr)) => debug!("Ignoring unexpected datagram from {}", addr),
                        Err(ref e) if e.kind() == ErrorKind::ConnectionReset => {}
                        Err(e) => warn!("Keep-alive receive error: {}", e),
                    }
                }
            })?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::SocketAddr;
    use std::time::{Duration, Instant};

    #[test]
    fn pings_refresh_subscribed_viewers_only() {
        let server = Arc::new(UdpSocket::bind("127.0.0.1:0").unwrap());
        let viewer = UdpSocket::bind("127.0.0.1:0").unwrap();
        let stranger = UdpSocket::bind("127.0.0.1:0").unwrap();
        let viewer_addr = viewer.local_addr().unwrap();
        let stranger_addr: SocketAddr = stranger.local_addr().unwrap();

        let monitor = Arc::new(Mutex::new(PingMonitor::new(Duration::from_secs(10))));
        monitor.lock().unwrap().track(viewer_addr);
        let tracked_at = monitor.lock().unwrap().last_ping(&viewer_addr).unwrap();
        UdpPingListener::start(Arc::clone(&server), Arc::clone(&monitor)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            stranger.send_to(PING, server.local_addr().unwrap()).unwrap();
            viewer.send_to(PING, server.local_addr().unwrap()).unwrap();
            std::thread::sleep(Duration::from_millis(20));
            let refreshed = monitor.lock().unwrap().last_ping(&viewer_addr).unwrap();
            if refreshed > tracked_at {
                break;
            }
            assert!(Instant::now() < deadline, "ping was never recorded");
        }
        assert!(monitor.lock().unwrap().last_ping(&stranger_addr).is_none());
    }
}
