//! Shared networking constants and helpers used by server and viewer.
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};

use crate::error::StreamError;
use crate::result::Result;

/// TCP port for the command channel (viewer -> server).
pub const COMMAND_PORT: u16 = 8080;
/// UDP port the server streams frames from and receives keep-alives on.
pub const DATA_PORT: u16 = 8081;
/// Largest frame the viewer is prepared to receive in one datagram.
pub const MAX_DATAGRAM: usize = 64 * 1024;
/// Largest encoded frame the server puts into one datagram.
pub const MAX_FRAME_BYTES: usize = 60 * 1024;

/// Keep-alive datagram a viewer sends to `DATA_PORT` from its receiving socket.
pub const PING: &[u8] = b"PING";
/// Interval between two keep-alives.
pub const PING_INTERVAL_MS: u64 = 2000;
/// Silence after which the server drops a viewer.
pub const PING_TIMEOUT_SECS: u64 = 10;

/// Builds the socket address for `ip` and `port`.
///
/// Accepts IPv4 and IPv6 literals, optionally wrapped in quotes or brackets
/// (`"127.0.0.1"`, `::1`, `[::1]`).
pub fn addr(ip: &str, port: u16) -> Result<SocketAddr> {
    let literal = ip
        .trim()
        .trim_matches('"')
        .trim_start_matches('[')
        .trim_end_matches(']');
    let ip: IpAddr = literal
        .parse()
        .map_err(|e| StreamError::Format(format!("Invalid IP address {literal:?}: {e}")))?;
    Ok(SocketAddr::new(ip, port))
}

/// Wildcard address of the same family as `ip`, for binding a local socket that
/// talks to `ip`.
pub fn unspecified_like(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
        IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
    }
}
