//! Control commands a viewer sends to the server.
//!
//! Each command is one JSON object tagged by `kind`, written on its own TCP
//! connection to the command port. Subscription commands carry the UDP port the
//! viewer listens on; the server pairs it with the peer IP of the TCP connection.
use std::net::{IpAddr, SocketAddr};

use serde::{Deserialize, Serialize};

use crate::error::StreamError;
use crate::result::Result;

/// Command payload sent from viewer to server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Start receiving frames on `port`.
    Subscribe {
        /// UDP port as a string.
        port: String,
    },
    /// Stop receiving frames on `port`.
    Unsubscribe {
        /// UDP port as a string.
        port: String,
    },
    /// Switch the generator to another instrument.
    Select {
        /// Catalog symbol.
        symbol: String,
    },
    /// Stopped -> Running.
    Start,
    /// Running -> Stopped.
    Stop,
    /// Flip between Running and Stopped.
    Toggle,
    /// Summarize the most recent observations.
    Analyze,
    /// Explain an architecture component.
    Explain {
        /// Component name, see `wire::PIPELINE_COMPONENTS`.
        component: String,
    },
}

impl Command {
    /// Creates a new subscription command.
    pub fn subscribe(port: u16) -> Self {
        Command::Subscribe {
            port: port.to_string(),
        }
    }

    /// Creates a new unsubscription command.
    pub fn unsubscribe(port: u16) -> Self {
        Command::Unsubscribe {
            port: port.to_string(),
        }
    }

    /// Parses one line of viewer input such as `select msft` or `explain Delta Lake`.
    ///
    /// Returns `Ok(None)` for blank lines.
    pub fn parse_line(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line, ""));
        let rest = rest.trim();
        let command = match verb.to_ascii_lowercase().as_str() {
            "start" => Command::Start,
            "stop" | "pause" => Command::Stop,
            "toggle" => Command::Toggle,
            "analyze" | "insight" => Command::Analyze,
            "select" if !rest.is_empty() => Command::Select {
                symbol: rest.to_ascii_uppercase(),
            },
            "explain" if !rest.is_empty() => Command::Explain {
                component: String::from(rest),
            },
            _ => return Err(StreamError::Format(format!("unknown command: {line}"))),
        };
        Ok(Some(command))
    }

    /// Resolve the UDP target of a (un)subscription against the TCP peer address.
    ///
    /// Returns `Ok(None)` for commands that carry no port.
    pub fn udp_target(&self, peer: IpAddr) -> Result<Option<SocketAddr>> {
        match self {
            Command::Subscribe { port } | Command::Unsubscribe { port } => {
                let port: u16 = port
                    .trim()
                    .parse()
                    .map_err(|e| StreamError::Format(format!("Invalid UDP port in command: {e}")))?;
                Ok(Some(SocketAddr::new(peer, port)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    #[test]
    fn commands_are_tagged_by_kind() {
        let json = serde_json::to_string(&Command::Select {
            symbol: String::from("NVDA"),
        })
        .unwrap();
        assert_eq!(json, r#"{"kind":"select","symbol":"NVDA"}"#);

        let start: Command = serde_json::from_str(r#"{"kind":"start"}"#).unwrap();
        assert_eq!(start, Command::Start);
    }

    #[test]
    fn viewer_lines_map_to_commands() {
        assert_eq!(
            Command::parse_line("select btc").unwrap(),
            Some(Command::Select {
                symbol: String::from("BTC")
            })
        );
        assert_eq!(
            Command::parse_line("explain  Delta Lake ").unwrap(),
            Some(Command::Explain {
                component: String::from("Delta Lake")
            })
        );
        assert_eq!(Command::parse_line("PAUSE").unwrap(), Some(Command::Stop));
        assert_eq!(Command::parse_line("   ").unwrap(), None);
        assert!(Command::parse_line("select").is_err());
        assert!(Command::parse_line("dance").is_err());
    }

    #[test]
    fn subscription_target_uses_peer_ip() {
        let peer = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 7));
        let target = Command::subscribe(55555).udp_target(peer).unwrap();
        assert_eq!(target, Some("10.0.0.7:55555".parse().unwrap()));
        assert_eq!(Command::Start.udp_target(peer).unwrap(), None);

        let bad = Command::Subscribe {
            port: String::from("http"),
        };
        assert!(bad.udp_target(peer).is_err());
    }
}
