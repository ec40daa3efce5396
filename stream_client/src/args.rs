//! Command-line arguments for the stream viewer.
//!
//! This module defines the CLI interface using `clap`. See `main` for end-to-end usage.
use clap::Parser;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Server IP address (IPv4 or IPv6) where the stream server is running.
    #[clap(long)]
    pub server_ip: String,

    /// Local UDP port to bind for receiving frames. `0` picks a free port.
    #[clap(long, default_value_t = 0)]
    pub listen_port: u16,

    /// Instrument to select right after subscribing.
    #[clap(long)]
    pub symbol: Option<String>,

    /// Start the stream right after subscribing.
    #[clap(long)]
    pub start: bool,
}
