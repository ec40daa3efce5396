//! Command-line arguments for the stream server.
use clap::Parser;
use std::path::PathBuf;
use stream_common::config::{LOG_CAPACITY, TICK_INTERVAL_MS};
use stream_common::net::PING_TIMEOUT_SECS;

use crate::llm::DEFAULT_MODEL;

/// Parsed command-line arguments.
#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
pub struct Args {
    /// Local address to bind the command (TCP) and data (UDP) sockets on.
    #[clap(long, default_value = "0.0.0.0")]
    pub bind_ip: String,

    /// Milliseconds between two generator ticks.
    #[clap(long, default_value_t = TICK_INTERVAL_MS)]
    pub tick_ms: u64,

    /// Number of telemetry records kept for new viewers (1 to 500).
    #[clap(long, default_value_t = LOG_CAPACITY)]
    pub log_capacity: usize,

    /// Seconds without a keep-alive after which a viewer is dropped.
    #[clap(long, default_value_t = PING_TIMEOUT_SECS)]
    pub viewer_timeout_secs: u64,

    /// Optional instrument catalog, one `SYMBOL,Name,MARKET,basePrice,volatility`
    /// per line. The built-in catalog is used when omitted.
    #[clap(long)]
    pub catalog: Option<PathBuf>,

    /// Text-generation model used for analysis and explanations.
    #[clap(long, default_value = DEFAULT_MODEL)]
    pub model: String,

    /// Instrument selected at startup instead of the first catalog entry.
    #[clap(long)]
    pub symbol: Option<String>,
}
