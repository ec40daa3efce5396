//! Data exchanged between the simulation and its presentation surface.
//!
//! Every type here serializes to JSON; a `Frame` is what one UDP datagram carries.

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

use crate::result::Result;

/// One synthetic market sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Observation {
    /// Wall-clock time at second precision (`HH:MM:SS`), display only.
    pub timestamp: String,
    /// Price rounded to cents.
    pub price: f64,
    /// Jittered short average.
    pub short_average: f64,
    /// RSI-like oscillator in `[0, 100]`.
    pub oscillator: f64,
    /// Synthetic traded volume.
    pub volume: u32,
}

/// Simulated pipeline stage a log record is attributed to.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, Hash, Eq, PartialEq,
)]
#[strum(ascii_case_insensitive)]
pub enum Stage {
    #[strum(to_string = "Ingestion (Bronze)", serialize = "ingestion")]
    Ingestion,
    #[strum(to_string = "Processing (Silver)", serialize = "processing")]
    Processing,
    #[strum(to_string = "Storage (Gold)", serialize = "storage")]
    Storage,
    #[strum(to_string = "Visualization", serialize = "visualization")]
    Visualization,
}

/// Severity of a telemetry record.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, Hash, Eq, PartialEq,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

/// One entry of the telemetry log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Unique, increasing identifier allocated by the log buffer.
    pub id: u64,
    /// `HH:MM:SS` of the event that produced the record.
    pub timestamp: String,
    /// Stage the simulated activity belongs to.
    pub stage: Stage,
    /// Human-readable description.
    pub message: String,
    /// Display severity.
    pub severity: Severity,
}

/// Update pushed to every subscribed viewer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Frame {
    /// The window was replaced wholesale (selection or fresh subscription).
    Reset {
        /// Selected instrument.
        symbol: String,
        /// Current price after seeding.
        price: f64,
        /// The whole observation window.
        window: Vec<Observation>,
    },
    /// Running/stopped state.
    Status {
        /// `true` while the tick producer is armed.
        running: bool,
    },
    /// Snapshot of the telemetry buffer.
    Logs {
        /// Records in display order.
        records: Vec<LogRecord>,
    },
    /// One generator tick.
    Tick {
        /// Selected instrument.
        symbol: String,
        /// Price after the tick.
        price: f64,
        /// The appended observation.
        observation: Observation,
        /// Records appended by this tick.
        logs: Vec<LogRecord>,
    },
    /// Analysis state changed.
    Analysis {
        /// Instrument the text refers to.
        symbol: String,
        /// Latest summary or fallback.
        text: String,
        /// Whether a request is outstanding.
        in_flight: bool,
    },
    /// A component explanation settled.
    Explanation {
        /// Name the explanation was asked for.
        component: String,
        /// Explanation or fallback.
        text: String,
    },
}

impl Frame {
    /// Encode the frame to JSON bytes.
    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let json = serde_json::to_vec(self)?;
        Ok(json)
    }

    /// Decode a frame from one datagram.
    pub fn from_json_bytes(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }
}

/// Architecture components that can be explained on demand.
pub const PIPELINE_COMPONENTS: [&str; 5] = [
    "Stock API",
    "Azure Event Hubs",
    "Databricks / Spark",
    "Delta Lake",
    "React Dashboard",
];
