//! Domain models of the stream server.
//!
//! - `indicators` — stateless price step and indicator synthesis.
//! - `bounded` — capped FIFO buffer behind the window and the log.
//! - `market_stream` — running/stopped generator owning the observation window.
//! - `telemetry` — bounded log of simulated pipeline activity.
//! - `analysis` — single-slot summarization and explanation requests.
//! - `ping_monitor` — keep-alive tracker for subscribed viewers.

pub mod analysis;
pub mod bounded;
pub mod indicators;
pub mod market_stream;
pub mod ping_monitor;
pub mod telemetry;
