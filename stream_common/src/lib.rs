//!
//! Common types and utilities shared by the stream server and the viewer.
//!
//! This crate aggregates:
//! - `error` — unified error type `StreamError` used across the workspace.
//! - `result` — handy `Result<T, StreamError>` alias.
//! - `config` — simulation tunables and their reference defaults.
//! - `instruments` — instrument catalog, registry and catalog-file parsing.
//! - `wire` — observations, telemetry records and frames sent to viewers.
//! - `command` — TCP command payloads exchanged between viewer and server.
//! - `net` — networking constants and small helpers.
#![warn(missing_docs)]
pub mod command;
pub mod config;
pub mod error;
pub mod instruments;
pub mod net;
pub mod result;
pub mod wire;

pub use command::Command;
pub use config::StreamConfig;
pub use error::StreamError;
pub use result::Result;
