//! Error types shared between the stream server and the viewer client.
//!
//! The `StreamError` enum unifies I/O, serialization, channel and locking failures
//! with the domain failures of the simulation (unknown or invalid instruments,
//! malformed catalogs, text-generation outages), so every crate can propagate a
//! single error type with `?`.
use std::io;
use std::sync::PoisonError;

use thiserror::Error;

/// Unified error type shared by server and client.
#[derive(Error, Debug)]
pub enum StreamError {
    /// I/O error originating from the standard library or sockets/files.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Generic formatting/validation error with a human-readable message.
    #[error("Format error: {0}")]
    Format(String),

    /// Error while parsing an instrument catalog file; carries the line number.
    #[error("Parse catalog error on line {line}: {reason}")]
    ParseCatalog {
        /// 1-based line number of the offending entry.
        line: usize,
        /// What was wrong with it.
        reason: String,
    },

    /// Failure while encoding/decoding JSON via serde_json.
    #[error("JSON serialization/deserialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// Channel send failed (e.g., receiver dropped); contains a short context string.
    #[error("Channel send failed: {0}")]
    ChannelSend(String),

    /// Channel receive failed (e.g., sender closed); contains a short context string.
    #[error("Channel receive failed: {0}")]
    ChannelRecv(String),

    /// Error indicating a poisoned mutex/lock was encountered.
    #[error("Mutex Lock Poisoned: {0}")]
    MutexLock(String),

    /// A requested symbol is not in the instrument registry.
    #[error("Instrument not found: {0}")]
    InstrumentNotFound(String),

    /// A catalog entry violates the instrument invariants.
    #[error("Invalid instrument {symbol}: {reason}")]
    InvalidInstrument {
        /// Symbol of the rejected entry.
        symbol: String,
        /// Violated invariant.
        reason: String,
    },

    /// The external text-generation service failed or is not configured.
    #[error("Text generation failed: {0}")]
    Generation(String),
}

impl<T> From<PoisonError<T>> for StreamError {
    fn from(err: PoisonError<T>) -> Self {
        StreamError::MutexLock(err.to_string())
    }
}
