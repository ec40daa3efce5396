//! Telemetry log buffer.
//!
//! Append-only record of simulated pipeline activity, capped like the observation
//! window. Producers hand over a `LogEntry`; the buffer stamps it with the next id and
//! keeps it until newer records push it out. Readers only ever get copies.

use stream_common::wire::{LogRecord, Severity, Stage};

use crate::model::bounded::BoundedBuffer;

/// A record before the buffer has assigned its id.
#[derive(Debug, Clone, PartialEq)]
pub struct LogEntry {
    /// `HH:MM:SS` of the producing event.
    pub timestamp: String,
    /// Simulated stage.
    pub stage: Stage,
    /// Display text.
    pub message: String,
    /// Display severity.
    pub severity: Severity,
}

impl LogEntry {
    /// Creates an entry for `stage`.
    pub fn new(timestamp: &str, stage: Stage, severity: Severity, message: String) -> Self {
        Self {
            timestamp: String::from(timestamp),
            stage,
            message,
            severity,
        }
    }
}

/// Bounded, ordered telemetry records.
#[derive(Debug)]
pub struct TelemetryLog {
    records: BoundedBuffer<LogRecord>,
    next_id: u64,
}

impl TelemetryLog {
    /// Creates an empty log that keeps at most `capacity` records.
    pub fn new(capacity: usize) -> Self {
        Self {
            records: BoundedBuffer::new(capacity),
            next_id: 1,
        }
    }

    /// Appends at the tail, truncating the head to the cap. Returns the stored record.
    pub fn append(&mut self, entry: LogEntry) -> LogRecord {
        let record = LogRecord {
            id: self.next_id,
            timestamp: entry.timestamp,
            stage: entry.stage,
            message: entry.message,
            severity: entry.severity,
        };
        self.next_id += 1;
        self.records.push(record.clone());
        record
    }

    /// Copy of all retained records in display order.
    pub fn snapshot(&self) -> Vec<LogRecord> {
        self.records.snapshot()
    }

    /// Number of retained records.
    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// `true` before the first append.
    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
