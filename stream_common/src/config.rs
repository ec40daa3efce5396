//! Simulation tunables.
//!
//! The defaults reproduce the reference dashboard: a tick every 1.5 s, a 20-point
//! seed history spaced 5 s apart, a 41-point chart window, 50 log lines and a
//! 10-point analysis slice.
use std::time::Duration;

/// Default interval between two generator ticks.
pub const TICK_INTERVAL_MS: u64 = 1500;
/// Number of observations synthesized when an instrument is selected.
pub const SEED_SIZE: usize = 20;
/// Spacing between two seeded observations.
pub const SEED_SPACING_SECS: i64 = 5;
/// Maximum number of observations kept in the window.
pub const WINDOW_CAPACITY: usize = 41;
/// Maximum number of telemetry records kept in the log buffer.
pub const LOG_CAPACITY: usize = 50;
/// Upper bound accepted for the log buffer cap.
pub const MAX_LOG_CAPACITY: usize = 500;
/// Number of most recent observations handed to the summarizer.
pub const ANALYSIS_DEPTH: usize = 10;
/// Chance that a tick also emits a Processing-stage record.
pub const PROCESSING_PROBABILITY: f64 = 0.3;

/// Runtime configuration of one simulation session.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    /// Period of the tick producer while running.
    pub tick_interval: Duration,
    /// Size of the freshly seeded window.
    pub seed_size: usize,
    /// Backdated spacing of seeded observations, in seconds.
    pub seed_spacing_secs: i64,
    /// Observation window cap `W`.
    pub window_capacity: usize,
    /// Log buffer cap `L`.
    pub log_capacity: usize,
    /// Observations per analysis request.
    pub analysis_depth: usize,
    /// Probability of the cosmetic Processing-stage record.
    pub processing_probability: f64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(TICK_INTERVAL_MS),
            seed_size: SEED_SIZE,
            seed_spacing_secs: SEED_SPACING_SECS,
            window_capacity: WINDOW_CAPACITY,
            log_capacity: LOG_CAPACITY,
            analysis_depth: ANALYSIS_DEPTH,
            processing_probability: PROCESSING_PROBABILITY,
        }
    }
}

impl StreamConfig {
    /// Override the tick interval.
    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    /// Override the log buffer cap, clamped to `1..=MAX_LOG_CAPACITY`.
    pub fn with_log_capacity(mut self, capacity: usize) -> Self {
        self.log_capacity = capacity.clamp(1, MAX_LOG_CAPACITY);
        self
    }
}
