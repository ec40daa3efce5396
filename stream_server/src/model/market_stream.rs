//! Market stream generator.
//!
//! `MarketStream` owns the running/stopped state machine, the price of the selected
//! instrument and its bounded observation window. Ticks are produced by a
//! `crossbeam_channel::tick` registration that exists only while the stream is
//! running; `stop` and `select_instrument` drop it, so a tick queued before either
//! call can never be delivered afterwards. The owner multiplexes `ticker()` in its
//! event loop and calls `tick` each time it fires.
//!
//! Each tick is one transition: new price, one appended observation, and the log
//! entries describing it. The entries are returned rather than written so the
//! session decides where telemetry goes.

use std::time::{Duration, Instant};

use chrono::{Local, NaiveDateTime, TimeDelta};
use crossbeam_channel::{Receiver, never, tick};
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use stream_common::StreamConfig;
use stream_common::instruments::Instrument;
use stream_common::wire::{Observation, Severity, Stage};

use crate::model::bounded::BoundedBuffer;
use crate::model::indicators;
use crate::model::telemetry::LogEntry;

const TIME_FORMAT: &str = "%H:%M:%S";

/// Running state of the generator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No tick registration.
    Stopped,
    /// Ticks arrive every `tick_interval`.
    Running,
}

/// Result of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickOutcome {
    /// Observation appended to the window.
    pub observation: Observation,
    /// Telemetry produced by the tick, in order.
    pub logs: Vec<LogEntry>,
}

/// Synthetic price generator for the selected instrument.
pub struct MarketStream {
    state: StreamState,
    instrument: Instrument,
    window: BoundedBuffer<Observation>,
    current_price: f64,
    ticker: Receiver<Instant>,
    tick_interval: Duration,
    seed_size: usize,
    seed_spacing: TimeDelta,
    processing_probability: f64,
    rng: StdRng,
}

impl MarketStream {
    /// Creates a stopped stream seeded for `instrument`.
    pub fn new(instrument: Instrument, config: &StreamConfig) -> Self {
        Self::with_rng(instrument, config, StdRng::from_os_rng())
    }

    /// Same as [`Self::new`] with a caller-provided random source.
    pub fn with_rng(instrument: Instrument, config: &StreamConfig, rng: StdRng) -> Self {
        let mut stream = MarketStream {
            state: StreamState::Stopped,
            current_price: instrument.base_price,
            instrument,
            window: BoundedBuffer::new(config.window_capacity.max(1)),
            ticker: never(),
            tick_interval: config.tick_interval,
            seed_size: config.seed_size,
            seed_spacing: TimeDelta::seconds(config.seed_spacing_secs),
            processing_probability: config.processing_probability.clamp(0.0, 1.0),
            rng,
        };
        stream.seed(Local::now().naive_local());
        stream
    }

    /// Switches to `instrument`, replacing the window with fresh seeded history.
    ///
    /// Allowed in both states. A pending tick registration is dropped and, when
    /// running, a new one is armed so the next tick is a full interval away.
    pub fn select_instrument(&mut self, instrument: Instrument) {
        self.select_instrument_at(instrument, Local::now().naive_local());
    }

    /// [`Self::select_instrument`] with an explicit wall-clock time.
    pub fn select_instrument_at(&mut self, instrument: Instrument, now: NaiveDateTime) {
        self.ticker = never();
        info!(
            "Selected {} ({}), base price {:.2}",
            instrument.symbol, instrument.display_name, instrument.base_price
        );
        self.instrument = instrument;
        self.seed(now);
        if self.state == StreamState::Running {
            self.ticker = tick(self.tick_interval);
        }
    }

    /// Stopped -> Running. Returns `false` if already running.
    pub fn start(&mut self) -> bool {
        if self.state == StreamState::Running {
            return false;
        }
        self.state = StreamState::Running;
        self.ticker = tick(self.tick_interval);
        info!(
            "Market stream started for {} every {:?}",
            self.instrument.symbol, self.tick_interval
        );
        true
    }

    /// Running -> Stopped. Returns `false` if already stopped.
    pub fn stop(&mut self) -> bool {
        if self.state == StreamState::Stopped {
            return false;
        }
        self.ticker = never();
        self.state = StreamState::Stopped;
        info!("Market stream stopped for {}", self.instrument.symbol);
        true
    }

    /// Flips the state; returns whether the stream is now running.
    pub fn toggle(&mut self) -> bool {
        match self.state {
            StreamState::Running => self.stop(),
            StreamState::Stopped => self.start(),
        };
        self.is_running()
    }

    /// Current tick registration; never fires while stopped.
    pub fn ticker(&self) -> &Receiver<Instant> {
        &self.ticker
    }

    /// Produces one tick stamped with the current wall-clock time.
    pub fn tick(&mut self) -> TickOutcome {
        self.tick_at(Local::now().naive_local())
    }

    /// Produces one tick stamped `now`.
    pub fn tick_at(&mut self, now: NaiveDateTime) -> TickOutcome {
        let timestamp = now.format(TIME_FORMAT).to_string();
        let previous_price = self.current_price;
        let new_price =
            indicators::next_price(&mut self.rng, previous_price, self.instrument.volatility);

        let observation = Observation {
            timestamp: timestamp.clone(),
            price: new_price,
            short_average: indicators::derived_short_average(&mut self.rng, new_price),
            oscillator: indicators::derived_oscillator(new_price - previous_price),
            volume: self.rng.random_range(500..1500),
        };
        self.window.push(observation.clone());
        self.current_price = new_price;

        let mut logs = vec![LogEntry::new(
            &timestamp,
            Stage::Ingestion,
            Severity::Info,
            format!(
                "Event Hub received {} tick: ${}",
                self.instrument.symbol, new_price
            ),
        )];
        if self.rng.random_bool(self.processing_probability) {
            logs.push(LogEntry::new(
                &timestamp,
                Stage::Processing,
                Severity::Success,
                String::from("Spark Window Triggered: 5m MA Updated"),
            ));
        }
        debug!(
            "{} tick {:.2} -> {:.2} (window {})",
            self.instrument.symbol,
            previous_price,
            new_price,
            self.window.len()
        );

        TickOutcome { observation, logs }
    }

    fn seed(&mut self, now: NaiveDateTime) {
        let mut price = self.instrument.base_price;
        let mut seeded = Vec::with_capacity(self.seed_size);
        for back in (1..=self.seed_size).rev() {
            let at = now - self.seed_spacing * back as i32;
            price = indicators::next_price(&mut self.rng, price, self.instrument.volatility);
            seeded.push(Observation {
                timestamp: at.format(TIME_FORMAT).to_string(),
                price,
                short_average: indicators::seed_short_average(&mut self.rng, price),
                oscillator: indicators::seed_oscillator(&mut self.rng),
                volume: self.rng.random_range(0..1000),
            });
        }
        self.window.replace(seeded);
        self.current_price = price;
    }

    /// `true` while a tick registration is armed.
    pub fn is_running(&self) -> bool {
        self.state == StreamState::Running
    }

    /// Current state.
    #[cfg(test)]
    pub fn state(&self) -> StreamState {
        self.state
    }

    /// Selected instrument.
    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    /// Price of the latest observation.
    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    /// Owned copy of the whole window, oldest first.
    pub fn window(&self) -> Vec<Observation> {
        self.window.snapshot()
    }

    /// Owned copy of the newest `n` observations, oldest first.
    pub fn recent(&self, n: usize) -> Vec<Observation> {
        self.window.tail(n)
    }

    /// Number of observations in the window.
    #[cfg(test)]
    pub fn window_len(&self) -> usize {
        self.window.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use stream_common::instruments::{InstrumentRegistry, Market};

    fn noon() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 15)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn apple() -> Instrument {
        Instrument::new("AAPL", "Apple Inc.", Market::NASDAQ, 150.0, 1.2)
    }

    fn stream(seed: u64) -> MarketStream {
        stream_with(seed, StreamConfig::default())
    }

    fn stream_with(seed: u64, config: StreamConfig) -> MarketStream {
        let mut stream = MarketStream::with_rng(apple(), &config, StdRng::seed_from_u64(seed));
        stream.select_instrument_at(apple(), noon());
        stream
    }

    #[test]
    fn seeded_window_is_ordered_and_bounded_around_base_price() {
        for seed in 0..50 {
            let stream = stream(seed);
            let window = stream.window();
            assert_eq!(window.len(), 20);
            assert!(window.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
            assert_eq!(window[0].timestamp, "11:58:20");
            assert_eq!(window[19].timestamp, "11:59:55");

            let last = window[19].price;
            assert!((last - 150.0).abs() <= 20.0 * 1.2 / 2.0 + 1e-6);
            assert_eq!(stream.current_price(), last);
            assert!(window.iter().all(|o| (0.0..=100.0).contains(&o.oscillator)));
            assert!(window.iter().all(|o| o.volume < 1000));
        }
    }

    #[test]
    fn selecting_replaces_the_window_wholesale() {
        let mut stream = stream(1);
        for _ in 0..30 {
            stream.tick_at(noon());
        }
        let btc = InstrumentRegistry::builtin().get("BTC").unwrap().clone();
        stream.select_instrument_at(btc, noon());

        let window = stream.window();
        assert_eq!(window.len(), 20);
        assert_eq!(stream.instrument().symbol, "BTC");
        // Bitcoin's walk cannot come anywhere near Apple's price range.
        assert!(window.iter().all(|o| o.price > 60_000.0));
        assert!(!stream.is_running());
    }

    #[test]
    fn ticks_grow_the_window_until_the_cap() {
        let mut stream = stream(2);
        for n in 1..=5 {
            stream.tick_at(noon());
            assert_eq!(stream.window_len(), 20 + n);
        }
        for _ in 0..100 {
            stream.tick_at(noon());
            assert!(stream.window_len() <= 41);
        }
        assert_eq!(stream.window_len(), 41);
    }

    #[test]
    fn window_keeps_the_most_recent_ticks_in_order() {
        let mut stream = stream(3);
        let produced: Vec<Observation> = (0..60).map(|_| stream.tick_at(noon()).observation).collect();
        assert_eq!(stream.window(), produced[60 - 41..].to_vec());
        assert_eq!(stream.recent(10), produced[50..].to_vec());
    }

    #[test]
    fn tick_derives_indicators_from_the_price_change() {
        let mut stream = stream(4);
        for _ in 0..200 {
            let before = stream.current_price();
            let outcome = stream.tick_at(noon());
            let o = &outcome.observation;
            assert!((o.price - before).abs() <= 0.6 + 1e-9);
            assert!((o.short_average - o.price).abs() <= 0.5 + 1e-9);
            assert!((o.oscillator - indicators::derived_oscillator(o.price - before)).abs() < 1e-9);
            assert!((500..1500).contains(&o.volume));
            assert_eq!(o.timestamp, "12:00:00");
            assert_eq!(stream.current_price(), o.price);
        }
    }

    #[test]
    fn every_tick_logs_ingestion_and_sometimes_processing() {
        let mut stream = stream(5);
        let mut processing = 0;
        for _ in 0..1000 {
            let outcome = stream.tick_at(noon());
            assert!(matches!(outcome.logs.len(), 1 | 2));
            assert_eq!(outcome.logs[0].stage, Stage::Ingestion);
            assert!(outcome.logs[0].message.starts_with("Event Hub received AAPL tick: $"));
            if let Some(extra) = outcome.logs.get(1) {
                assert_eq!(extra.stage, Stage::Processing);
                assert_eq!(extra.severity, Severity::Success);
                processing += 1;
            }
        }
        assert!((200..400).contains(&processing), "processing records: {processing}");
    }

    #[test]
    fn redundant_transitions_are_no_ops() {
        let mut stream = stream(6);
        assert!(!stream.stop());
        assert!(stream.start());
        assert!(!stream.start());
        assert_eq!(stream.state(), StreamState::Running);
        assert!(!stream.toggle());
        assert!(stream.toggle());
    }

    #[test]
    fn stop_cancels_ticks_already_queued() {
        let config = StreamConfig::default().with_tick_interval(Duration::from_millis(5));
        let mut stream = stream_with(7, config);
        stream.start();
        let armed = stream.ticker().clone();
        std::thread::sleep(Duration::from_millis(30));
        assert!(armed.try_recv().is_ok(), "ticks should be pending while running");

        stream.stop();
        drop(armed);
        let ticker = stream.ticker().clone();
        assert!(ticker.recv_timeout(Duration::from_millis(40)).is_err());
    }

    #[test]
    fn selection_while_running_rearms_the_ticker() {
        let config = StreamConfig::default().with_tick_interval(Duration::from_millis(5));
        let mut stream = stream_with(8, config);
        stream.start();
        stream.select_instrument_at(apple(), noon());
        assert!(stream.is_running());
        assert!(stream.ticker().recv_timeout(Duration::from_millis(500)).is_ok());
    }
}
