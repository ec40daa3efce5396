//! One dashboard session.
//!
//! A `Session` owns the generator, the telemetry log and both request slots, and
//! runs them on a single thread. `crossbeam_channel::select!` multiplexes three
//! sources: inbound `SessionEvent`s, the generator's tick registration, and
//! settlements of outstanding text requests. Every state change is therefore applied
//! whole before the next event is looked at, and frames reach subscribers in the
//! order the changes happened.
//!
//! Subscribers are plain channels. A subscriber whose receiver is gone is dropped on
//! the next broadcast.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, Sender, select, unbounded};
use log::{debug, error, info, warn};
use stream_common::Command;
use stream_common::StreamConfig;
use stream_common::instruments::InstrumentRegistry;
use stream_common::wire::Frame;
use stream_common::Result;

use crate::llm::TextGenerator;
use crate::model::analysis::{AnalysisCoordinator, ComponentExplainer, Settlement};
use crate::model::market_stream::MarketStream;
use crate::model::telemetry::TelemetryLog;

/// Message delivered to the session thread.
pub enum SessionEvent {
    /// A viewer command (subscription commands are handled by the caller).
    Command(Command),
    /// Register a new frame subscriber.
    Subscribe(Sender<StreamEvent>),
    /// Stop the loop and notify subscribers.
    Shutdown,
}

/// Message sent by the session to its subscribers.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A state update.
    Frame(Frame),
    /// Global shutdown notification for all consumers.
    Shutdown,
}

/// Generator, telemetry and analysis of one dashboard.
pub struct Session {
    registry: InstrumentRegistry,
    stream: MarketStream,
    telemetry: TelemetryLog,
    analysis: AnalysisCoordinator,
    explainer: ComponentExplainer,
    settlements: Receiver<Settlement>,
    subscribers: Vec<Sender<StreamEvent>>,
}

impl Session {
    /// Creates a stopped session showing the registry's first instrument.
    pub fn new(
        registry: InstrumentRegistry,
        config: &StreamConfig,
        generator: Arc<dyn TextGenerator>,
    ) -> Self {
        let (settle_tx, settlements) = unbounded();
        let stream = MarketStream::new(registry.first().clone(), config);
        Session {
            stream,
            telemetry: TelemetryLog::new(config.log_capacity.max(1)),
            analysis: AnalysisCoordinator::new(Arc::clone(&generator), config.analysis_depth)
                .with_notify(settle_tx.clone()),
            explainer: ComponentExplainer::new(generator).with_notify(settle_tx),
            settlements,
            subscribers: Vec::new(),
            registry,
        }
    }

    /// Start the session thread and return its inbox.
    ///
    /// The thread hands the session back when it receives `SessionEvent::Shutdown`
    /// or when every inbox sender is gone.
    pub fn spawn(self) -> Result<(Sender<SessionEvent>, JoinHandle<Session>)> {
        let (events_tx, events_rx) = unbounded::<SessionEvent>();
        let handle = thread::Builder::new()
            .name(String::from("session"))
            .spawn(move || self.run(events_rx))?;
        Ok((events_tx, handle))
    }

    /// Event loop; returns when shut down.
    pub fn run(mut self, events: Receiver<SessionEvent>) -> Self {
        info!(
            "Session started on {} (thread {:?})",
            self.stream.instrument().symbol,
            thread::current().id()
        );
        loop {
            // Re-read every iteration: start/stop/select replace the registration.
            let ticker = self.stream.ticker().clone();
            let settlements = self.settlements.clone();
            select! {
                recv(events) -> msg => match msg {
                    Ok(SessionEvent::Command(command)) => self.apply(command),
                    Ok(SessionEvent::Subscribe(tx)) => self.subscribe(tx),
                    Ok(SessionEvent::Shutdown) | Err(_) => break,
                },
                recv(ticker) -> _ => self.on_tick(),
                recv(settlements) -> msg => if let Ok(settlement) = msg {
                    self.on_settled(settlement);
                },
            }
        }
        self.stream.stop();
        self.broadcast(StreamEvent::Shutdown);
        info!("Session stopped");
        self
    }

    /// Applies one viewer command.
    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Select { symbol } => self.select(&symbol),
            Command::Start => {
                if self.stream.start() {
                    self.broadcast_status();
                }
            }
            Command::Stop => {
                if self.stream.stop() {
                    self.broadcast_status();
                }
            }
            Command::Toggle => {
                self.stream.toggle();
                self.broadcast_status();
            }
            Command::Analyze => self.analyze(),
            Command::Explain { component } => {
                match self.explainer.explain_component(&component) {
                    Ok(Some(_)) => info!("Explanation requested for {}", component),
                    Ok(None) => debug!("Explanation already in flight, ignoring {}", component),
                    Err(e) => error!("Failed to request explanation: {}", e),
                }
            }
            Command::Subscribe { .. } | Command::Unsubscribe { .. } => {
                debug!("Subscription commands are handled by the network layer");
            }
        }
    }

    fn select(&mut self, symbol: &str) {
        let instrument = match self.registry.get(symbol) {
            Ok(instrument) => instrument.clone(),
            Err(e) => {
                warn!("Ignoring selection: {}", e);
                return;
            }
        };
        self.stream.select_instrument(instrument);
        if let Err(e) = self.analysis.reset_for(&self.stream.instrument().symbol) {
            error!("Failed to reset analysis text: {}", e);
        }
        let reset = self.reset_frame();
        self.broadcast(StreamEvent::Frame(reset));
        self.broadcast_analysis();
    }

    fn analyze(&mut self) {
        let recent = self.stream.recent(self.analysis.depth());
        let symbol = self.stream.instrument().symbol.clone();
        match self.analysis.request_analysis(&recent, &symbol) {
            Ok(Some(_)) => self.broadcast_analysis(),
            Ok(None) => debug!("Analysis already in flight or window empty"),
            Err(e) => error!("Failed to request analysis: {}", e),
        }
    }

    fn on_tick(&mut self) {
        let outcome = self.stream.tick();
        let logs = outcome
            .logs
            .into_iter()
            .map(|entry| self.telemetry.append(entry))
            .collect();
        let frame = Frame::Tick {
            symbol: self.stream.instrument().symbol.clone(),
            price: self.stream.current_price(),
            observation: outcome.observation,
            logs,
        };
        self.broadcast(StreamEvent::Frame(frame));
    }

    fn on_settled(&mut self, settlement: Settlement) {
        let frame = match settlement {
            Settlement::Analysis { symbol, text } => {
                info!("Analysis for {} settled", symbol);
                // A newer request may already be outstanding.
                let in_flight = match self.analysis.state() {
                    Ok(state) => state.in_flight,
                    Err(e) => {
                        error!("Failed to read analysis state: {}", e);
                        false
                    }
                };
                Frame::Analysis {
                    symbol,
                    text,
                    in_flight,
                }
            }
            Settlement::Explanation { component, text } => {
                info!("Explanation for {} settled", component);
                Frame::Explanation { component, text }
            }
        };
        self.broadcast(StreamEvent::Frame(frame));
    }

    fn subscribe(&mut self, tx: Sender<StreamEvent>) {
        let mut greeting = vec![
            self.reset_frame(),
            Frame::Status {
                running: self.stream.is_running(),
            },
            Frame::Logs {
                records: self.telemetry.snapshot(),
            },
        ];
        greeting.extend(self.analysis_frame());
        if greeting
            .into_iter()
            .all(|frame| tx.send(StreamEvent::Frame(frame)).is_ok())
        {
            self.subscribers.push(tx);
            info!("Subscriber added. Total subscribers: {}", self.subscribers.len());
        }
    }

    fn reset_frame(&self) -> Frame {
        Frame::Reset {
            symbol: self.stream.instrument().symbol.clone(),
            price: self.stream.current_price(),
            window: self.stream.window(),
        }
    }

    fn analysis_frame(&self) -> Option<Frame> {
        match self.analysis.state() {
            Ok(state) => Some(Frame::Analysis {
                symbol: self.stream.instrument().symbol.clone(),
                text: state.last_result,
                in_flight: state.in_flight,
            }),
            Err(e) => {
                error!("Failed to read analysis state: {}", e);
                None
            }
        }
    }

    fn broadcast_analysis(&mut self) {
        if let Some(frame) = self.analysis_frame() {
            self.broadcast(StreamEvent::Frame(frame));
        }
    }

    fn broadcast_status(&mut self) {
        let running = self.stream.is_running();
        self.broadcast(StreamEvent::Frame(Frame::Status { running }));
    }

    fn broadcast(&mut self, event: StreamEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// The generator.
    #[cfg(test)]
    pub fn stream(&self) -> &MarketStream {
        &self.stream
    }

    /// The telemetry log.
    #[cfg(test)]
    pub fn telemetry(&self) -> &TelemetryLog {
        &self.telemetry
    }

    /// The analysis coordinator.
    #[cfg(test)]
    pub fn analysis(&self) -> &AnalysisCoordinator {
        &self.analysis
    }
}
