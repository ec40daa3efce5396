//! On-demand summaries over the observation window.
//!
//! Both the market analysis and the architecture explanations follow the same
//! pattern, captured by `InFlightSlot`: at most one request at a time, a second one
//! is rejected rather than queued, the request runs on a worker thread so ticks are
//! never delayed, and it always settles to some text (the reply, or a fixed fallback
//! when the service fails).
//!
//! Observations are copied before the worker starts; later ticks cannot change what
//! is being analyzed.

use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::Sender;
use log::{error, info};
use stream_common::wire::Observation;
use stream_common::{Result, StreamError};

use crate::llm::TextGenerator;

/// Shown before the first analysis.
pub const ANALYSIS_WAITING: &str = "Waiting for data stream to generate insights...";
/// Reply was empty.
pub const ANALYSIS_EMPTY: &str = "Analysis unavailable.";
/// Service failed.
pub const ANALYSIS_FALLBACK: &str = "AI Analysis service is temporarily unavailable.";
/// Reply was empty.
pub const EXPLANATION_EMPTY: &str = "Explanation unavailable.";
/// Service failed.
pub const EXPLANATION_FALLBACK: &str = "Info service unavailable.";

/// Notification sent once a request has settled.
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// A market analysis finished.
    Analysis {
        /// Instrument that was analyzed.
        symbol: String,
        /// Summary or fallback.
        text: String,
    },
    /// A component explanation finished.
    Explanation {
        /// Component that was explained.
        component: String,
        /// Explanation or fallback.
        text: String,
    },
}

/// Externally visible state of one slot.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisState {
    /// A request is outstanding.
    pub in_flight: bool,
    /// Latest settled text.
    pub last_result: String,
}

/// Single-slot request guard.
pub struct InFlightSlot {
    state: Arc<Mutex<AnalysisState>>,
    empty_reply: &'static str,
    fallback: &'static str,
}

impl InFlightSlot {
    /// Creates an idle slot showing `initial`.
    pub fn new(initial: &str, empty_reply: &'static str, fallback: &'static str) -> Self {
        Self {
            state: Arc::new(Mutex::new(AnalysisState {
                in_flight: false,
                last_result: String::from(initial),
            })),
            empty_reply,
            fallback,
        }
    }

    /// Runs `job` on a worker thread unless a request is already outstanding.
    ///
    /// Returns `Ok(None)` when rejected. On settlement the result is stored, the slot
    /// is freed, and then `on_settled` receives the text.
    pub fn try_issue<F, S>(&self, job: F, on_settled: S) -> Result<Option<JoinHandle<()>>>
    where
        F: FnOnce() -> Result<String> + Send + 'static,
        S: FnOnce(String) + Send + 'static,
    {
        {
            let mut state = self.state.lock()?;
            if state.in_flight {
                return Ok(None);
            }
            state.in_flight = true;
        }

        let state = Arc::clone(&self.state);
        let (empty_reply, fallback) = (self.empty_reply, self.fallback);
        let spawned = thread::Builder::new()
            .name(String::from("text-request"))
            .spawn(move || {
                let text = match panic::catch_unwind(AssertUnwindSafe(job)) {
                    Ok(Ok(reply)) if !reply.trim().is_empty() => String::from(reply.trim()),
                    Ok(Ok(_)) => String::from(empty_reply),
                    Ok(Err(e)) => {
                        error!("Text generation error: {}", e);
                        String::from(fallback)
                    }
                    Err(_) => {
                        error!("Text generation worker panicked");
                        String::from(fallback)
                    }
                };
                settle(&state, text.clone());
                on_settled(text);
            });

        match spawned {
            Ok(handle) => Ok(Some(handle)),
            Err(e) => {
                settle(&self.state, String::from(fallback));
                Err(StreamError::Io(e))
            }
        }
    }

    /// Copy of the current state.
    pub fn state(&self) -> Result<AnalysisState> {
        Ok(self.state.lock()?.clone())
    }

    /// Replace the displayed text without touching the in-flight flag.
    pub fn set_last_result(&self, text: String) -> Result<()> {
        self.state.lock()?.last_result = text;
        Ok(())
    }
}

fn settle(state: &Mutex<AnalysisState>, text: String) {
    let mut state = state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    state.last_result = text;
    state.in_flight = false;
}

/// Builds the summarization prompt for `symbol` over `observations`.
pub fn analysis_prompt(symbol: &str, observations: &[Observation]) -> Result<String> {
    let data = serde_json::to_string(observations)?;
    Ok(format!(
        "Act as a senior financial analyst. Analyze the following recent stock market data \
         points (simulated) for {symbol}.\n\nData:\n{data}\n\nProvide a concise 2-3 sentence \
         summary of the current trend, specifically mentioning volatility and the RSI \
         (Relative Strength Index) indicators, which appear as `oscillator`.\nDo not use \
         markdown formatting. Keep it professional and direct."
    ))
}

/// Builds the tooltip prompt for an architecture component.
pub fn explanation_prompt(component: &str) -> String {
    format!(
        "Explain the role of \"{component}\" in a modern Azure Data Engineering pipeline using \
         Medallion Architecture (Bronze/Silver/Gold) and Databricks.\nKeep the explanation \
         under 50 words, suitable for a technical tooltip."
    )
}

/// Summarizes the latest observations of the selected instrument.
pub struct AnalysisCoordinator {
    slot: InFlightSlot,
    generator: Arc<dyn TextGenerator>,
    depth: usize,
    notify: Option<Sender<Settlement>>,
}

impl AnalysisCoordinator {
    /// Creates an idle coordinator that analyzes at most `depth` observations.
    pub fn new(generator: Arc<dyn TextGenerator>, depth: usize) -> Self {
        Self {
            slot: InFlightSlot::new(ANALYSIS_WAITING, ANALYSIS_EMPTY, ANALYSIS_FALLBACK),
            generator,
            depth: depth.max(1),
            notify: None,
        }
    }

    /// Report every settlement on `tx`.
    pub fn with_notify(mut self, tx: Sender<Settlement>) -> Self {
        self.notify = Some(tx);
        self
    }

    /// Issues one summarization over the newest observations of `window`.
    ///
    /// A no-op returning `Ok(None)` when the window is empty or a request is already
    /// outstanding; `last_result` is left as is in both cases.
    pub fn request_analysis(
        &self,
        window: &[Observation],
        symbol: &str,
    ) -> Result<Option<JoinHandle<()>>> {
        if window.is_empty() {
            return Ok(None);
        }
        let recent = window[window.len().saturating_sub(self.depth)..].to_vec();
        let symbol = String::from(symbol);
        let generator = Arc::clone(&self.generator);
        let notify = self.notify.clone();
        let job_symbol = symbol.clone();

        let issued = self.slot.try_issue(
            move || generator.generate(&analysis_prompt(&job_symbol, &recent)?),
            move |text| {
                if let Some(tx) = notify {
                    let _ = tx.send(Settlement::Analysis { symbol, text });
                }
            },
        )?;
        if issued.is_some() {
            info!("Analysis requested");
        }
        Ok(issued)
    }

    /// Number of most recent observations one request looks at.
    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Show the "ready" message for a newly selected instrument.
    pub fn reset_for(&self, symbol: &str) -> Result<()> {
        self.slot.set_last_result(format!("Ready to analyze {symbol}..."))
    }

    /// Copy of `{in_flight, last_result}`.
    pub fn state(&self) -> Result<AnalysisState> {
        self.slot.state()
    }
}

/// Explains pipeline components for tooltips.
pub struct ComponentExplainer {
    slot: InFlightSlot,
    generator: Arc<dyn TextGenerator>,
    notify: Option<Sender<Settlement>>,
}

impl ComponentExplainer {
    /// Creates an idle explainer.
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            slot: InFlightSlot::new("", EXPLANATION_EMPTY, EXPLANATION_FALLBACK),
            generator,
            notify: None,
        }
    }

    /// Report every settlement on `tx`.
    pub fn with_notify(mut self, tx: Sender<Settlement>) -> Self {
        self.notify = Some(tx);
        self
    }

    /// Asks for an explanation of `component`; rejected while one is outstanding.
    pub fn explain_component(&self, component: &str) -> Result<Option<JoinHandle<()>>> {
        let prompt = explanation_prompt(component);
        let component = String::from(component);
        let generator = Arc::clone(&self.generator);
        let notify = self.notify.clone();

        self.slot.try_issue(
            move || generator.generate(&prompt),
            move |text| {
                if let Some(tx) = notify {
                    let _ = tx.send(Settlement::Explanation { component, text });
                }
            },
        )
    }

    /// Copy of `{in_flight, last_result}`.
    #[cfg(test)]
    pub fn state(&self) -> Result<AnalysisState> {
        self.slot.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::{Receiver, bounded, unbounded};
    use std::time::Duration;

    struct Scripted {
        reply: Result<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn ok(text: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(String::from(text)),
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(StreamError::Generation(String::from("503"))),
                prompts: Mutex::new(Vec::new()),
            })
        }
    }

    impl TextGenerator for Scripted {
        fn generate(&self, prompt: &str) -> Result<String> {
            self.prompts.lock().unwrap().push(String::from(prompt));
            match &self.reply {
                Ok(text) => Ok(text.clone()),
                Err(e) => Err(StreamError::Generation(e.to_string())),
            }
        }
    }

    /// Blocks until the test releases it.
    struct Gated {
        gate: Receiver<()>,
    }

    impl TextGenerator for Gated {
        fn generate(&self, _prompt: &str) -> Result<String> {
            self.gate
                .recv()
                .map_err(|e| StreamError::ChannelRecv(e.to_string()))?;
            Ok(String::from("Prices drift higher on steady volume."))
        }
    }

    struct Panicking;

    impl TextGenerator for Panicking {
        fn generate(&self, _prompt: &str) -> Result<String> {
            panic!("boom");
        }
    }

    fn observation(n: usize) -> Observation {
        Observation {
            timestamp: format!("12:00:{:02}", n % 60),
            price: 100.0 + n as f64,
            short_average: 100.0 + n as f64,
            oscillator: 50.0,
            volume: 700,
        }
    }

    fn window(len: usize) -> Vec<Observation> {
        (0..len).map(observation).collect()
    }

    #[test]
    fn successful_reply_becomes_the_last_result() {
        let generator = Scripted::ok("  Uptrend with low volatility; RSI neutral.  ");
        let coordinator = AnalysisCoordinator::new(generator.clone(), 10);
        assert_eq!(coordinator.state().unwrap().last_result, ANALYSIS_WAITING);

        let handle = coordinator.request_analysis(&window(41), "AAPL").unwrap().unwrap();
        handle.join().unwrap();

        let state = coordinator.state().unwrap();
        assert!(!state.in_flight);
        assert_eq!(state.last_result, "Uptrend with low volatility; RSI neutral.");
    }

    #[test]
    fn only_the_newest_ten_observations_are_sent() {
        let generator = Scripted::ok("ok");
        let coordinator = AnalysisCoordinator::new(generator.clone(), 10);
        coordinator
            .request_analysis(&window(41), "MSFT")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();

        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("for MSFT"));
        assert!(prompts[0].contains("\"price\":140.0"));
        assert!(prompts[0].contains("\"price\":131.0"));
        assert!(!prompts[0].contains("\"price\":130.0"));
    }

    #[test]
    fn short_windows_are_sent_whole_and_empty_ones_ignored() {
        let generator = Scripted::ok("ok");
        let coordinator = AnalysisCoordinator::new(generator.clone(), 10);
        assert!(coordinator.request_analysis(&[], "AAPL").unwrap().is_none());
        assert!(!coordinator.state().unwrap().in_flight);

        coordinator
            .request_analysis(&window(3), "AAPL")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert_eq!(prompts[0].matches("\"timestamp\"").count(), 3);
    }

    #[test]
    fn failures_settle_to_the_fallback_text() {
        let coordinator = AnalysisCoordinator::new(Scripted::failing(), 10);
        coordinator
            .request_analysis(&window(20), "TSLA")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();
        let state = coordinator.state().unwrap();
        assert!(!state.in_flight);
        assert_eq!(state.last_result, ANALYSIS_FALLBACK);

        let panicking = AnalysisCoordinator::new(Arc::new(Panicking), 10);
        panicking
            .request_analysis(&window(20), "TSLA")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(panicking.state().unwrap().last_result, ANALYSIS_FALLBACK);
    }

    #[test]
    fn empty_replies_use_the_unavailable_text() {
        let coordinator = AnalysisCoordinator::new(Scripted::ok("   "), 10);
        coordinator
            .request_analysis(&window(5), "NVDA")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();
        assert_eq!(coordinator.state().unwrap().last_result, ANALYSIS_EMPTY);
    }

    #[test]
    fn second_request_while_in_flight_is_rejected() {
        let (release, gate) = bounded::<()>(0);
        let coordinator = AnalysisCoordinator::new(Arc::new(Gated { gate }), 10);

        let first = coordinator.request_analysis(&window(20), "AAPL").unwrap();
        assert!(first.is_some());
        let second = coordinator.request_analysis(&window(20), "AAPL").unwrap();
        assert!(second.is_none());

        let pending = coordinator.state().unwrap();
        assert!(pending.in_flight);
        assert_eq!(pending.last_result, ANALYSIS_WAITING);

        release.send(()).unwrap();
        first.unwrap().join().unwrap();
        let settled = coordinator.state().unwrap();
        assert!(!settled.in_flight);
        assert_eq!(settled.last_result, "Prices drift higher on steady volume.");

        // The slot is free again once settled.
        let third = coordinator.request_analysis(&window(20), "AAPL").unwrap();
        assert!(third.is_some());
        release.send(()).unwrap();
        third.unwrap().join().unwrap();
    }

    #[test]
    fn later_window_changes_do_not_affect_the_request() {
        let generator = Scripted::ok("ok");
        let coordinator = AnalysisCoordinator::new(generator.clone(), 10);
        let mut live = window(20);
        let handle = coordinator.request_analysis(&live, "AAPL").unwrap().unwrap();
        for o in live.iter_mut() {
            o.price = 9999.0;
        }
        handle.join().unwrap();
        assert!(!generator.prompts.lock().unwrap()[0].contains("9999"));
    }

    #[test]
    fn reset_changes_text_but_not_the_flag() {
        let (release, gate) = bounded::<()>(0);
        let coordinator = AnalysisCoordinator::new(Arc::new(Gated { gate }), 10);
        let handle = coordinator.request_analysis(&window(5), "AAPL").unwrap().unwrap();
        coordinator.reset_for("BTC").unwrap();

        let state = coordinator.state().unwrap();
        assert!(state.in_flight);
        assert_eq!(state.last_result, "Ready to analyze BTC...");

        release.send(()).unwrap();
        handle.join().unwrap();
        assert_eq!(
            coordinator.state().unwrap().last_result,
            "Prices drift higher on steady volume."
        );
    }

    #[test]
    fn settlements_are_reported() {
        let (tx, rx) = unbounded();
        let coordinator = AnalysisCoordinator::new(Scripted::ok("fine"), 10).with_notify(tx.clone());
        coordinator.request_analysis(&window(5), "AMZN").unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Settlement::Analysis {
                symbol: String::from("AMZN"),
                text: String::from("fine")
            }
        );

        let explainer = ComponentExplainer::new(Scripted::failing()).with_notify(tx);
        explainer.explain_component("Delta Lake").unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(5)).unwrap(),
            Settlement::Explanation {
                component: String::from("Delta Lake"),
                text: String::from(EXPLANATION_FALLBACK)
            }
        );
    }

    #[test]
    fn explainer_has_its_own_slot() {
        let (release, gate) = bounded::<()>(0);
        let gated: Arc<dyn TextGenerator> = Arc::new(Gated { gate });
        let explainer = ComponentExplainer::new(Arc::clone(&gated));
        let coordinator = AnalysisCoordinator::new(Scripted::ok("ok"), 10);

        let pending = explainer.explain_component("Azure Event Hubs").unwrap().unwrap();
        assert!(explainer.explain_component("Delta Lake").unwrap().is_none());
        coordinator
            .request_analysis(&window(5), "AAPL")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();

        release.send(()).unwrap();
        pending.join().unwrap();
        assert!(!explainer.state().unwrap().in_flight);
    }

    #[test]
    fn explanation_prompt_names_the_component() {
        let generator = Scripted::ok("Buffers raw events.");
        let explainer = ComponentExplainer::new(generator.clone());
        explainer
            .explain_component("Azure Event Hubs")
            .unwrap()
            .unwrap()
            .join()
            .unwrap();
        let prompts = generator.prompts.lock().unwrap();
        assert!(prompts[0].contains("\"Azure Event Hubs\""));
        assert!(prompts[0].contains("under 50 words"));
        assert_eq!(explainer.state().unwrap().last_result, "Buffers raw events.");
    }
}
