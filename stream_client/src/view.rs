//! Text rendering of frames for the terminal.
use stream_common::wire::{Frame, LogRecord};

/// Render one log record as `[time] [stage] message`.
pub fn log_line(record: &LogRecord) -> String {
    format!(
        "[{}] [{}] {} ({})",
        record.timestamp, record.stage, record.message, record.severity
    )
}

/// Lines to print for `frame`, in order.
pub fn render(frame: &Frame) -> Vec<String> {
    match frame {
        Frame::Reset {
            symbol,
            price,
            window,
        } => {
            let mut lines = vec![format!(
                "== {} ${:.2} ({} points of history)",
                symbol,
                price,
                window.len()
            )];
            if let (Some(first), Some(last)) = (window.first(), window.last()) {
                lines.push(format!(
                    "   {} ${:.2} .. {} ${:.2}",
                    first.timestamp, first.price, last.timestamp, last.price
                ));
            }
            lines
        }
        Frame::Status { running } => {
            vec![String::from(if *running {
                "Stream running"
            } else {
                "Stream paused"
            })]
        }
        Frame::Logs { records } => records.iter().map(log_line).collect(),
        Frame::Tick {
            symbol,
            price,
            observation,
            logs,
        } => {
            let mut lines = vec![format!(
                "{} {} Price=${:.2} MA={:.2} RSI={:.1} Volume={}",
                observation.timestamp,
                symbol,
                price,
                observation.short_average,
                observation.oscillator,
                observation.volume
            )];
            lines.extend(logs.iter().map(log_line));
            lines
        }
        Frame::Analysis {
            symbol,
            text,
            in_flight,
        } => {
            if *in_flight {
                vec![format!("Analyzing {}...", symbol)]
            } else {
                vec![format!("Analyst insights ({}): \"{}\"", symbol, text)]
            }
        }
        Frame::Explanation { component, text } => vec![format!("{}: {}", component, text)],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_common::wire::{Observation, Severity, Stage};

    #[test]
    fn ticks_print_the_price_line_then_their_logs() {
        let frame = Frame::Tick {
            symbol: String::from("AAPL"),
            price: 150.4,
            observation: Observation {
                timestamp: String::from("10:15:03"),
                price: 150.4,
                short_average: 150.21,
                oscillator: 54.0,
                volume: 812,
            },
            logs: vec![LogRecord {
                id: 7,
                timestamp: String::from("10:15:03"),
                stage: Stage::Ingestion,
                message: String::from("Event Hub received AAPL tick: $150.4"),
                severity: Severity::Info,
            }],
        };
        let lines = render(&frame);
        assert_eq!(
            lines[0],
            "10:15:03 AAPL Price=$150.40 MA=150.21 RSI=54.0 Volume=812"
        );
        assert_eq!(
            lines[1],
            "[10:15:03] [Ingestion (Bronze)] Event Hub received AAPL tick: $150.4 (info)"
        );
    }

    #[test]
    fn analysis_shows_progress_then_text() {
        let pending = Frame::Analysis {
            symbol: String::from("BTC"),
            text: String::from("old"),
            in_flight: true,
        };
        assert_eq!(render(&pending), vec!["Analyzing BTC..."]);

        let done = Frame::Analysis {
            symbol: String::from("BTC"),
            text: String::from("Sideways."),
            in_flight: false,
        };
        assert_eq!(render(&done), vec!["Analyst insights (BTC): \"Sideways.\""]);
    }

    #[test]
    fn empty_reset_prints_only_the_header() {
        let frame = Frame::Reset {
            symbol: String::from("MSFT"),
            price: 420.0,
            window: Vec::new(),
        };
        assert_eq!(render(&frame), vec!["== MSFT $420.00 (0 points of history)"]);
    }
}
