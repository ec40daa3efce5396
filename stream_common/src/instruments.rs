//! Instrument catalog shared between server and viewer.
//!
//! An `Instrument` is immutable once it enters an `InstrumentRegistry`; the registry
//! is the only place where base prices and volatilities are validated, so the
//! indicator functions downstream can assume both are strictly positive.

use serde::{Deserialize, Serialize};
use std::io::BufRead;
use strum_macros::{Display, EnumString};

use crate::error::StreamError;
use crate::result::Result;

/// Venue an instrument is listed on.
#[allow(missing_docs)]
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, Display, EnumString, Hash, Eq, PartialEq,
)]
#[strum(ascii_case_insensitive)]
pub enum Market {
    NASDAQ,
    NYSE,
    CRYPTO,
}

/// Selectable instrument with its simulation parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Instrument {
    /// Ticker symbol, e.g. `AAPL`.
    pub symbol: String,
    /// Human-readable name.
    pub display_name: String,
    /// Listing venue.
    pub market: Market,
    /// Price the seed walk starts from.
    pub base_price: f64,
    /// Scale of the per-tick price delta.
    pub volatility: f64,
}

impl Instrument {
    /// Creates a catalog entry. Validation happens when it joins a registry.
    pub fn new(
        symbol: &str,
        display_name: &str,
        market: Market,
        base_price: f64,
        volatility: f64,
    ) -> Self {
        Instrument {
            symbol: symbol.trim().to_ascii_uppercase(),
            display_name: String::from(display_name.trim()),
            market,
            base_price,
            volatility,
        }
    }

    fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| StreamError::InvalidInstrument {
            symbol: self.symbol.clone(),
            reason: String::from(reason),
        };
        if self.symbol.is_empty() {
            return Err(invalid("empty symbol"));
        }
        if !(self.base_price.is_finite() && self.base_price > 0.0) {
            return Err(invalid("base price must be positive"));
        }
        if !(self.volatility.is_finite() && self.volatility > 0.0) {
            return Err(invalid("volatility must be positive"));
        }
        Ok(())
    }
}

/// Trait providing file parsing for instrument catalogs.
pub trait CatalogParser {
    /// Parses instruments from a buffered reader.
    ///
    /// Each non-empty line not starting with `#` must look like
    /// `SYMBOL,Display Name,MARKET,basePrice,volatility`.
    fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<Instrument>>;
}

impl CatalogParser for Instrument {
    fn parse_from_reader<R: BufRead>(reader: R) -> Result<Vec<Self>> {
        let mut instruments = Vec::new();

        for (index, line_result) in reader.lines().enumerate() {
            let line = line_result.map_err(StreamError::Io)?;
            let trimmed_line = line.trim();
            if trimmed_line.is_empty() || trimmed_line.starts_with('#') {
                continue;
            }

            let parse_error = |reason: String| StreamError::ParseCatalog {
                line: index + 1,
                reason,
            };
            let fields: Vec<&str> = trimmed_line.split(',').map(str::trim).collect();
            let [symbol, name, market, base_price, volatility] = fields.as_slice() else {
                return Err(parse_error(format!("expected 5 fields, got {}", fields.len())));
            };
            let market = market
                .parse::<Market>()
                .map_err(|e| parse_error(format!("market {market:?}: {e}")))?;
            let base_price = base_price
                .parse::<f64>()
                .map_err(|e| parse_error(format!("base price {base_price:?}: {e}")))?;
            let volatility = volatility
                .parse::<f64>()
                .map_err(|e| parse_error(format!("volatility {volatility:?}: {e}")))?;

            instruments.push(Instrument::new(symbol, name, market, base_price, volatility));
        }
        Ok(instruments)
    }
}

/// Ordered, validated, read-only catalog of instruments.
#[derive(Debug, Clone)]
pub struct InstrumentRegistry {
    instruments: Vec<Instrument>,
}

impl InstrumentRegistry {
    /// Builds a registry, rejecting invalid, duplicate or missing entries.
    pub fn new(instruments: Vec<Instrument>) -> Result<Self> {
        if instruments.is_empty() {
            return Err(StreamError::Format(String::from("instrument catalog is empty")));
        }
        for (i, instrument) in instruments.iter().enumerate() {
            instrument.validate()?;
            if instruments[..i].iter().any(|other| other.symbol == instrument.symbol) {
                return Err(StreamError::InvalidInstrument {
                    symbol: instrument.symbol.clone(),
                    reason: String::from("duplicate symbol"),
                });
            }
        }
        Ok(Self { instruments })
    }

    /// The catalog the dashboard ships with.
    pub fn builtin() -> Self {
        let instruments = vec![
            Instrument::new("AAPL", "Apple Inc.", Market::NASDAQ, 150.00, 1.2),
            Instrument::new("MSFT", "Microsoft Corp.", Market::NASDAQ, 420.00, 1.5),
            Instrument::new("NVDA", "NVIDIA Corp.", Market::NASDAQ, 880.00, 8.5),
            Instrument::new("AMZN", "Amazon.com Inc.", Market::NASDAQ, 180.00, 2.0),
            Instrument::new("TSLA", "Tesla Inc.", Market::NASDAQ, 175.00, 4.5),
            Instrument::new("BTC", "Bitcoin USD", Market::CRYPTO, 65000.00, 150.0),
        ];
        Self { instruments }
    }

    /// All instruments in catalog order.
    pub fn list(&self) -> &[Instrument] {
        &self.instruments
    }

    /// Looks a symbol up, ignoring ASCII case.
    pub fn get(&self, symbol: &str) -> Result<&Instrument> {
        let symbol = symbol.trim();
        self.instruments
            .iter()
            .find(|i| i.symbol.eq_ignore_ascii_case(symbol))
            .ok_or_else(|| StreamError::InstrumentNotFound(String::from(symbol)))
    }

    /// Default selection: the first catalog entry.
    pub fn first(&self) -> &Instrument {
        &self.instruments[0]
    }
}

impl Default for InstrumentRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
