//! Core data types for options contracts and their market data.
//!
//! Field names on the market-data structs serialize to the short keys the
//! snapshots endpoint uses (`ap`, `bp`, `vw`, ...) so a saved result set can
//! be read back through the same decoder that reads live pages.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{FetchError, Result};

/// Calendar date format used by query bounds and contract dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Option type (call or put).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptionType {
    Call,
    Put,
}

impl OptionType {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "C" | "CALL" => Some(Self::Call),
            "P" | "PUT" => Some(Self::Put),
            _ => None,
        }
    }

    /// Value sent in the `type` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Call => "call",
            Self::Put => "put",
        }
    }
}

impl fmt::Display for OptionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Exercise style of a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExerciseStyle {
    American,
    European,
}

impl ExerciseStyle {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "american" => Some(Self::American),
            "european" => Some(Self::European),
            _ => None,
        }
    }
}

/// Filter for one contracts/snapshots pull.
///
/// Expiration bounds are kept as the ISO strings the API receives; they are
/// validated by [`Query::new`] and again by the fetcher before any request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    /// Underlying symbol (e.g., "TSLA")
    pub underlying: String,

    /// Contract type
    pub option_type: OptionType,

    /// Inclusive strike bounds [low, high]
    pub strike_range: [i64; 2],

    /// Inclusive expiration bounds [start, end] as YYYY-MM-DD
    pub expiration_range: [String; 2],
}

impl Query {
    /// Build a query, rejecting dates that are not real calendar dates.
    pub fn new(
        underlying: impl Into<String>,
        option_type: OptionType,
        strike_range: [i64; 2],
        expiration_range: [&str; 2],
    ) -> Result<Self> {
        let query = Self {
            underlying: underlying.into(),
            option_type,
            strike_range,
            expiration_range: expiration_range.map(str::to_string),
        };
        query.expiration_bounds()?;
        Ok(query)
    }

    /// Parse the expiration bounds.
    pub fn expiration_bounds(&self) -> Result<(NaiveDate, NaiveDate)> {
        let [start, end] = &self.expiration_range;
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s, DATE_FORMAT).map_err(|_| {
                FetchError::InvalidDateRange(format!(
                    "invalid date {:?}, expected format YYYY-MM-DD",
                    s
                ))
            })
        };
        let start_date = parse(start)?;
        let end_date = parse(end)?;
        if start_date > end_date {
            return Err(FetchError::InvalidDateRange(format!(
                "start {} is after end {}",
                start_date, end_date
            )));
        }
        Ok((start_date, end_date))
    }

    pub fn strike_low(&self) -> i64 {
        self.strike_range[0]
    }

    pub fn strike_high(&self) -> i64 {
        self.strike_range[1]
    }

    pub fn expiration_start(&self) -> &str {
        &self.expiration_range[0]
    }

    pub fn expiration_end(&self) -> &str {
        &self.expiration_range[1]
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} strikes {}..={} expiring {}..={}",
            self.underlying,
            self.option_type,
            self.strike_low(),
            self.strike_high(),
            self.expiration_start(),
            self.expiration_end()
        )
    }
}

/// Greeks for an option contract.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Greeks {
    pub delta: f64,
    pub gamma: f64,
    pub theta: f64,
    pub vega: f64,
    pub rho: f64,
}

/// Price/volume data for one bar period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    #[serde(rename = "o")]
    pub open: f64,
    #[serde(rename = "h")]
    pub high: f64,
    #[serde(rename = "l")]
    pub low: f64,
    #[serde(rename = "c")]
    pub close: f64,
    #[serde(rename = "v")]
    pub volume: i64,
    #[serde(rename = "n")]
    pub trade_count: i64,
    /// Volume-weighted average price
    #[serde(rename = "vw")]
    pub vwap: f64,
    #[serde(rename = "t")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Latest NBBO quote.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "ap")]
    pub ask_price: f64,
    #[serde(rename = "as")]
    pub ask_size: i64,
    #[serde(rename = "ax")]
    pub ask_exchange: String,
    #[serde(rename = "bp")]
    pub bid_price: f64,
    #[serde(rename = "bs")]
    pub bid_size: i64,
    #[serde(rename = "bx")]
    pub bid_exchange: String,
    #[serde(rename = "c")]
    pub condition: String,
    #[serde(rename = "t")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl Quote {
    /// Midpoint of bid and ask, zero when either side is missing.
    pub fn mid(&self) -> f64 {
        if self.bid_price <= 0.0 || self.ask_price <= 0.0 {
            return 0.0;
        }
        (self.bid_price + self.ask_price) / 2.0
    }
}

/// Latest trade print.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    #[serde(rename = "p")]
    pub price: f64,
    #[serde(rename = "s")]
    pub size: i64,
    #[serde(rename = "x")]
    pub exchange: String,
    #[serde(rename = "c")]
    pub condition: String,
    #[serde(rename = "t")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Market data attached to a contract.
///
/// Every sub-object is always present; a contract that never received a
/// snapshot compares equal to `MarketData::default()`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MarketData {
    pub latest_quote: Quote,
    pub latest_trade: Trade,
    pub daily_bar: Bar,
    pub prev_daily_bar: Bar,
    pub minute_bar: Bar,
    pub greeks: Greeks,
    pub implied_volatility: f64,
}

impl MarketData {
    /// Splice a decoded snapshot into this record.
    ///
    /// Sub-objects are replaced whole when present and left untouched when
    /// absent, so nothing set by an earlier page is ever reset.
    pub fn apply(&mut self, fragment: MarketDataFragment) {
        if let Some(quote) = fragment.latest_quote {
            self.latest_quote = quote;
        }
        if let Some(trade) = fragment.latest_trade {
            self.latest_trade = trade;
        }
        if let Some(bar) = fragment.daily_bar {
            self.daily_bar = bar;
        }
        if let Some(bar) = fragment.prev_daily_bar {
            self.prev_daily_bar = bar;
        }
        if let Some(bar) = fragment.minute_bar {
            self.minute_bar = bar;
        }
        if let Some(greeks) = fragment.greeks {
            self.greeks = greeks;
        }
        if let Some(iv) = fragment.implied_volatility {
            self.implied_volatility = iv;
        }
    }
}

/// Market data decoded from one snapshot entry, with presence per sub-object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MarketDataFragment {
    pub latest_quote: Option<Quote>,
    pub latest_trade: Option<Trade>,
    pub daily_bar: Option<Bar>,
    pub prev_daily_bar: Option<Bar>,
    pub minute_bar: Option<Bar>,
    pub greeks: Option<Greeks>,
    pub implied_volatility: Option<f64>,
}

/// One option contract with its attached market data.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    /// Unique contract id (dedup key)
    pub id: String,

    /// OCC symbol (e.g., "TSLA250523C00335000")
    pub symbol: String,

    pub name: String,

    pub status: String,

    pub tradable: bool,

    pub expiration_date: Option<NaiveDate>,

    pub root_symbol: String,

    pub underlying_symbol: String,

    pub underlying_asset_id: String,

    #[serde(rename = "type")]
    pub option_type: Option<OptionType>,

    pub style: Option<ExerciseStyle>,

    pub strike_price: Decimal,

    pub multiplier: i64,

    /// Contract size (shares per contract)
    pub size: i64,

    pub open_interest: i64,

    pub open_interest_date: Option<NaiveDate>,

    pub close_price: Decimal,

    pub close_price_date: Option<NaiveDate>,

    /// Penny pilot indicator
    pub ppind: bool,

    #[serde(flatten)]
    pub market_data: MarketData,
}
