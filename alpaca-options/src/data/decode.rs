//! Defensive decoding of loosely-typed API payloads.
//!
//! The contracts endpoint sends numbers as strings, the snapshots endpoint
//! sends them as JSON numbers, and either may omit keys. Every extraction
//! here falls back to the field's zero value instead of failing the record.

use std::str::FromStr;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde_json::{Map, Value};

use super::types::{
    Bar, Contract, ExerciseStyle, Greeks, MarketDataFragment, OptionType, Quote, Trade,
    DATE_FORMAT,
};

pub type Object = Map<String, Value>;

/// Key under which the snapshots endpoint nests contract fields.
pub const NESTED_CONTRACT_KEY: &str = "option_contracts";

/// Where contract fields live in a payload entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dialect {
    /// Flat contract objects from the contracts listing.
    Contracts,
    /// Snapshot entries with contract fields under `option_contracts`.
    NestedSnapshot,
}

impl Dialect {
    fn contract_fields<'a>(&self, raw: &'a Object) -> Option<&'a Object> {
        match self {
            Self::Contracts => Some(raw),
            Self::NestedSnapshot => get_object(raw, NESTED_CONTRACT_KEY),
        }
    }
}

pub fn get_object<'a>(obj: &'a Object, key: &str) -> Option<&'a Object> {
    obj.get(key).and_then(Value::as_object)
}

pub fn get_str(obj: &Object, key: &str) -> String {
    obj.get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

pub fn get_bool(obj: &Object, key: &str) -> bool {
    obj.get(key).and_then(Value::as_bool).unwrap_or(false)
}

pub fn get_f64(obj: &Object, key: &str) -> f64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Integer field; fractional numbers are truncated.
pub fn get_i64(obj: &Object, key: &str) -> i64 {
    match obj.get(key) {
        Some(Value::Number(n)) => n
            .as_i64()
            .or_else(|| n.as_f64().map(|f| f as i64))
            .unwrap_or(0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0),
        _ => 0,
    }
}

/// Decimal field, read from the literal text so "335.5" and 335.5 agree.
pub fn get_decimal(obj: &Object, key: &str) -> Decimal {
    let text = match obj.get(key) {
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::String(s)) => s.trim().to_string(),
        _ => return Decimal::ZERO,
    };
    Decimal::from_str(&text)
        .or_else(|_| Decimal::from_scientific(&text))
        .unwrap_or(Decimal::ZERO)
}

pub fn get_date(obj: &Object, key: &str) -> Option<NaiveDate> {
    obj.get(key)
        .and_then(Value::as_str)
        .and_then(|s| NaiveDate::parse_from_str(s, DATE_FORMAT).ok())
}

pub fn get_timestamp(obj: &Object, key: &str) -> Option<DateTime<Utc>> {
    obj.get(key).and_then(Value::as_str).and_then(parse_timestamp)
}

/// Parse an API timestamp.
///
/// Bars carry whole seconds ("2025-05-20T04:00:00Z"), quotes and trades carry
/// nanoseconds ("2025-05-20T19:59:59.953277952Z"); both are RFC 3339. Values
/// without an offset are read as UTC.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

pub fn decode_bar(obj: &Object) -> Bar {
    Bar {
        open: get_f64(obj, "o"),
        high: get_f64(obj, "h"),
        low: get_f64(obj, "l"),
        close: get_f64(obj, "c"),
        volume: get_i64(obj, "v"),
        trade_count: get_i64(obj, "n"),
        vwap: get_f64(obj, "vw"),
        timestamp: get_timestamp(obj, "t"),
    }
}

pub fn decode_quote(obj: &Object) -> Quote {
    Quote {
        ask_price: get_f64(obj, "ap"),
        ask_size: get_i64(obj, "as"),
        ask_exchange: get_str(obj, "ax"),
        bid_price: get_f64(obj, "bp"),
        bid_size: get_i64(obj, "bs"),
        bid_exchange: get_str(obj, "bx"),
        condition: get_str(obj, "c"),
        timestamp: get_timestamp(obj, "t"),
    }
}

pub fn decode_trade(obj: &Object) -> Trade {
    Trade {
        price: get_f64(obj, "p"),
        size: get_i64(obj, "s"),
        exchange: get_str(obj, "x"),
        condition: get_str(obj, "c"),
        timestamp: get_timestamp(obj, "t"),
    }
}

pub fn decode_greeks(obj: &Object) -> Greeks {
    Greeks {
        delta: get_f64(obj, "delta"),
        gamma: get_f64(obj, "gamma"),
        theta: get_f64(obj, "theta"),
        vega: get_f64(obj, "vega"),
        rho: get_f64(obj, "rho"),
    }
}

fn decode_contract_fields(fields: &Object) -> Contract {
    Contract {
        id: get_str(fields, "id"),
        symbol: get_str(fields, "symbol"),
        name: get_str(fields, "name"),
        status: get_str(fields, "status"),
        tradable: get_bool(fields, "tradable"),
        expiration_date: get_date(fields, "expiration_date"),
        root_symbol: get_str(fields, "root_symbol"),
        underlying_symbol: get_str(fields, "underlying_symbol"),
        underlying_asset_id: get_str(fields, "underlying_asset_id"),
        option_type: OptionType::from_str(&get_str(fields, "type")),
        style: ExerciseStyle::from_str(&get_str(fields, "style")),
        strike_price: get_decimal(fields, "strike_price"),
        multiplier: get_i64(fields, "multiplier"),
        size: get_i64(fields, "size"),
        open_interest: get_i64(fields, "open_interest"),
        open_interest_date: get_date(fields, "open_interest_date"),
        close_price: get_decimal(fields, "close_price"),
        close_price_date: get_date(fields, "close_price_date"),
        ppind: get_bool(fields, "ppind"),
        market_data: Default::default(),
    }
}

/// Decode a contract; `None` only when `raw` is not a JSON object.
///
/// Market data starts out fully defaulted.
pub fn decode_contract(raw: &Value, dialect: Dialect) -> Option<Contract> {
    let obj = raw.as_object()?;
    let empty = Object::new();
    let fields = dialect.contract_fields(obj).unwrap_or(&empty);
    Some(decode_contract_fields(fields))
}

/// Decode the market-data parts of a snapshot entry.
pub fn decode_market_data(raw: &Value) -> Option<MarketDataFragment> {
    let obj = raw.as_object()?;
    Some(MarketDataFragment {
        latest_quote: get_object(obj, "latestQuote").map(decode_quote),
        latest_trade: get_object(obj, "latestTrade").map(decode_trade),
        daily_bar: get_object(obj, "dailyBar").map(decode_bar),
        prev_daily_bar: get_object(obj, "prevDailyBar").map(decode_bar),
        minute_bar: get_object(obj, "minuteBar").map(decode_bar),
        greeks: get_object(obj, "greeks").map(decode_greeks),
        implied_volatility: obj
            .get("impliedVolatility")
            .filter(|v| v.is_number() || v.is_string())
            .map(|_| get_f64(obj, "impliedVolatility")),
    })
}

/// Decode a nested snapshot entry into a contract carrying its market data.
///
/// The entry key stands in for the symbol when the nested fields lack one.
pub fn decode_snapshot_entry(symbol: &str, raw: &Value) -> Option<Contract> {
    let mut contract = decode_contract(raw, Dialect::NestedSnapshot)?;
    if contract.symbol.is_empty() {
        contract.symbol = symbol.to_string();
    }
    if let Some(fragment) = decode_market_data(raw) {
        contract.market_data.apply(fragment);
    }
    Some(contract)
}

/// Decode a saved record: flat contract fields with market data alongside.
pub fn decode_stored(raw: &Value) -> Option<Contract> {
    let mut contract = decode_contract(raw, Dialect::Contracts)?;
    if let Some(fragment) = decode_market_data(raw) {
        contract.market_data.apply(fragment);
    }
    Some(contract)
}
