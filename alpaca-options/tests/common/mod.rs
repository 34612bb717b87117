#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use alpaca_options::client::{RawResponse, Transport, TransportError};
use alpaca_options::{
    Credentials, FetchConfig, OptionType, OptionsFetcher, PageProgress, Phase, ProgressSink, Query,
};
use async_trait::async_trait;
use reqwest::Url;
use serde_json::{json, Value};

type Script = Box<dyn Fn(&Url, usize) -> Result<RawResponse, TransportError> + Send + Sync>;

/// One recorded request.
#[derive(Debug, Clone)]
pub struct Call {
    pub url: Url,
    pub headers: Vec<(String, String)>,
}

/// Transport answering from a closure of (url, call index).
pub struct ScriptedTransport {
    script: Script,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedTransport {
    pub fn new(
        script: impl Fn(&Url, usize) -> Result<RawResponse, TransportError> + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            script: Box::new(script),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Requests whose path ends with `suffix`.
    pub fn calls_to(&self, suffix: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.url.path().ends_with(suffix))
            .count()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn get(&self, url: &Url, headers: &[(&str, &str)]) -> Result<RawResponse, TransportError> {
        let index = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                url: url.clone(),
                headers: headers
                    .iter()
                    .map(|(k, v)| (k.to_string(), v.to_string()))
                    .collect(),
            });
            calls.len() - 1
        };
        (self.script)(url, index)
    }
}

/// Progress sink keeping every page report.
#[derive(Default)]
pub struct RecordingProgress {
    pages: Mutex<Vec<PageProgress>>,
}

impl RecordingProgress {
    pub fn pages(&self, phase: Phase) -> Vec<PageProgress> {
        self.pages
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.phase == phase)
            .copied()
            .collect()
    }
}

impl ProgressSink for RecordingProgress {
    fn on_page(&self, progress: PageProgress) {
        self.pages.lock().unwrap().push(progress);
    }
}

pub fn is_contracts(url: &Url) -> bool {
    url.path().ends_with("/options/contracts")
}

pub fn is_snapshots(url: &Url) -> bool {
    url.path().contains("/options/snapshots/")
}

pub fn param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub fn page_token(url: &Url) -> String {
    param(url, "page_token").unwrap_or_default()
}

pub fn ok(body: Value) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(200, body.to_string()))
}

pub fn status(code: u16) -> Result<RawResponse, TransportError> {
    Ok(RawResponse::new(code, format!(r#"{{"code": {}, "message": "unavailable"}}"#, code)))
}

/// Contract record as the contracts endpoint sends it, numbers as strings.
pub fn contract(id: &str, symbol: &str) -> Value {
    json!({
        "id": id,
        "symbol": symbol,
        "name": format!("{} option", symbol),
        "status": "active",
        "tradable": true,
        "expiration_date": "2025-05-23",
        "root_symbol": "TSLA",
        "underlying_symbol": "TSLA",
        "underlying_asset_id": "8ccae427-5dd0-45b3-b5fe-7ba5e422c766",
        "type": "call",
        "style": "american",
        "strike_price": "335",
        "multiplier": "100",
        "size": "100",
        "open_interest": "1204",
        "open_interest_date": "2025-05-15",
        "close_price": "12.45",
        "close_price_date": "2025-05-15",
        "ppind": true
    })
}

pub fn contracts_page(contracts: Vec<Value>, next: Option<&str>) -> Value {
    json!({
        "option_contracts": contracts,
        "next_page_token": next,
    })
}

/// Snapshot entry with a quote, greeks and implied volatility.
pub fn snapshot(bid: f64, ask: f64) -> Value {
    json!({
        "latestQuote": {
            "ap": ask, "as": 12, "ax": "C",
            "bp": bid, "bs": 3, "bx": "X",
            "c": "A", "t": "2025-05-16T19:59:59.953277952Z"
        },
        "greeks": {"delta": 0.52, "gamma": 0.01, "theta": -0.4, "vega": 0.3, "rho": 0.05},
        "impliedVolatility": 0.61
    })
}

pub fn snapshots_page(entries: Vec<(&str, Value)>, next: Option<&str>) -> Value {
    let map: serde_json::Map<String, Value> = entries
        .into_iter()
        .map(|(symbol, entry)| (symbol.to_string(), entry))
        .collect();
    json!({
        "snapshots": map,
        "next_page_token": next,
    })
}

pub fn credentials() -> Credentials {
    Credentials::new("PKTEST", "secret")
}

pub fn query() -> Query {
    Query::new("TSLA", OptionType::Call, [0, 10000], ["2025-05-23", "2027-01-23"]).unwrap()
}

pub fn fetcher(transport: Arc<ScriptedTransport>) -> OptionsFetcher {
    fetcher_with(FetchConfig::default(), transport)
}

pub fn fetcher_with(config: FetchConfig, transport: Arc<ScriptedTransport>) -> OptionsFetcher {
    OptionsFetcher::new(config, credentials(), transport)
}
