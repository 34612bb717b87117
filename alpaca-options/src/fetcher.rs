//! Query orchestration.
//!
//! One query runs its phases in order on the calling task: validate the
//! expiration range, check credentials, collect contracts, merge market
//! data. Batches run queries one after another.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde_json::Value;
use tracing::info;

use crate::client::endpoints::stock_quote_url;
use crate::client::{
    FetchStats, LogProgress, ProgressSink, ReqwestTransport, RequestSender, RetryPolicy, Transport,
};
use crate::collect::ContractCollector;
use crate::config::{Credentials, EndpointMode, FetchConfig};
use crate::data::{Contract, Query};
use crate::error::{FetchError, Interrupted, Result};
use crate::merge::MarketDataMerger;

/// Contracts and diagnostics for one query or a batch of queries.
#[derive(Debug, Clone, Default)]
pub struct QueryOutput {
    pub contracts: Vec<Contract>,
    /// Snapshot symbols that matched no collected contract.
    pub unmatched: BTreeSet<String>,
    /// Warnings from phases that degrade instead of failing.
    pub log: Vec<String>,
    pub stats: FetchStats,
    /// Some query stopped at its contract cap with pages left unread.
    pub capped: bool,
}

impl QueryOutput {
    fn extend(&mut self, other: QueryOutput) {
        self.contracts.extend(other.contracts);
        self.unmatched.extend(other.unmatched);
        self.log.extend(other.log);
        self.stats.absorb(other.stats);
        self.capped |= other.capped;
    }
}

/// Fetches option contracts with market data from Alpaca.
pub struct OptionsFetcher {
    config: FetchConfig,
    sender: RequestSender,
    progress: Arc<dyn ProgressSink>,
}

impl OptionsFetcher {
    pub fn new(config: FetchConfig, credentials: Credentials, transport: Arc<dyn Transport>) -> Self {
        let sender = RequestSender::new(transport, credentials, RetryPolicy::from_config(&config));
        Self {
            config,
            sender,
            progress: Arc::new(LogProgress),
        }
    }

    /// Fetcher backed by a reqwest client with the configured request timeout.
    pub fn with_reqwest(config: FetchConfig, credentials: Credentials) -> Result<Self> {
        let transport = ReqwestTransport::new(config.request_timeout())?;
        Ok(Self::new(config, credentials, Arc::new(transport)))
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Fetch the contracts for one query with their market data.
    ///
    /// `cap` of zero or less means the configured default cap. On failure
    /// the error carries whatever contracts were collected.
    pub async fn run(
        &self,
        query: &Query,
        cap: i64,
    ) -> std::result::Result<QueryOutput, Interrupted<Contract>> {
        query.expiration_bounds()?;
        if !self.sender.has_credentials() {
            return Err(FetchError::CredentialsMissing.into());
        }

        let cap = self.config.effective_cap(cap);
        info!("Pulling options for {} (max {})", query, cap);

        let progress = self.progress.as_ref();
        let collector = ContractCollector::new(&self.sender, &self.config, progress);

        match self.config.endpoint_mode {
            EndpointMode::Contracts => {
                let collected = collector.collect(query, cap).await?;
                let mut contracts = collected.items;
                let mut stats = collected.stats;

                let merger = MarketDataMerger::new(&self.sender, &self.config, progress);
                let report = merger.merge(&mut contracts, query).await;
                stats.absorb(report.stats);

                Ok(QueryOutput {
                    contracts,
                    unmatched: report.unmatched,
                    log: report.log,
                    stats,
                    capped: collected.capped,
                })
            }
            EndpointMode::Snapshots => {
                let collected = collector.collect_from_snapshots(query, cap).await?;
                Ok(QueryOutput {
                    contracts: collected.items,
                    stats: collected.stats,
                    capped: collected.capped,
                    ..QueryOutput::default()
                })
            }
        }
    }

    /// Run queries in order and concatenate their results.
    ///
    /// Every expiration range is checked before the first request. The first
    /// failing query aborts the batch; its error carries the contracts of
    /// every earlier query plus its own partial set.
    pub async fn run_many(
        &self,
        queries: &[Query],
        cap: i64,
    ) -> std::result::Result<QueryOutput, Interrupted<Contract>> {
        if !self.sender.has_credentials() {
            return Err(FetchError::CredentialsMissing.into());
        }
        for query in queries {
            query.expiration_bounds()?;
        }

        let mut output = QueryOutput::default();
        for (i, query) in queries.iter().enumerate() {
            match self.run(query, cap).await {
                Ok(result) => output.extend(result),
                Err(interrupted) => {
                    output.stats.absorb(interrupted.stats);
                    let (partial, error) = interrupted.into_parts();
                    info!(
                        "Query {} of {} failed, keeping {} contracts",
                        i + 1,
                        queries.len(),
                        output.contracts.len() + partial.len()
                    );
                    output.contracts.extend(partial);
                    return Err(Interrupted::new(output.contracts, error).with_stats(output.stats));
                }
            }
        }

        info!(
            "Fetched {} contracts for {} queries in {} requests",
            output.contracts.len(),
            queries.len(),
            output.stats.requests
        );
        Ok(output)
    }

    /// Latest ask price of a stock.
    pub async fn latest_ask(&self, ticker: &str) -> Result<f64> {
        let url = stock_quote_url(&self.config, ticker)?;
        let sent = self.sender.send(&url).await?;
        ask_price(&sent.body, ticker)
    }
}

/// Read `quotes.<ticker>.ap` from a latest-quotes body.
pub fn ask_price(body: &Value, ticker: &str) -> Result<f64> {
    let quotes = body
        .get("quotes")
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::malformed("no quotes data found in response"))?;
    let quote = quotes
        .get(ticker)
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::malformed(format!("no data found for ticker {}", ticker)))?;
    quote
        .get("ap")
        .and_then(Value::as_f64)
        .ok_or_else(|| FetchError::malformed(format!("no ask price found for ticker {}", ticker)))
}
