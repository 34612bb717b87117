//! Contract collection.
//!
//! Pages the contracts listing for one query and returns each contract once,
//! keyed by id, with market data left at its defaults for the merge phase.
//! The snapshot-nested variant reads contracts and market data from the
//! snapshots endpoint in a single pass.

use serde_json::Value;
use tracing::debug;

use crate::client::endpoints::{contracts_page_url, snapshots_page_url};
use crate::client::{Paginator, Phase, ProgressSink, RequestSender, Walk};
use crate::config::FetchConfig;
use crate::data::{decode_contract, decode_snapshot_entry, Contract, Dialect, Query};
use crate::error::{FetchError, Interrupted, Result};

pub const CONTRACTS_KEY: &str = "option_contracts";
pub const SNAPSHOTS_KEY: &str = "snapshots";

/// Contracts gathered for one query.
pub type Collected<T> = Walk<T>;

/// Collects the contracts matching a query.
pub struct ContractCollector<'a> {
    sender: &'a RequestSender,
    config: &'a FetchConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> ContractCollector<'a> {
    pub fn new(
        sender: &'a RequestSender,
        config: &'a FetchConfig,
        progress: &'a dyn ProgressSink,
    ) -> Self {
        Self {
            sender,
            config,
            progress,
        }
    }

    /// Page the contracts listing, deduplicating by contract id.
    pub async fn collect(
        &self,
        query: &Query,
        cap: usize,
    ) -> std::result::Result<Collected<Contract>, Interrupted<Contract>> {
        let paginator = Paginator::new(self.sender, self.progress, Phase::Contracts, self.config);
        paginator
            .walk(
                |token| contracts_page_url(self.config, query, token),
                contracts_page,
                Some(cap),
            )
            .await
    }

    /// Read contracts nested in snapshot entries, market data included.
    ///
    /// Entries are keyed by id, or by symbol when the id is missing.
    pub async fn collect_from_snapshots(
        &self,
        query: &Query,
        cap: usize,
    ) -> std::result::Result<Collected<Contract>, Interrupted<Contract>> {
        let paginator = Paginator::new(self.sender, self.progress, Phase::Snapshots, self.config);
        paginator
            .walk(
                |token| snapshots_page_url(self.config, query, token),
                nested_snapshot_page,
                Some(cap),
            )
            .await
    }
}

/// Extract `(id, contract)` pairs from one contracts page.
pub fn contracts_page(body: &Value) -> Result<Vec<(String, Contract)>> {
    let entries = body
        .get(CONTRACTS_KEY)
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::malformed(format!("missing {} array", CONTRACTS_KEY)))?;

    let mut page = Vec::with_capacity(entries.len());
    for raw in entries {
        match decode_contract(raw, Dialect::Contracts) {
            Some(contract) => page.push((contract.id.clone(), contract)),
            None => debug!("Skipping non-object contract entry: {}", raw),
        }
    }
    Ok(page)
}

/// Extract `(key, contract)` pairs from one snapshots page in nested form.
pub fn nested_snapshot_page(body: &Value) -> Result<Vec<(String, Contract)>> {
    let entries = snapshot_entries(body)?;

    let mut page = Vec::with_capacity(entries.len());
    for (symbol, raw) in entries {
        match decode_snapshot_entry(symbol, raw) {
            Some(contract) => {
                let key = if contract.id.is_empty() {
                    contract.symbol.clone()
                } else {
                    contract.id.clone()
                };
                page.push((key, contract));
            }
            None => debug!("Skipping non-object snapshot entry {}", symbol),
        }
    }
    Ok(page)
}

/// The `snapshots` map of a snapshots page.
pub fn snapshot_entries(body: &Value) -> Result<&serde_json::Map<String, Value>> {
    body.get(SNAPSHOTS_KEY)
        .and_then(Value::as_object)
        .ok_or_else(|| FetchError::malformed(format!("missing {} object", SNAPSHOTS_KEY)))
}
