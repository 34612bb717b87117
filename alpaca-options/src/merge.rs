//! Market-data merge.
//!
//! Pages the snapshots endpoint and splices each entry into the collected
//! contract with the same symbol. Merging never fails the query: a page
//! error ends the merge early with a warning in the report's log.

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::client::endpoints::snapshots_page_url;
use crate::client::{FetchStats, Paginator, Phase, ProgressSink, RequestSender};
use crate::collect::snapshot_entries;
use crate::config::FetchConfig;
use crate::data::{decode_market_data, Contract, Query};

/// Outcome of merging snapshots into a contract set.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeReport {
    /// Snapshot symbols with no collected contract.
    pub unmatched: BTreeSet<String>,
    /// Distinct contracts that received market data.
    pub updated: usize,
    /// Warnings raised while merging.
    pub log: Vec<String>,
    pub stats: FetchStats,
}

/// Position of each contract by symbol.
pub fn symbol_index(contracts: &[Contract]) -> HashMap<String, usize> {
    contracts
        .iter()
        .enumerate()
        .map(|(i, contract)| (contract.symbol.clone(), i))
        .collect()
}

/// Splices snapshot market data into collected contracts.
pub struct MarketDataMerger<'a> {
    sender: &'a RequestSender,
    config: &'a FetchConfig,
    progress: &'a dyn ProgressSink,
}

impl<'a> MarketDataMerger<'a> {
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

    pub async fn merge(&self, contracts: &mut [Contract], query: &Query) -> MergeReport {
        let index = symbol_index(contracts);
        let mut unmatched = BTreeSet::new();
        let paginator = Paginator::new(self.sender, self.progress, Phase::Snapshots, self.config);

        let result = paginator
            .walk(
                |token| snapshots_page_url(self.config, query, token),
                |body| {
                    let entries = snapshot_entries(body)?;
                    let mut applied = Vec::new();
                    for (symbol, raw) in entries {
                        let Some(&position) = index.get(symbol) else {
                            if unmatched.insert(symbol.clone()) {
                                warn!("No matching option found for symbol: {}", symbol);
                            }
                            continue;
                        };
                        if let Some(fragment) = decode_market_data(raw) {
                            contracts[position].market_data.apply(fragment);
                            applied.push((symbol.clone(), ()));
                        }
                    }
                    Ok(applied)
                },
                None,
            )
            .await;

        let mut report = MergeReport {
            unmatched,
            ..MergeReport::default()
        };
        match result {
            Ok(walk) => {
                report.updated = walk.items.len();
                report.stats = walk.stats;
            }
            Err(interrupted) => {
                report.updated = interrupted.items.len();
                report.stats = interrupted.stats;
                let message = format!("Error fetching market data: {}", interrupted.error);
                warn!("{}", message);
                report.log.push(message);
            }
        }

        info!(
            "Merged market data: {} of {} options updated, {} symbols not found",
            report.updated,
            contracts.len(),
            report.unmatched.len()
        );
        if !report.unmatched.is_empty() {
            debug!("Unmatched snapshot symbols: {:?}", report.unmatched);
        }
        report
    }
}
