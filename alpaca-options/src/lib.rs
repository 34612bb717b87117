//! Alpaca options chain fetcher.
//!
//! Pulls option contracts for an underlying from the Alpaca contracts
//! endpoint, then pages the options snapshots endpoint and merges quotes,
//! trades, bars and greeks into the matching contracts by symbol.
//!
//! ```no_run
//! use std::sync::Arc;
//! use alpaca_options::{
//!     Credentials, FetchConfig, OptionType, OptionsFetcher, Query, ReqwestTransport,
//! };
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let config = FetchConfig::default();
//! let credentials = Credentials::resolve("alpacaConfig.json")?;
//! let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
//! let fetcher = OptionsFetcher::new(config, credentials, transport);
//!
//! let query = Query::new("TSLA", OptionType::Call, [0, 10000], ["2025-05-23", "2027-01-23"])?;
//! let output = fetcher.run(&query, -1).await?;
//! println!("{} contracts", output.contracts.len());
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod collect;
pub mod config;
pub mod data;
pub mod error;
pub mod fetcher;
pub mod merge;
pub mod snapshot;

// Re-export commonly used types
pub use client::{
    LogProgress, PageProgress, Phase, ProgressSink, RawResponse, ReqwestTransport, Transport,
    TransportError,
};
pub use collect::ContractCollector;
pub use config::{Credentials, EndpointMode, FetchConfig};
pub use data::{Contract, MarketData, OptionType, Query};
pub use error::{FetchError, Interrupted};
pub use fetcher::{OptionsFetcher, QueryOutput};
pub use merge::{MarketDataMerger, MergeReport};
pub use snapshot::{load_options, save_options};
