//! Error types for the options fetcher.

use thiserror::Error;

use crate::client::FetchStats;

/// Errors raised while fetching, decoding or persisting options data.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("API key id or secret key is not set")]
    CredentialsMissing,

    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),

    #[error("HTTP request failed: {0}")]
    Request(String),

    #[error("Max retries reached ({retries}) with status {}", .last_status.map(|s| s.to_string()).unwrap_or_else(|| "none".into()))]
    MaxRetriesExceeded {
        retries: u32,
        last_status: Option<u16>,
    },

    #[error("Empty response received")]
    EmptyResponse,

    #[error("Invalid JSON response: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("API error: {message}")]
    Api { message: String },

    #[error("Invalid response format: {0}")]
    MalformedResponse(String),

    #[error("Operation timed out, fetched {collected} items")]
    OperationTimeout { collected: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FetchError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedResponse(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, FetchError>;

/// A failed walk that still hands back what it gathered before failing.
///
/// Timeouts keep every item collected so far; other failures keep the items
/// from the pages that completed before the failing one.
#[derive(Error, Debug)]
#[error("{error}")]
pub struct Interrupted<T> {
    pub items: Vec<T>,
    /// Requests and retries spent on the pages that completed.
    pub stats: FetchStats,
    #[source]
    pub error: FetchError,
}

impl<T> Interrupted<T> {
    pub fn new(items: Vec<T>, error: FetchError) -> Self {
        Self {
            items,
            stats: FetchStats::default(),
            error,
        }
    }

    pub fn with_stats(mut self, stats: FetchStats) -> Self {
        self.stats = stats;
        self
    }

    pub fn into_parts(self) -> (Vec<T>, FetchError) {
        (self.items, self.error)
    }
}

impl<T> From<FetchError> for Interrupted<T> {
    fn from(error: FetchError) -> Self {
        Self::new(Vec::new(), error)
    }
}
