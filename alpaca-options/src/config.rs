//! Fetcher configuration and API credentials.
//!
//! Timing knobs default to the values the Alpaca client has always used:
//! 5 s between retries, 12 retries, 1 s between pages, 5 minutes per
//! pagination phase.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{FetchError, Result};

pub const KEY_ID_ENV: &str = "APCA_API_KEY_ID";
pub const SECRET_KEY_ENV: &str = "APCA_API_SECRET_KEY";

/// Credentials file consulted when the environment has no key pair.
pub const DEFAULT_CREDENTIALS_FILE: &str = "alpacaConfig.json";

/// How contract identities are obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointMode {
    /// Page the contracts listing, then merge snapshots by symbol.
    #[default]
    Contracts,
    /// Read contracts nested inside snapshot entries in a single pass.
    Snapshots,
}

/// Fetcher configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Contracts listing endpoint.
    pub contracts_url: String,

    /// Snapshots endpoint; the underlying symbol is appended as a path segment.
    pub snapshots_url: String,

    /// Latest stock quotes endpoint.
    pub stocks_quotes_url: String,

    /// Snapshot data feed.
    pub feed: String,

    /// Items requested per page.
    pub page_size: u32,

    /// Cap used when the caller passes a non-positive item cap.
    pub default_item_cap: usize,

    /// Resends allowed after the first attempt of a request.
    pub max_retries: u32,

    /// Fixed wait between resends, in milliseconds.
    pub retry_delay_ms: u64,

    /// Minimum spacing between page requests, in milliseconds.
    pub page_spacing_ms: u64,

    /// Deadline for one pagination phase, in milliseconds.
    pub operation_timeout_ms: u64,

    /// Per-request HTTP timeout, in milliseconds.
    pub request_timeout_ms: u64,

    pub endpoint_mode: EndpointMode,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            contracts_url: "https://paper-api.alpaca.markets/v2/options/contracts".to_string(),
            snapshots_url: "https://data.alpaca.markets/v1beta1/options/snapshots".to_string(),
            stocks_quotes_url: "https://data.alpaca.markets/v2/stocks/quotes/latest".to_string(),
            feed: "indicative".to_string(),
            page_size: 1000,
            default_item_cap: 10_000,
            max_retries: 12,
            retry_delay_ms: 5_000,
            page_spacing_ms: 1_000,
            operation_timeout_ms: 5 * 60 * 1_000,
            request_timeout_ms: 30_000,
            endpoint_mode: EndpointMode::Contracts,
        }
    }
}

impl FetchConfig {
    /// Load a JSON config file; missing keys keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| FetchError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.page_size == 0 {
            return Err(FetchError::Config("page_size must be positive".into()));
        }
        if self.default_item_cap == 0 {
            return Err(FetchError::Config("default_item_cap must be positive".into()));
        }
        if self.page_spacing_ms == 0 {
            return Err(FetchError::Config("page_spacing_ms must be positive".into()));
        }
        Ok(())
    }

    /// Resolve a caller-supplied cap; zero or negative means "default".
    pub fn effective_cap(&self, requested: i64) -> usize {
        if requested <= 0 {
            self.default_item_cap
        } else {
            requested as usize
        }
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    pub fn page_spacing(&self) -> Duration {
        Duration::from_millis(self.page_spacing_ms)
    }

    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// API key pair sent with every request.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Credentials {
    #[serde(rename = "api_key_id")]
    pub key_id: String,
    #[serde(rename = "api_secret_key")]
    pub secret_key: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("key_id", &self.key_id)
            .field("secret_key", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    pub fn new(key_id: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            key_id: key_id.into(),
            secret_key: secret_key.into(),
        }
    }

    /// Both halves of the pair are set.
    pub fn is_complete(&self) -> bool {
        !self.key_id.is_empty() && !self.secret_key.is_empty()
    }

    pub fn from_env() -> Option<Self> {
        let key_id = std::env::var(KEY_ID_ENV).ok()?;
        let secret_key = std::env::var(SECRET_KEY_ENV).ok()?;
        let credentials = Self::new(key_id, secret_key);
        credentials.is_complete().then_some(credentials)
    }

    /// Read `{"api_key_id": ..., "api_secret_key": ...}` from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let credentials: Self = serde_json::from_str(&content)
            .map_err(|e| FetchError::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        if !credentials.is_complete() {
            return Err(FetchError::CredentialsMissing);
        }
        Ok(credentials)
    }

    /// Environment first, then the credentials file.
    pub fn resolve(path: impl AsRef<Path>) -> Result<Self> {
        if let Some(credentials) = Self::from_env() {
            return Ok(credentials);
        }
        warn!(
            "{} or {} not set, trying {}",
            KEY_ID_ENV,
            SECRET_KEY_ENV,
            path.as_ref().display()
        );
        Self::from_file(path).map_err(|e| match e {
            FetchError::Io(_) => FetchError::CredentialsMissing,
            other => other,
        })
    }
}
