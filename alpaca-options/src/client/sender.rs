//! Authenticated GET with fixed-interval retries.
//!
//! Transport failures and non-200 statuses are resent after a fixed delay,
//! up to `max_retries` resends. A 200 must carry a non-empty JSON body with
//! no `message` field; the data API reports some failures that way.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::transport::Transport;
use crate::config::{Credentials, FetchConfig};
use crate::error::{FetchError, Result};

pub const HEADER_ACCEPT: &str = "accept";
pub const HEADER_KEY_ID: &str = "APCA-API-KEY-ID";
pub const HEADER_SECRET_KEY: &str = "APCA-API-SECRET-KEY";

/// Fixed-delay retry policy; no backoff growth, no jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }

    pub fn from_config(config: &FetchConfig) -> Self {
        Self::new(config.max_retries, config.retry_delay())
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&FetchConfig::default())
    }
}

/// A validated response body and the resends it took to get it.
#[derive(Debug, Clone)]
pub struct SentRequest {
    pub body: Value,
    pub retries: u32,
}

/// Sends authenticated requests through a [`Transport`].
pub struct RequestSender {
    transport: Arc<dyn Transport>,
    credentials: Credentials,
    policy: RetryPolicy,
}

impl RequestSender {
    pub fn new(transport: Arc<dyn Transport>, credentials: Credentials, policy: RetryPolicy) -> Self {
        Self {
            transport,
            credentials,
            policy,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credentials.is_complete()
    }

    /// GET `url`, retrying on transport errors and non-200 statuses.
    pub async fn send(&self, url: &Url) -> Result<SentRequest> {
        if !self.has_credentials() {
            return Err(FetchError::CredentialsMissing);
        }

        let headers = [
            (HEADER_ACCEPT, "application/json"),
            (HEADER_KEY_ID, self.credentials.key_id.as_str()),
            (HEADER_SECRET_KEY, self.credentials.secret_key.as_str()),
        ];

        let mut retries = 0;
        let response = loop {
            let last_status = match self.transport.get(url, &headers).await {
                Ok(response) if response.is_ok() => break response,
                Ok(response) => {
                    warn!(
                        "Received status code {} from {}, waiting {:?} and retrying ({}): {}",
                        response.status,
                        url.path(),
                        self.policy.delay,
                        retries + 1,
                        response.body_text()
                    );
                    Some(response.status)
                }
                Err(e) => {
                    warn!(
                        "Request to {} failed ({}), waiting {:?} and retrying ({})",
                        url.path(),
                        e,
                        self.policy.delay,
                        retries + 1
                    );
                    None
                }
            };

            if retries >= self.policy.max_retries {
                return Err(FetchError::MaxRetriesExceeded {
                    retries,
                    last_status,
                });
            }
            retries += 1;
            sleep(self.policy.delay).await;
        };

        debug!(
            "GET {} -> {} ({} bytes, {} retries)",
            url.path(),
            response.status,
            response.body.len(),
            retries
        );

        let body = parse_body(&response.body)?;
        Ok(SentRequest { body, retries })
    }
}

/// Validate a 200 body: non-empty, JSON, and not an API error message.
pub fn parse_body(body: &[u8]) -> Result<Value> {
    if body.is_empty() {
        return Err(FetchError::EmptyResponse);
    }
    let value: Value = serde_json::from_slice(body)?;
    if let Some(message) = value.get("message").and_then(Value::as_str) {
        if !message.is_empty() {
            return Err(FetchError::Api {
                message: message.to_string(),
            });
        }
    }
    Ok(value)
}
