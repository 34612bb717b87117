//! Cursor pagination over `next_page_token` listings.
//!
//! One request per page, at least `page_spacing` apart, all pages of a phase
//! sharing one deadline. The deadline is only checked while waiting for the
//! page gate, never in the middle of a request and its retries.

use std::collections::HashSet;
use std::fmt;
use std::time::Duration;

use reqwest::Url;
use serde_json::Value;
use tokio::time::{interval, sleep_until, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::sender::RequestSender;
use crate::config::FetchConfig;
use crate::error::{FetchError, Interrupted, Result};

pub const NEXT_PAGE_TOKEN: &str = "next_page_token";

/// Floor for the page gate; `tokio::time::interval` rejects a zero period.
const MIN_PAGE_SPACING: Duration = Duration::from_millis(1);

/// Which listing is being walked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Contracts,
    Snapshots,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Contracts => f.write_str("contracts"),
            Self::Snapshots => f.write_str("snapshots"),
        }
    }
}

/// Running totals reported after every page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageProgress {
    pub phase: Phase,
    pub requests: usize,
    pub items: usize,
}

/// Receives pagination progress.
pub trait ProgressSink: Send + Sync {
    fn on_page(&self, progress: PageProgress);

    fn on_finish(&self, _progress: PageProgress) {}
}

/// Progress sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn on_page(&self, progress: PageProgress) {
        debug!(
            "{} API requests made - {} {} found",
            progress.requests, progress.items, progress.phase
        );
    }
}

/// Request counters for one or more walks.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct FetchStats {
    pub requests: usize,
    pub retries: u32,
}

impl FetchStats {
    pub fn absorb(&mut self, other: FetchStats) {
        self.requests += other.requests;
        self.retries += other.retries;
    }
}

/// Items gathered by a completed walk.
#[derive(Debug, Clone)]
pub struct Walk<T> {
    pub items: Vec<T>,
    pub stats: FetchStats,
    /// The walk stopped at the item cap rather than on the last page.
    pub capped: bool,
}

/// Walks a paginated listing through a [`RequestSender`].
pub struct Paginator<'a> {
    sender: &'a RequestSender,
    progress: &'a dyn ProgressSink,
    phase: Phase,
    page_spacing: Duration,
    timeout: Duration,
}

impl<'a> Paginator<'a> {
    pub fn new(
        sender: &'a RequestSender,
        progress: &'a dyn ProgressSink,
        phase: Phase,
        config: &FetchConfig,
    ) -> Self {
        Self {
            sender,
            progress,
            phase,
            page_spacing: config.page_spacing().max(MIN_PAGE_SPACING),
            timeout: config.operation_timeout(),
        }
    }

    /// Collect keyed items across pages until the last page or `cap` items.
    ///
    /// `page_url` builds the request for a page token (empty for the first
    /// page). `extract` turns a page body into `(key, item)` pairs; items
    /// whose key was already seen on an earlier page are dropped.
    pub async fn walk<T, U, E>(
        &self,
        page_url: U,
        mut extract: E,
        cap: Option<usize>,
    ) -> std::result::Result<Walk<T>, Interrupted<T>>
    where
        U: Fn(&str) -> Result<Url>,
        E: FnMut(&Value) -> Result<Vec<(String, T)>>,
    {
        let deadline = Instant::now() + self.timeout;
        let mut gate = interval(self.page_spacing);
        gate.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut seen: HashSet<String> = HashSet::new();
        let mut items: Vec<T> = Vec::new();
        let mut stats = FetchStats::default();
        let mut token = String::new();

        loop {
            let timed_out = tokio::select! {
                biased;
                _ = sleep_until(deadline) => true,
                _ = gate.tick() => false,
            };
            if timed_out {
                let collected = items.len();
                warn!(
                    "{} pagination timed out after {:?}, fetched {} items",
                    self.phase, self.timeout, collected
                );
                return Err(
                    Interrupted::new(items, FetchError::OperationTimeout { collected })
                        .with_stats(stats),
                );
            }

            let page = match self.fetch_page(&page_url, &token, &mut extract).await {
                Ok((page, body, retries)) => {
                    stats.requests += 1;
                    stats.retries += retries;
                    (page, body)
                }
                Err(e) => return Err(Interrupted::new(items, e).with_stats(stats)),
            };
            let (entries, body) = page;

            let mut capped = false;
            for (key, item) in entries {
                if !seen.insert(key) {
                    continue;
                }
                items.push(item);
                if cap.is_some_and(|cap| items.len() >= cap) {
                    capped = true;
                    break;
                }
            }

            self.progress.on_page(PageProgress {
                phase: self.phase,
                requests: stats.requests,
                items: items.len(),
            });

            if capped {
                info!("Reached maximum number of {} ({})", self.phase, items.len());
                self.report_finish(&stats, items.len());
                return Ok(Walk {
                    items,
                    stats,
                    capped: true,
                });
            }

            match next_page_token(&body) {
                Some(next) => token = next.to_string(),
                None => break,
            }
        }

        info!(
            "Completed fetching {}: {} items in {} requests",
            self.phase,
            items.len(),
            stats.requests
        );
        self.report_finish(&stats, items.len());
        Ok(Walk {
            items,
            stats,
            capped: false,
        })
    }

    async fn fetch_page<T, U, E>(
        &self,
        page_url: &U,
        token: &str,
        extract: &mut E,
    ) -> Result<(Vec<(String, T)>, Value, u32)>
    where
        U: Fn(&str) -> Result<Url>,
        E: FnMut(&Value) -> Result<Vec<(String, T)>>,
    {
        let url = page_url(token)?;
        let sent = self.sender.send(&url).await?;
        let entries = extract(&sent.body)?;
        Ok((entries, sent.body, sent.retries))
    }

    fn report_finish(&self, stats: &FetchStats, items: usize) {
        self.progress.on_finish(PageProgress {
            phase: self.phase,
            requests: stats.requests,
            items,
        });
    }
}

/// The cursor for the next page, `None` when absent or empty.
pub fn next_page_token(body: &Value) -> Option<&str> {
    body.get(NEXT_PAGE_TOKEN)
        .and_then(Value::as_str)
        .filter(|token| !token.is_empty())
}
