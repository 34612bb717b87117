//! Alpaca HTTP client.
//!
//! Provides:
//! - The transport seam and its reqwest implementation
//! - Authenticated requests with fixed-interval retries
//! - Cursor pagination with a per-phase deadline
//! - Endpoint URL builders

pub mod endpoints;
pub mod paginate;
pub mod sender;
pub mod transport;

pub use paginate::{FetchStats, LogProgress, PageProgress, Paginator, Phase, ProgressSink, Walk};
pub use sender::{RequestSender, RetryPolicy, SentRequest};
pub use transport::{RawResponse, ReqwestTransport, Transport, TransportError};
