//! Utility modules supporting catalog operations.
//!
//! - [`ResponseCache`]: TTL + LRU cache with at most one in-flight fetch per key
//! - [`HttpClient`]: Shared reqwest client for upstream calls
//! - [`RetryPolicy`] / [`with_retry`]: Bounded retries with exponential backoff and jitter
//! - [`format`]: Plain-text rendering of records for tool results and the CLI
//!
//! # Retry with Backoff
//!
//! ```rust,no_run
//! use stanford_mcp::sources::SourceError;
//! use stanford_mcp::utils::{with_retry, RetryPolicy};
//!
//! # async fn fetch_data() -> Result<String, SourceError> { Ok("data".to_string()) }
//! # #[tokio::main]
//! # async fn main() -> Result<(), SourceError> {
//! let policy = RetryPolicy::default().max_attempts(3);
//! let data = with_retry(&policy, || fetch_data()).await?;
//! # Ok(())
//! # }
//! ```

mod cache;
pub mod format;
mod http;
mod retry;

pub use cache::{CacheResult, CacheStats, ResponseCache};
pub use http::{HttpClient, DEFAULT_USER_AGENT};
pub use retry::{with_retry, RetryPolicy, Transient};
