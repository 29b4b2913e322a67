//! Catalog access: the rate-limited, retrying client adapter and the cached
//! catalog service built on top of it.
//!
//! [`CatalogClient`] wraps a [`CatalogSource`]: every attempt first takes a
//! token from the shared [`RateLimiter`], is bounded by the request timeout,
//! and transient failures are retried with backoff. Raw payloads are
//! normalized into [`CourseRecord`]s. The client never touches the cache;
//! [`CatalogService`] owns the caches and the domain operations.

mod parse;
mod rate_limit;
mod service;

pub use parse::{parse_courses, parse_schools};
pub use rate_limit::{refill_period, RateLimiter, Throttled};
pub use service::CatalogService;

use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;

use crate::config::Config;
use crate::models::{AcademicYear, CourseRecord, Query, QueryError, School};
use crate::sources::{CatalogSource, SourceError, UpstreamRequest};
use crate::utils::{with_retry, RetryPolicy, Transient};

/// Backoff suggested to clients when upstream throttles without a Retry-After
const DEFAULT_UPSTREAM_BACKOFF: Duration = Duration::from_secs(1);

/// Errors surfaced by catalog operations
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("invalid query: {0}")]
    InvalidQuery(#[from] QueryError),

    #[error("rate limited, retry after {retry_after:?}")]
    RateLimited { retry_after: Duration },

    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {message}")]
    Upstream { message: String, retryable: bool },

    #[error("upstream request timed out")]
    Timeout,

    #[error("internal error: {0}")]
    Internal(String),
}

impl FetchError {
    /// Stable kind label exposed to clients
    pub fn kind(&self) -> &'static str {
        match self {
            FetchError::InvalidQuery(_) => "InvalidQuery",
            FetchError::RateLimited { .. } => "RateLimited",
            FetchError::NotFound(_) => "NotFound",
            FetchError::Upstream { .. } => "UpstreamError",
            FetchError::Timeout => "Timeout",
            FetchError::Internal(_) => "InternalError",
        }
    }

    /// Whether the same call may succeed later
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::RateLimited { .. } | FetchError::Timeout => true,
            FetchError::Upstream { retryable, .. } => *retryable,
            _ => false,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            FetchError::RateLimited { retry_after } => Some(*retry_after),
            _ => None,
        }
    }
}

impl From<SourceError> for FetchError {
    fn from(err: SourceError) -> Self {
        match err {
            SourceError::Timeout => FetchError::Timeout,
            SourceError::RateLimit { retry_after } => FetchError::RateLimited {
                retry_after: retry_after.unwrap_or(DEFAULT_UPSTREAM_BACKOFF),
            },
            SourceError::NotFound(what) => FetchError::NotFound(what),
            SourceError::Network(_) | SourceError::Server { .. } => FetchError::Upstream {
                message: err.to_string(),
                retryable: true,
            },
            SourceError::Api { .. } | SourceError::Parse(_) | SourceError::Other(_) => {
                FetchError::Upstream {
                    message: err.to_string(),
                    retryable: false,
                }
            }
        }
    }
}

impl From<JoinError> for FetchError {
    fn from(err: JoinError) -> Self {
        FetchError::Internal(format!("fetch task failed: {}", err))
    }
}

/// Outcome of a single upstream attempt
#[derive(Debug)]
enum AttemptError {
    Throttled(Throttled),
    Source(SourceError),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Throttled(t) => t.fmt(f),
            AttemptError::Source(e) => e.fmt(f),
        }
    }
}

impl Transient for AttemptError {
    fn is_transient(&self) -> bool {
        match self {
            // the limiter already waited its full budget
            AttemptError::Throttled(_) => false,
            AttemptError::Source(e) => e.is_transient(),
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            AttemptError::Throttled(_) => None,
            AttemptError::Source(e) => e.retry_after(),
        }
    }
}

impl From<AttemptError> for FetchError {
    fn from(err: AttemptError) -> Self {
        match err {
            AttemptError::Throttled(t) => FetchError::RateLimited {
                retry_after: t.retry_after,
            },
            AttemptError::Source(e) => e.into(),
        }
    }
}

/// Rate-limited, retrying adapter over a [`CatalogSource`]
#[derive(Debug, Clone)]
pub struct CatalogClient {
    source: Arc<dyn CatalogSource>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
    request_timeout: Duration,
}

impl CatalogClient {
    pub fn new(
        source: Arc<dyn CatalogSource>,
        limiter: Arc<RateLimiter>,
        retry: RetryPolicy,
        request_timeout: Duration,
    ) -> Self {
        Self {
            source,
            limiter,
            retry,
            request_timeout,
        }
    }

    pub fn from_config(source: Arc<dyn CatalogSource>, config: &Config) -> Self {
        Self::new(
            source,
            Arc::new(RateLimiter::from_config(&config.rate_limit)),
            RetryPolicy::from(&config.retry),
            config.catalog.request_timeout(),
        )
    }

    pub fn source(&self) -> &dyn CatalogSource {
        self.source.as_ref()
    }

    /// Fetch and normalize the courses matching `query`, in upstream order
    pub async fn fetch(&self, query: &Query) -> Result<Vec<CourseRecord>, FetchError> {
        let request = UpstreamRequest::Courses {
            academic_year: query.term().year,
            search: query.search_text(),
            filters: query.filters().map(|f| f.param()).collect(),
        };

        let payload = self.execute(&request).await?;
        let courses = parse_courses(&payload, &query.term())?;

        let matching: Vec<CourseRecord> = courses.into_iter().filter(|c| query.matches(c)).collect();
        tracing::debug!(%query, results = matching.len(), "Fetched courses");
        Ok(matching)
    }

    /// Fetch the school and department listing for an academic year
    pub async fn fetch_schools(&self, academic_year: AcademicYear) -> Result<Vec<School>, FetchError> {
        let payload = self
            .execute(&UpstreamRequest::Schools { academic_year })
            .await?;
        let schools = parse_schools(&payload)?;
        tracing::debug!(%academic_year, schools = schools.len(), "Fetched schools");
        Ok(schools)
    }

    async fn execute(&self, request: &UpstreamRequest) -> Result<String, FetchError> {
        let outcome = with_retry(&self.retry, || async move {
            self.limiter.acquire().await.map_err(AttemptError::Throttled)?;

            match tokio::time::timeout(self.request_timeout, self.source.raw_query(request)).await {
                Ok(result) => result.map_err(AttemptError::Source),
                Err(_) => {
                    tracing::debug!(timeout = ?self.request_timeout, "Upstream attempt timed out");
                    Err(AttemptError::Source(SourceError::Timeout))
                }
            }
        })
        .await;

        outcome.map_err(FetchError::from)
    }
}
