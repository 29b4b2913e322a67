//! Upstream catalog sources.
//!
//! This module defines the [`CatalogSource`] trait: the opaque upstream
//! collaborator that turns an [`UpstreamRequest`] into a raw XML payload.
//! [`ExploreCoursesSource`] talks to the public ExploreCourses endpoint;
//! [`MockSource`] is an in-process stand-in with call counters, scripted
//! failures and artificial latency.
//!
//! Sources do no retrying, rate limiting or caching; those belong to the
//! [`CatalogClient`](crate::catalog::CatalogClient) wrapping them.

mod explorecourses;
pub mod mock;

pub use explorecourses::{ExploreCoursesSource, EXPLORECOURSES_BASE_URL};
pub use mock::MockSource;

use std::time::Duration;

use async_trait::async_trait;

use crate::models::AcademicYear;
use crate::utils::Transient;

/// XML view requested from ExploreCourses
pub const XML_VIEW: &str = "xml-20200810";

/// A request against the upstream catalog
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum UpstreamRequest {
    /// Course search for an academic year
    Courses {
        academic_year: AcademicYear,
        search: String,
        /// Filter parameters, each sent with value "on"
        filters: Vec<&'static str>,
    },
    /// The school/department listing for an academic year
    Schools { academic_year: AcademicYear },
}

impl UpstreamRequest {
    /// Path relative to the catalog base URL
    pub fn path(&self) -> &'static str {
        match self {
            UpstreamRequest::Courses { .. } => "search",
            UpstreamRequest::Schools { .. } => "",
        }
    }

    /// Query string parameters in request order
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        match self {
            UpstreamRequest::Courses {
                academic_year,
                search,
                filters,
            } => {
                let mut pairs = vec![
                    ("view", XML_VIEW.to_string()),
                    ("academicYear", academic_year.upstream_param()),
                    ("q", search.clone()),
                    ("filter-coursestatus-Active", "on".to_string()),
                ];
                pairs.extend(filters.iter().map(|param| (*param, "on".to_string())));
                pairs
            }
            UpstreamRequest::Schools { academic_year } => vec![
                ("view", XML_VIEW.to_string()),
                ("academicYear", academic_year.upstream_param()),
            ],
        }
    }
}

/// The upstream course catalog.
///
/// Implementations return the raw payload for a request, or an error
/// classified well enough for the caller to decide whether to retry.
#[async_trait]
pub trait CatalogSource: Send + Sync + std::fmt::Debug {
    /// Unique identifier for this source
    fn id(&self) -> &str;

    /// Human-readable name of this source
    fn name(&self) -> &str;

    /// Perform one request against the upstream catalog
    async fn raw_query(&self, request: &UpstreamRequest) -> Result<String, SourceError>;
}

/// Errors that can occur when talking to a catalog source
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SourceError {
    /// Connection-level failure
    #[error("Network error: {0}")]
    Network(String),

    /// The request did not complete in time
    #[error("Request timed out")]
    Timeout,

    /// Upstream answered with a 5xx status
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// Upstream answered 429
    #[error("Upstream rate limit exceeded")]
    RateLimit { retry_after: Option<Duration> },

    /// The requested entity does not exist upstream
    #[error("Not found: {0}")]
    NotFound(String),

    /// Upstream rejected the request (other 4xx)
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The payload could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Other error
    #[error("Error: {0}")]
    Other(String),
}

impl Transient for SourceError {
    fn is_transient(&self) -> bool {
        matches!(
            self,
            SourceError::Network(_)
                | SourceError::Timeout
                | SourceError::Server { .. }
                | SourceError::RateLimit { .. }
        )
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            SourceError::RateLimit { retry_after } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Network(err.to_string())
        }
    }
}

impl From<quick_xml::DeError> for SourceError {
    fn from(err: quick_xml::DeError) -> Self {
        SourceError::Parse(format!("XML: {}", err))
    }
}

impl From<url::ParseError> for SourceError {
    fn from(err: url::ParseError) -> Self {
        SourceError::Other(format!("invalid URL: {}", err))
    }
}
