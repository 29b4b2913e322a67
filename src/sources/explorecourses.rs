//! ExploreCourses catalog source using the public XML view.

use async_trait::async_trait;
use reqwest::header::RETRY_AFTER;
use reqwest::StatusCode;
use std::time::Duration;
use url::Url;

use crate::config::CatalogConfig;
use crate::sources::{CatalogSource, SourceError, UpstreamRequest};
use crate::utils::HttpClient;

/// Public ExploreCourses endpoint
pub const EXPLORECOURSES_BASE_URL: &str = "https://explorecourses.stanford.edu/";

/// Longest body excerpt carried into an error message
const ERROR_BODY_EXCERPT: usize = 200;

/// Stanford ExploreCourses source
#[derive(Debug, Clone)]
pub struct ExploreCoursesSource {
    client: HttpClient,
    base_url: Url,
}

impl ExploreCoursesSource {
    /// Create a source against `base_url` (a trailing slash is added if missing)
    pub fn new(base_url: &str, client: HttpClient) -> Result<Self, SourceError> {
        let mut base_url = Url::parse(base_url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self { client, base_url })
    }

    pub fn from_config(config: &CatalogConfig) -> Result<Self, SourceError> {
        let client = HttpClient::with_user_agent(&config.user_agent)?;
        Self::new(&config.base_url, client)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn build_url(&self, request: &UpstreamRequest) -> Result<Url, SourceError> {
        let mut url = self.base_url.join(request.path())?;
        url.query_pairs_mut().extend_pairs(request.query_pairs());
        Ok(url)
    }
}

#[async_trait]
impl CatalogSource for ExploreCoursesSource {
    fn id(&self) -> &str {
        "explorecourses"
    }

    fn name(&self) -> &str {
        "Stanford ExploreCourses"
    }

    async fn raw_query(&self, request: &UpstreamRequest) -> Result<String, SourceError> {
        let url = self.build_url(request)?;
        tracing::debug!(%url, "Querying ExploreCourses");

        let response = self.client.client().get(url).send().await?;
        let status = response.status();

        if status.is_success() {
            return Ok(response.text().await?);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let body = response.text().await.unwrap_or_default();
        let message: String = body.chars().take(ERROR_BODY_EXCERPT).collect();

        tracing::debug!(status = status.as_u16(), "ExploreCourses request failed");

        Err(match status {
            StatusCode::TOO_MANY_REQUESTS => SourceError::RateLimit { retry_after },
            StatusCode::NOT_FOUND => SourceError::NotFound(format!("{} ({})", request.path(), status)),
            s if s.is_server_error() => SourceError::Server {
                status: s.as_u16(),
                message,
            },
            s => SourceError::Api {
                status: s.as_u16(),
                message,
            },
        })
    }
}
