//! Configuration management.
//!
//! Settings are layered: built-in defaults, then a TOML file, then
//! `STANFORD_MCP__SECTION__KEY` environment variables. Command-line flags
//! are applied by the binary on top of the loaded [`Config`].

mod file_config;

pub use file_config::{default_config_path, find_config_file, ConfigFileError};

use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::path::Path;
use std::time::Duration;

use crate::models::{AcademicYear, QueryError};
use crate::sources::EXPLORECOURSES_BASE_URL;
use crate::utils::{RetryPolicy, DEFAULT_USER_AGENT};

/// Prefix of environment overrides, e.g. `STANFORD_MCP__SERVER__PORT`
pub const ENV_PREFIX: &str = "STANFORD_MCP";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    #[serde(default)]
    pub catalog: CatalogConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetryConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub session: SessionConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// HTTP transport settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Bearer token required on `/mcp` when set
    #[serde(default)]
    pub auth_token: Option<String>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_token: None,
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8000
}

/// Upstream catalog settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Academic year used when a term names only a quarter
    #[serde(default = "default_academic_year")]
    pub academic_year: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            academic_year: default_academic_year(),
            request_timeout_secs: default_request_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

impl CatalogConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn academic_year(&self) -> Result<AcademicYear, QueryError> {
        self.academic_year.parse()
    }
}

fn default_base_url() -> String {
    EXPLORECOURSES_BASE_URL.to_string()
}

fn default_academic_year() -> String {
    "2025-2026".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_user_agent() -> String {
    DEFAULT_USER_AGENT.to_string()
}

/// Process-wide upstream request budget
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_rps")]
    pub requests_per_second: f64,

    #[serde(default = "default_burst")]
    pub burst: u32,

    /// How long an over-budget request may wait for a token
    #[serde(default = "default_max_wait")]
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rps(),
            burst: default_burst(),
            max_wait_ms: default_max_wait(),
        }
    }
}

impl RateLimitConfig {
    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }
}

fn default_rps() -> f64 {
    5.0
}

fn default_burst() -> u32 {
    5
}

fn default_max_wait() -> u64 {
    10_000
}

/// Retry settings for transient upstream failures
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    #[serde(default = "default_multiplier")]
    pub backoff_multiplier: f64,

    /// Fraction of each delay randomized, 0.0..=1.0
    #[serde(default = "default_jitter")]
    pub jitter: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_multiplier(),
            jitter: default_jitter(),
        }
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        RetryPolicy {
            max_attempts: config.max_attempts.max(1),
            initial_delay: Duration::from_millis(config.initial_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            backoff_multiplier: config.backoff_multiplier,
            jitter: config.jitter.clamp(0.0, 1.0),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_delay() -> u64 {
    250
}

fn default_max_delay() -> u64 {
    5_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

/// Response cache settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_ttl")]
    pub ttl_secs: u64,

    #[serde(default = "default_max_entries")]
    pub max_entries: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            ttl_secs: default_ttl(),
            max_entries: default_max_entries(),
        }
    }
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }

    pub fn capacity(&self) -> NonZeroUsize {
        NonZeroUsize::new(self.max_entries).unwrap_or(NonZeroUsize::MIN)
    }
}

fn default_ttl() -> u64 {
    600 // 10 minutes
}

fn default_max_entries() -> usize {
    1024
}

/// Session lifecycle settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Idle HTTP sessions are closed after this long
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,

    #[serde(default = "default_reap_interval")]
    pub reap_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_idle_timeout(),
            reap_interval_secs: default_reap_interval(),
        }
    }
}

impl SessionConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn reap_interval(&self) -> Duration {
        Duration::from_secs(self.reap_interval_secs.max(1))
    }
}

fn default_idle_timeout() -> u64 {
    1800
}

fn default_reap_interval() -> u64 {
    60
}

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Reject settings that would make the server misbehave at runtime
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        let invalid = |msg: String| Err(config::ConfigError::Message(msg));

        if let Err(e) = self.catalog.academic_year() {
            return invalid(format!("catalog.academic_year: {}", e));
        }
        if let Err(e) = url::Url::parse(&self.catalog.base_url) {
            return invalid(format!("catalog.base_url: {}", e));
        }
        if crate::catalog::refill_period(self.rate_limit.requests_per_second).is_none() {
            return invalid(format!(
                "rate_limit.requests_per_second must be positive and at most 1e9, got {}",
                self.rate_limit.requests_per_second
            ));
        }
        if self.rate_limit.burst == 0 {
            return invalid("rate_limit.burst must be at least 1".to_string());
        }
        if self.retry.max_attempts == 0 {
            return invalid("retry.max_attempts must be at least 1".to_string());
        }
        if self.cache.max_entries == 0 {
            return invalid("cache.max_entries must be at least 1".to_string());
        }
        if self.catalog.request_timeout_secs == 0 {
            return invalid("catalog.request_timeout_secs must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Load configuration: defaults, then `path` (or a discovered file), then the environment
pub fn load_config(path: Option<&Path>) -> Result<Config, config::ConfigError> {
    load_with_env(path, environment())
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("__")
        .separator("__")
        .try_parsing(true)
}

fn load_with_env(
    path: Option<&Path>,
    env: config::Environment,
) -> Result<Config, config::ConfigError> {
    let mut builder =
        config::Config::builder().add_source(config::Config::try_from(&Config::default())?);

    match path {
        Some(path) => {
            builder = builder.add_source(config::File::from(path));
        }
        None => {
            if let Some(found) = find_config_file() {
                tracing::debug!(path = %found.display(), "Using discovered config file");
                builder = builder.add_source(config::File::from(found.as_path()));
            }
        }
    }

    let config: Config = builder.add_source(env).build()?.try_deserialize()?;
    config.validate()?;
    Ok(config)
}

/// Get the default configuration
pub fn get_config() -> Config {
    Config::default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn no_env() -> config::Environment {
        environment().source(Some(HashMap::new()))
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.server.port, 8000);
        assert_eq!(config.rate_limit.requests_per_second, 5.0);
        assert_eq!(config.cache.ttl(), Duration::from_secs(600));
        assert_eq!(config.catalog.academic_year().unwrap(), AcademicYear::new(2025));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[server]
port = 9100

[rate_limit]
requests_per_second = 2.5

[cache]
ttl_secs = 60
"#,
        )
        .unwrap();

        let config = load_with_env(Some(&path), no_env()).unwrap();
        assert_eq!(config.server.port, 9100);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.rate_limit.requests_per_second, 2.5);
        assert_eq!(config.rate_limit.burst, 5);
        assert_eq!(config.cache.ttl(), Duration::from_secs(60));
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[server]\nport = 9100\n").unwrap();

        let env = environment().source(Some(HashMap::from([
            ("STANFORD_MCP__SERVER__PORT".to_string(), "9200".to_string()),
            ("STANFORD_MCP__LOGGING__FORMAT".to_string(), "json".to_string()),
        ])));
        let config = load_with_env(Some(&path), env).unwrap();
        assert_eq!(config.server.port, 9200);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[catalog]\nacademic_year = \"last year\"\n").unwrap();
        assert!(load_with_env(Some(&path), no_env()).is_err());

        std::fs::write(&path, "[rate_limit]\nburst = 0\n").unwrap();
        assert!(load_with_env(Some(&path), no_env()).is_err());
        std::fs::write(&path, "[rate_limit]\nrequests_per_second = 0.0\n").unwrap();
        assert!(load_with_env(Some(&path), no_env()).is_err());
    }

    #[test]
    fn test_request_rate_too_fast_for_limiter_rejected() {
        let mut config = Config::default();
        config.rate_limit.requests_per_second = 5e9;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("requests_per_second"));

        config.rate_limit.requests_per_second = 1e9;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_file_is_error() {
        let path = Path::new("/nonexistent/stanford-mcp.toml");
        assert!(load_with_env(Some(path), no_env()).is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let policy = RetryPolicy::from(&RetryConfig {
            max_attempts: 0,
            jitter: 4.0,
            ..Default::default()
        });
        assert_eq!(policy.max_attempts, 1);
        assert_eq!(policy.jitter, 1.0);
        assert_eq!(policy.initial_delay, Duration::from_millis(250));
    }
}
