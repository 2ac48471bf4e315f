//! Run configuration and line-list inputs.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::proxy::Proxy;
use crate::{DorkError, Result};

/// Retry and backoff settings applied to every dork.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Base of the exponential backoff, in seconds.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_factor() -> f64 {
    1.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            backoff_factor: default_backoff_factor(),
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given retry count and backoff base.
    pub fn new(max_retries: u32, backoff_factor: f64) -> Self {
        Self {
            max_retries,
            backoff_factor,
        }
    }

    /// Total attempts on the base proxy path, initial one included.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Sleep inserted before the `retry`-th retry (1-based): `factor * 2^(retry-1)`.
    pub fn backoff_before_retry(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let exponent = (retry - 1).min(62) as i32;
        let secs = self.backoff_factor.max(0.0) * 2f64.powi(exponent);
        Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
    }
}

/// Immutable configuration for one run, shared read-only by every worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Log raw results at debug level.
    #[serde(default)]
    pub verbose: bool,
    /// Number of dorks searched concurrently.
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Maximum links kept per dork.
    #[serde(default = "default_num_results")]
    pub num_results: usize,
    /// Maximum paid-gateway attempts per dork.
    #[serde(default)]
    pub max_paid: u32,
    /// Credential for the paid gateway.
    #[serde(default)]
    pub paid_api_key: Option<String>,
    #[serde(default = "default_dorks_file")]
    pub dorks_file: PathBuf,
    #[serde(default = "default_user_agents_file")]
    pub user_agents_file: PathBuf,
    /// Persisted proxy cache; written on first download.
    #[serde(default = "default_proxies_file")]
    pub proxies_file: PathBuf,
    /// Directory receiving one file per dork.
    #[serde(default = "default_results_dir")]
    pub results_dir: PathBuf,
    /// Combined dork -> URL set file.
    #[serde(default = "default_aggregate_file")]
    pub aggregate_file: PathBuf,
    /// Nominal global pacing target.
    #[serde(default = "default_requests_per_second")]
    pub requests_per_second: f64,
    /// Timeout for free-proxy requests and probes, in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    /// Timeout for paid-gateway requests, in seconds.
    #[serde(default = "default_paid_timeout")]
    pub paid_timeout: u64,
    /// Reachability target used to probe free proxies.
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    /// Concurrent probes during validation.
    #[serde(default = "default_probe_concurrency")]
    pub probe_concurrency: usize,
    /// Use loaded proxies as-is.
    #[serde(default)]
    pub skip_validation: bool,
    #[serde(default)]
    pub retry: RetryPolicy,
}

fn default_threads() -> usize {
    20
}

fn default_num_results() -> usize {
    30
}

fn default_dorks_file() -> PathBuf {
    PathBuf::from("config/dorks.txt")
}

fn default_user_agents_file() -> PathBuf {
    PathBuf::from("config/useragents.txt")
}

fn default_proxies_file() -> PathBuf {
    PathBuf::from("config/proxies.txt")
}

fn default_results_dir() -> PathBuf {
    PathBuf::from("results")
}

fn default_aggregate_file() -> PathBuf {
    PathBuf::from("all_dorks_results.json")
}

fn default_requests_per_second() -> f64 {
    100.0
}

fn default_timeout() -> u64 {
    4
}

fn default_paid_timeout() -> u64 {
    60
}

fn default_probe_url() -> String {
    "https://bing.com/".to_string()
}

fn default_probe_concurrency() -> usize {
    100
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            threads: default_threads(),
            num_results: default_num_results(),
            max_paid: 0,
            paid_api_key: None,
            dorks_file: default_dorks_file(),
            user_agents_file: default_user_agents_file(),
            proxies_file: default_proxies_file(),
            results_dir: default_results_dir(),
            aggregate_file: default_aggregate_file(),
            requests_per_second: default_requests_per_second(),
            timeout: default_timeout(),
            paid_timeout: default_paid_timeout(),
            probe_url: default_probe_url(),
            probe_concurrency: default_probe_concurrency(),
            skip_validation: false,
            retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    /// Checks the invariants the runner relies on.
    pub fn validate(&self) -> Result<()> {
        if self.threads == 0 {
            return Err(DorkError::InvalidConfig("threads must be > 0".into()));
        }
        if self.num_results == 0 {
            return Err(DorkError::InvalidConfig("num_results must be > 0".into()));
        }
        if self.probe_concurrency == 0 {
            return Err(DorkError::InvalidConfig(
                "probe_concurrency must be > 0".into(),
            ));
        }
        if !self.requests_per_second.is_finite() || self.requests_per_second <= 0.0 {
            return Err(DorkError::InvalidConfig(
                "requests_per_second must be a positive number".into(),
            ));
        }
        if !self.retry.backoff_factor.is_finite() || self.retry.backoff_factor < 0.0 {
            return Err(DorkError::InvalidConfig(
                "backoff_factor must be a non-negative number".into(),
            ));
        }
        if self.max_paid > 0 && self.paid_key().is_none() {
            return Err(DorkError::InvalidConfig(
                "max_paid > 0 requires a paid gateway API key".into(),
            ));
        }
        url::Url::parse(&self.probe_url)?;
        Ok(())
    }

    fn paid_key(&self) -> Option<&str> {
        self.paid_api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
    }

    /// The paid gateway, present only when fallback is enabled and keyed.
    pub fn paid_gateway(&self) -> Option<Proxy> {
        if self.max_paid == 0 {
            return None;
        }
        self.paid_key().map(Proxy::paid_gateway)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn paid_request_timeout(&self) -> Duration {
        Duration::from_secs(self.paid_timeout)
    }
}

/// Splits newline-separated input into trimmed, non-empty, de-duplicated entries.
///
/// First occurrence wins, so input order is preserved.
pub fn parse_lines(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter(|line| seen.insert(*line))
        .map(str::to_string)
        .collect()
}

/// Reads a newline-separated list file.
pub async fn read_lines(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let text = tokio::fs::read_to_string(path.as_ref()).await?;
    Ok(parse_lines(&text))
}
