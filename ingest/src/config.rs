use serde::Deserialize;
use std::time::Duration;
use store::config::Environment;
use thiserror::Error;

#[derive(Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Concurrency cannot be 0")]
    InvalidConcurrency,

    #[error("Upstream timeout cannot be 0")]
    InvalidTimeout,

    #[error("Schedule interval for {0} cannot be 0")]
    InvalidInterval(&'static str),
}

/// Where the ingestors fetch from and how hard they hit it.
#[derive(Clone, Debug, Deserialize, PartialEq)]
pub struct UpstreamConfig {
    /// Registry package API. Scores are read from `{score_url}/{package}/score`.
    #[serde(default = "default_score_url")]
    pub score_url: String,
    /// Repositories are read from `{github_url}/repos/{owner}/{repo}`.
    #[serde(default = "default_github_url")]
    pub github_url: String,
    /// Falls back to `GITHUB_TOKEN` from the environment.
    pub github_token: Option<String>,
    /// Per-fetch timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Maximum fetches in flight per run.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl UpstreamConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.concurrency == 0 {
            return Err(ValidationError::InvalidConcurrency);
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn resolve_github_token(&self, env: &dyn Environment) -> Option<String> {
        self.github_token
            .clone()
            .or_else(|| env.var("GITHUB_TOKEN"))
            .filter(|token| !token.is_empty())
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        UpstreamConfig {
            score_url: default_score_url(),
            github_url: default_github_url(),
            github_token: None,
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
        }
    }
}

/// Intervals at which `serve` runs the ingestors in the background. An absent
/// interval leaves that ingestor to an external trigger.
#[derive(Clone, Debug, Default, Deserialize, PartialEq)]
pub struct ScheduleConfig {
    pub score_interval_secs: Option<u64>,
    pub stats_interval_secs: Option<u64>,
}

impl ScheduleConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.score_interval_secs == Some(0) {
            return Err(ValidationError::InvalidInterval("scores"));
        }
        if self.stats_interval_secs == Some(0) {
            return Err(ValidationError::InvalidInterval("stats"));
        }
        Ok(())
    }
}

fn default_score_url() -> String {
    "https://pub.dev/api/packages".into()
}

fn default_github_url() -> String {
    "https://api.github.com".into()
}

fn default_timeout_secs() -> u64 {
    10
}

fn default_concurrency() -> usize {
    4
}
