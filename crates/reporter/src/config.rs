//! Reporter configuration

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::backoff::{BackoffFn, BackoffStrategy};
use crate::dispatcher::{Dispatcher, DEFAULT_CONCURRENCY};
use crate::error::{ReportError, ReportResult};
use crate::retry::{RetryExecutor, MAX_ATTEMPTS};

/// Reporter configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReporterConfig {
    /// Base URL of the collector
    pub collector_url: String,

    /// Bearer token passed through to the collector
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Maximum submissions in flight
    pub concurrency: usize,

    /// Attempts per submission, first one included
    pub max_attempts: u32,

    /// Delay policy between attempts
    pub backoff: BackoffStrategy,

    /// Per-request timeout
    pub request_timeout_secs: u64,

    /// Directory receiving the JSON run report
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,

    /// Aggregate and write the report, but deliver nothing
    pub dry_run: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            collector_url: "http://127.0.0.1:8787".to_string(),
            api_key: None,
            concurrency: DEFAULT_CONCURRENCY,
            max_attempts: MAX_ATTEMPTS,
            backoff: BackoffStrategy::default(),
            request_timeout_secs: 30,
            output_dir: None,
            dry_run: false,
        }
    }
}

impl ReporterConfig {
    /// Load configuration from file; a missing file yields the defaults
    pub fn load(path: &Path) -> ReportResult<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> ReportResult<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn to_toml(&self) -> ReportResult<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> ReportResult<()> {
        if !(self.collector_url.starts_with("http://") || self.collector_url.starts_with("https://")) {
            return Err(ReportError::Config(format!(
                "collector_url must be an http(s) URL, got '{}'",
                self.collector_url
            )));
        }
        if self.concurrency == 0 {
            return Err(ReportError::Config("concurrency must be at least 1".to_string()));
        }
        if self.max_attempts == 0 {
            return Err(ReportError::Config("max_attempts must be at least 1".to_string()));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_executor(&self) -> RetryExecutor<BackoffFn> {
        RetryExecutor::from_strategy(self.backoff).with_max_attempts(self.max_attempts)
    }

    pub fn dispatcher(&self) -> Dispatcher<BackoffFn> {
        Dispatcher::with_retry(self.concurrency, self.retry_executor())
    }

    /// Where the report for `run_id` is written, if anywhere
    pub fn report_path(&self, run_id: &str) -> Option<PathBuf> {
        self.output_dir
            .as_ref()
            .map(|dir| dir.join(format!("steptrace-{}.json", run_id)))
    }
}
