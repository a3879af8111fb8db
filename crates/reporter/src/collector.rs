//! Collector seam and its HTTP implementation

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use steptrace_common::Test;
use tracing::debug;

use crate::config::ReporterConfig;
use crate::error::{ReportError, ReportResult};

/// Run-level record delivered next to the tests
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// One reconstructed test addressed to a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestSubmission {
    pub run_id: String,
    pub test: Test,
}

/// A unit of delivery to the collector
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Submission {
    Test(TestSubmission),
    Run(RunMetadata),
}

impl Submission {
    pub fn test(run_id: &str, test: Test) -> Self {
        Submission::Test(TestSubmission {
            run_id: run_id.to_string(),
            test,
        })
    }

    pub fn run_id(&self) -> &str {
        match self {
            Submission::Test(submission) => &submission.run_id,
            Submission::Run(metadata) => &metadata.run_id,
        }
    }

    /// Path relative to the collector base URL
    pub fn path(&self) -> String {
        match self {
            Submission::Test(submission) => format!("runs/{}/tests", submission.run_id),
            Submission::Run(metadata) => format!("runs/{}", metadata.run_id),
        }
    }
}

/// Receives submissions. Any error is treated as transient and retried by
/// the dispatcher.
#[async_trait]
pub trait Collector: Send + Sync {
    async fn submit(&self, submission: &Submission) -> ReportResult<()>;
}

/// Collector reached over HTTP
#[derive(Debug, Clone)]
pub struct HttpCollector {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpCollector {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> ReportResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
        })
    }

    /// Bearer token passed through on every request
    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn from_config(config: &ReporterConfig) -> ReportResult<Self> {
        Ok(Self::new(&config.collector_url, config.request_timeout())?
            .with_api_key(config.api_key.clone()))
    }

    pub fn endpoint(&self, submission: &Submission) -> String {
        format!("{}/{}", self.base_url, submission.path())
    }
}

#[async_trait]
impl Collector for HttpCollector {
    async fn submit(&self, submission: &Submission) -> ReportResult<()> {
        let url = self.endpoint(submission);

        let mut request = self.client.post(&url).json(submission);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status.is_success() {
            debug!(%url, %status, "Submission accepted");
            return Ok(());
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(err) => {
                debug!(%url, %status, error = %err, "Failed to read collector response body");
                String::new()
            }
        };
        Err(ReportError::CollectorStatus {
            status: status.as_u16(),
            body,
        })
    }
}
