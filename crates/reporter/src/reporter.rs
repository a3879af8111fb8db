//! Suite lifecycle reporter
//!
//! Holds the state of one run between the host runner's lifecycle callbacks.
//! Events are buffered per finished test and only aggregated once the suite
//! ends, at which point the reconstructed tests and the run metadata are
//! shipped through the dispatcher. `on_suite_end` consumes the reporter, so
//! an instance serves exactly one run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use steptrace_common::{ErrorInfo, EventKind, RawEvent, Test, TestResult, Timestamp};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::collector::{Collector, RunMetadata, Submission};
use crate::config::ReporterConfig;
use crate::error::{ReportError, ReportResult};

/// Identifies a test the host runner is about to execute
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestIdContext {
    pub path: Vec<String>,
    /// 1-based runner retry attempt
    #[serde(default = "first_attempt")]
    pub attempt: u32,
}

fn first_attempt() -> u32 {
    1
}

impl TestIdContext {
    pub fn new(path: &[&str]) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            attempt: 1,
        }
    }
}

/// A finished test: its raw events and the outcome decided by the runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestResultRecord {
    pub path: Vec<String>,
    pub result: TestResult,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
    #[serde(default)]
    pub events: Vec<RawEvent>,
}

impl TestResultRecord {
    pub fn new(path: &[&str], result: TestResult, events: Vec<RawEvent>) -> Self {
        Self {
            path: path.iter().map(|s| s.to_string()).collect(),
            result,
            error: None,
            events,
        }
    }

    pub fn with_error(mut self, error: ErrorInfo) -> Self {
        self.error = Some(error);
        self
    }

    /// Add `test:start`/`test:end` at the edges of the recorded events when
    /// the runner did not emit them
    fn ensure_boundaries(&mut self) {
        let has = |kind: &EventKind| {
            self.events
                .iter()
                .any(|event| event.test_path == self.path && event.kind == *kind)
        };
        let needs_start = !has(&EventKind::TestStart);
        let needs_end = !has(&EventKind::TestEnd);

        if !needs_start && !needs_end {
            return;
        }

        let now = || Timestamp::from_millis(Utc::now().timestamp_millis() as f64);
        let earliest = self.events.iter().map(|e| e.timestamp).min().unwrap_or_else(now);
        let latest = self.events.iter().map(|e| e.timestamp).max().unwrap_or(earliest);

        debug!(
            test = %self.path.join(" > "),
            needs_start,
            needs_end,
            "Synthesising test boundaries"
        );

        if needs_start {
            self.events.push(RawEvent {
                timestamp: earliest,
                test_path: self.path.clone(),
                kind: EventKind::TestStart,
            });
        }
        if needs_end {
            self.events.push(RawEvent {
                timestamp: latest,
                test_path: self.path.clone(),
                kind: EventKind::TestEnd,
            });
        }
    }
}

/// Outcome of a completed run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    /// Submissions accepted by the collector; zero on a dry run
    pub delivered: usize,
}

/// Report written to the output directory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run: RunMetadata,
    pub tests: Vec<Test>,
}

struct Outcome {
    result: TestResult,
    error: Option<ErrorInfo>,
}

/// State holder for a single run
pub struct SuiteReporter<C> {
    config: ReporterConfig,
    collector: C,
    run_id: String,
    started_at: Option<DateTime<Utc>>,
    running: HashMap<Vec<String>, TestIdContext>,
    events: Vec<RawEvent>,
    outcomes: HashMap<Vec<String>, Outcome>,
}

impl<C: Collector> SuiteReporter<C> {
    pub fn new(config: ReporterConfig, collector: C) -> Self {
        Self {
            config,
            collector,
            run_id: Uuid::new_v4().to_string(),
            started_at: None,
            running: HashMap::new(),
            events: Vec::new(),
            outcomes: HashMap::new(),
        }
    }

    pub fn with_run_id(mut self, run_id: impl Into<String>) -> Self {
        self.run_id = run_id.into();
        self
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    fn ensure_started(&self, operation: &str) -> ReportResult<()> {
        if self.started_at.is_none() {
            return Err(ReportError::Lifecycle(format!(
                "{} called before the suite began",
                operation
            )));
        }
        Ok(())
    }

    pub fn on_suite_begin(&mut self) -> ReportResult<()> {
        if self.started_at.is_some() {
            return Err(ReportError::Lifecycle("suite already began".to_string()));
        }
        self.started_at = Some(Utc::now());
        info!(run_id = %self.run_id, "Suite started");
        Ok(())
    }

    pub fn on_test_begin(&mut self, context: TestIdContext) -> ReportResult<()> {
        self.ensure_started("on_test_begin")?;

        if self.running.contains_key(&context.path) {
            return Err(ReportError::Lifecycle(format!(
                "test '{}' began twice without ending",
                context.path.join(" > ")
            )));
        }

        debug!(test = %context.path.join(" > "), attempt = context.attempt, "Test started");
        self.running.insert(context.path.clone(), context);
        Ok(())
    }

    pub fn on_test_end(&mut self, mut record: TestResultRecord) -> ReportResult<()> {
        self.ensure_started("on_test_end")?;

        let context = self.running.remove(&record.path).ok_or_else(|| {
            ReportError::Lifecycle(format!(
                "test '{}' ended but was never begun",
                record.path.join(" > ")
            ))
        })?;

        debug!(
            test = %record.path.join(" > "),
            attempt = context.attempt,
            result = %record.result,
            events = record.events.len(),
            "Test finished"
        );

        record.ensure_boundaries();
        self.events.append(&mut record.events);
        // Later attempts of the same test replace earlier outcomes
        self.outcomes.insert(
            record.path,
            Outcome {
                result: record.result,
                error: record.error,
            },
        );
        Ok(())
    }

    /// Aggregate, write the report and deliver everything to the collector
    pub async fn on_suite_end(self) -> ReportResult<RunSummary> {
        self.ensure_started("on_suite_end")?;
        let started_at = self.started_at.unwrap_or_else(Utc::now);

        if !self.running.is_empty() {
            warn!(
                unfinished = self.running.len(),
                "Suite ended with tests still running; their events are lost"
            );
        }

        let mut tests = aggregate(self.events)?;
        for test in &mut tests {
            match self.outcomes.get(&test.path) {
                Some(outcome) => {
                    test.result = outcome.result;
                    test.error = outcome.error.clone();
                }
                None => test.result = TestResult::Unknown,
            }
        }

        let count = |result: TestResult| tests.iter().filter(|t| t.result == result).count();
        let metadata = RunMetadata {
            run_id: self.run_id.clone(),
            started_at,
            finished_at: Utc::now(),
            total: tests.len(),
            passed: count(TestResult::Passed),
            failed: count(TestResult::Failed),
            skipped: count(TestResult::Skipped),
        };

        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            total: metadata.total,
            passed: metadata.passed,
            failed: metadata.failed,
            skipped: metadata.skipped,
            delivered: 0,
        };

        let report = RunReport {
            run: metadata,
            tests,
        };

        if let Some(path) = self.config.report_path(&self.run_id) {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
            info!(path = %path.display(), "Wrote run report");
        }

        if self.config.dry_run {
            info!(run_id = %self.run_id, tests = summary.total, "Dry run; skipping delivery");
            return Ok(summary);
        }

        let submissions: Vec<Submission> = report
            .tests
            .into_iter()
            .map(|test| Submission::test(&self.run_id, test))
            .chain(std::iter::once(Submission::Run(report.run)))
            .collect();

        let collector = &self.collector;
        let delivered = self
            .config
            .dispatcher()
            .run_all(
                submissions
                    .iter()
                    .map(|submission| move || collector.submit(submission)),
            )
            .await?;

        summary.delivered = delivered.len();
        info!(
            run_id = %summary.run_id,
            tests = summary.total,
            passed = summary.passed,
            failed = summary.failed,
            delivered = summary.delivered,
            "Run delivered"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use steptrace_common::{CommandInfo, StepPayload};

    #[test]
    fn test_boundaries_are_synthesised_at_event_edges() {
        let mut record = TestResultRecord::new(
            &["suite", "case"],
            TestResult::Passed,
            vec![
                RawEvent::step_end(
                    40,
                    &["suite", "case"],
                    StepPayload::new(CommandInfo::new("a", "get")),
                ),
                RawEvent::step_start(
                    10,
                    &["suite", "case"],
                    StepPayload::new(CommandInfo::new("a", "get")),
                ),
            ],
        );

        record.ensure_boundaries();

        let start = record.events.iter().find(|e| e.kind == EventKind::TestStart).unwrap();
        let end = record.events.iter().find(|e| e.kind == EventKind::TestEnd).unwrap();
        assert_eq!(start.timestamp.as_millis(), 10.0);
        assert_eq!(end.timestamp.as_millis(), 40.0);
    }

    #[test]
    fn test_existing_boundaries_are_kept() {
        let path: &[&str] = &["case"];
        let mut record = TestResultRecord::new(
            path,
            TestResult::Failed,
            vec![RawEvent::test_start(5, path), RawEvent::test_end(9, path)],
        );

        record.ensure_boundaries();
        assert_eq!(record.events.len(), 2);
    }

    #[test]
    fn test_record_without_events_gets_both_boundaries() {
        let mut record = TestResultRecord::new(&["case"], TestResult::Skipped, vec![]);
        record.ensure_boundaries();

        assert_eq!(record.events.len(), 2);
        assert_eq!(record.events[0].timestamp, record.events[1].timestamp);
    }

    #[test]
    fn test_record_deserializes_from_runner_json() {
        let json = r#"{"path":["suite","case"],"result":"failed",
            "error":{"message":"expected 2 got 3","line":8}}"#;
        let record: TestResultRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.result, TestResult::Failed);
        assert!(record.events.is_empty());
        assert_eq!(record.error.unwrap().line, Some(8));

        let context: TestIdContext = serde_json::from_str(r#"{"path":["case"]}"#).unwrap();
        assert_eq!(context.attempt, 1);
    }
}
