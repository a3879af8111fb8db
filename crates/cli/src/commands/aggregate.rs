//! Aggregate Command
//!
//! Rebuilds tests from recorded JSON-lines event logs and prints them.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::{Path, PathBuf};
use steptrace_common::{RawEvent, Test};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::output::{print_list, print_serialized, OutputFormat, TableDisplay};

const EVENT_LOG_EXTENSION: &str = "jsonl";

#[derive(Args)]
pub struct AggregateArgs {
    /// Event log files, or directories searched for *.jsonl
    #[arg(required = true)]
    pub paths: Vec<PathBuf>,

    /// List individual steps instead of tests
    #[arg(long)]
    pub steps: bool,
}

/// One test for display
#[derive(Serialize, Clone)]
pub struct TestRow {
    pub test: String,
    pub result: String,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub steps: usize,
    pub failed_steps: usize,
}

impl From<&Test> for TestRow {
    fn from(test: &Test) -> Self {
        Self {
            test: test.display_path(),
            result: test.result.to_string(),
            start_ms: test.relative_start_time,
            duration_ms: test.duration,
            steps: test.steps.len(),
            failed_steps: test.steps.iter().filter(|s| s.error.is_some()).count(),
        }
    }
}

impl TableDisplay for TestRow {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Result", "Start (ms)", "Duration (ms)", "Steps", "Failed"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.test.clone(),
            self.result.clone(),
            format!("{:.0}", self.start_ms),
            format!("{:.0}", self.duration_ms),
            self.steps.to_string(),
            self.failed_steps.to_string(),
        ]
    }
}

/// One step for display, indented by depth
#[derive(Serialize, Clone)]
pub struct StepRow {
    pub test: String,
    pub step: String,
    pub name: String,
    pub depth: usize,
    pub start_ms: f64,
    pub duration_ms: f64,
    pub error: Option<String>,
}

impl TableDisplay for StepRow {
    fn headers() -> Vec<&'static str> {
        vec!["Test", "Step", "Command", "Start (ms)", "Duration (ms)", "Error"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.test.clone(),
            self.step.clone(),
            format!("{}{}", "  ".repeat(self.depth), self.name),
            format!("{:.0}", self.start_ms),
            format!("{:.0}", self.duration_ms),
            self.error.clone().unwrap_or_default(),
        ]
    }
}

/// Flatten every test's step tree, parents before their children
pub fn step_rows(tests: &[Test]) -> Vec<StepRow> {
    fn visit(test: &Test, parent: Option<&str>, depth: usize, rows: &mut Vec<StepRow>) {
        let level = test
            .steps
            .iter()
            .filter(|step| step.parent_id.as_deref() == parent);
        for step in level {
            rows.push(StepRow {
                test: test.display_path(),
                step: step.id.clone(),
                name: step.name.clone(),
                depth,
                start_ms: step.relative_start_time,
                duration_ms: step.duration,
                error: step.error.as_ref().map(ToString::to_string),
            });
            visit(test, Some(&step.id), depth + 1, rows);
        }
    }

    let mut rows = Vec::new();
    for test in tests {
        visit(test, None, 0, &mut rows);
    }
    rows
}

/// Expand directories into the event logs below them, sorted by path
pub fn collect_event_logs(paths: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut logs = Vec::new();

    for path in paths {
        if path.is_dir() {
            let mut found: Vec<PathBuf> = WalkDir::new(path)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .filter(|entry| entry.file_type().is_file())
                .map(|entry| entry.into_path())
                .filter(|p| p.extension().map_or(false, |ext| ext == EVENT_LOG_EXTENSION))
                .collect();
            found.sort();
            debug!(dir = %path.display(), logs = found.len(), "Scanned directory");
            logs.extend(found);
        } else {
            logs.push(path.clone());
        }
    }

    Ok(logs)
}

/// Read and concatenate the events of every log
pub fn load_events(logs: &[PathBuf]) -> Result<Vec<RawEvent>> {
    let mut events = Vec::new();
    for log in logs {
        events.extend(read_event_log(log)?);
    }
    Ok(events)
}

fn read_event_log(path: &Path) -> Result<Vec<RawEvent>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    RawEvent::parse_jsonl(&content).with_context(|| format!("Invalid event log {}", path.display()))
}

pub async fn execute(args: AggregateArgs, format: OutputFormat) -> Result<()> {
    let logs = collect_event_logs(&args.paths)?;
    let events = load_events(&logs)?;
    info!(logs = logs.len(), events = events.len(), "Loaded events");

    let tests = steptrace_reporter::aggregate(events)?;

    match (format, args.steps) {
        (OutputFormat::Json | OutputFormat::Yaml, false) => print_serialized(&tests, format),
        (_, true) => print_list(&step_rows(&tests), format),
        (_, false) => {
            let rows: Vec<TestRow> = tests.iter().map(TestRow::from).collect();
            print_list(&rows, format)
        }
    }
}
