//! Report Command
//!
//! Replays a recorded run log through the suite reporter and delivers the
//! results to the collector.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use steptrace_reporter::{
    HttpCollector, ReporterConfig, RunSummary, SuiteReporter, TestIdContext, TestResultRecord,
};
use tracing::info;

use crate::output::{print_item, print_success, print_warning, OutputFormat, TableDisplay};

#[derive(Args)]
pub struct ReportArgs {
    /// JSON-lines run log of testBegin/testEnd records
    pub run_log: PathBuf,

    /// Aggregate and write the report without delivering
    #[arg(long)]
    pub dry_run: bool,

    /// Directory receiving the JSON run report
    #[arg(long)]
    pub output_dir: Option<PathBuf>,

    /// Maximum submissions in flight
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Run id to report under (generated when omitted)
    #[arg(long)]
    pub run_id: Option<String>,
}

/// One line of a run log
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RunLogEntry {
    TestBegin(TestIdContext),
    TestEnd(TestResultRecord),
}

pub fn parse_run_log(path: &Path) -> Result<Vec<RunLogEntry>> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read run log {}", path.display()))?;

    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(number, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("{}:{}: invalid run log entry", path.display(), number + 1))
        })
        .collect()
}

impl TableDisplay for RunSummary {
    fn headers() -> Vec<&'static str> {
        vec!["Run", "Total", "Passed", "Failed", "Skipped", "Delivered"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.run_id.clone(),
            self.total.to_string(),
            self.passed.to_string(),
            self.failed.to_string(),
            self.skipped.to_string(),
            self.delivered.to_string(),
        ]
    }
}

pub async fn execute(args: ReportArgs, mut config: ReporterConfig, format: OutputFormat) -> Result<()> {
    config.dry_run |= args.dry_run;
    if let Some(dir) = args.output_dir {
        config.output_dir = Some(dir);
    }
    if let Some(concurrency) = args.concurrency {
        config.concurrency = concurrency.max(1);
    }

    let entries = parse_run_log(&args.run_log)?;
    info!(entries = entries.len(), log = %args.run_log.display(), "Replaying run log");

    let collector = HttpCollector::from_config(&config)?;
    let mut reporter = SuiteReporter::new(config.clone(), collector);
    if let Some(run_id) = args.run_id {
        reporter = reporter.with_run_id(run_id);
    }

    reporter.on_suite_begin()?;
    for entry in entries {
        match entry {
            RunLogEntry::TestBegin(context) => reporter.on_test_begin(context)?,
            RunLogEntry::TestEnd(record) => reporter.on_test_end(record)?,
        }
    }
    let summary = reporter.on_suite_end().await?;

    print_item(&summary, format)?;

    if matches!(format, OutputFormat::Table | OutputFormat::Plain) {
        if config.dry_run {
            print_warning("Dry run: nothing was delivered");
        } else {
            print_success(&format!("Delivered {} submissions to {}", summary.delivered, config.collector_url));
        }
        if summary.failed > 0 {
            println!("{}", format!("{} test(s) failed", summary.failed).red());
        }
        if let Some(path) = config.report_path(&summary.run_id) {
            println!("Report: {}", path.display());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use steptrace_common::TestResult;
    use tempfile::TempDir;

    #[test]
    fn test_parse_run_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.jsonl");
        std::fs::write(
            &path,
            r#"{"type":"testBegin","path":["s","t"]}

{"type":"testEnd","path":["s","t"],"result":"failed","error":{"message":"boom"},"events":[{"kind":"test:start","timestamp":0,"testPath":["s","t"]}]}
"#,
        )
        .unwrap();

        let entries = parse_run_log(&path).unwrap();
        assert_eq!(entries.len(), 2);
        assert!(matches!(&entries[0], RunLogEntry::TestBegin(ctx) if ctx.attempt == 1));
        match &entries[1] {
            RunLogEntry::TestEnd(record) => {
                assert_eq!(record.result, TestResult::Failed);
                assert_eq!(record.events.len(), 1);
            }
            other => panic!("unexpected entry {:?}", other),
        }
    }

    #[test]
    fn test_bad_line_is_located() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("run.jsonl");
        std::fs::write(&path, "{\"type\":\"testBegin\",\"path\":[\"a\"]}\n{\"type\":\"suiteBegin\"}\n").unwrap();

        let err = parse_run_log(&path).unwrap_err();
        assert!(err.to_string().ends_with("run.jsonl:2: invalid run log entry"));
    }

    #[tokio::test]
    async fn test_dry_run_replay_writes_report() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("run.jsonl");
        std::fs::write(
            &log,
            r#"{"type":"testBegin","path":["s","t"]}
{"type":"testEnd","path":["s","t"],"result":"passed","events":[{"kind":"step:start","timestamp":3,"testPath":["s","t"],"command":{"id":"a","name":"get"}},{"kind":"step:end","timestamp":9,"testPath":["s","t"],"command":{"id":"a","name":"get"}}]}
"#,
        )
        .unwrap();

        let args = ReportArgs {
            run_log: log,
            dry_run: true,
            output_dir: Some(dir.path().join("out")),
            concurrency: None,
            run_id: Some("replay".to_string()),
        };
        execute(args, ReporterConfig::default(), OutputFormat::Json).await.unwrap();

        let report = std::fs::read_to_string(dir.path().join("out").join("steptrace-replay.json")).unwrap();
        let report: serde_json::Value = serde_json::from_str(&report).unwrap();
        assert_eq!(report["run"]["passed"], 1);
        assert_eq!(report["tests"][0]["steps"][0]["duration"], 6.0);
    }
}
