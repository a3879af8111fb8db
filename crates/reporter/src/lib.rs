//! steptrace reporter
//!
//! Turns the raw instrumentation events of a browser test run into
//! structured results and delivers them to a remote collector.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │  SuiteReporter (one run)                                    │
//! │    ├── on_suite_begin / on_test_begin / on_test_end         │
//! │    └── on_suite_end -> RunSummary                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  aggregate(events) -> Vec<Test>                             │
//! │    └── sort by timestamp, rebuild step trees                │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Dispatcher (bounded concurrency)                           │
//! │    └── RetryExecutor (linear | geometric backoff)           │
//! │          └── Collector::submit  (HttpCollector)             │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod aggregator;
pub mod backoff;
pub mod collector;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod reporter;
pub mod retry;

pub use aggregator::aggregate;
pub use backoff::{geometric_backoff, linear_backoff, BackoffFn, BackoffStrategy};
pub use collector::{Collector, HttpCollector, RunMetadata, Submission, TestSubmission};
pub use config::ReporterConfig;
pub use dispatcher::{run_all, Dispatcher, DEFAULT_CONCURRENCY};
pub use error::{ReportError, ReportResult};
pub use reporter::{RunReport, RunSummary, SuiteReporter, TestIdContext, TestResultRecord};
pub use retry::{retry, RetryExecutor, MAX_ATTEMPTS};
