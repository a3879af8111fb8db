//! steptrace CLI
//!
//! Command-line interface for aggregating recorded browser test events and
//! replaying run logs to a collector.

pub mod commands;
pub mod output;
