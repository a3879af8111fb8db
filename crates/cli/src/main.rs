//! steptrace CLI - Main Entry Point
//!
//! Aggregates recorded browser test events and replays run logs to a
//! remote collector.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use steptrace_cli::commands::{aggregate, config, report};
use steptrace_cli::output;

/// steptrace - browser test telemetry reporter
#[derive(Parser)]
#[command(name = "steptrace")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Reporter configuration file
    #[arg(short, long, default_value = "steptrace.toml", global = true)]
    config: PathBuf,

    /// Collector base URL
    #[arg(long, env = "STEPTRACE_COLLECTOR_URL", global = true)]
    collector_url: Option<String>,

    /// API key sent to the collector as a bearer token
    #[arg(long, env = "STEPTRACE_API_KEY", hide_env_values = true, global = true)]
    api_key: Option<String>,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: output::OutputFormat,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild tests from event logs and print them
    Aggregate(aggregate::AggregateArgs),

    /// Replay a run log and deliver the results
    Report(report::ReportArgs),

    /// Print the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let overrides = config::ConfigOverrides {
        collector_url: cli.collector_url,
        api_key: cli.api_key,
    };

    match cli.command {
        Commands::Aggregate(args) => aggregate::execute(args, cli.format).await?,
        Commands::Report(args) => {
            let resolved = config::resolve(&cli.config, &overrides)?;
            report::execute(args, resolved, cli.format).await?
        }
        Commands::Config => config::execute(&config::resolve(&cli.config, &overrides)?)?,
    }

    Ok(())
}
