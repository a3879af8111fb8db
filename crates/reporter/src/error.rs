//! Error types for reporting

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Aggregation failed: {0}")]
    Aggregation(#[from] steptrace_common::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Collector rejected submission with {status}: {body}")]
    CollectorStatus { status: u16, body: String },

    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("TOML write error: {0}")]
    TomlWrite(#[from] toml::ser::Error),
}

pub type ReportResult<T> = Result<T, ReportError>;
