//! Config Command
//!
//! Resolves the effective reporter configuration from file and flags.

use anyhow::{Context, Result};
use std::path::Path;
use steptrace_reporter::ReporterConfig;

/// Values given on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub collector_url: Option<String>,
    pub api_key: Option<String>,
}

/// Load `path` (defaults when missing) and apply overrides on top
pub fn resolve(path: &Path, overrides: &ConfigOverrides) -> Result<ReporterConfig> {
    let mut config = ReporterConfig::load(path)
        .with_context(|| format!("Failed to load config from {}", path.display()))?;

    if let Some(url) = &overrides.collector_url {
        config.collector_url = url.clone();
    }
    if let Some(api_key) = &overrides.api_key {
        config.api_key = Some(api_key.clone());
    }

    config.validate()?;
    Ok(config)
}

/// Print the effective configuration as TOML with the API key masked
pub fn execute(config: &ReporterConfig) -> Result<()> {
    let mut shown = config.clone();
    if shown.api_key.is_some() {
        shown.api_key = Some("********".to_string());
    }
    print!("{}", shown.to_toml()?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_overrides_win_over_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("steptrace.toml");
        std::fs::write(&path, "collector_url = \"http://file:1\"\nconcurrency = 9\n").unwrap();

        let config = resolve(
            &path,
            &ConfigOverrides {
                collector_url: Some("https://flag:2".to_string()),
                api_key: Some("token".to_string()),
            },
        )
        .unwrap();

        assert_eq!(config.collector_url, "https://flag:2");
        assert_eq!(config.api_key.as_deref(), Some("token"));
        assert_eq!(config.concurrency, 9);
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let dir = TempDir::new().unwrap();
        let overrides = ConfigOverrides {
            collector_url: Some("collector:8787".to_string()),
            ..Default::default()
        };
        assert!(resolve(&dir.path().join("none.toml"), &overrides).is_err());
    }
}
