use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use surplus_harvest_core::models::ParsingMode;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub db: DbConfig,
    #[serde(default)]
    pub scrapyd: ScrapydConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Jurisdiction connectors. Empty means "use the compiled-in set".
    #[serde(default)]
    pub connectors: Vec<ConnectorEntry>,
    /// Enablement flags. Empty means every jurisdiction is enabled.
    #[serde(default)]
    pub jurisdictions: Vec<JurisdictionEntry>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ScrapydConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_project")]
    pub project: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ScrapydConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            project: default_project(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:6800".to_string()
}
fn default_project() -> String {
    "default".to_string()
}
fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkerConfig {
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    300
}

#[derive(Debug, Deserialize, Clone, Copy)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    1000
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectorEntry {
    pub state: String,
    pub county_code: String,
    pub spider: String,
    #[serde(default)]
    pub watch_urls: Vec<String>,
    #[serde(default = "default_schedule_interval_secs")]
    pub schedule_interval_secs: u64,
    #[serde(default = "default_parsing_mode")]
    pub parsing_mode: ParsingMode,
}

fn default_schedule_interval_secs() -> u64 {
    900
}
fn default_parsing_mode() -> ParsingMode {
    ParsingMode::Normalized
}

#[derive(Debug, Deserialize, Clone)]
pub struct JurisdictionEntry {
    pub state: String,
    pub county_code: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

fn default_enabled() -> bool {
    true
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;

    if config.retry.max_attempts == 0 {
        anyhow::bail!("retry.max_attempts must be >= 1");
    }
    if config.worker.poll_interval_secs == 0 {
        anyhow::bail!("worker.poll_interval_secs must be > 0");
    }

    for connector in &config.connectors {
        if connector.state.len() != 2 {
            anyhow::bail!(
                "connector state '{}' must be a two-letter code",
                connector.state
            );
        }
        if connector.county_code.trim().is_empty() {
            anyhow::bail!("connector county_code must not be empty");
        }
        if connector.spider.trim().is_empty() {
            anyhow::bail!(
                "connector {}-{} is missing a spider name",
                connector.state,
                connector.county_code
            );
        }
        if connector.schedule_interval_secs == 0 {
            anyhow::bail!(
                "connector {}-{}: schedule_interval_secs must be > 0",
                connector.state,
                connector.county_code
            );
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config_fills_defaults() {
        let config: Config = toml::from_str(
            r#"
[db]
path = "data/svh.sqlite"
"#,
        )
        .unwrap();

        assert_eq!(config.scrapyd.base_url, "http://localhost:6800");
        assert_eq!(config.scrapyd.project, "default");
        assert_eq!(config.worker.poll_interval_secs, 300);
        assert_eq!(config.retry.max_attempts, 3);
        assert_eq!(config.retry.base_delay_ms, 1000);
        assert!(config.connectors.is_empty());
        assert!(config.jurisdictions.is_empty());
    }

    #[test]
    fn connector_entries_parse() {
        let config: Config = toml::from_str(
            r#"
[db]
path = "data/svh.sqlite"

[[connectors]]
state = "GA"
county_code = "FULTON"
spider = "ga_fulton_overages"
watch_urls = ["https://fultoncountyga.gov/overages"]
schedule_interval_secs = 900
parsing_mode = "normalized"

[[jurisdictions]]
state = "GA"
county_code = "FULTON"
enabled = false
"#,
        )
        .unwrap();

        assert_eq!(config.connectors.len(), 1);
        assert_eq!(config.connectors[0].spider, "ga_fulton_overages");
        assert_eq!(config.connectors[0].parsing_mode, ParsingMode::Normalized);
        assert!(!config.jurisdictions[0].enabled);
    }
}
