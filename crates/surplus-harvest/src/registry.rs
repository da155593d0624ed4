//! Connector catalog.
//!
//! Maps the uppercased `STATE-COUNTY` composite key to a
//! [`ConnectorConfig`]. Read-only after construction; lookups that miss
//! return `None` rather than an error. Iteration order is the sorted key
//! order, which keeps cycle processing deterministic.

use std::collections::BTreeMap;

use surplus_harvest_core::models::{ConnectorConfig, ConnectorKey, ParsingMode};

use crate::config::Config;

pub struct ConnectorRegistry {
    connectors: BTreeMap<String, ConnectorConfig>,
}

/// Jurisdictions the pipeline watches out of the box when the config file
/// declares none.
fn default_connectors() -> Vec<ConnectorConfig> {
    vec![
        ConnectorConfig {
            key: ConnectorKey::new("GA", "FULTON"),
            spider_name: "ga_fulton_overages".to_string(),
            watch_urls: vec!["https://fultoncountyga.gov/overages".to_string()],
            schedule_interval_secs: 60 * 15,
            parsing_mode: ParsingMode::Normalized,
        },
        ConnectorConfig {
            key: ConnectorKey::new("TX", "HARRIS"),
            spider_name: "tx_harris_overages".to_string(),
            watch_urls: vec!["https://www.hctax.net/Property/ExcessProceeds".to_string()],
            schedule_interval_secs: 60 * 30,
            parsing_mode: ParsingMode::Normalized,
        },
        ConnectorConfig {
            key: ConnectorKey::new("AZ", "MARICOPA"),
            spider_name: "az_maricopa_overages".to_string(),
            watch_urls: vec!["https://www.maricopa.gov".to_string()],
            schedule_interval_secs: 60 * 60,
            parsing_mode: ParsingMode::Raw,
        },
    ]
}

impl ConnectorRegistry {
    pub fn new(configs: Vec<ConnectorConfig>) -> Self {
        let connectors = configs
            .into_iter()
            .map(|config| (config.key.canonical(), config))
            .collect();
        Self { connectors }
    }

    /// Built-in connector set.
    pub fn with_defaults() -> Self {
        Self::new(default_connectors())
    }

    /// Registry from the config file; falls back to the built-in set when
    /// no connectors are declared.
    pub fn from_config(config: &Config) -> Self {
        if config.connectors.is_empty() {
            return Self::with_defaults();
        }

        let configs = config
            .connectors
            .iter()
            .map(|entry| ConnectorConfig {
                key: ConnectorKey::new(entry.state.clone(), entry.county_code.clone()),
                spider_name: entry.spider.clone(),
                watch_urls: entry.watch_urls.clone(),
                schedule_interval_secs: entry.schedule_interval_secs,
                parsing_mode: entry.parsing_mode,
            })
            .collect();
        Self::new(configs)
    }

    pub fn get(&self, key: &ConnectorKey) -> Option<&ConnectorConfig> {
        self.connectors.get(&key.canonical())
    }

    pub fn list(&self) -> Vec<&ConnectorConfig> {
        self.connectors.values().collect()
    }

    pub fn is_empty(&self) -> bool {
        self.connectors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.connectors.len()
    }
}
