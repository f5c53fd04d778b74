//! eth-proxy TOML configuration file.
//!
//! Every field is optional. Values from the file only fill in settings that
//! were not given on the command line or through the environment.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration: {0}")]
    InvalidDuration(String),
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProxyFileConfig {
    pub port: Option<u16>,
    pub timeout_limit: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
    pub client_urls: Option<Vec<String>>,
    pub probe_interval: Option<String>,
    pub query_timeout: Option<String>,
    pub consensus_interval: Option<String>,
}

impl ProxyFileConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Parse an optional duration field, reporting the raw text on failure.
    pub fn duration(value: Option<&str>) -> Result<Option<Duration>, ConfigError> {
        value
            .map(|s| parse_duration(s).ok_or_else(|| ConfigError::InvalidDuration(s.to_string())))
            .transpose()
    }
}

/// Parse a duration string like "5s", "500ms", "1m".
///
/// A bare number is read as seconds.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        ms.parse::<u64>().ok().map(Duration::from_millis)
    } else if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok().map(Duration::from_secs)
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>()
            .ok()
            .and_then(|m| m.checked_mul(60))
            .map(Duration::from_secs)
    } else {
        s.parse::<u64>().ok().map(Duration::from_secs)
    }
}
