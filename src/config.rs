//! Runtime configuration
//!
//! Values come from a TOML file, environment variables, or both (the
//! environment wins).

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::{BotError, Result};
use crate::threat_intel::DetectionPolicy;

pub const DEFAULT_VIRUSTOTAL_URL: &str = "https://www.virustotal.com/vtapi/v2";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VirusTotalConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for VirusTotalConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: DEFAULT_VIRUSTOTAL_URL.to_string(),
            timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotConfig {
    /// Results fetched and listed per search
    pub search_limit: usize,
    /// Entries per histogram in the stats view
    pub stats_top_n: usize,
    /// External references shown for a single pattern
    pub reference_limit: usize,
    /// Minimum engine detections for a hash to count as malicious
    pub malicious_threshold: u32,
    /// How long a dispatch waits on a hash lookup before giving up on it
    pub lookup_timeout_secs: u64,
    pub virustotal: VirusTotalConfig,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            search_limit: 10,
            stats_top_n: 5,
            reference_limit: 3,
            malicious_threshold: 1,
            lookup_timeout_secs: 30,
            virustotal: VirusTotalConfig::default(),
        }
    }
}

impl BotConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Read a TOML file, then apply environment overrides
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let mut config = Self::from_toml_str(&text)?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn detection_policy(&self) -> DetectionPolicy {
        DetectionPolicy::new(self.malicious_threshold)
    }

    pub fn lookup_timeout(&self) -> Duration {
        Duration::from_secs(self.lookup_timeout_secs)
    }

    fn apply_env<F>(&mut self, var: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = var("VIRUSTOTAL_API_KEY") {
            self.virustotal.api_key = Some(key);
        }
        if let Some(url) = var("VIRUSTOTAL_BASE_URL") {
            self.virustotal.base_url = url;
        }
        if let Some(secs) = var("VIRUSTOTAL_TIMEOUT_SECS") {
            self.virustotal.timeout_secs = parse_var("VIRUSTOTAL_TIMEOUT_SECS", &secs)?;
        }
        if let Some(limit) = var("CYBERBOT_SEARCH_LIMIT") {
            self.search_limit = parse_var("CYBERBOT_SEARCH_LIMIT", &limit)?;
        }
        if let Some(threshold) = var("CYBERBOT_MALICIOUS_THRESHOLD") {
            self.malicious_threshold = parse_var("CYBERBOT_MALICIOUS_THRESHOLD", &threshold)?;
        }
        if let Some(secs) = var("CYBERBOT_LOOKUP_TIMEOUT_SECS") {
            self.lookup_timeout_secs = parse_var("CYBERBOT_LOOKUP_TIMEOUT_SECS", &secs)?;
        }
        Ok(())
    }
}

fn parse_var<T: FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| BotError::Config(format!("{} must be a number, got '{}'", name, value)))
}
