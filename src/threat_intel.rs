//! Hash reputation lookups
//!
//! [`ThreatIntelClient`] never fails: a missing API key, rate limiting, a
//! non-success status, a transport error or an unreadable body all collapse
//! into the zero-engine [`ThreatReport::undetected`] shape.

use ahash::AHashMap;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::VirusTotalConfig;
use crate::error::{BotError, Result};
use crate::types::HashType;

/// Verdict for a single hash lookup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreatReport {
    pub hash_value: String,
    pub is_malicious: bool,
    pub detection_count: u32,
    pub total_engines: u32,
    pub scan_date: Option<String>,
    pub report_link: Option<String>,
}

impl ThreatReport {
    pub fn undetected(hash_value: impl Into<String>) -> Self {
        Self {
            hash_value: hash_value.into(),
            is_malicious: false,
            detection_count: 0,
            total_engines: 0,
            scan_date: None,
            report_link: None,
        }
    }

    /// Percentage of engines that flagged the hash
    pub fn detection_rate(&self) -> f64 {
        if self.total_engines == 0 {
            return 0.0;
        }
        (self.detection_count as f64 / self.total_engines as f64) * 100.0
    }
}

/// When a detection count is reported as malicious
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetectionPolicy {
    pub malicious_threshold: u32,
}

impl DetectionPolicy {
    pub fn new(malicious_threshold: u32) -> Self {
        Self {
            malicious_threshold,
        }
    }

    /// Zero detections are never malicious, whatever the threshold
    pub fn is_malicious(&self, detection_count: u32) -> bool {
        detection_count > 0 && detection_count >= self.malicious_threshold
    }
}

impl Default for DetectionPolicy {
    fn default() -> Self {
        Self::new(1)
    }
}

#[async_trait]
pub trait ThreatIntelClient: Send + Sync {
    async fn check_hash(&self, value: &str, hash_type: HashType) -> ThreatReport;
}

// VirusTotal v2 file report
#[derive(Deserialize)]
struct FileReport {
    #[serde(default)]
    response_code: i64,
    #[serde(default)]
    scans: AHashMap<String, EngineVerdict>,
    scan_date: Option<String>,
    permalink: Option<String>,
}

#[derive(Deserialize)]
struct EngineVerdict {
    #[serde(default)]
    detected: bool,
}

/// Parse a VirusTotal v2 `file/report` body
pub fn parse_report(body: &str, hash_value: &str, policy: DetectionPolicy) -> Result<ThreatReport> {
    let report: FileReport = serde_json::from_str(body)?;

    if report.response_code == 0 {
        // unknown to the service
        return Ok(ThreatReport {
            report_link: report.permalink,
            ..ThreatReport::undetected(hash_value)
        });
    }

    let total_engines = report.scans.len() as u32;
    let detection_count = report.scans.values().filter(|v| v.detected).count() as u32;

    Ok(ThreatReport {
        hash_value: hash_value.to_string(),
        is_malicious: policy.is_malicious(detection_count),
        detection_count,
        total_engines,
        scan_date: report.scan_date,
        report_link: report.permalink,
    })
}

/// HTTP client for the VirusTotal v2 API
pub struct VirusTotalClient {
    client: Client,
    api_key: Option<String>,
    base_url: String,
    policy: DetectionPolicy,
}

impl VirusTotalClient {
    pub fn new(config: &VirusTotalConfig, policy: DetectionPolicy) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BotError::ThreatIntel(e.to_string()))?;

        Ok(Self {
            client,
            api_key: config.api_key.clone().filter(|k| !k.trim().is_empty()),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            policy,
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.api_key.is_some()
    }

    async fn fetch_report(&self, api_key: &str, value: &str) -> Result<ThreatReport> {
        let url = format!("{}/file/report", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[("apikey", api_key), ("resource", value)])
            .send()
            .await
            .map_err(|e| BotError::ThreatIntel(e.to_string()))?;

        match response.status() {
            StatusCode::OK => {
                let body = response
                    .text()
                    .await
                    .map_err(|e| BotError::ThreatIntel(e.to_string()))?;
                parse_report(&body, value, self.policy)
            }
            StatusCode::NO_CONTENT => {
                tracing::warn!("VirusTotal rate limit exceeded");
                Ok(ThreatReport::undetected(value))
            }
            status => Err(BotError::ThreatIntel(format!("API error: {}", status))),
        }
    }
}

#[async_trait]
impl ThreatIntelClient for VirusTotalClient {
    async fn check_hash(&self, value: &str, hash_type: HashType) -> ThreatReport {
        let Some(api_key) = self.api_key.as_deref() else {
            tracing::warn!("VirusTotal API key not configured");
            return ThreatReport::undetected(value);
        };

        tracing::debug!(%hash_type, "checking hash with VirusTotal");
        match self.fetch_report(api_key, value).await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(error = %e, "VirusTotal lookup failed");
                ThreatReport::undetected(value)
            }
        }
    }
}
