//! Core data types for classification and dispatch results

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Classified command category for a user message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    SearchPatterns,
    CheckHash,
    GetStats,
    Help,
    Unknown,
}

impl Intent {
    pub const ALL: [Intent; 5] = [
        Intent::SearchPatterns,
        Intent::CheckHash,
        Intent::GetStats,
        Intent::Help,
        Intent::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Intent::SearchPatterns => "search_patterns",
            Intent::CheckHash => "check_hash",
            Intent::GetStats => "get_stats",
            Intent::Help => "help",
            Intent::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Digest algorithms accepted by hash checks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashType {
    Md5,
    Sha1,
    Sha256,
}

impl HashType {
    pub fn as_str(&self) -> &'static str {
        match self {
            HashType::Md5 => "md5",
            HashType::Sha1 => "sha1",
            HashType::Sha256 => "sha256",
        }
    }

    /// Number of hex characters in a digest of this type
    pub fn hex_len(&self) -> usize {
        match self {
            HashType::Md5 => 32,
            HashType::Sha1 => 40,
            HashType::Sha256 => 64,
        }
    }

    pub fn is_valid_digest(&self, value: &str) -> bool {
        value.len() == self.hex_len() && value.chars().all(|c| c.is_ascii_hexdigit())
    }
}

impl FromStr for HashType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md5" => Ok(HashType::Md5),
            "sha1" => Ok(HashType::Sha1),
            "sha256" => Ok(HashType::Sha256),
            other => Err(format!("unsupported hash type: {}", other)),
        }
    }
}

impl fmt::Display for HashType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a search request is looking for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchTarget {
    PatternId { pattern_id: String },
    Query { query: String },
}

/// A hash check either carries a validated digest or the validation failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HashCheck {
    Valid {
        hash_type: HashType,
        hash_value: String,
    },
    Invalid {
        error: String,
    },
}

/// Parameters extracted for a classified message.
///
/// Serializes to the flat parameter map handed to handlers, e.g.
/// `{"pattern_id": "T1055"}` or `{"error": "Invalid md5 hash format"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParameterBundle {
    Search(SearchTarget),
    CheckHash(HashCheck),
    Stats { stats_type: String },
    Help { help_type: String },
    Unknown { original_message: String },
}

impl ParameterBundle {
    pub fn query(query: impl Into<String>) -> Self {
        ParameterBundle::Search(SearchTarget::Query {
            query: query.into(),
        })
    }

    pub fn pattern_id(pattern_id: impl Into<String>) -> Self {
        ParameterBundle::Search(SearchTarget::PatternId {
            pattern_id: pattern_id.into(),
        })
    }

    /// Validation error carried by the bundle, if any
    pub fn error(&self) -> Option<&str> {
        match self {
            ParameterBundle::CheckHash(HashCheck::Invalid { error }) => Some(error),
            _ => None,
        }
    }
}

/// Terminal state of a single dispatch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Succeeded,
    Failed,
}

impl Outcome {
    pub fn from_success(success: bool) -> Self {
        if success {
            Outcome::Succeeded
        } else {
            Outcome::Failed
        }
    }
}

/// Response returned for every handled message
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub success: bool,
    pub message: String,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl ResponseEnvelope {
    pub fn success(intent: Intent, message: impl Into<String>) -> Self {
        Self::new(true, intent, message.into())
    }

    pub fn failure(intent: Intent, message: impl Into<String>) -> Self {
        Self::new(false, intent, message.into())
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn outcome(&self) -> Outcome {
        Outcome::from_success(self.success)
    }

    fn new(success: bool, intent: Intent, message: String) -> Self {
        Self {
            success,
            message,
            intent,
            data: None,
            timestamp: Utc::now(),
        }
    }
}
