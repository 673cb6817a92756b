//! Attack-pattern storage capability
//!
//! The dispatcher only sees [`PatternRepository`]; the in-memory
//! implementation backs the CLI and tests.

use ahash::AHashMap;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::Result;

/// A catalogued attack technique
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackPattern {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "x_mitre_platforms", default)]
    pub platforms: Vec<String>,
    #[serde(rename = "x_mitre_detection", default)]
    pub detection: String,
    #[serde(default)]
    pub phase_name: String,
    #[serde(default)]
    pub external_id: String,
    #[serde(default)]
    pub external_references: Vec<ExternalReference>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalReference {
    #[serde(default)]
    pub source_name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub external_id: Option<String>,
}

/// Fields the repository can build histograms over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupField {
    Phase,
    Platform,
}

/// One histogram bucket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FacetCount {
    pub value: String,
    pub count: u64,
}

#[async_trait]
pub trait PatternRepository: Send + Sync {
    /// Keyword match across name, description, platforms, detection, phase
    /// and external id. Returns one page of records and the total match count.
    async fn search(&self, query: &str, limit: usize, offset: usize)
        -> Result<(Vec<AttackPattern>, u64)>;

    async fn get_by_id(&self, id: &str) -> Result<Option<AttackPattern>>;

    /// Buckets sorted by count, descending
    async fn aggregate(&self, field: GroupField) -> Result<Vec<FacetCount>>;

    async fn count_all(&self) -> Result<u64>;
}

/// Repository over a fixed set of records held in memory
#[derive(Debug, Clone, Default)]
pub struct InMemoryPatternRepository {
    patterns: Vec<AttackPattern>,
}

impl InMemoryPatternRepository {
    pub fn new(patterns: Vec<AttackPattern>) -> Self {
        Self { patterns }
    }

    /// Parse a JSON array of attack-pattern records
    pub fn from_json_str(json: &str) -> Result<Self> {
        let patterns: Vec<AttackPattern> = serde_json::from_str(json)?;
        Ok(Self::new(patterns))
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    fn matches(pattern: &AttackPattern, needle: &str) -> bool {
        let hit = |text: &str| text.to_lowercase().contains(needle);
        hit(&pattern.name)
            || hit(&pattern.description)
            || pattern.platforms.iter().any(|p| hit(p))
            || hit(&pattern.detection)
            || hit(&pattern.phase_name)
            || hit(&pattern.external_id)
            || hit(&pattern.id)
    }
}

#[async_trait]
impl PatternRepository for InMemoryPatternRepository {
    async fn search(
        &self,
        query: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<AttackPattern>, u64)> {
        let needle = query.trim().to_lowercase();
        let matched: Vec<&AttackPattern> = self
            .patterns
            .iter()
            .filter(|p| Self::matches(p, &needle))
            .collect();
        let total = matched.len() as u64;
        let page = matched.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, total))
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<AttackPattern>> {
        let id = id.trim();
        Ok(self
            .patterns
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id) || p.external_id.eq_ignore_ascii_case(id))
            .cloned())
    }

    async fn aggregate(&self, field: GroupField) -> Result<Vec<FacetCount>> {
        let mut counts: AHashMap<&str, u64> = AHashMap::new();
        for pattern in &self.patterns {
            match field {
                GroupField::Phase => *counts.entry(pattern.phase_name.as_str()).or_insert(0) += 1,
                GroupField::Platform => {
                    for platform in &pattern.platforms {
                        *counts.entry(platform.as_str()).or_insert(0) += 1;
                    }
                }
            }
        }

        let mut buckets: Vec<FacetCount> = counts
            .into_iter()
            .map(|(value, count)| FacetCount {
                value: value.to_string(),
                count,
            })
            .collect();
        buckets.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.value.cmp(&b.value)));
        Ok(buckets)
    }

    async fn count_all(&self) -> Result<u64> {
        Ok(self.patterns.len() as u64)
    }
}
