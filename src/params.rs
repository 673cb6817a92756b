//! Parameter extraction from classified messages
//!
//! Extraction is total: malformed input becomes data (an `error` entry)
//! rather than a failure, so every classified message can be dispatched.

use regex::Regex;

use crate::matcher::MatchHandle;
use crate::types::{HashCheck, HashType, Intent, ParameterBundle};

pub const GENERAL: &str = "general";

/// Derives the typed parameter bundle for an intent
#[derive(Debug, Clone)]
pub struct ParameterExtractor {
    pattern_id: Regex,
}

impl ParameterExtractor {
    pub fn new() -> Self {
        // Compiled once - this should never fail
        let pattern_id = Regex::new(r"(?i)^t\d{4}(?:\.\d{3})?$").expect("Invalid regex pattern");
        Self { pattern_id }
    }

    /// Whether `text` is a catalogued technique identifier such as `T1055.001`
    pub fn is_pattern_id(&self, text: &str) -> bool {
        self.pattern_id.is_match(text)
    }

    pub fn extract(
        &self,
        intent: Intent,
        handle: &MatchHandle,
        normalized: &str,
    ) -> ParameterBundle {
        match intent {
            Intent::SearchPatterns => {
                let captured = match handle {
                    MatchHandle::Rule { .. } => handle.group(1).unwrap_or_default(),
                    MatchHandle::Keywords { terms } => terms.as_str(),
                    MatchHandle::Unmatched => normalized,
                };
                self.search_target(captured)
            }
            Intent::CheckHash => self.hash_check(handle.group(1), handle.group(2)),
            Intent::GetStats => ParameterBundle::Stats {
                stats_type: GENERAL.to_string(),
            },
            Intent::Help => ParameterBundle::Help {
                help_type: GENERAL.to_string(),
            },
            Intent::Unknown => ParameterBundle::Unknown {
                original_message: normalized.to_string(),
            },
        }
    }

    fn search_target(&self, captured: &str) -> ParameterBundle {
        let captured = captured.trim();
        if self.is_pattern_id(captured) {
            ParameterBundle::pattern_id(captured.to_uppercase())
        } else {
            ParameterBundle::query(captured)
        }
    }

    fn hash_check(&self, hash_type: Option<&str>, hash_value: Option<&str>) -> ParameterBundle {
        let type_text = hash_type.unwrap_or_default().trim().to_lowercase();
        let value = hash_value.unwrap_or_default().trim().to_lowercase();

        let check = match type_text.parse::<HashType>() {
            Ok(hash_type) if hash_type.is_valid_digest(&value) => HashCheck::Valid {
                hash_type,
                hash_value: value,
            },
            _ if type_text.is_empty() => HashCheck::Invalid {
                error: "Invalid hash format".to_string(),
            },
            _ => HashCheck::Invalid {
                error: format!("Invalid {} hash format", type_text),
            },
        };
        ParameterBundle::CheckHash(check)
    }
}

impl Default for ParameterExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SearchTarget;

    fn rule(groups: &[&str]) -> MatchHandle {
        MatchHandle::Rule {
            index: 0,
            groups: groups.iter().map(|g| Some(g.to_string())).collect(),
        }
    }

    #[test]
    fn test_pattern_id_shape() {
        let extractor = ParameterExtractor::new();
        let bundle = extractor.extract(Intent::SearchPatterns, &rule(&["t1055"]), "show me t1055");
        assert_eq!(bundle, ParameterBundle::pattern_id("T1055"));

        let bundle = extractor.extract(Intent::SearchPatterns, &rule(&["t1055.011"]), "");
        assert_eq!(bundle, ParameterBundle::pattern_id("T1055.011"));
    }

    #[test]
    fn test_query_when_not_an_id() {
        let extractor = ParameterExtractor::new();
        let bundle = extractor.extract(
            Intent::SearchPatterns,
            &rule(&[" t1055 injection "]),
            "search t1055 injection",
        );
        assert_eq!(
            bundle,
            ParameterBundle::Search(SearchTarget::Query {
                query: "t1055 injection".to_string()
            })
        );
    }

    #[test]
    fn test_keyword_fallback_becomes_query() {
        let extractor = ParameterExtractor::new();
        let handle = MatchHandle::Keywords {
            terms: "asdkjhasd".to_string(),
        };
        let bundle = extractor.extract(Intent::SearchPatterns, &handle, "asdkjhasd");
        assert_eq!(bundle, ParameterBundle::query("asdkjhasd"));
    }

    #[test]
    fn test_valid_hash() {
        let extractor = ParameterExtractor::new();
        let value = "5D41402ABC4B2A76B9719D911017C592";
        let bundle = extractor.extract(Intent::CheckHash, &rule(&["MD5", value]), "");
        assert_eq!(
            bundle,
            ParameterBundle::CheckHash(HashCheck::Valid {
                hash_type: HashType::Md5,
                hash_value: value.to_lowercase(),
            })
        );
    }

    #[test]
    fn test_malformed_hash_is_data_not_failure() {
        let extractor = ParameterExtractor::new();
        let cases = [
            ("md5", "notahash"),
            ("sha1", "5d41402abc4b2a76b9719d911017c592"),
            ("sha256", "abc"),
        ];
        for (hash_type, value) in cases {
            let bundle = extractor.extract(Intent::CheckHash, &rule(&[hash_type, value]), "");
            assert_eq!(
                bundle.error(),
                Some(format!("Invalid {} hash format", hash_type).as_str())
            );
        }
    }

    #[test]
    fn test_missing_captures() {
        let extractor = ParameterExtractor::new();
        let bundle = extractor.extract(Intent::CheckHash, &MatchHandle::Unmatched, "check");
        assert_eq!(bundle.error(), Some("Invalid hash format"));
    }

    #[test]
    fn test_constant_bundles() {
        let extractor = ParameterExtractor::new();
        assert_eq!(
            extractor.extract(Intent::GetStats, &MatchHandle::Unmatched, "stats"),
            ParameterBundle::Stats {
                stats_type: "general".to_string()
            }
        );
        assert_eq!(
            extractor.extract(Intent::Unknown, &MatchHandle::Unmatched, "the and or"),
            ParameterBundle::Unknown {
                original_message: "the and or".to_string()
            }
        );
    }
}
