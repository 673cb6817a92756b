//! Intent classifier - ordered, first-match rule evaluation
//!
//! Rules are tried in table order against the normalized message and the
//! first one that matches anywhere in it decides the intent. Specific
//! phrasings (pattern-ID lookups, hash checks) sit ahead of the generic
//! search verbs so that e.g. `show me T1055` never degrades to a free-text
//! search for "t1055".

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::error::{BotError, Result};
use crate::keywords::extract_search_terms;
use crate::types::Intent;

const PATTERN_REF: &str = r"(?:pattern\s+)?(t\d{4}(?:\.\d{3})?)\b";
// Hash value is any token up to sentence punctuation; params validates it
const HASH_ARGS: &str = r"(md5|sha1|sha256)\s+([^\s.,;:!?]+)";

/// Built-in rule table. Order is priority.
pub fn default_rules() -> Vec<RuleSpec> {
    let id_lookups = [
        format!(r"\b(?:show|tell)\s+(?:me\s+)?(?:details?\s+)?(?:about\s+)?{PATTERN_REF}"),
        format!(r"\bdetails?\s+(?:for\s+|about\s+|on\s+)?{PATTERN_REF}"),
        format!(r"\binfo\s+(?:about\s+|on\s+)?{PATTERN_REF}"),
    ];
    let hash_checks = [
        format!(r"\b(?:check|scan|analy[sz]e|lookup)\s+(?:the\s+)?(?:hash\s+)?{HASH_ARGS}"),
        format!(r"\bis\s+(?:the\s+)?(?:hash\s+)?{HASH_ARGS}\s+(?:malicious|bad|a\s+virus|virus)\b"),
        format!(r"\bvirustotal\s+(?:check\s+)?(?:the\s+)?(?:hash\s+)?{HASH_ARGS}"),
    ];
    // Short commands lead the message; trailing words and punctuation are allowed
    let stats = [
        r"^stats?\b",
        r"^statistics\b",
        r"^show\s+(?:me\s+)?(?:the\s+)?(?:stats?|statistics)\b",
        r"\bhow\s+many\s+(?:attack\s+)?patterns?\b",
        r"\bcount\s+(?:attack\s+)?patterns?\b",
        r"\bdatabase\s+(?:stats?|statistics)\b",
    ];
    // "command" also opens technique names, so these two must be the whole message
    let help = [
        r"^help\b",
        r"^commands?\W*$",
        r"^usage\W*$",
        r"\bwhat\s+can\s+you\s+do\b",
        r"\bhow\s+(?:to|do\s+i)\s+use\b",
    ];
    let searches = [
        r"\bsearch\s+(?:for\s+)?(.+)",
        r"\bfind\s+(?:attack\s+)?(?:patterns?\s+)?(?:for\s+)?(.+)",
        r"\blook\s+(?:for\s+|up\s+)?(.+)",
        r"\bshow\s+(?:me\s+)?(?:attack\s+)?(?:patterns?\s+)?(?:for\s+)?(.+)",
        r"\bwhat\s+(?:are\s+)?(?:the\s+)?(?:attack\s+)?(?:patterns?\s+)?(?:for\s+)?(.+)",
        r"\blist\s+(?:attack\s+)?(?:patterns?\s+)?(?:for\s+)?(.+)",
    ];

    let mut rules = Vec::new();
    rules.extend(id_lookups.into_iter().map(|p| RuleSpec::new(p, Intent::SearchPatterns)));
    rules.extend(hash_checks.into_iter().map(|p| RuleSpec::new(p, Intent::CheckHash)));
    rules.extend(stats.into_iter().map(|p| RuleSpec::new(p, Intent::GetStats)));
    rules.extend(help.into_iter().map(|p| RuleSpec::new(p, Intent::Help)));
    rules.extend(searches.into_iter().map(|p| RuleSpec::new(p, Intent::SearchPatterns)));
    rules
}

/// Uncompiled rule: a pattern with capture groups and the intent it selects
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSpec {
    pub pattern: String,
    pub intent: Intent,
}

impl RuleSpec {
    pub fn new(pattern: impl Into<String>, intent: Intent) -> Self {
        Self {
            pattern: pattern.into(),
            intent,
        }
    }
}

/// Compiled rule in the classifier's table
#[derive(Debug, Clone)]
pub struct RuleEntry {
    regex: Regex,
    intent: Intent,
}

impl RuleEntry {
    pub fn compile(spec: &RuleSpec) -> Result<Self> {
        let regex = RegexBuilder::new(&spec.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| BotError::InvalidRule {
                pattern: spec.pattern.clone(),
                source,
            })?;
        Ok(Self {
            regex,
            intent: spec.intent,
        })
    }

    pub fn pattern(&self) -> &str {
        self.regex.as_str()
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }
}

/// What produced the intent, and the text captured on the way
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchHandle {
    /// Rule at `index` matched; `groups[0]` is capture group 1
    Rule {
        index: usize,
        groups: Vec<Option<String>>,
    },
    /// No rule matched but meaningful words remained
    Keywords { terms: String },
    /// Nothing usable in the message
    Unmatched,
}

impl MatchHandle {
    /// Capture group by its regex number (1-based)
    pub fn group(&self, n: usize) -> Option<&str> {
        match self {
            MatchHandle::Rule { groups, .. } if n > 0 => {
                groups.get(n - 1).and_then(|g| g.as_deref())
            }
            _ => None,
        }
    }
}

/// Classifier output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub handle: MatchHandle,
    pub normalized: String,
}

/// Trimmed and case-folded form every rule is matched against
pub fn normalize(message: &str) -> String {
    message.trim().to_lowercase()
}

/// Ordered rule table with first-match semantics
#[derive(Debug, Clone)]
pub struct CommandClassifier {
    rules: Vec<RuleEntry>,
}

impl CommandClassifier {
    pub fn new() -> Self {
        // Built-in patterns are fixed and known to compile
        let rules = default_rules()
            .iter()
            .map(|spec| RuleEntry::compile(spec).expect("Invalid built-in rule pattern"))
            .collect();
        Self { rules }
    }

    /// Build a classifier over a custom table, evaluated in the given order
    pub fn with_rules<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = RuleSpec>,
    {
        let rules = specs
            .into_iter()
            .map(|spec| RuleEntry::compile(&spec))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { rules })
    }

    pub fn rules(&self) -> &[RuleEntry] {
        &self.rules
    }

    /// Classify a raw message. Always yields an intent.
    pub fn classify(&self, message: &str) -> Classification {
        let normalized = normalize(message);

        for (index, rule) in self.rules.iter().enumerate() {
            if let Some(caps) = rule.regex.captures(&normalized) {
                let groups = caps
                    .iter()
                    .skip(1)
                    .map(|g| g.map(|m| m.as_str().to_string()))
                    .collect();
                tracing::debug!(intent = %rule.intent, rule = index, "matched rule");
                return Classification {
                    intent: rule.intent,
                    handle: MatchHandle::Rule { index, groups },
                    normalized,
                };
            }
        }

        match extract_search_terms(&normalized) {
            Some(terms) => {
                tracing::debug!(%terms, "no rule matched, falling back to keyword search");
                Classification {
                    intent: Intent::SearchPatterns,
                    handle: MatchHandle::Keywords { terms },
                    normalized,
                }
            }
            None => Classification {
                intent: Intent::Unknown,
                handle: MatchHandle::Unmatched,
                normalized,
            },
        }
    }
}

impl Default for CommandClassifier {
    fn default() -> Self {
        Self::new()
    }
}
