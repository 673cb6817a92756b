//! Message parsing: classification followed by parameter extraction

use serde::Serialize;

use crate::error::Result;
use crate::matcher::{CommandClassifier, MatchHandle, RuleSpec};
use crate::params::ParameterExtractor;
use crate::types::{Intent, ParameterBundle};

/// A message turned into a typed command
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedCommand {
    pub intent: Intent,
    pub params: ParameterBundle,
    pub normalized: String,
    /// Index of the rule that matched, `None` for fallback classifications
    pub rule: Option<usize>,
}

/// Pure, stateless parser over a classifier and an extractor
#[derive(Debug, Clone, Default)]
pub struct CommandParser {
    classifier: CommandClassifier,
    extractor: ParameterExtractor,
}

impl CommandParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rules<I>(specs: I) -> Result<Self>
    where
        I: IntoIterator<Item = RuleSpec>,
    {
        Ok(Self {
            classifier: CommandClassifier::with_rules(specs)?,
            extractor: ParameterExtractor::new(),
        })
    }

    pub fn classifier(&self) -> &CommandClassifier {
        &self.classifier
    }

    pub fn parse(&self, message: &str) -> ParsedCommand {
        let classification = self.classifier.classify(message);
        let params = self.extractor.extract(
            classification.intent,
            &classification.handle,
            &classification.normalized,
        );
        let rule = match classification.handle {
            MatchHandle::Rule { index, .. } => Some(index),
            _ => None,
        };
        tracing::debug!(intent = %classification.intent, ?params, "parsed command");

        ParsedCommand {
            intent: classification.intent,
            params,
            normalized: classification.normalized,
            rule,
        }
    }
}
