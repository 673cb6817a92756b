//! Fallback keyword extraction
//!
//! When no rule matches, the meaningful words of a message are treated as a
//! free-text search query.

use ahash::AHashSet;
use std::sync::OnceLock;

/// Low-information words dropped from fallback queries
pub const STOP_WORDS: &[&str] = &[
    "the", "a", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
    "is", "are", "was", "were", "be", "been", "being", "have", "has", "had", "do", "does",
    "did", "will", "would", "could", "should", "may", "might", "can", "what", "how", "when",
    "where", "why",
];

/// Tokens this short never make it into a query
pub const MIN_TERM_CHARS: usize = 3;

fn stop_words() -> &'static AHashSet<&'static str> {
    static SET: OnceLock<AHashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| STOP_WORDS.iter().copied().collect())
}

pub fn is_stop_word(word: &str) -> bool {
    stop_words().contains(word)
}

/// Extract search terms from an unstructured, already normalized message.
///
/// Returns `None` when nothing but stop words and short tokens remain.
pub fn extract_search_terms(message: &str) -> Option<String> {
    let terms: Vec<&str> = message
        .split_whitespace()
        .filter(|word| word.chars().count() >= MIN_TERM_CHARS && !is_stop_word(word))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keeps_unknown_words() {
        assert_eq!(extract_search_terms("asdkjhasd").as_deref(), Some("asdkjhasd"));
    }

    #[test]
    fn test_strips_stop_words_and_short_tokens() {
        assert_eq!(
            extract_search_terms("what is the lateral movement in ad").as_deref(),
            Some("lateral movement")
        );
    }

    #[test]
    fn test_only_stop_words() {
        assert_eq!(extract_search_terms("the and or"), None);
        assert_eq!(extract_search_terms("   "), None);
    }

    #[test]
    fn test_short_tokens_counted_in_chars() {
        // two multi-byte chars stay below the minimum
        assert_eq!(extract_search_terms("éé"), None);
        assert_eq!(extract_search_terms("ééé").as_deref(), Some("ééé"));
    }
}
