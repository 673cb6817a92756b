//! User-facing message text
//!
//! Everything here is a pure function of its arguments, so identical input
//! renders byte-identical text.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::repository::{AttackPattern, FacetCount};
use crate::stats::RunStats;
use crate::threat_intel::ThreatReport;

pub const DESCRIPTION_PREVIEW_CHARS: usize = 200;
pub const DETECTION_PREVIEW_CHARS: usize = 100;

pub const HELP_TEXT: &str = "\
**Cyber Bot Commands:**

**Database Search:**
- `search [query]` - Search attack patterns in the database
- `find [query]` - Find attack patterns
- `show me [query]` - Display attack patterns
- `what are the attack patterns for [query]`
- `show me T1055` - Get details for a specific pattern ID
- `details for T1055` - Get detailed information about a pattern

**Hash Reputation:**
- `check md5 [hash]` - Check an MD5 hash
- `scan sha1 [hash]` - Scan a SHA1 hash
- `analyze sha256 [hash]` - Analyze a SHA256 hash
- `is md5 [hash] malicious` - Check whether a hash is malicious

**Statistics:**
- `stats` - Show database and bot statistics
- `how many attack patterns` - Count attack patterns

**Help:**
- `help` - Show this help message
- `commands` - List available commands

**Examples:**
- `search process injection`
- `check md5 5d41402abc4b2a76b9719d911017c592`
- `find windows attacks`
- `stats`";

pub fn unknown_command(message: &str) -> String {
    format!(
        "**Unknown Command:** \"{}\"\n\n\
         I didn't understand that command. Here are some things I can help you with:\n\n\
         - **Search attack patterns** - Try: `search process injection`\n\
         - **Check hashes** - Try: `check md5 5d41402abc4b2a76b9719d911017c592`\n\
         - **Get statistics** - Try: `stats`\n\
         - **Get help** - Try: `help`\n\n\
         Type `help` for a complete list of commands!",
        message
    )
}

/// Cut `text` to at most `max_chars` characters, marking the cut
pub fn truncate(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

/// Condensed search hit carried in the response data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchResult {
    pub pattern_id: String,
    pub name: String,
    pub description: String,
    pub platforms: Vec<String>,
    pub phase: String,
    pub detection: String,
}

impl From<&AttackPattern> for SearchResult {
    fn from(pattern: &AttackPattern) -> Self {
        Self {
            pattern_id: pattern.id.clone(),
            name: pattern.name.clone(),
            description: truncate(&pattern.description, DESCRIPTION_PREVIEW_CHARS),
            platforms: pattern.platforms.clone(),
            phase: pattern.phase_name.clone(),
            detection: truncate(&pattern.detection, DETECTION_PREVIEW_CHARS),
        }
    }
}

pub fn no_patterns_found(subject: &str) -> String {
    format!("No attack patterns found for: '{}'", subject)
}

pub fn search_results(query: &str, results: &[SearchResult], total: u64) -> String {
    let mut message = format!("**Search Results for:** '{}'\n", query);
    message.push_str(&format!(
        "**Found:** {} patterns (showing {} of {})\n\n",
        total,
        results.len(),
        total
    ));

    for (i, result) in results.iter().enumerate() {
        message.push_str(&format!("**{}. {}** (`{}`)\n", i + 1, result.name, result.pattern_id));
        message.push_str(&format!("   **Phase:** {}\n", result.phase));
        message.push_str(&format!("   **Platforms:** {}\n", result.platforms.join(", ")));
        message.push_str(&format!("   **Description:** {}\n\n", result.description));
    }

    if total > results.len() as u64 {
        message.push_str(&format!("**Tip:** Showing first {} results. ", results.len()));
        message.push_str("Use more specific search terms for better results!\n");
        message.push_str("**For details:** Ask about a specific pattern (e.g., 'show me T1055')");
    }

    message.trim_end().to_string()
}

pub fn pattern_detail(pattern: &AttackPattern, reference_limit: usize) -> String {
    let mut message = format!("**Pattern Details: {}**\n\n", pattern.name);
    message.push_str(&format!("**ID:** `{}`\n", pattern.id));
    message.push_str(&format!("**Phase:** {}\n", pattern.phase_name));
    message.push_str(&format!("**Platforms:** {}\n\n", pattern.platforms.join(", ")));
    message.push_str(&format!(
        "**Description:**\n{}\n\n",
        or_default(&pattern.description, "No description available")
    ));
    message.push_str(&format!(
        "**Detection:**\n{}\n\n",
        or_default(&pattern.detection, "No detection information available")
    ));
    message.push_str("**External References:**\n");

    let linked: Vec<_> = pattern
        .external_references
        .iter()
        .filter_map(|r| r.url.as_deref().map(|url| (r.source_name.as_str(), url)))
        .take(reference_limit)
        .collect();
    if linked.is_empty() {
        message.push_str("No external references available\n");
    }
    for (source, url) in linked {
        message.push_str(&format!("- [{}]({})\n", source, url));
    }

    message.push_str("\n**Tip:** Use this pattern ID in your security analysis!");
    message
}

pub fn hash_report(report: &ThreatReport) -> String {
    if report.total_engines == 0 {
        return format!(
            "**Hash Analysis:** `{}`\nHash not found in the threat-intel database",
            report.hash_value
        );
    }

    let status = if report.is_malicious { "MALICIOUS" } else { "CLEAN" };
    let mut message = format!(
        "**Hash Analysis:** `{}`\n**Status:** {}\n**Detection:** {}/{} engines ({:.1}%)\n",
        report.hash_value,
        status,
        report.detection_count,
        report.total_engines,
        report.detection_rate()
    );
    message.push_str(&format!(
        "**Scan Date:** {}",
        report.scan_date.as_deref().unwrap_or("Unknown")
    ));
    if let Some(link) = &report.report_link {
        message.push_str(&format!("\n**Report:** {}", link));
    }
    message
}

/// Inputs to the statistics view
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsView {
    pub total_patterns: u64,
    pub phase_stats: Vec<FacetCount>,
    pub platform_stats: Vec<FacetCount>,
    pub bot_stats: RunStats,
    pub success_rate: f64,
    pub uptime: String,
}

pub fn stats(view: &StatsView) -> String {
    let mut message = String::from("**Cyber Bot Statistics**\n\n**Database:**\n");
    message.push_str(&format!(
        "- Total Attack Patterns: {}\n",
        group_thousands(view.total_patterns)
    ));
    message.push_str(&format!("- Bot Uptime: {}\n", view.uptime));

    message.push_str("\n**Top Attack Phases:**\n");
    for facet in &view.phase_stats {
        message.push_str(&format!("- {}: {}\n", facet.value, group_thousands(facet.count)));
    }

    message.push_str("\n**Top Platforms:**\n");
    for facet in &view.platform_stats {
        message.push_str(&format!("- {}: {}\n", facet.value, group_thousands(facet.count)));
    }

    message.push_str("\n**Bot Performance:**\n");
    message.push_str(&format!("- Commands Processed: {}\n", view.bot_stats.total));
    message.push_str(&format!("- Success Rate: {:.1}%", view.success_rate));
    message
}

/// `H:MM:SS`, prefixed with the day count once uptime passes a day
pub fn format_uptime(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    let (days, rest) = (secs / 86_400, secs % 86_400);
    let clock = format!("{}:{:02}:{:02}", rest / 3600, (rest % 3600) / 60, rest % 60);
    match days {
        0 => clock,
        1 => format!("1 day, {}", clock),
        n => format!("{} days, {}", n, clock),
    }
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn or_default<'a>(text: &'a str, fallback: &'a str) -> &'a str {
    if text.trim().is_empty() {
        fallback
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::pattern;

    #[test]
    fn test_uptime_format() {
        assert_eq!(format_uptime(Duration::from_secs(0)), "0:00:00");
        assert_eq!(format_uptime(Duration::from_secs(3_725)), "1:02:05");
        assert_eq!(format_uptime(Duration::from_secs(86_400 + 61)), "1 day, 0:01:01");
        assert_eq!(format_uptime(Duration::from_secs(3 * 86_400)), "3 days, 0:00:00");
    }

    #[test]
    fn test_truncate_is_char_safe() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("ééééé", 2), "éé...");
    }

    #[test]
    fn test_thousands() {
        assert_eq!(group_thousands(7), "7");
        assert_eq!(group_thousands(1234), "1,234");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_search_results_hint_only_when_more_exist() {
        let record = pattern("T1055", "Process Injection", "x", &["Windows"]);
        let hits = vec![SearchResult::from(&record)];

        let complete = search_results("injection", &hits, 1);
        assert!(!complete.contains("**Tip:**"));

        let partial = search_results("injection", &hits, 12);
        assert!(partial.contains("showing 1 of 12"));
        assert!(partial.contains("show me T1055"));
    }

    #[test]
    fn test_pattern_detail_limits_references() {
        let mut record = pattern("T1055", "Process Injection", "defense-evasion", &["Windows"]);
        record.external_references = (0..5)
            .map(|i| crate::repository::ExternalReference {
                source_name: format!("ref{}", i),
                url: Some(format!("https://example.test/{}", i)),
                external_id: None,
            })
            .collect();

        let text = pattern_detail(&record, 3);
        assert!(text.contains("[ref2]"));
        assert!(!text.contains("[ref3]"));
    }

    #[test]
    fn test_stats_layout() {
        let view = StatsView {
            total_patterns: 1234,
            phase_stats: vec![FacetCount {
                value: "execution".to_string(),
                count: 12,
            }],
            platform_stats: vec![],
            bot_stats: RunStats {
                total: 4,
                ..RunStats::default()
            },
            success_rate: 75.0,
            uptime: "0:01:00".to_string(),
        };

        assert_eq!(
            stats(&view),
            "**Cyber Bot Statistics**\n\n**Database:**\n\
             - Total Attack Patterns: 1,234\n\
             - Bot Uptime: 0:01:00\n\
             \n**Top Attack Phases:**\n\
             - execution: 12\n\
             \n**Top Platforms:**\n\
             \n**Bot Performance:**\n\
             - Commands Processed: 4\n\
             - Success Rate: 75.0%"
        );
    }

    #[test]
    fn test_hash_report_layout() {
        let report = ThreatReport {
            hash_value: "abc".to_string(),
            is_malicious: true,
            detection_count: 3,
            total_engines: 4,
            scan_date: None,
            report_link: Some("https://example.test/r".to_string()),
        };

        assert_eq!(
            hash_report(&report),
            "**Hash Analysis:** `abc`\n**Status:** MALICIOUS\n\
             **Detection:** 3/4 engines (75.0%)\n**Scan Date:** Unknown\n\
             **Report:** https://example.test/r"
        );
    }

    #[test]
    fn test_hash_report_without_engines() {
        let text = hash_report(&ThreatReport::undetected("abc"));
        assert!(text.contains("not found"));
        assert!(!text.contains("MALICIOUS"));
    }
}
