//! Command dispatch
//!
//! Each message goes through one transition: parse, run the handler bound to
//! its intent, record the outcome. Handlers report problems as values; the
//! boundary in [`Dispatcher::dispatch`] turns anything that still escapes,
//! panics included, into a failed [`ResponseEnvelope`].

use ahash::AHashMap;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::BotConfig;
use crate::error::{BotError, Result};
use crate::parser::CommandParser;
use crate::render::{self, SearchResult, StatsView};
use crate::repository::{GroupField, PatternRepository};
use crate::stats::{RunStats, StatsTracker};
use crate::threat_intel::{ThreatIntelClient, ThreatReport, VirusTotalClient};
use crate::types::{HashCheck, Intent, ParameterBundle, ResponseEnvelope, SearchTarget};

/// Read-only view of the bot's own counters
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotStats {
    pub total_commands: u64,
    pub successful_commands: u64,
    pub failed_commands: u64,
    pub command_usage: AHashMap<String, u64>,
    pub uptime: String,
}

/// Process-wide dispatch context, built once at startup and shared by handle
pub struct Dispatcher {
    parser: CommandParser,
    repository: Arc<dyn PatternRepository>,
    threat_intel: Arc<dyn ThreatIntelClient>,
    stats: StatsTracker,
    config: BotConfig,
    started: Instant,
}

impl Dispatcher {
    pub fn new(
        config: BotConfig,
        repository: Arc<dyn PatternRepository>,
        threat_intel: Arc<dyn ThreatIntelClient>,
    ) -> Self {
        Self {
            parser: CommandParser::new(),
            repository,
            threat_intel,
            stats: StatsTracker::new(),
            config,
            started: Instant::now(),
        }
    }

    /// Dispatcher backed by the VirusTotal client described in `config`
    pub fn from_config(config: BotConfig, repository: Arc<dyn PatternRepository>) -> Result<Self> {
        let client = VirusTotalClient::new(&config.virustotal, config.detection_policy())?;
        if !client.has_credentials() {
            tracing::warn!("VIRUSTOTAL_API_KEY not set - hash checks will report no detections");
        }
        Ok(Self::new(config, repository, Arc::new(client)))
    }

    /// Replace the built-in rule table
    pub fn with_parser(mut self, parser: CommandParser) -> Self {
        self.parser = parser;
        self
    }

    pub fn parser(&self) -> &CommandParser {
        &self.parser
    }

    pub fn config(&self) -> &BotConfig {
        &self.config
    }

    /// Classify, extract and dispatch a raw user message
    pub async fn handle(&self, message: &str) -> ResponseEnvelope {
        let command = self.parser.parse(message);
        self.dispatch(command.intent, &command.params).await
    }

    /// Run the handler for an already parsed command and record its outcome
    pub async fn dispatch(&self, intent: Intent, params: &ParameterBundle) -> ResponseEnvelope {
        let result = AssertUnwindSafe(self.execute(intent, params))
            .catch_unwind()
            .await;

        let envelope = match result {
            Ok(Ok(envelope)) => envelope,
            Ok(Err(e)) => {
                tracing::error!(%intent, error = %e, "command failed");
                processing_error(intent, &e.to_string())
            }
            Err(payload) => {
                let cause = panic_message(&*payload);
                tracing::error!(%intent, %cause, "handler panicked");
                processing_error(intent, &cause)
            }
        };

        // handler is finished; nothing below awaits
        self.stats.record(intent, envelope.outcome());
        tracing::info!(%intent, success = envelope.success, "command processed");
        envelope
    }

    pub fn stats(&self) -> RunStats {
        self.stats.snapshot()
    }

    pub fn bot_stats(&self) -> BotStats {
        let stats = self.stats.snapshot();
        BotStats {
            total_commands: stats.total,
            successful_commands: stats.successful,
            failed_commands: stats.failed,
            command_usage: stats.usage,
            uptime: render::format_uptime(self.uptime()),
        }
    }

    pub fn help_text(&self) -> &'static str {
        render::HELP_TEXT
    }

    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }

    async fn execute(&self, intent: Intent, params: &ParameterBundle) -> Result<ResponseEnvelope> {
        match (intent, params) {
            (Intent::SearchPatterns, ParameterBundle::Search(target)) => self.search(target).await,
            (Intent::CheckHash, ParameterBundle::CheckHash(check)) => self.check_hash(check).await,
            (Intent::GetStats, _) => self.get_stats().await,
            (Intent::Help, _) => Ok(ResponseEnvelope::success(Intent::Help, render::HELP_TEXT)
                .with_data(json!({ "help_type": "general" }))),
            (Intent::Unknown, ParameterBundle::Unknown { original_message }) => {
                Ok(ResponseEnvelope::failure(
                    Intent::Unknown,
                    render::unknown_command(original_message),
                )
                .with_data(json!({ "original_message": original_message })))
            }
            (intent, params) => Err(BotError::Parameters(format!(
                "{} cannot take {}",
                intent,
                serde_json::to_string(params)?
            ))),
        }
    }

    async fn search(&self, target: &SearchTarget) -> Result<ResponseEnvelope> {
        match target {
            SearchTarget::PatternId { pattern_id } => self.pattern_details(pattern_id).await,
            SearchTarget::Query { query } => self.search_query(query.trim()).await,
        }
    }

    async fn pattern_details(&self, pattern_id: &str) -> Result<ResponseEnvelope> {
        let pattern = match self.repository.get_by_id(pattern_id).await {
            Ok(pattern) => pattern,
            Err(e) => {
                tracing::error!(pattern_id, error = %e, "pattern lookup failed");
                return Ok(ResponseEnvelope::failure(
                    Intent::SearchPatterns,
                    format!("Error getting pattern details: {}", e),
                ));
            }
        };

        Ok(match pattern {
            Some(pattern) => ResponseEnvelope::success(
                Intent::SearchPatterns,
                render::pattern_detail(&pattern, self.config.reference_limit),
            )
            .with_data(json!({ "pattern": pattern })),
            None => ResponseEnvelope::success(
                Intent::SearchPatterns,
                render::no_patterns_found(pattern_id),
            )
            .with_data(json!({ "total": 0, "results": [] })),
        })
    }

    async fn search_query(&self, query: &str) -> Result<ResponseEnvelope> {
        if query.is_empty() {
            return Ok(ResponseEnvelope::failure(
                Intent::SearchPatterns,
                "Please provide a search query",
            ));
        }

        let (patterns, total) = match self
            .repository
            .search(query, self.config.search_limit, 0)
            .await
        {
            Ok(found) => found,
            Err(e) => {
                tracing::error!(query, error = %e, "search failed");
                return Ok(ResponseEnvelope::failure(
                    Intent::SearchPatterns,
                    format!("Error searching database: {}", e),
                ));
            }
        };

        if patterns.is_empty() {
            return Ok(
                ResponseEnvelope::success(Intent::SearchPatterns, render::no_patterns_found(query))
                    .with_data(json!({ "total": 0, "results": [] })),
            );
        }

        let results: Vec<SearchResult> = patterns.iter().map(SearchResult::from).collect();
        let message = render::search_results(query, &results, total);
        Ok(ResponseEnvelope::success(Intent::SearchPatterns, message)
            .with_data(json!({ "total": total, "results": results })))
    }

    async fn check_hash(&self, check: &HashCheck) -> Result<ResponseEnvelope> {
        let (hash_type, hash_value) = match check {
            HashCheck::Invalid { error } => {
                return Ok(ResponseEnvelope::failure(Intent::CheckHash, error.as_str())
                    .with_data(json!({ "error": error })));
            }
            HashCheck::Valid {
                hash_type,
                hash_value,
            } => (*hash_type, hash_value.as_str()),
        };

        let lookup = self.threat_intel.check_hash(hash_value, hash_type);
        let report = match tokio::time::timeout(self.config.lookup_timeout(), lookup).await {
            Ok(report) => report,
            Err(_) => {
                tracing::warn!(%hash_type, "hash lookup timed out");
                ThreatReport::undetected(hash_value)
            }
        };

        Ok(ResponseEnvelope::success(Intent::CheckHash, render::hash_report(&report))
            .with_data(serde_json::to_value(&report)?))
    }

    async fn get_stats(&self) -> Result<ResponseEnvelope> {
        let aggregates = async {
            let total = self.repository.count_all().await?;
            let phases = self.repository.aggregate(GroupField::Phase).await?;
            let platforms = self.repository.aggregate(GroupField::Platform).await?;
            Ok::<_, BotError>((total, phases, platforms))
        }
        .await;

        let (total_patterns, mut phase_stats, mut platform_stats) = match aggregates {
            Ok(aggregates) => aggregates,
            Err(e) => {
                tracing::error!(error = %e, "stats aggregation failed");
                return Ok(ResponseEnvelope::failure(
                    Intent::GetStats,
                    format!("Error getting statistics: {}", e),
                ));
            }
        };
        phase_stats.truncate(self.config.stats_top_n);
        platform_stats.truncate(self.config.stats_top_n);

        let bot_stats = self.stats.snapshot();
        let view = StatsView {
            total_patterns,
            phase_stats,
            platform_stats,
            success_rate: bot_stats.success_rate(),
            bot_stats,
            uptime: render::format_uptime(self.uptime()),
        };

        Ok(ResponseEnvelope::success(Intent::GetStats, render::stats(&view))
            .with_data(serde_json::to_value(&view)?))
    }
}

fn processing_error(intent: Intent, cause: &str) -> ResponseEnvelope {
    ResponseEnvelope::failure(intent, format!("Error processing command: {}", cause))
        .with_data(json!({ "error": cause }))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "internal error".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures::sample;
    use crate::repository::{AttackPattern, FacetCount};
    use crate::types::HashType;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const MD5: &str = "5d41402abc4b2a76b9719d911017c592";

    #[derive(Default)]
    struct MockIntel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ThreatIntelClient for MockIntel {
        async fn check_hash(&self, value: &str, _hash_type: HashType) -> ThreatReport {
            self.calls.fetch_add(1, Ordering::SeqCst);
            ThreatReport {
                hash_value: value.to_string(),
                is_malicious: true,
                detection_count: 3,
                total_engines: 10,
                scan_date: Some("2024-01-01".to_string()),
                report_link: None,
            }
        }
    }

    struct StalledIntel;

    #[async_trait]
    impl ThreatIntelClient for StalledIntel {
        async fn check_hash(&self, value: &str, _hash_type: HashType) -> ThreatReport {
            tokio::time::sleep(Duration::from_secs(30)).await;
            ThreatReport {
                is_malicious: true,
                detection_count: 1,
                total_engines: 1,
                ..ThreatReport::undetected(value)
            }
        }
    }

    struct BrokenRepository {
        panic: bool,
    }

    impl BrokenRepository {
        fn fail(&self) -> Result<()> {
            if self.panic {
                panic!("boom");
            }
            Err(BotError::Repository("connection refused".to_string()))
        }
    }

    #[async_trait]
    impl PatternRepository for BrokenRepository {
        async fn search(
            &self,
            _query: &str,
            _limit: usize,
            _offset: usize,
        ) -> Result<(Vec<AttackPattern>, u64)> {
            self.fail().map(|_| (Vec::new(), 0))
        }

        async fn get_by_id(&self, _id: &str) -> Result<Option<AttackPattern>> {
            self.fail().map(|_| None)
        }

        async fn aggregate(&self, _field: GroupField) -> Result<Vec<FacetCount>> {
            self.fail().map(|_| Vec::new())
        }

        async fn count_all(&self) -> Result<u64> {
            self.fail().map(|_| 0)
        }
    }

    fn dispatcher_with(intel: Arc<dyn ThreatIntelClient>) -> Dispatcher {
        Dispatcher::new(BotConfig::default(), Arc::new(sample()), intel)
    }

    fn broken(panic: bool) -> Dispatcher {
        Dispatcher::new(
            BotConfig::default(),
            Arc::new(BrokenRepository { panic }),
            Arc::new(MockIntel::default()),
        )
    }

    #[tokio::test]
    async fn test_valid_hash_calls_threat_intel() {
        let intel = Arc::new(MockIntel::default());
        let dispatcher = dispatcher_with(intel.clone());

        let response = dispatcher.handle(&format!("check md5 {}", MD5)).await;

        assert!(response.success);
        assert_eq!(response.intent, Intent::CheckHash);
        assert_eq!(intel.calls.load(Ordering::SeqCst), 1);
        assert!(response.message.contains("MALICIOUS"));
        assert!(response.message.contains("3/10 engines (30.0%)"));
        assert_eq!(response.data.unwrap()["hash_value"], MD5);
    }

    #[tokio::test]
    async fn test_malformed_hash_skips_threat_intel() {
        let intel = Arc::new(MockIntel::default());
        let dispatcher = dispatcher_with(intel.clone());

        let response = dispatcher.handle("check md5 notahash").await;

        assert!(!response.success);
        assert_eq!(response.message, "Invalid md5 hash format");
        assert_eq!(intel.calls.load(Ordering::SeqCst), 0);
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_stalled_lookup_degrades_to_clean() {
        let config = BotConfig {
            lookup_timeout_secs: 1,
            ..BotConfig::default()
        };
        let dispatcher = Dispatcher::new(config, Arc::new(sample()), Arc::new(StalledIntel));

        let response = dispatcher.handle(&format!("scan md5 {}", MD5)).await;

        assert!(response.success);
        assert!(response.message.contains("not found"));
        assert_eq!(response.data.unwrap()["detection_count"], 0);
    }

    #[tokio::test]
    async fn test_search_query() {
        let dispatcher = dispatcher_with(Arc::new(MockIntel::default()));

        let response = dispatcher.handle("search process injection").await;

        assert!(response.success);
        assert!(response.message.contains("Process Injection"));
        let data = response.data.unwrap();
        assert_eq!(data["total"], 1);
        assert_eq!(data["results"][0]["pattern_id"], "T1055");
    }

    #[tokio::test]
    async fn test_empty_result_is_success() {
        let dispatcher = dispatcher_with(Arc::new(MockIntel::default()));

        let response = dispatcher.handle("find zzzqqq").await;
        assert!(response.success);
        assert_eq!(response.message, "No attack patterns found for: 'zzzqqq'");

        let response = dispatcher.handle("show me T9999").await;
        assert!(response.success);
        assert_eq!(response.data.unwrap()["total"], 0);
    }

    #[tokio::test]
    async fn test_pattern_id_detail() {
        let dispatcher = dispatcher_with(Arc::new(MockIntel::default()));

        let response = dispatcher.handle("show me T1055").await;

        assert!(response.success);
        assert!(response.message.starts_with("**Pattern Details: Process Injection**"));
        assert!(response.message.contains("https://attack.mitre.org/techniques/T1055"));
        assert_eq!(response.data.unwrap()["pattern"]["id"], "T1055");
    }

    #[tokio::test]
    async fn test_blank_query_never_reaches_repository() {
        let dispatcher = broken(false);

        let response = dispatcher
            .dispatch(Intent::SearchPatterns, &ParameterBundle::query("   "))
            .await;

        assert!(!response.success);
        assert_eq!(response.message, "Please provide a search query");
    }

    #[tokio::test]
    async fn test_stats_merges_repository_and_run_stats() {
        let dispatcher = dispatcher_with(Arc::new(MockIntel::default()));
        dispatcher.handle("help").await;
        dispatcher.handle("the and or").await;

        let response = dispatcher.handle("stats").await;

        assert!(response.success);
        assert!(response.message.contains("Total Attack Patterns: 5"));
        assert!(response.message.contains("- defense-evasion: 2"));
        assert!(response.message.contains("Success Rate: 50.0%"));
        let data = response.data.unwrap();
        assert_eq!(data["bot_stats"]["total"], 2);
        assert_eq!(data["platform_stats"][0]["value"], "Windows");
    }

    #[tokio::test]
    async fn test_stats_histograms_capped() {
        let config = BotConfig {
            stats_top_n: 2,
            ..BotConfig::default()
        };
        let dispatcher =
            Dispatcher::new(config, Arc::new(sample()), Arc::new(MockIntel::default()));

        let data = dispatcher.handle("stats").await.data.unwrap();
        assert_eq!(data["phase_stats"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_repository_failure_is_reported() {
        let dispatcher = broken(false);

        let response = dispatcher.handle("search lateral movement").await;
        assert!(!response.success);
        assert_eq!(
            response.message,
            "Error searching database: repository error: connection refused"
        );

        let response = dispatcher.handle("stats").await;
        assert!(response.message.starts_with("Error getting statistics:"));

        let stats = dispatcher.stats();
        assert_eq!(stats.total, 2);
        assert_eq!(stats.failed, 2);
    }

    #[tokio::test]
    async fn test_panic_is_contained() {
        let dispatcher = broken(true);

        let response = dispatcher.handle("stats").await;

        assert!(!response.success);
        assert_eq!(response.intent, Intent::GetStats);
        assert_eq!(response.message, "Error processing command: boom");
        assert_eq!(dispatcher.stats().failed, 1);
    }

    #[tokio::test]
    async fn test_mismatched_parameters() {
        let dispatcher = dispatcher_with(Arc::new(MockIntel::default()));

        let response = dispatcher
            .dispatch(Intent::CheckHash, &ParameterBundle::query("x"))
            .await;

        assert!(!response.success);
        assert!(response.message.starts_with("Error processing command: invalid parameters"));
    }

    #[tokio::test]
    async fn test_help_and_unknown_are_stable() {
        let dispatcher = dispatcher_with(Arc::new(MockIntel::default()));

        let first = dispatcher.handle("help").await;
        let second = dispatcher.handle("help").await;
        assert!(first.success);
        assert_eq!(first.message, second.message);
        assert_eq!(first.message, dispatcher.help_text());

        let first = dispatcher.handle("the and or").await;
        let second = dispatcher.handle("the and or").await;
        assert!(!first.success);
        assert_eq!(first.intent, Intent::Unknown);
        assert_eq!(first.message, second.message);
        assert!(first.message.contains("\"the and or\""));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatches_keep_exact_counts() {
        let dispatcher = Arc::new(dispatcher_with(Arc::new(MockIntel::default())));

        let tasks: Vec<_> = (0..64)
            .map(|i| {
                let dispatcher = Arc::clone(&dispatcher);
                tokio::spawn(async move {
                    let message = if i % 4 == 0 { "the and or" } else { "help" };
                    dispatcher.handle(message).await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }

        let stats = dispatcher.stats();
        assert_eq!(stats.total, 64);
        assert_eq!(stats.successful, 48);
        assert_eq!(stats.failed, 16);
        assert_eq!(stats.usage_of(Intent::Help), 48);
        assert_eq!(stats.usage_of(Intent::Unknown), 16);

        let bot = dispatcher.bot_stats();
        assert_eq!(bot.total_commands, 64);
        assert_eq!(bot.uptime.split(':').count(), 3);
    }
}
