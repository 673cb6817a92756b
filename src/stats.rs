//! Process-lifetime command statistics

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::types::{Intent, Outcome};

/// Counters for every dispatch since process start
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    pub total: u64,
    pub successful: u64,
    pub failed: u64,
    /// Invocation count keyed by intent name
    pub usage: AHashMap<String, u64>,
}

impl RunStats {
    /// Percentage of successful dispatches; 0 when nothing ran yet
    pub fn success_rate(&self) -> f64 {
        (self.successful as f64 / self.total.max(1) as f64) * 100.0
    }

    pub fn usage_of(&self, intent: Intent) -> u64 {
        self.usage.get(intent.as_str()).copied().unwrap_or(0)
    }
}

/// Thread-safe owner of [`RunStats`].
///
/// The lock is only taken for the counter update itself, never across an
/// await point.
#[derive(Debug, Default)]
pub struct StatsTracker {
    inner: Mutex<RunStats>,
}

impl StatsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, intent: Intent, outcome: Outcome) {
        let mut stats = self.lock();
        stats.total += 1;
        match outcome {
            Outcome::Succeeded => stats.successful += 1,
            Outcome::Failed => stats.failed += 1,
        }
        *stats.usage.entry(intent.as_str().to_string()).or_insert(0) += 1;
    }

    /// Point-in-time copy of the counters
    pub fn snapshot(&self) -> RunStats {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, RunStats> {
        // counters stay valid even if a holder panicked mid-update
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
