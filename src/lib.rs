//! Cyber bot core - intent classification and command dispatch
//!
//! Turns free-form operator messages ("check md5 <hash>", "search process
//! injection", "stats") into typed commands, routes them to handlers backed
//! by a pattern repository and a threat-intel service, and always answers
//! with a [`ResponseEnvelope`].

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod keywords;
pub mod matcher;
pub mod params;
pub mod parser;
pub mod render;
pub mod repository;
pub mod stats;
pub mod threat_intel;
pub mod types;

pub use config::{BotConfig, VirusTotalConfig};
pub use dispatcher::{BotStats, Dispatcher};
pub use error::{BotError, Result};
pub use matcher::{Classification, CommandClassifier, MatchHandle, RuleEntry, RuleSpec};
pub use params::ParameterExtractor;
pub use parser::{CommandParser, ParsedCommand};
pub use repository::{AttackPattern, InMemoryPatternRepository, PatternRepository};
pub use stats::{RunStats, StatsTracker};
pub use threat_intel::{DetectionPolicy, ThreatIntelClient, ThreatReport, VirusTotalClient};
pub use types::*;

// Python bindings
#[cfg(feature = "extension-module")]
pub mod py;

#[cfg(feature = "extension-module")]
use pyo3::prelude::*;

#[cfg(feature = "extension-module")]
#[pymodule]
fn cyberbot_core(m: &Bound<'_, PyModule>) -> PyResult<()> {
    use py::*;
    m.add_class::<PyCommandParser>()?;
    m.add_function(wrap_pyfunction!(py_classify, m)?)?;
    Ok(())
}
