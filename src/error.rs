//! Error type shared by the classifier, collaborators and dispatcher

use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("invalid rule pattern '{pattern}': {source}")]
    InvalidRule {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("invalid parameters: {0}")]
    Parameters(String),

    #[error("repository error: {0}")]
    Repository(String),

    #[error("threat intel error: {0}")]
    ThreatIntel(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

pub type Result<T> = std::result::Result<T, BotError>;
