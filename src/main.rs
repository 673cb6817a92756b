//! Cyber bot CLI
//!
//! Handles a single message given on the command line, or reads one message
//! per line from stdin until EOF or `quit`.

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use cyberbot_core::{BotConfig, Dispatcher, InMemoryPatternRepository, ResponseEnvelope, Result};

#[derive(Parser, Debug)]
#[command(name = "cyberbot", about = "Security assistant command dispatcher")]
struct Args {
    /// JSON array of attack-pattern records to search
    #[arg(long)]
    patterns: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the full response envelope as JSON
    #[arg(long)]
    json: bool,

    /// Message to handle; omit to read messages from stdin
    message: Vec<String>,
}

fn print_response(envelope: &ResponseEnvelope, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(envelope)?);
    } else {
        println!("{}\n", envelope.message);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("cyberbot_core=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config = match &args.config {
        Some(path) => BotConfig::load(path)?,
        None => BotConfig::from_env()?,
    };

    let repository = match &args.patterns {
        Some(path) => InMemoryPatternRepository::load(path)?,
        None => {
            tracing::warn!("no --patterns file given - searches will find nothing");
            InMemoryPatternRepository::default()
        }
    };
    tracing::info!(patterns = repository.len(), "pattern repository loaded");

    let dispatcher = Dispatcher::from_config(config, Arc::new(repository))?;

    if !args.message.is_empty() {
        let envelope = dispatcher.handle(&args.message.join(" ")).await;
        return print_response(&envelope, args.json);
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "quit" | "exit") {
            break;
        }
        let envelope = dispatcher.handle(line).await;
        print_response(&envelope, args.json)?;
    }

    let stats = dispatcher.bot_stats();
    tracing::info!(
        total = stats.total_commands,
        failed = stats.failed_commands,
        uptime = %stats.uptime,
        "session finished"
    );
    Ok(())
}
