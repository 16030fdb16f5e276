mod cli;
mod config;
mod db;
mod embedding;
mod error;
mod memory;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mnemo", version, about = "Long-horizon memory archival and retrieval engine")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Semantic search across archived collections
    Search {
        query: String,
        /// Collection to search; repeat for a set, omit for all
        #[arg(long = "scope")]
        scope: Vec<String>,
        /// Maximum results to return
        #[arg(long)]
        n: Option<usize>,
        /// Minimum similarity floor (0.0 - 1.0)
        #[arg(long)]
        min_similarity: Option<f64>,
    },
    /// Archive and truncate oversized log sources
    Rollover {
        /// Specific source to roll; omit for all log sources
        source: Option<String>,
    },
    /// Show per-source sizes, limits, and backlog
    IntakeStatus,
    /// Run one full intake sweep over every enabled source
    IntakeProcess,
    /// Search stored fragments and show their signatures
    Fragments {
        query: String,
        #[arg(long)]
        n: Option<usize>,
    },
    /// Exercise the associative surfacing path against live text
    HookTest {
        text: String,
        /// Session identifier for the surfacing gates
        #[arg(long, default_value = "hook-test")]
        session: String,
        /// Current turn number within the session
        #[arg(long, default_value_t = 100)]
        turn: u64,
    },
    /// Manage the embedding model
    Model {
        #[command(subcommand)]
        action: ModelAction,
    },
}

#[derive(Subcommand)]
enum ModelAction {
    /// Download the embedding model to the cache directory
    Download,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = config::MnemoConfig::load()?;

    // Log to stderr so stdout stays clean for command output.
    let filter =
        EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    // Partial success (some sources ok, one failed) prints per-source
    // results and still exits non-zero.
    let ok = match cli.command {
        Command::Search {
            query,
            scope,
            n,
            min_similarity,
        } => {
            cli::search::search(&config, &query, &scope, n, min_similarity).await?;
            true
        }
        Command::Rollover { source } => cli::rollover::rollover(&config, source.as_deref()).await?,
        Command::IntakeStatus => {
            cli::intake::status(&config)?;
            true
        }
        Command::IntakeProcess => cli::intake::process(&config).await?,
        Command::Fragments { query, n } => {
            cli::fragments::fragments(&config, &query, n).await?;
            true
        }
        Command::HookTest { text, session, turn } => {
            cli::hook_test::hook_test(&config, &text, &session, turn)?;
            true
        }
        Command::Model { action } => match action {
            ModelAction::Download => {
                cli::model_download(&config.embedding).await?;
                true
            }
        },
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}
