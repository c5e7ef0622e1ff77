//! # wikiqa CLI
//!
//! The `wikiqa` binary drives the whole pipeline: summarizing the raw wiki,
//! building the vector index, querying it, and serving the chat API.
//!
//! ## Usage
//!
//! ```bash
//! wikiqa --config ./config/wikiqa.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `wikiqa init` | Create the SQLite index database |
//! | `wikiqa summarize` | Write a summary for every raw document that lacks one |
//! | `wikiqa index` | Chunk, embed, and store both trees |
//! | `wikiqa build` | `summarize` followed by `index` |
//! | `wikiqa search "<query>"` | Print the references retrieved for a query |
//! | `wikiqa ask "<question>"` | Answer one question with the agent |
//! | `wikiqa serve` | Start the HTTP API and frontend |
//! | `wikiqa status` | Show corpus and index counts |
//!
//! ## Examples
//!
//! ```bash
//! # Summarize with 8 concurrent workers, then rebuild the index
//! wikiqa build --workers 8
//!
//! # Inspect what the search tool would hand the model
//! wikiqa search "node pool upgrade" --k 10
//!
//! # Serve the frontend on [server].bind
//! wikiqa serve
//! ```

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

use wikiqa::commands;
use wikiqa::config::{self, Config};

/// Question answering over an internal markdown wiki.
///
/// Without `--config`, `./config/wikiqa.toml` is used when present and
/// built-in defaults otherwise. See `config/wikiqa.example.toml`.
#[derive(Parser)]
#[command(name = "wikiqa", version, about)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the index database and its schema.
    Init,

    /// Summarize raw documents that do not have a summary yet.
    Summarize {
        /// Concurrent summarization requests (overrides `[ingest].max_workers`).
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Build the vector index from the summary and raw trees.
    Index {
        /// Add to the existing index instead of replacing it.
        #[arg(long)]
        append: bool,
    },

    /// Summarize, then rebuild the index.
    Build {
        /// Concurrent summarization requests (overrides `[ingest].max_workers`).
        #[arg(long)]
        workers: Option<usize>,
    },

    /// Print the references retrieved for a query.
    Search {
        /// Query text.
        query: String,

        /// Number of nearest chunks to retrieve (overrides `[retrieval].top_k`).
        #[arg(long)]
        k: Option<usize>,
    },

    /// Answer a single question.
    Ask {
        /// The question.
        query: String,
    },

    /// Start the HTTP server.
    Serve,

    /// Show corpus and index status.
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let cfg = config::resolve_config(cli.config.as_deref())?;
    init_logging(&cfg)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Summarize { workers } => commands::run_summarize(&cfg, workers).await?,
        Commands::Index { append } => commands::run_index(&cfg, append).await?,
        Commands::Build { workers } => commands::run_build(&cfg, workers).await?,
        Commands::Search { query, k } => commands::run_search(&cfg, &query, k).await?,
        Commands::Ask { query } => commands::run_ask(&cfg, &query).await?,
        Commands::Serve => commands::run_serve(&cfg).await?,
        Commands::Status => commands::run_status(&cfg).await?,
    }

    Ok(())
}

/// Logs go to stderr, or to `[logging].file` when set, so stdout stays
/// reserved for command output.
fn init_logging(cfg: &Config) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.logging.default_level(cfg.server.debug)));

    match &cfg.logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
    Ok(())
}
