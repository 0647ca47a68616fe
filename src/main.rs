//! # schema-search CLI
//!
//! Find the database tables relevant to a natural-language question.
//!
//! ```bash
//! schema-search --config ./config/schema-search.toml search "customer emails"
//! schema-search --snapshot ./schema.json related orders --hops 2
//! schema-search serve
//! ```
//!
//! | Command | Description |
//! |---------|-------------|
//! | `search "<query>"` | Rank tables for a query |
//! | `related <table>` | List tables reachable through foreign keys |
//! | `chunks` | Print the generated text chunks |
//! | `serve` | Start the HTTP server |

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use schema_search::config::{load_config, Config};
use schema_search::{logging, search, server};

/// Hybrid BM25 + vector search over database schemas.
#[derive(Parser)]
#[command(name = "schema-search", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/schema-search.toml")]
    config: PathBuf,

    /// Schema snapshot JSON. Overrides `[snapshot] path`; without a config
    /// file, runs with fuzzy search defaults.
    #[arg(long, global = true)]
    snapshot: Option<PathBuf>,

    /// Log at debug level unless SCHEMA_SEARCH_LOG says otherwise.
    #[arg(long, short, global = true)]
    verbose: bool,

    /// Emit logs as JSON lines on stderr.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Rank tables for a natural-language query.
    Search {
        query: String,

        /// Maximum number of tables to return.
        #[arg(long)]
        limit: Option<usize>,

        /// Relationship hops for related tables.
        #[arg(long)]
        hops: Option<usize>,

        /// Override `[search] strategy`.
        #[arg(long, value_parser = ["semantic", "fuzzy"])]
        strategy: Option<String>,

        /// Show the score breakdown of each result.
        #[arg(long)]
        explain: bool,

        /// Print results as JSON.
        #[arg(long)]
        json: bool,

        /// Re-embed all chunks instead of using `[embedding] cache_dir`.
        #[arg(long)]
        reindex: bool,
    },

    /// List tables related to a table through foreign keys.
    Related {
        table: String,

        #[arg(long)]
        hops: Option<usize>,
    },

    /// Print generated chunks.
    Chunks {
        /// Only chunks for this table.
        #[arg(long)]
        table: Option<String>,
    },

    /// Start the HTTP server on `[server] bind`.
    Serve {
        /// Re-embed all chunks instead of using `[embedding] cache_dir`.
        #[arg(long)]
        reindex: bool,
    },
}

fn resolve_config(path: &Path, snapshot: Option<PathBuf>) -> Result<Config> {
    match snapshot {
        Some(snapshot) if path.exists() => {
            let mut config = load_config(path)?;
            config.snapshot.path = snapshot;
            Ok(config)
        }
        Some(snapshot) => Ok(Config::minimal(snapshot)),
        None => load_config(path),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_json);

    let mut config = resolve_config(&cli.config, cli.snapshot)?;

    match cli.command {
        Commands::Search {
            query,
            limit,
            hops,
            strategy,
            explain,
            json,
            reindex,
        } => {
            if let Some(s) = strategy {
                config.search.strategy = s;
                config.validate()?;
            }
            if limit == Some(0) {
                bail!("--limit must be >= 1");
            }
            let defaults = config.search.options();
            let opts = schema_search_core::strategy::SearchOptions {
                limit: limit.unwrap_or(defaults.limit),
                hops: hops.unwrap_or(defaults.hops),
                explain,
            };
            search::run_search(config, &query, opts, json, reindex).await?;
        }
        Commands::Related { table, hops } => {
            let hops = hops.unwrap_or(config.search.hops);
            search::run_related(&config, &table, hops).await?;
        }
        Commands::Chunks { table } => {
            search::run_chunks(&config, table.as_deref()).await?;
        }
        Commands::Serve { reindex } => {
            server::run_server(config, reindex).await?;
        }
    }

    Ok(())
}
