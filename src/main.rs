//! # Product Query Bot CLI (`pqb`)
//!
//! ## Usage
//!
//! ```bash
//! pqb --config ./config/pqb.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pqb index` | Build the vector index snapshot from the corpus |
//! | `pqb query "<text>"` | Answer one question from the command line |
//! | `pqb serve` | Start the HTTP server |
//!
//! Log verbosity is controlled by `PQB_LOG` (e.g. `PQB_LOG=debug`).

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use product_query_bot::config::{self, Config};
use product_query_bot::index::{build_index, load_index, SharedIndex};
use product_query_bot::pipeline::{ConfiguredResolver, Pipeline};
use product_query_bot::server;

const DEFAULT_CONFIG_PATH: &str = "./config/pqb.toml";

/// Product Query Bot: answer product questions from a local corpus.
#[derive(Parser)]
#[command(
    name = "pqb",
    about = "Product Query Bot — retrieval-augmented answers over product descriptions",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/pqb.toml`; built-in defaults are used when
    /// that file does not exist.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the vector index snapshot.
    ///
    /// Loads every product file in the corpus, chunks and embeds it, and
    /// replaces the snapshot at `[index].store_path`.
    Index {
        /// Corpus directory (overrides `[index].corpus_dir`).
        #[arg(long)]
        corpus: Option<PathBuf>,
    },

    /// Answer a single question against the existing snapshot.
    Query {
        /// The question to ask.
        query: String,

        /// User identifier echoed in `--json` output.
        #[arg(long, default_value = "cli")]
        user_id: String,

        /// Print the full `{ user_id, query, response }` record as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Start the HTTP server on `[server].bind`.
    Serve,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("PQB_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => config::load_config(path)?,
        None => config::load_config_or_default(Path::new(DEFAULT_CONFIG_PATH))?,
    };

    match cli.command {
        Commands::Index { corpus } => {
            run_index(&cfg, corpus).await?;
        }
        Commands::Query {
            query,
            user_id,
            json,
        } => {
            run_query(&cfg, &query, &user_id, json).await?;
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}

async fn run_index(cfg: &Config, corpus: Option<PathBuf>) -> anyhow::Result<()> {
    let corpus = corpus.unwrap_or_else(|| cfg.index.corpus_dir.clone());
    let embedder = ConfiguredResolver::from_config(cfg).embedding_provider();

    let built = build_index(&corpus, &cfg.index.store_path, cfg, &embedder).await?;
    let manifest = built.index.manifest();

    println!("Index build complete:");
    println!("  corpus:    {}", corpus.display());
    println!("  snapshot:  {}", built.snapshot_path.display());
    println!("  documents: {}", manifest.document_count);
    println!("  chunks:    {}", manifest.chunk_count);
    println!("  provider:  {}", manifest.fingerprint);
    println!("  dims:      {}", manifest.dims);
    Ok(())
}

async fn run_query(cfg: &Config, query: &str, user_id: &str, json: bool) -> anyhow::Result<()> {
    let index = SharedIndex::new(Some(load_index(&cfg.index.store_path)?));
    let pipeline = Pipeline::new(
        cfg,
        index,
        Arc::new(ConfiguredResolver::from_config(cfg)),
    );

    let state = pipeline.run(query).await?;

    if json {
        let record = server::QueryResponse {
            user_id: user_id.to_string(),
            query: state.query,
            response: state.response,
        };
        println!("{}", serde_json::to_string_pretty(&record)?);
    } else {
        println!("{}", state.response);
    }
    Ok(())
}
