//! # corpusd
//!
//! The `corpusd` binary runs the document corpus server: database
//! initialization and the combined HTTP front end + ingestion worker pool.
//!
//! ## Usage
//!
//! ```bash
//! corpusd --config ./config/corpus.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `corpusd init` | Create the SQLite database and run schema migrations |
//! | `corpusd serve` | Start the HTTP server and the ingestion worker pool |

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use doc_corpus::ai::{AiHandle, CollaboratorBuilder};
use doc_corpus::config::load_config;
use doc_corpus::extract::TikaExtractor;
use doc_corpus::pipeline::PipelineContext;
use doc_corpus::server::AppState;
use doc_corpus::{db, dispatch, migrate, server};

/// Document corpus server — ingests documents pushed by scanner agents
/// and answers retrieval-augmented queries over them.
#[derive(Parser)]
#[command(
    name = "corpusd",
    about = "Document corpus ingestion and RAG query server",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/corpus.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema.
    ///
    /// Creates the SQLite database file and the documents table. This
    /// command is idempotent — running it multiple times is safe.
    Init,

    /// Start the HTTP server and the ingestion worker pool.
    ///
    /// Queued jobs left behind by a previous run are redelivered to the
    /// workers before the server starts accepting requests.
    Serve,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Init => {
            let pool = db::connect(&config).await?;
            migrate::run(&pool).await?;
            pool.close().await;
            println!("database initialized at {}", config.db.path.display());
            Ok(())
        }
        Commands::Serve => serve(config).await,
    }
}

async fn serve(config: doc_corpus::config::Config) -> Result<()> {
    let config = Arc::new(config);
    let pool = db::connect(&config).await?;

    let extractor = Arc::new(TikaExtractor::new(&config.extraction)?);
    let ai = Arc::new(AiHandle::new(Box::new(CollaboratorBuilder::new(
        config.embedding.clone(),
        config.vector.clone(),
        config.generation.clone(),
    ))));

    let (dispatcher, receiver) = dispatch::queue(config.dispatch.queue_capacity);

    let ctx = Arc::new(PipelineContext {
        pool: pool.clone(),
        extractor,
        ai: Arc::clone(&ai),
        chunking: config.chunking.clone(),
    });

    tokio::spawn(dispatch::run_workers(
        ctx,
        receiver,
        config.dispatch.workers,
    ));

    // Redeliver jobs that were queued when the previous process stopped.
    dispatch::requeue_pending(&pool, &dispatcher).await?;

    let state = AppState::new(config, pool, ai, dispatcher)?;
    server::run_server(state).await
}
