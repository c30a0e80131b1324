//! # Dockeep CLI (`dockeep`)
//!
//! The `dockeep` binary drives the two pipelines: organizing documents in
//! the cloud file store into category folders, and answering questions
//! over locally ingested documents.
//!
//! ## Usage
//!
//! ```bash
//! dockeep --config ./config/dockeep.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `dockeep organize` | Classify unorganized files and move them into category folders |
//! | `dockeep reconcile` | Merge near-duplicate category folders |
//! | `dockeep prune` | Delete empty folders |
//! | `dockeep ingest <dir>` | Chunk, embed, and index documents from a local directory |
//! | `dockeep ask "<question>"` | Answer a question from the indexed documents |
//! | `dockeep chunks "<query>"` | Show the chunks most similar to a query |

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dockeep::classify::Classifier;
use dockeep::config;
use dockeep::embedding::create_embedder;
use dockeep::error::QaError;
use dockeep::genai::{GeminiProvider, GenAi};
use dockeep::ingest::ingest_directory;
use dockeep::ocr::create_ocr;
use dockeep::organizer::{self, Organizer};
use dockeep::rag::RagEngine;
use dockeep::storage::create_storage;

/// Document organization and question answering over a cloud file store.
///
/// All commands accept a `--config` flag pointing to a TOML configuration
/// file. See `config/dockeep.example.toml` for a full example.
#[derive(Parser)]
#[command(
    name = "dockeep",
    about = "Classify cloud documents into folders and answer questions over them",
    version
)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/dockeep.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level CLI commands.
#[derive(Subcommand)]
enum Commands {
    /// Classify unorganized files and move them into category folders.
    ///
    /// Lists candidate files, asks the generative model for a category per
    /// file, then resolves each distinct category to a folder (fuzzy match
    /// against existing folders, created when nothing matches) and moves
    /// the files. Files that cannot be read or classified land in the
    /// Uncategorized folder.
    Organize {
        /// Classify and report without resolving folders or moving files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Merge near-duplicate category folders.
    ///
    /// Clusters folders whose normalized names are similar, moves every
    /// file from the duplicates into the cluster's canonical folder, and
    /// deletes the emptied duplicates.
    Reconcile,

    /// Delete folders with no children.
    ///
    /// Run after `reconcile` in a maintenance cycle. Idempotent.
    Prune,

    /// Ingest documents from a local directory into the vector index.
    ///
    /// Walks the directory, extracts text from files matching the
    /// configured include globs, chunks and embeds them, and appends the
    /// chunks to the persistent index.
    Ingest {
        /// Directory to ingest.
        dir: PathBuf,
    },

    /// Answer a question from the indexed documents.
    ///
    /// Retrieves the most similar chunks, feeds them to the generative
    /// model as grounding context, and prints the answer with its sources.
    Ask {
        /// The question to answer.
        question: String,
    },

    /// Show the indexed chunks most similar to a query.
    Chunks {
        /// The query to match against.
        query: String,

        /// Number of chunks to return (defaults to the configured top_k).
        #[arg(short, long)]
        k: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dockeep=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Organize { dry_run } => {
            let storage = create_storage(&cfg.storage)?;
            let genai: Arc<dyn GenAi> = Arc::new(GeminiProvider::new(&cfg.classifier)?);
            let organizer = Organizer::new(
                storage,
                Classifier::new(genai),
                create_ocr(&cfg.ocr),
                cfg.organizer.clone(),
            );

            let report = organizer.run_batch(dry_run).await?;
            if dry_run {
                println!("organize (dry-run)");
            } else {
                println!("organize");
            }
            println!("  files found: {}", report.files_found);
            println!("  classified: {}", report.classified);
            println!("  moved: {}", report.moved);
            println!("  folders created: {}", report.folders_created);
            if !report.uncategorized.is_empty() {
                println!("  uncategorized: {}", report.uncategorized.len());
                for name in &report.uncategorized {
                    println!("    - {}", name);
                }
            }
        }
        Commands::Reconcile => {
            let storage = create_storage(&cfg.storage)?;

            let report =
                organizer::reconcile(storage.as_ref(), cfg.organizer.merge_cutoff).await?;
            println!("reconcile");
            println!("  duplicate clusters: {}", report.clusters);
            println!("  folders merged: {}", report.folders_merged);
            println!("  files moved: {}", report.files_moved);
            println!("  subfolders moved: {}", report.folders_moved);
        }
        Commands::Prune => {
            let storage = create_storage(&cfg.storage)?;

            let report = organizer::prune(storage.as_ref()).await?;
            println!("prune");
            println!("  folders checked: {}", report.folders_checked);
            println!("  folders deleted: {}", report.folders_deleted);
        }
        Commands::Ingest { dir } => {
            let mut engine = RagEngine::new(create_embedder(&cfg.embedding)?, &cfg);
            engine.load_index().await?;

            let ocr = create_ocr(&cfg.ocr);
            let report =
                ingest_directory(&mut engine, ocr.as_ref(), &dir, &cfg.ingest.include_globs)
                    .await?;

            println!("ingest {}", dir.display());
            println!("  files found: {}", report.files_found);
            println!("  files ingested: {}", report.files_ingested);
            println!("  chunks indexed: {}", report.chunks_indexed);
            if !report.skipped.is_empty() {
                println!("  skipped: {}", report.skipped.len());
                for name in &report.skipped {
                    println!("    - {}", name);
                }
            }
            if let Ok(total) = engine.index_size().await {
                println!("  index total: {}", total);
            }
            engine.close().await;
        }
        Commands::Ask { question } => {
            let genai: Arc<dyn GenAi> = Arc::new(GeminiProvider::new(&cfg.classifier)?);
            let mut engine =
                RagEngine::new(create_embedder(&cfg.embedding)?, &cfg).with_genai(genai);
            engine.load_index().await?;

            match engine.answer(&question).await {
                Ok(answer) => {
                    println!("{}", answer.answer);
                    if !answer.source_documents.is_empty() {
                        println!();
                        println!("sources:");
                        for chunk in &answer.source_documents {
                            let source = chunk
                                .metadata
                                .get("source")
                                .and_then(|s| s.as_str())
                                .unwrap_or("unknown");
                            println!("  - {} (score {:.3})", source, chunk.score);
                        }
                    }
                }
                Err(QaError::IndexNotInitialized) => {
                    eprintln!("No index found. Run `dockeep ingest <dir>` first.");
                    std::process::exit(1);
                }
                Err(QaError::Other(e)) => return Err(e),
            }
            engine.close().await;
        }
        Commands::Chunks { query, k } => {
            let mut engine = RagEngine::new(create_embedder(&cfg.embedding)?, &cfg);
            engine.load_index().await?;

            let k = k.unwrap_or(cfg.retrieval.top_k);
            match engine.relevant_chunks(&query, k).await {
                Ok(chunks) => {
                    for (i, chunk) in chunks.iter().enumerate() {
                        let source = chunk
                            .metadata
                            .get("source")
                            .and_then(|s| s.as_str())
                            .unwrap_or("unknown");
                        println!("[{}] score {:.3} source {}", i + 1, chunk.score, source);
                        println!("{}", chunk.text);
                        println!();
                    }
                }
                Err(QaError::IndexNotInitialized) => {
                    eprintln!("No index found. Run `dockeep ingest <dir>` first.");
                    std::process::exit(1);
                }
                Err(QaError::Other(e)) => return Err(e),
            }
            engine.close().await;
        }
    }

    Ok(())
}
