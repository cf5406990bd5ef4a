//! # Pagewise CLI (`pagewise`)
//!
//! ## Usage
//!
//! ```bash
//! pagewise --config ./config/pagewise.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `pagewise split <file>` | Print the chunks of a document as JSON |
//! | `pagewise pages <file>` | Print the per-page extraction report |
//! | `pagewise ingest <file>` | Embed a document into an in-memory index, optionally ask a question |
//! | `pagewise serve` | Start the HTTP API |
//!
//! ## Examples
//!
//! ```bash
//! # Chunk a contract, one page at a time
//! pagewise split ./contract.pdf
//!
//! # Chunk all pages as one text
//! pagewise split ./contract.pdf --mode combined
//!
//! # Ingest and ask in one go (needs embedding and answer providers)
//! pagewise ingest ./contract.pdf --ask "What is the total amount?"
//! ```
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use pagewise::answer::ask;
use pagewise::config::{self, Config};
use pagewise::extract::{
    default_document_id, page_report, DocumentSource, ExtractOptions, ExtractingPageSource, PageSource,
};
use pagewise::ingest::{split_with_mode, IngestMode, IngestRequest};
use pagewise::server;
use pagewise::services::{build_splitter, Services};
use pagewise_core::embedding::EmbedderCache;

const DEFAULT_CONFIG: &str = "./config/pagewise.toml";

/// Pagewise: page-aware PDF chunking, embedding, and question answering.
///
/// `--config` points to a TOML file; without it `./config/pagewise.toml`
/// is used when present, built-in defaults otherwise.
#[derive(Parser)]
#[command(name = "pagewise", version, about)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum ModeArg {
    Pages,
    Combined,
    Spans,
}

impl From<ModeArg> for IngestMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Pages => IngestMode::Pages,
            ModeArg::Combined => IngestMode::Combined,
            ModeArg::Spans => IngestMode::Spans,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Split a document into chunks and print them as JSON.
    ///
    /// Accepts `.pdf`, `.txt`/`.text`/`.md` (form feeds separate pages),
    /// and `.json` page lists.
    Split {
        file: PathBuf,

        /// Document id; defaults to the file stem.
        #[arg(long)]
        id: Option<String>,

        /// Overrides `[ingest].mode`.
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },

    /// Print the per-page extraction report as JSON.
    Pages {
        file: PathBuf,

        #[arg(long)]
        id: Option<String>,

        /// Omit page text from the report.
        #[arg(long)]
        no_content: bool,
    },

    /// Ingest a document into an in-memory index and print the report.
    ///
    /// With `--ask`, answers the question from the freshly built index.
    Ingest {
        file: PathBuf,

        #[arg(long)]
        id: Option<String>,

        #[arg(long)]
        ask: Option<String>,
    },

    /// Start the HTTP API on `[server].bind`.
    Serve,
}

fn load(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => config::load_config(path),
        None if Path::new(DEFAULT_CONFIG).exists() => config::load_config(Path::new(DEFAULT_CONFIG)),
        None => Ok(Config::default()),
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let cfg = load(cli.config.as_deref())?;

    match cli.command {
        Commands::Split { file, id, mode } => {
            let document_id = id.unwrap_or_else(|| default_document_id(&file));
            let mode = match mode {
                Some(mode) => IngestMode::from(mode),
                None => cfg.ingest.mode.parse()?,
            };
            let options = ExtractOptions::from(&cfg.extract);

            // Extraction and semantic splitting block; keep them off the runtime.
            let chunks = tokio::task::spawn_blocking(move || -> Result<_> {
                let splitter = build_splitter(&cfg, Arc::new(EmbedderCache::new()))?;
                let pages = ExtractingPageSource
                    .load_pages(&DocumentSource::new(&file), &document_id)
                    .with_context(|| format!("Failed to extract {}", file.display()))?;
                let pages = options.select(pages);
                Ok(split_with_mode(&splitter, &pages, &document_id, mode))
            })
            .await??;

            print_json(&chunks)?;
        }
        Commands::Pages {
            file,
            id,
            no_content,
        } => {
            let document_id = id.unwrap_or_else(|| default_document_id(&file));
            let source = DocumentSource::new(&file);
            let doc = document_id.clone();
            let pages = tokio::task::spawn_blocking(move || ExtractingPageSource.load_pages(&source, &doc))
                .await?
                .with_context(|| format!("Failed to extract {}", file.display()))?;

            let options = ExtractOptions::from(&cfg.extract);
            print_json(&page_report(&document_id, pages, &options, !no_content))?;
        }
        Commands::Ingest { file, id, ask: question } => {
            let services = Services::from_config(&cfg)?;
            let Some(pipeline) = services.pipeline()? else {
                bail!("ingest requires an embedding provider; set [embedding].provider");
            };

            let document_id = id.unwrap_or_else(|| default_document_id(&file));
            let report = pipeline
                .ingest(IngestRequest {
                    source: DocumentSource::new(&file),
                    document_id: document_id.clone(),
                    filename: file.file_name().map(|n| n.to_string_lossy().into_owned()),
                })
                .await?;
            print_json(&report)?;
            if !report.is_ok() {
                bail!("ingestion of {} failed", document_id);
            }

            if let Some(question) = question {
                let response = ask(
                    pipeline.index().as_ref(),
                    services.answerer.as_deref(),
                    services.ask_settings(),
                    &question,
                    &document_id,
                )
                .await?;
                print_json(&response)?;
            }
        }
        Commands::Serve => {
            server::run_server(&cfg).await?;
        }
    }

    Ok(())
}
