use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use ragkit_core::config::Config;
use ragkit_core::data_processor::DataProcessor;
use ragkit_core::VectorIndex;
use ragkit_hybrid::{execute, render, ResponseFormat, RetrievalOrchestrator, SearchRequest};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "ragkit", version, about = "Chunk, index and query documents with hybrid retrieval")]
struct Args {
    /// TOML settings file; defaults to config.toml (+ config.<RUST_ENV>.toml) in the working directory.
    #[arg(long, short = 'c', value_name = "FILE", global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Chunk and index every .txt/.md file under a directory.
    Ingest {
        dir: PathBuf,
        /// Only ingest the first N files.
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Run a retrieval query.
    Query {
        text: String,
        #[arg(long, short = 'k')]
        k: Option<usize>,
        #[arg(long)]
        domain: Option<String>,
        /// JSON filter object, e.g. '{"category":"herbs"}'.
        #[arg(long)]
        filter: Option<String>,
        #[arg(long, conflicts_with = "no_rerank")]
        rerank: bool,
        #[arg(long)]
        no_rerank: bool,
        #[arg(long)]
        rerank_top_n: Option<usize>,
        #[arg(long)]
        json: bool,
    },
    /// Remove every chunk of a document.
    Delete { doc_id: String },
    /// Print index statistics.
    Stats,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    let settings = config.settings()?;
    let orchestrator = RetrievalOrchestrator::from_settings(&settings).await.context("failed to start retrieval pipeline")?;

    match args.command {
        Command::Ingest { dir, limit } => {
            let processor = limit.map_or_else(DataProcessor::new, DataProcessor::with_limit);
            let docs = processor.load_directory(&dir)?;
            println!("Ingesting {} documents from {}", docs.len(), dir.display());

            let pb = ProgressBar::new(docs.len() as u64);
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                    .progress_chars("=>-"),
            );
            let mut chunks = 0;
            for doc in &docs {
                pb.set_message(doc.id.clone());
                chunks += orchestrator.ingest(doc).await.with_context(|| format!("failed to ingest {}", doc.id))?.len();
                pb.inc(1);
            }
            pb.finish_with_message("done");
            info!(documents = docs.len(), chunks, dir = %dir.display(), "ingest finished");
            println!("✅ Ingest complete ({} documents, {} chunks)", docs.len(), chunks);
        }
        Command::Query { text, k, domain, filter, rerank, no_rerank, rerank_top_n, json } => {
            let filter = filter
                .as_deref()
                .map(serde_json::from_str::<serde_json::Value>)
                .transpose()
                .context("--filter must be a JSON object")?;
            let request = SearchRequest {
                query: text,
                k,
                filter,
                domain,
                rerank: match (rerank, no_rerank) {
                    (true, _) => Some(true),
                    (_, true) => Some(false),
                    _ => None,
                },
                rerank_top_n,
                format: if json { ResponseFormat::Json } else { ResponseFormat::Text },
            };
            let format = request.format;
            let response = execute(&orchestrator, request).await.map_err(|e| anyhow::anyhow!("{:?}: {}", e.kind, e.message))?;
            let out = render(&response, format).map_err(|e| anyhow::anyhow!(e.message))?;
            println!("{out}");
        }
        Command::Delete { doc_id } => {
            let removed = orchestrator.delete_document(&doc_id).await?;
            println!("Removed {removed} chunks of {doc_id}");
        }
        Command::Stats => {
            let index = orchestrator.index();
            let count = orchestrator.count().await?;
            println!("backend: {}", index.backend());
            println!("dim:     {}", index.dim());
            println!("filters: {:?}", index.filter_mode());
            println!("chunks:  {count}");
        }
    }
    Ok(())
}
