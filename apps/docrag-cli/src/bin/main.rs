use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser as _;
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, warn};

use docrag_core::config::RagConfig;
use docrag_core::error::{Error, ErrorCategory, Operation};
use docrag_embed::load_embedder;
use docrag_retrieve::{build_index, user_prompt, ContextAssembler, Retriever, SharedIndex};

#[derive(clap::Parser)]
#[command(name = "docrag")]
#[command(about = "Build a passage index over a document folder and query it")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Subcommand)]
enum Command {
    /// Ingest, chunk and embed the document folder, replacing the index
    Build {
        #[arg(long)]
        data_dir: Option<PathBuf>,
        #[arg(long)]
        index_dir: Option<PathBuf>,
        #[arg(long)]
        chunk_size: Option<usize>,
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Print the passages closest to a query
    Search {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Print the context and prompt a generator would receive for a query
    Context {
        query: String,
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
        /// Context bound in characters
        #[arg(long)]
        max_length: Option<usize>,
    },
}

fn main() -> ExitCode {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();

    let args = Args::parse();
    let operation = match args.command {
        Command::Build { .. } => Operation::Build,
        Command::Search { .. } | Command::Context { .. } => Operation::Query,
    };
    match run(args.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", operator_message(&err, operation));
            eprintln!("  caused by: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn operator_message(err: &anyhow::Error, operation: Operation) -> &'static str {
    let category = err.downcast_ref::<Error>().map(|e| e.category_in(operation)).unwrap_or(match operation {
        Operation::Build => ErrorCategory::BuildFailed,
        Operation::Query => ErrorCategory::QueryFailed,
    });
    category.operator_message()
}

fn load_config() -> Result<RagConfig> {
    let cwd = std::env::current_dir().context("cannot determine working directory")?;
    let config = RagConfig::load().context("failed to load configuration")?;
    Ok(config.resolve_paths(&cwd))
}

fn run(command: Command) -> Result<()> {
    let mut config = load_config()?;
    match command {
        Command::Build { data_dir, index_dir, chunk_size, overlap } => {
            if let Some(dir) = data_dir {
                config.data_dir = dir;
            }
            if let Some(dir) = index_dir {
                config.index_dir = dir;
            }
            if let Some(size) = chunk_size {
                config.chunk_size = size;
            }
            if let Some(overlap) = overlap {
                config.chunk_overlap = overlap;
            }
            build(config.validated()?)
        }
        Command::Search { query, top_k } => {
            if let Some(k) = top_k {
                config.top_k = k;
            }
            search(&config.validated()?, &query)
        }
        Command::Context { query, top_k, max_length } => {
            if let Some(k) = top_k {
                config.top_k = k;
            }
            if let Some(max) = max_length {
                config.max_context_chars = max;
            }
            context(&config.validated()?, &query)
        }
    }
}

fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}") {
        pb.set_style(style);
    }
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn build(config: RagConfig) -> Result<()> {
    let embedder = load_embedder(&config)?;
    info!(data_dir = %config.data_dir.display(), index_dir = %config.index_dir.display(), "building index");

    let pb = spinner("ingesting, chunking and embedding documents");
    let result = build_index(&config, embedder.as_ref());
    pb.finish_and_clear();
    let summary = result?;

    for skipped in &summary.skipped {
        warn!(path = %skipped.path.display(), reason = ?skipped.reason, "skipped file");
    }
    info!(
        chunks = summary.chunks,
        documents = summary.documents,
        dim = summary.dim,
        index_dir = %summary.index_dir.display(),
        "index built"
    );
    Ok(())
}

fn retriever(config: &RagConfig) -> Result<Retriever> {
    let artifact = SharedIndex::new(&config.index_dir).get()?;
    let embedder = load_embedder(config)?;
    Ok(Retriever::new(embedder, artifact))
}

fn search(config: &RagConfig, query: &str) -> Result<()> {
    let results = retriever(config)?.search(query, config.top_k)?;
    if results.is_empty() {
        println!("No results.");
    }
    for r in &results {
        let ext = if r.chunk.extension.is_empty() { "-" } else { r.chunk.extension.as_str() };
        println!("#{} score {:.4}  {} [{}] chunk {}", r.rank, r.score, r.chunk.source_name, ext, r.chunk.chunk_index);
        println!("   {}", r.preview(docrag_retrieve::pipeline::PREVIEW_CHARS).replace('\n', " "));
    }
    Ok(())
}

fn context(config: &RagConfig, query: &str) -> Result<()> {
    let results = retriever(config)?.search(query, config.top_k)?;
    let context = ContextAssembler::format(&results, config.max_context_chars);
    println!("{}", context.text);
    println!();
    println!(
        "-- {} of {} results included, {} characters{}",
        context.included_count,
        results.len(),
        context.text.chars().count(),
        if context.truncated { ", truncated" } else { "" }
    );
    println!();
    println!("{}", user_prompt(&context, query));
    Ok(())
}
