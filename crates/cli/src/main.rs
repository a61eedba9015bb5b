//! distill: summarize a local document with the map-reduce pipeline.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use distill_core::TokenCounter;
use distill_ingest::{chunker, document};
use distill_pipeline::{CallOptions, Pipeline, PipelineConfig, PromptTemplate, RetryPolicy};

/// Summarize a document (PDF, TXT, or MD) via map-reduce over an LLM.
#[derive(Parser, Debug)]
#[command(name = "distill", version, about)]
struct Cli {
    /// Path to the document to summarize.
    file: PathBuf,

    /// Maximum chunk size, in the configured counting unit.
    #[arg(long, env = "CHUNK_SIZE", default_value_t = 12000)]
    chunk_size: usize,

    /// Units repeated across adjacent chunk boundaries.
    #[arg(long, env = "CHUNK_OVERLAP", default_value_t = 0)]
    overlap: usize,

    /// Token budget per reduce-stage call.
    #[arg(long, env = "TOKEN_MAX", default_value_t = 16000)]
    token_max: usize,

    /// Concurrent completion calls.
    #[arg(long, env = "CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Counting unit: "words" or "chars".
    #[arg(long, env = "DISTILL_TOKENIZER", default_value = "words")]
    tokenizer: String,

    /// Retries per completion call after the first attempt.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 0)]
    max_retries: u32,

    /// Map prompt template file (built-in template if unset).
    #[arg(long, env = "MAP_PROMPT_PATH")]
    map_prompt: Option<String>,

    /// Reduce prompt template file (built-in template if unset).
    #[arg(long, env = "REDUCE_PROMPT_PATH")]
    reduce_prompt: Option<String>,

    /// Print each chunk before summarizing.
    #[arg(long)]
    show_chunks: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    distill_core::config::load_dotenv();
    let config = distill_core::Config::from_env();

    let counter = TokenCounter::parse(&cli.tokenizer)
        .with_context(|| format!("unknown tokenizer '{}'", cli.tokenizer))?;
    let chunk_config = chunker::ChunkConfig {
        max_size: cli.chunk_size,
        overlap: cli.overlap,
        counter,
    };

    let bytes = std::fs::read(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let filename = cli
        .file
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document.txt");

    let doc = document::extract_text(&bytes, filename)?;
    info!(
        "Extracted '{}' ({}): {} pages, {} chars",
        filename,
        doc.file_type,
        doc.pages.len(),
        doc.total_chars(),
    );
    if doc.total_chars() == 0 {
        anyhow::bail!("document contains no extractable text");
    }
    let text = doc.full_text();

    if cli.show_chunks {
        for chunk in chunker::split(&text, &chunk_config)? {
            println!(
                "--- chunk {} ({} {}) ---",
                chunk.ordinal,
                chunk.size,
                counter.label()
            );
            println!("{}", chunk.content);
        }
    }

    let provider = distill_llm::create_provider(&config.llm, &config.ollama)?;

    let map_prompt = match &cli.map_prompt {
        Some(path) => PromptTemplate::from_file(path)?,
        None => PromptTemplate::default_map(),
    };
    let reduce_prompt = match &cli.reduce_prompt {
        Some(path) => PromptTemplate::from_file(path)?,
        None => PromptTemplate::default_reduce(),
    };

    let pipeline_config = PipelineConfig {
        chunk: chunk_config,
        token_max: cli.token_max,
        concurrency: cli.concurrency.max(1),
        calls: CallOptions {
            temperature: config.llm.temperature,
            max_tokens: config.llm.max_tokens,
            retry: RetryPolicy {
                max_retries: cli.max_retries,
                ..RetryPolicy::default()
            },
        },
        map_prompt,
        reduce_prompt,
    };

    let pipeline = Pipeline::new(provider, pipeline_config);
    let result = pipeline.run(&text).await?;

    info!(
        chunks = result.stats.chunks,
        map_calls = result.stats.map_calls,
        reduce_calls = result.stats.reduce_calls,
        collapse_levels = result.stats.collapse_levels,
        "summarization finished"
    );

    println!("{}", result.summary);
    Ok(())
}
