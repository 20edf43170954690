//! CLI command implementations.
//!
//! Each `run_*` function backs one `gchat` subcommand, prints its result to
//! stdout, and returns `anyhow::Result` so `main` can report failures with
//! context and a non-zero exit code.

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::embedding::create_embedder;
use crate::index::VectorIndex;
use crate::runtime::{build_index, Runtime};
use crate::surface::TerminalSurface;

const EXAMPLE_CONFIG: &str = include_str!("../config/chat.example.toml");

/// Write a starter config file and create the data directory it points to.
pub fn run_init(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        );
    }
    if let Some(parent) = config_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    std::fs::write(config_path, EXAMPLE_CONFIG)
        .with_context(|| format!("writing {}", config_path.display()))?;
    std::fs::create_dir_all("data").context("creating ./data")?;

    println!("Wrote {}", config_path.display());
    println!("Put .md, .txt, .pdf, or .docx files under ./data, then run `gchat index`.");
    Ok(())
}

/// Load, chunk, and embed the corpus, reusing stored embeddings.
pub async fn run_index(config: &Config, rebuild: bool) -> Result<()> {
    let embedder = create_embedder(&config.embedding)?;
    let (index, report) = build_index(config, embedder, rebuild).await?;
    index.close().await;

    println!(
        "Indexed {} passages ({} embedded, {} reused, {} pruned).",
        report.total, report.embedded, report.reused, report.pruned
    );
    Ok(())
}

/// Print the top `k` passages for `query`.
pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    let runtime = Runtime::new(config.clone());
    let index = runtime.index().await?;
    let k = k.unwrap_or(config.retrieval.k);

    let hits = index.search(query, k).await?;
    if hits.is_empty() {
        println!("No results.");
        return Ok(());
    }
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. [{:.3}] {} @{}",
            i + 1,
            hit.score,
            hit.passage.source,
            hit.passage.offset
        );
        println!("   {}", hit.passage.text.replace('\n', " "));
    }
    Ok(())
}

/// Answer a single question and exit.
pub async fn run_ask(config: &Config, question: &str) -> Result<()> {
    let runtime = Runtime::new(config.clone());
    let assistant = runtime.assistant().await?;
    let mut session = assistant.new_session();
    let mut surface = TerminalSurface::new();
    assistant
        .run_turn(&mut session, question, &mut surface)
        .await?;
    Ok(())
}

/// Interactive terminal chat until `/exit` or end of input.
pub async fn run_chat(config: &Config) -> Result<()> {
    let runtime = Runtime::new(config.clone());
    let assistant = runtime.assistant().await?;
    let mut session = assistant.new_session();
    let mut surface = TerminalSurface::new();

    println!("{}", config.assistant.title_text());
    println!("Type /exit to quit.\n");
    assistant.chat_loop(&mut session, &mut surface).await?;
    tracing::info!(session = %session.id, messages = session.memory.len(), "session ended");
    Ok(())
}

/// Print what the index holds. Needs the embedding credential only to
/// resolve the model name.
pub async fn run_status(config: &Config) -> Result<()> {
    println!("Data root:   {}", config.data.root.display());
    println!("Index:       {}", config.index.path.display());

    if !config.index.path.exists() {
        println!("Status:      not built (run `gchat index`)");
        return Ok(());
    }

    let embedder = create_embedder(&config.embedding)?;
    let index = VectorIndex::open(&config.index.path, Arc::clone(&embedder), 1).await?;
    let status = index.status().await?;
    index.close().await;

    println!("Model:       {} ({} dims)", status.model, status.dims);
    println!("Passages:    {}", status.passages);
    println!("Documents:   {}", status.sources);
    println!("Size:        {} bytes", status.size_bytes);
    for (model, count) in &status.other_models {
        println!("Other model: {} ({} passages, unused)", model, count);
    }
    Ok(())
}
