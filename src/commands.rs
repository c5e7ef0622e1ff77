//! Command implementations behind the `wikiqa` CLI.
//!
//! Each `run_*` function builds the handles it needs from the configuration
//! exactly once (store, embedder, chat model) and prints a short
//! human-readable report.

use anyhow::{bail, Result};
use std::sync::Arc;

use crate::agent::{system_prompt, Agent};
use crate::config::Config;
use crate::corpus::Corpus;
use crate::embedding::create_embedder;
use crate::index::build_index;
use crate::llm::{ChatModel, OpenAiChat};
use crate::models::RootKind;
use crate::search::Retriever;
use crate::server::{self, AppState};
use crate::stats;
use crate::store::{VectorStore, WriteMode};
use crate::summarize::{build_summaries, Summarizer};
use crate::tools::ToolRegistry;

pub async fn run_init(config: &Config) -> Result<()> {
    let store = VectorStore::open(&config.db.path).await?;
    store.close().await;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_summarize(config: &Config, workers: Option<usize>) -> Result<()> {
    let workers = workers.unwrap_or(config.ingest.max_workers);
    if workers == 0 {
        bail!("--workers must be >= 1");
    }

    let corpus = Corpus::from_config(config)?;
    let discovery = corpus.discover(RootKind::Raw)?;

    println!("summarize");
    if discovery.files.is_empty() {
        println!("  found: 0");
        println!("  ignored: {}", discovery.ignored.len());
        println!("ok");
        return Ok(());
    }

    let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::summary_model(&config.llm)?);
    let summarizer = Arc::new(Summarizer::new(model, corpus, config.ingest.min_lines));
    let report = build_summaries(summarizer, workers).await?;

    println!("  found: {}", report.found);
    println!("  ignored: {}", report.ignored);
    println!("  summarized: {}", report.summarized);
    println!("  skipped (existing): {}", report.skipped_existing);
    println!("  skipped (too short): {}", report.skipped_short);
    println!("  failed: {}", report.failed);
    println!("ok");
    Ok(())
}

pub async fn run_index(config: &Config, append: bool) -> Result<()> {
    if !config.embedding.is_enabled() {
        bail!("Embedding provider is disabled; set embedding.provider to build the index");
    }
    let corpus = Corpus::from_config(config)?;
    let embedder = create_embedder(&config.embedding)?;
    let store = VectorStore::open(&config.db.path).await?;
    let mode = if append {
        WriteMode::Append
    } else {
        WriteMode::Replace
    };

    let report = build_index(
        &corpus,
        &store,
        embedder.as_ref(),
        config.embedding.batch_size,
        mode,
    )
    .await?;

    println!("index ({})", if append { "append" } else { "replace" });
    println!("  summary documents: {}", report.summary_documents);
    println!("  raw documents: {}", report.raw_documents);
    println!("  chunks: {}", report.chunks);
    println!("  embedded: {}", report.embedded);
    println!("  model: {}", embedder.model_name());
    println!("ok");

    store.close().await;
    Ok(())
}

pub async fn run_build(config: &Config, workers: Option<usize>) -> Result<()> {
    run_summarize(config, workers).await?;
    run_index(config, false).await
}

pub async fn run_search(config: &Config, query: &str, k: Option<usize>) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let store = VectorStore::open(&config.db.path).await?;
    let retriever = Retriever::new(
        store.clone(),
        create_embedder(&config.embedding)?,
        Corpus::from_config(config)?,
    );
    let text = retriever
        .search(query, k.unwrap_or(config.retrieval.top_k))
        .await?;

    if text.is_empty() {
        println!("No results.");
    } else {
        println!("{}", text);
    }

    store.close().await;
    Ok(())
}

pub async fn run_ask(config: &Config, query: &str) -> Result<()> {
    if query.trim().is_empty() {
        bail!("No query provided");
    }
    let agent = build_agent(config).await?;
    let answer = agent.answer(query, &[]).await?;
    println!("{}", answer);
    Ok(())
}

pub async fn run_serve(config: &Config) -> Result<()> {
    let state = AppState {
        assistant: Arc::new(config.assistant.clone()),
        agent: Arc::new(build_agent(config).await?),
    };
    server::run_server(&config.server, state).await
}

pub async fn run_status(config: &Config) -> Result<()> {
    let corpus = Corpus::from_config(config)?;
    let store = VectorStore::open(&config.db.path).await?;
    let status = stats::collect_status(&corpus, &store, &config.db.path).await?;
    stats::print_status(&corpus, &config.db.path, &status);
    store.close().await;
    Ok(())
}

/// Wire the agent: store + embedder → retriever → search tool, plus the
/// answering model and the assistant's system prompt.
pub async fn build_agent(config: &Config) -> Result<Agent> {
    let store = VectorStore::open(&config.db.path).await?;
    let retriever = Arc::new(Retriever::new(
        store,
        create_embedder(&config.embedding)?,
        Corpus::from_config(config)?,
    ));
    let tools = ToolRegistry::with_search(retriever, config.retrieval.top_k);
    let model: Arc<dyn ChatModel> = Arc::new(OpenAiChat::answer_model(&config.llm)?);

    tracing::info!(
        model = model.name(),
        provider = %config.llm.provider,
        "agent ready"
    );

    Ok(Agent::new(
        model,
        tools,
        system_prompt(&config.assistant.name, &config.assistant.description),
        config.llm.max_iterations,
    ))
}
