//! Query-time retrieval.
//!
//! A query is embedded, the nearest chunks are fetched from the store, and
//! the hits are collapsed to one [`Reference`] per source document (first
//! hit wins the position). Each reference carries the document's summary,
//! read fresh from the summary tree, and is rendered as
//!
//! ```text
//! Source: foo/bar.md
//!
//! <summary text>
//! ```
//!
//! with blocks separated by a `----` line. A missing summary file leaves
//! the block's text empty instead of failing the query.

use anyhow::Result;
use std::collections::HashSet;
use std::sync::Arc;

use crate::corpus::Corpus;
use crate::embedding::Embedder;
use crate::models::{Reference, SearchHit};
use crate::store::VectorStore;

pub const BLOCK_SEPARATOR: &str = "\n\n----\n\n";

/// Shared retrieval entry point used by the CLI and the agent's search tool.
pub struct Retriever {
    store: VectorStore,
    embedder: Arc<dyn Embedder>,
    corpus: Corpus,
}

impl Retriever {
    pub fn new(store: VectorStore, embedder: Arc<dyn Embedder>, corpus: Corpus) -> Self {
        Self {
            store,
            embedder,
            corpus,
        }
    }

    /// Deduplicated references for the `k` nearest chunks.
    pub async fn references(&self, query: &str, k: usize) -> Result<Vec<Reference>> {
        if query.trim().is_empty() {
            return Ok(Vec::new());
        }

        if self.store.meta().await?.is_none() {
            tracing::warn!("index is empty; run `wikiqa index` first");
            return Ok(Vec::new());
        }

        tracing::info!(query, k, "searching");
        let query_vec = self.embedder.embed_query(query).await?;
        let hits = self
            .store
            .nearest(&query_vec, self.embedder.model_name(), k)
            .await?;

        let references: Vec<Reference> = unique_sources(&hits)
            .into_iter()
            .map(|source| load_reference(&self.corpus, source))
            .collect();

        tracing::info!(hits = hits.len(), references = references.len(), "found references");
        Ok(references)
    }

    /// Search and render the references as one text block.
    pub async fn search(&self, query: &str, k: usize) -> Result<String> {
        let references = self.references(query, k).await?;
        Ok(format_references(&references))
    }
}

/// Distinct sources in first-seen order.
pub fn unique_sources(hits: &[SearchHit]) -> Vec<&str> {
    let mut seen = HashSet::new();
    hits.iter()
        .map(|hit| hit.source.as_str())
        .filter(|source| seen.insert(*source))
        .collect()
}

/// Resolve a source to its summary text.
pub fn load_reference(corpus: &Corpus, source: &str) -> Reference {
    let summary_path = corpus.summary_path(source);
    let summary = match std::fs::read_to_string(&summary_path) {
        Ok(text) => Some(text),
        Err(e) => {
            tracing::debug!(source, error = %e, "no summary for reference");
            None
        }
    };

    Reference {
        source: source.to_string(),
        summary,
    }
}

pub fn format_references(references: &[Reference]) -> String {
    references
        .iter()
        .map(|r| format!("Source: {}\n\n{}", r.source, r.summary.as_deref().unwrap_or("")))
        .collect::<Vec<_>>()
        .join(BLOCK_SEPARATOR)
}
