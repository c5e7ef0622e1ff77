//! Index build: summary tree + raw tree → chunks → embeddings → store.
//!
//! Both trees are loaded (summaries first), split on markdown headers, and
//! embedded in batches. Everything is written in a single store
//! transaction, so a failed build leaves the previous index intact.

use anyhow::{Context, Result};

use crate::chunk::split_document;
use crate::corpus::Corpus;
use crate::embedding::Embedder;
use crate::models::{Chunk, RootKind};
use crate::store::{VectorStore, WriteMode};

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexReport {
    pub summary_documents: usize,
    pub raw_documents: usize,
    pub chunks: usize,
    pub embedded: usize,
}

pub async fn build_index(
    corpus: &Corpus,
    store: &VectorStore,
    embedder: &dyn Embedder,
    batch_size: usize,
    mode: WriteMode,
) -> Result<IndexReport> {
    let mut report = IndexReport::default();
    let mut chunks: Vec<Chunk> = Vec::new();

    for kind in [RootKind::Summary, RootKind::Raw] {
        let documents = corpus.load_documents(kind)?;
        match kind {
            RootKind::Summary => report.summary_documents = documents.len(),
            RootKind::Raw => report.raw_documents = documents.len(),
        }
        for doc in &documents {
            chunks.extend(split_document(doc));
        }
    }
    report.chunks = chunks.len();

    tracing::info!(
        summaries = report.summary_documents,
        raw = report.raw_documents,
        chunks = report.chunks,
        model = embedder.model_name(),
        "building index"
    );

    let mut vectors: Vec<Vec<f32>> = Vec::with_capacity(chunks.len());
    for (batch_no, batch) in chunks.chunks(batch_size.max(1)).enumerate() {
        let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
        let embedded = embedder
            .embed(&texts)
            .await
            .with_context(|| format!("Embedding batch {} failed", batch_no + 1))?;
        tracing::debug!(batch = batch_no + 1, size = embedded.len(), "embedded batch");
        vectors.extend(embedded);
    }

    report.embedded = store
        .write(&chunks, &vectors, embedder.model_name(), embedder.dims(), mode)
        .await?;

    tracing::info!(embedded = report.embedded, "index written");
    Ok(report)
}
