//! Core data models used throughout the assistant.
//!
//! These types represent the documents, chunks, and retrieval results that
//! flow through the summarize → index → search pipeline.

use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

/// Which data tree a document was loaded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RootKind {
    Raw,
    Summary,
}

impl RootKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RootKind::Raw => "raw",
            RootKind::Summary => "summary",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "raw" => Some(RootKind::Raw),
            "summary" => Some(RootKind::Summary),
            _ => None,
        }
    }
}

impl fmt::Display for RootKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A markdown file read from one of the data trees.
#[derive(Debug, Clone)]
pub struct Document {
    pub path: PathBuf,
    /// Path relative to its root, `/`-separated. Shared by a raw document
    /// and its summary.
    pub source: String,
    pub root: RootKind,
    pub content: String,
}

impl Document {
    /// Base file name, used as the chunk title.
    pub fn title(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Header values in effect at the start of a chunk.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HeaderPath {
    pub h1: Option<String>,
    pub h2: Option<String>,
    pub h3: Option<String>,
}

/// A header-bounded slice of a document, the unit stored in the index.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub id: String,
    pub source: String,
    pub title: String,
    pub root: RootKind,
    pub headers: HeaderPath,
    pub text: String,
    pub hash: String,
}

/// A chunk returned by nearest-neighbor search.
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub chunk_id: String,
    pub source: String,
    pub title: String,
    pub root: RootKind,
    pub score: f32,
    pub text: String,
}

/// One deduplicated document cited by a search.
#[derive(Debug, Clone)]
pub struct Reference {
    pub source: String,
    /// Summary text, `None` when no summary file exists.
    pub summary: Option<String>,
}
