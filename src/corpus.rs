//! Markdown corpus on disk: the raw tree, its mirrored summary tree, and the
//! path filter applied to both.
//!
//! A raw document at `<raw_dir>/foo/bar.md` and its summary at
//! `<summary_dir>/foo/bar.md` share the source identifier `foo/bar.md`.
//! That identifier is what the index stores and what search deduplicates on.

use anyhow::{bail, Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};
use regex::Regex;
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::models::{Document, RootKind};

const MARKDOWN_GLOB: &str = "**/*.md";

/// Path-exclusion rules.
///
/// Each pattern is a regular expression tested against the full path of a
/// file. Matching is anchored at the start of the path but does not need to
/// consume all of it, so `.*/Archive/.*` excludes anything under an
/// `Archive` directory.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    patterns: Vec<(String, Regex)>,
}

impl IgnoreFilter {
    pub fn new(patterns: &[String]) -> Result<Self> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&format!("^(?:{})", p))
                    .map(|re| (p.clone(), re))
                    .with_context(|| format!("Invalid ignore pattern: '{}'", p))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { patterns })
    }

    /// Returns the first pattern matching `path`, if any.
    pub fn matched(&self, path: &Path) -> Option<&str> {
        let path = path.to_string_lossy();
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(&path))
            .map(|(pattern, _)| pattern.as_str())
    }

    pub fn is_ignored(&self, path: &Path) -> bool {
        self.matched(path).is_some()
    }
}

/// Result of walking one data tree.
#[derive(Debug, Default)]
pub struct Discovery {
    /// Markdown files to process, sorted.
    pub files: Vec<PathBuf>,
    /// Markdown files excluded by an ignore pattern.
    pub ignored: Vec<PathBuf>,
}

/// The two data trees plus the ignore filter.
#[derive(Debug, Clone)]
pub struct Corpus {
    raw_dir: PathBuf,
    summary_dir: PathBuf,
    filter: IgnoreFilter,
}

impl Corpus {
    pub fn new(raw_dir: PathBuf, summary_dir: PathBuf, filter: IgnoreFilter) -> Self {
        Self {
            raw_dir,
            summary_dir,
            filter,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self::new(
            config.data.raw_dir.clone(),
            config.data.summary_dir.clone(),
            IgnoreFilter::new(&config.ingest.ignore_patterns)?,
        ))
    }

    pub fn raw_dir(&self) -> &Path {
        &self.raw_dir
    }

    pub fn summary_dir(&self) -> &Path {
        &self.summary_dir
    }

    pub fn filter(&self) -> &IgnoreFilter {
        &self.filter
    }

    pub fn root(&self, kind: RootKind) -> &Path {
        match kind {
            RootKind::Raw => &self.raw_dir,
            RootKind::Summary => &self.summary_dir,
        }
    }

    /// Map a file under either tree to `(tree, relative source)`.
    ///
    /// Returns `None` for paths outside both trees.
    pub fn relative_source(&self, path: &Path) -> Option<(RootKind, String)> {
        [RootKind::Raw, RootKind::Summary]
            .into_iter()
            .find_map(|kind| {
                path.strip_prefix(self.root(kind))
                    .ok()
                    .map(|rel| (kind, source_key(rel)))
            })
    }

    /// Mirrored summary location for a source identifier.
    pub fn summary_path(&self, source: &str) -> PathBuf {
        join_source(&self.summary_dir, source)
    }

    /// Original document location for a source identifier.
    pub fn raw_path(&self, source: &str) -> PathBuf {
        join_source(&self.raw_dir, source)
    }

    /// Walk one tree and collect its markdown files.
    ///
    /// A missing raw tree is an error; a missing summary tree simply means
    /// nothing has been summarized yet.
    pub fn discover(&self, kind: RootKind) -> Result<Discovery> {
        let root = self.root(kind);
        if !root.exists() {
            if kind == RootKind::Raw {
                bail!("Raw document directory does not exist: {}", root.display());
            }
            return Ok(Discovery::default());
        }

        let include_set = build_globset(&[MARKDOWN_GLOB.to_string()])?;
        let mut discovery = Discovery::default();

        for entry in WalkDir::new(root).follow_links(false) {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable directory entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }

            let path = entry.path();
            let relative = path.strip_prefix(root).unwrap_or(path);
            if !include_set.is_match(relative) {
                continue;
            }

            if let Some(pattern) = self.filter.matched(path) {
                tracing::info!(path = %path.display(), pattern, "ignoring file");
                discovery.ignored.push(path.to_path_buf());
                continue;
            }

            discovery.files.push(path.to_path_buf());
        }

        discovery.files.sort();
        discovery.ignored.sort();
        Ok(discovery)
    }

    /// Read every included markdown file in a tree.
    ///
    /// Files that cannot be read as UTF-8 text are skipped.
    pub fn load_documents(&self, kind: RootKind) -> Result<Vec<Document>> {
        let discovery = self.discover(kind)?;
        let root = self.root(kind);
        let mut documents = Vec::with_capacity(discovery.files.len());

        for path in discovery.files {
            let content = match std::fs::read_to_string(&path) {
                Ok(content) => content,
                Err(e) => {
                    tracing::debug!(path = %path.display(), error = %e, "skipping unreadable file");
                    continue;
                }
            };
            let source = source_key(path.strip_prefix(root).unwrap_or(&path));
            documents.push(Document {
                path,
                source,
                root: kind,
                content,
            });
        }

        Ok(documents)
    }
}

/// Normalize a relative path to a `/`-separated source identifier.
fn source_key(relative: &Path) -> String {
    relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn join_source(root: &Path, source: &str) -> PathBuf {
    source
        .split('/')
        .filter(|part| !part.is_empty() && *part != "." && *part != "..")
        .fold(root.to_path_buf(), |acc, part| acc.join(part))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}
