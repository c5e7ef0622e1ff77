//! Summary generation for the raw document tree.
//!
//! Each raw markdown document gets at most one summary, written to the same
//! relative path under the summary tree. Summaries are never regenerated:
//! an existing summary file short-circuits the work before the source is
//! even read.
//!
//! [`build_summaries`] runs the summarizer over every discovered file with a
//! bounded number of concurrent model calls. A failure on one file is logged
//! and counted; the rest of the batch continues.

use anyhow::{bail, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::corpus::Corpus;
use crate::llm::ChatModel;
use crate::models::RootKind;

const SUMMARY_INSTRUCTIONS: &str = "You are a helpful assistant that creates concise summaries of technical documents.
Please create a concise summary of the following document. Focus on the main points and key information.

DOCUMENT:
";

/// Build the summarization prompt for one document.
pub fn summary_prompt(content: &str) -> String {
    format!("{}{}\n", SUMMARY_INSTRUCTIONS, content)
}

/// What happened to a single file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SummaryOutcome {
    Summarized,
    /// A summary was already present.
    SkippedExisting,
    /// Too few non-empty lines to be worth summarizing.
    SkippedShort,
}

/// Counts from one [`build_summaries`] run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SummaryReport {
    pub found: usize,
    pub ignored: usize,
    pub summarized: usize,
    pub skipped_existing: usize,
    pub skipped_short: usize,
    pub failed: usize,
}

pub struct Summarizer {
    model: Arc<dyn ChatModel>,
    corpus: Corpus,
    min_lines: usize,
}

impl Summarizer {
    pub fn new(model: Arc<dyn ChatModel>, corpus: Corpus, min_lines: usize) -> Self {
        Self {
            model,
            corpus,
            min_lines,
        }
    }

    pub fn corpus(&self) -> &Corpus {
        &self.corpus
    }

    /// Summarize one raw document if it has no summary yet.
    ///
    /// The summary file is only created after the model has answered, so a
    /// failed call never leaves a partial artifact behind.
    pub async fn summarize_file(&self, path: &Path) -> Result<SummaryOutcome> {
        let source = match self.corpus.relative_source(path) {
            Some((RootKind::Raw, source)) => source,
            _ => bail!("Not a raw document: {}", path.display()),
        };

        let target = self.corpus.summary_path(&source);
        if target.exists() {
            tracing::debug!(source = %source, "summary exists, skipping");
            return Ok(SummaryOutcome::SkippedExisting);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;

        if !has_min_lines(&content, self.min_lines) {
            tracing::debug!(source = %source, "document too short, skipping");
            return Ok(SummaryOutcome::SkippedShort);
        }

        let response = self
            .model
            .complete(&summary_prompt(&content))
            .await
            .with_context(|| format!("Summarization failed for {}", source))?;
        let summary = response.trim();
        if summary.is_empty() {
            bail!("Model returned an empty summary for {}", source);
        }

        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        tokio::fs::write(&target, summary)
            .await
            .with_context(|| format!("Failed to write {}", target.display()))?;

        tracing::info!(source = %source, model = self.model.name(), "summary written");
        Ok(SummaryOutcome::Summarized)
    }
}

fn has_min_lines(content: &str, min_lines: usize) -> bool {
    let non_empty = content.lines().filter(|l| !l.trim().is_empty()).count();
    non_empty > 0 && non_empty >= min_lines
}

/// Summarize every included raw document with at most `max_workers` files
/// in flight.
///
/// Blocks until every file has been attempted once.
pub async fn build_summaries(summarizer: Arc<Summarizer>, max_workers: usize) -> Result<SummaryReport> {
    let discovery = summarizer.corpus().discover(RootKind::Raw)?;
    let mut report = SummaryReport {
        found: discovery.files.len(),
        ignored: discovery.ignored.len(),
        ..SummaryReport::default()
    };

    tracing::info!(
        files = report.found,
        ignored = report.ignored,
        workers = max_workers,
        "starting summary generation"
    );

    let semaphore = Arc::new(Semaphore::new(max_workers.max(1)));
    let mut tasks: JoinSet<(PathBuf, Result<SummaryOutcome>)> = JoinSet::new();

    for path in discovery.files {
        let summarizer = Arc::clone(&summarizer);
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(e) => return (path, Err(e.into())),
            };
            let outcome = summarizer.summarize_file(&path).await;
            (path, outcome)
        });
    }

    while let Some(joined) = tasks.join_next().await {
        match joined {
            Ok((_, Ok(SummaryOutcome::Summarized))) => report.summarized += 1,
            Ok((_, Ok(SummaryOutcome::SkippedExisting))) => report.skipped_existing += 1,
            Ok((_, Ok(SummaryOutcome::SkippedShort))) => report.skipped_short += 1,
            Ok((path, Err(e))) => {
                tracing::error!(path = %path.display(), error = format!("{:#}", e), "failed to summarize");
                report.failed += 1;
            }
            Err(e) => {
                tracing::error!(error = %e, "summary task panicked");
                report.failed += 1;
            }
        }
    }

    tracing::info!(
        summarized = report.summarized,
        failed = report.failed,
        "summary generation finished"
    );
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::IgnoreFilter;
    use crate::llm::{ChatResponse, Message, ToolDefinition};
    use async_trait::async_trait;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// Echoes a fixed summary and fails on documents containing `FAIL`.
    struct FakeModel {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for FakeModel {
        fn name(&self) -> &str {
            "fake"
        }

        async fn chat(&self, messages: &[Message], _tools: &[ToolDefinition]) -> Result<ChatResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let prompt = &messages[0].content;
            if prompt.contains("FAIL") {
                bail!("provider exploded");
            }
            Ok(ChatResponse::Text("\n  Short summary.  \n".to_string()))
        }
    }

    fn setup(patterns: &[&str]) -> (TempDir, Arc<Summarizer>, Arc<FakeModel>) {
        let tmp = TempDir::new().unwrap();
        let patterns: Vec<String> = patterns.iter().map(|p| p.to_string()).collect();
        let corpus = Corpus::new(
            tmp.path().join("raw"),
            tmp.path().join("summary"),
            IgnoreFilter::new(&patterns).unwrap(),
        );
        let model = Arc::new(FakeModel {
            calls: AtomicUsize::new(0),
        });
        let summarizer = Arc::new(Summarizer::new(model.clone(), corpus, 3));
        (tmp, summarizer, model)
    }

    fn write(path: &Path, content: &str) {
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_prompt_embeds_document() {
        let prompt = summary_prompt("# Title\nbody");
        assert!(prompt.starts_with("You are a helpful assistant"));
        assert!(prompt.contains("DOCUMENT:\n# Title\nbody"));
    }

    #[test]
    fn test_min_lines_counts_non_empty() {
        assert!(has_min_lines("a\nb\nc", 3));
        assert!(!has_min_lines("a\n\n\n\nb", 3));
        assert!(!has_min_lines("   \n\n", 0));
    }

    #[tokio::test]
    async fn test_summary_written_trimmed_to_mirrored_path() {
        let (tmp, summarizer, _) = setup(&[]);
        let raw = tmp.path().join("raw/foo/bar.md");
        write(&raw, "# Bar\nline one\nline two\nline three\n");

        let outcome = summarizer.summarize_file(&raw).await.unwrap();
        assert_eq!(outcome, SummaryOutcome::Summarized);
        let summary = fs::read_to_string(tmp.path().join("summary/foo/bar.md")).unwrap();
        assert_eq!(summary, "Short summary.");
    }

    #[tokio::test]
    async fn test_rerun_is_noop() {
        let (tmp, summarizer, model) = setup(&[]);
        write(&tmp.path().join("raw/a.md"), "1\n2\n3\n4\n");

        let first = build_summaries(summarizer.clone(), 2).await.unwrap();
        assert_eq!(first.summarized, 1);
        let target = tmp.path().join("summary/a.md");
        let mtime = fs::metadata(&target).unwrap().modified().unwrap();

        let second = build_summaries(summarizer, 2).await.unwrap();
        assert_eq!(second.summarized, 0);
        assert_eq!(second.skipped_existing, 1);
        assert_eq!(fs::metadata(&target).unwrap().modified().unwrap(), mtime);
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_short_document_never_summarized() {
        let (tmp, summarizer, model) = setup(&[]);
        write(&tmp.path().join("raw/short.md"), "only\n\n\ntwo\n");

        let report = build_summaries(summarizer, 1).await.unwrap();
        assert_eq!(report.skipped_short, 1);
        assert!(!tmp.path().join("summary/short.md").exists());
        assert_eq!(model.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_failure_does_not_stop_batch() {
        let (tmp, summarizer, _) = setup(&[]);
        write(&tmp.path().join("raw/bad.md"), "FAIL\nFAIL\nFAIL\n");
        for i in 0..4 {
            write(
                &tmp.path().join(format!("raw/good{}.md", i)),
                "one\ntwo\nthree\n",
            );
        }

        let report = build_summaries(summarizer, 2).await.unwrap();
        assert_eq!(report.found, 5);
        assert_eq!(report.failed, 1);
        assert_eq!(report.summarized, 4);
        assert!(!tmp.path().join("summary/bad.md").exists());
    }

    #[tokio::test]
    async fn test_ignored_files_never_summarized() {
        let (tmp, summarizer, model) = setup(&[".*/Archive/.*"]);
        write(&tmp.path().join("raw/Archive/old.md"), "one\ntwo\nthree\n");
        write(&tmp.path().join("raw/new.md"), "one\ntwo\nthree\n");

        let report = build_summaries(summarizer, 3).await.unwrap();
        assert_eq!(report.ignored, 1);
        assert_eq!(report.summarized, 1);
        assert!(!tmp.path().join("summary/Archive/old.md").exists());
        assert_eq!(model.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejects_paths_outside_raw_tree() {
        let (tmp, summarizer, _) = setup(&[]);
        let stray = tmp.path().join("elsewhere.md");
        write(&stray, "a\nb\nc\n");
        assert!(summarizer.summarize_file(&stray).await.is_err());
    }

    /// Records how many calls overlap.
    struct SlowModel {
        in_flight: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl ChatModel for SlowModel {
        fn name(&self) -> &str {
            "slow"
        }

        async fn chat(&self, _messages: &[Message], _tools: &[ToolDefinition]) -> Result<ChatResponse> {
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(30)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);
            Ok(ChatResponse::Text("Summary.".to_string()))
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_worker_pool_is_bounded() {
        let tmp = TempDir::new().unwrap();
        for i in 0..20 {
            write(&tmp.path().join(format!("raw/doc{:02}.md", i)), "one\ntwo\nthree\n");
        }
        let model = Arc::new(SlowModel {
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        });
        let corpus = Corpus::new(
            tmp.path().join("raw"),
            tmp.path().join("summary"),
            IgnoreFilter::default(),
        );
        let summarizer = Arc::new(Summarizer::new(model.clone(), corpus, 3));

        let report = build_summaries(summarizer, 3).await.unwrap();
        assert_eq!(report.summarized, 20);
        let peak = model.peak.load(Ordering::SeqCst);
        assert!(peak <= 3, "peak concurrency {} exceeded 3 workers", peak);
        assert!(peak >= 1);
    }
}
