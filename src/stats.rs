//! Corpus and index overview.
//!
//! Gives a quick summary of what is on disk and what is indexed: raw
//! documents, ignored files, summaries written, chunks per tree, and the
//! embedding model of the last build. Used by `wikiqa status` to show
//! whether summarize and index runs are keeping up with the wiki.

use anyhow::Result;

use crate::corpus::Corpus;
use crate::models::RootKind;
use crate::store::{StoreStats, VectorStore};

/// Counts gathered for `wikiqa status`.
#[derive(Debug, Default)]
pub struct Status {
    pub raw_documents: usize,
    pub ignored: usize,
    pub summaries: usize,
    pub index: StoreStats,
    pub db_size: u64,
}

pub async fn collect_status(corpus: &Corpus, store: &VectorStore, db_path: &std::path::Path) -> Result<Status> {
    let (raw_documents, ignored) = match corpus.discover(RootKind::Raw) {
        Ok(d) => (d.files.len(), d.ignored.len()),
        Err(e) => {
            tracing::warn!(error = %e, "cannot scan raw documents");
            (0, 0)
        }
    };
    let summaries = corpus.discover(RootKind::Summary)?.files.len();

    Ok(Status {
        raw_documents,
        ignored,
        summaries,
        index: store.stats().await?,
        db_size: std::fs::metadata(db_path).map(|m| m.len()).unwrap_or(0),
    })
}

/// Print the status report.
pub fn print_status(corpus: &Corpus, db_path: &std::path::Path, status: &Status) {
    println!("wikiqa status");
    println!("=============");
    println!();
    println!("  Raw docs:    {} ({})", status.raw_documents, corpus.raw_dir().display());
    println!("  Ignored:     {}", status.ignored);
    println!(
        "  Summaries:   {} / {} ({}%)",
        status.summaries,
        status.raw_documents,
        percent(status.summaries as i64, status.raw_documents as i64)
    );
    println!();
    println!("  Database:    {}", db_path.display());
    println!("  Size:        {}", format_bytes(status.db_size));
    println!("  Sources:     {}", status.index.sources);
    println!(
        "  Chunks:      {} summary, {} raw",
        status.index.summary_chunks, status.index.raw_chunks
    );

    match &status.index.meta {
        Some(meta) => {
            println!("  Model:       {} ({} dims)", meta.model, meta.dims);
            println!("  Last build:  {}", format_ts_relative(meta.built_at));
        }
        None => println!("  Last build:  never"),
    }
    println!();
}

fn percent(part: i64, total: i64) -> i64 {
    if total > 0 {
        (part * 100) / total
    } else {
        0
    }
}

/// Format a byte count as a human-readable string.
fn format_bytes(bytes: u64) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else if bytes < 1024 * 1024 {
        format!("{:.1} KB", bytes as f64 / 1024.0)
    } else if bytes < 1024 * 1024 * 1024 {
        format!("{:.1} MB", bytes as f64 / (1024.0 * 1024.0))
    } else {
        format!("{:.2} GB", bytes as f64 / (1024.0 * 1024.0 * 1024.0))
    }
}

/// Format a Unix timestamp as a relative time string (e.g. "3 hours ago").
fn format_ts_relative(ts: i64) -> String {
    let now = chrono::Utc::now().timestamp();
    let delta = now - ts;

    if delta < 0 {
        return format_ts_iso(ts);
    }

    if delta < 60 {
        "just now".to_string()
    } else if delta < 3600 {
        let mins = delta / 60;
        format!("{} min{} ago", mins, if mins == 1 { "" } else { "s" })
    } else if delta < 86400 {
        let hours = delta / 3600;
        format!("{} hour{} ago", hours, if hours == 1 { "" } else { "s" })
    } else if delta < 86400 * 30 {
        let days = delta / 86400;
        format!("{} day{} ago", days, if days == 1 { "" } else { "s" })
    } else {
        format_ts_iso(ts)
    }
}

fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| ts.to_string())
}
