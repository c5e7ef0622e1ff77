//! Markdown header splitter.
//!
//! Splits document text into sections bounded by H1–H3 headers. Every
//! section carries the header values in effect where it starts, so a
//! section under `## Setup` inside `# Install` is tagged
//! `{h1: "Install", h2: "Setup"}`. Header lines themselves are stripped
//! from the section text.
//!
//! Rules:
//! - a header is `#`, `##` or `###` followed by a space (or nothing);
//!   deeper headers (`####`) and `#tags` are ordinary text
//! - opening a header clears every header at the same or deeper level
//! - lines inside fenced code blocks are never treated as headers
//! - consecutive pieces with identical header values are merged with a
//!   markdown line break (`"  \n"`); blank lines separate pieces
//! - empty sections are dropped
//!
//! Boundaries follow header structure only; there is no size limit.

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document, HeaderPath};

const HEADER_MARKERS: [(&str, usize); 3] = [("###", 3), ("##", 2), ("#", 1)];

/// A header-bounded span of text before it is stamped as a [`Chunk`].
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub headers: HeaderPath,
    pub text: String,
}

/// Split a document into chunks stamped with its title, source, and root.
pub fn split_document(doc: &Document) -> Vec<Chunk> {
    let title = doc.title();
    split_markdown(&doc.content)
        .into_iter()
        .map(|section| make_chunk(doc, &title, section))
        .collect()
}

/// Split markdown text on H1–H3 headers.
pub fn split_markdown(text: &str) -> Vec<Section> {
    let mut pieces: Vec<Section> = Vec::new();
    let mut headers = HeaderPath::default();
    let mut current: Vec<&str> = Vec::new();
    let mut fence: Option<&str> = None;

    for raw_line in text.lines() {
        let line = raw_line.trim();

        match fence {
            None => {
                if line.starts_with("```") && line.matches("```").count() == 1 {
                    fence = Some("```");
                } else if line.starts_with("~~~") {
                    fence = Some("~~~");
                }
            }
            Some(marker) => {
                if line.starts_with(marker) {
                    fence = None;
                }
            }
        }

        if fence.is_some() {
            current.push(line);
            continue;
        }

        if let Some((level, value)) = parse_header(line) {
            flush(&mut pieces, &mut current, &headers);
            set_header(&mut headers, level, value);
            continue;
        }

        if line.is_empty() {
            flush(&mut pieces, &mut current, &headers);
        } else {
            current.push(line);
        }
    }
    flush(&mut pieces, &mut current, &headers);

    merge_pieces(pieces)
}

fn parse_header(line: &str) -> Option<(usize, String)> {
    HEADER_MARKERS.iter().find_map(|(marker, level)| {
        let rest = line.strip_prefix(marker)?;
        if rest.is_empty() || rest.starts_with(' ') {
            Some((*level, rest.trim().to_string()))
        } else {
            None
        }
    })
}

fn set_header(headers: &mut HeaderPath, level: usize, value: String) {
    match level {
        1 => {
            headers.h1 = Some(value);
            headers.h2 = None;
            headers.h3 = None;
        }
        2 => {
            headers.h2 = Some(value);
            headers.h3 = None;
        }
        _ => headers.h3 = Some(value),
    }
}

fn flush(pieces: &mut Vec<Section>, current: &mut Vec<&str>, headers: &HeaderPath) {
    if current.is_empty() {
        return;
    }
    pieces.push(Section {
        headers: headers.clone(),
        text: current.join("\n"),
    });
    current.clear();
}

fn merge_pieces(pieces: Vec<Section>) -> Vec<Section> {
    let mut merged: Vec<Section> = Vec::new();
    for piece in pieces {
        match merged.last_mut() {
            Some(last) if last.headers == piece.headers => {
                last.text.push_str("  \n");
                last.text.push_str(&piece.text);
            }
            _ => merged.push(piece),
        }
    }
    merged.retain(|s| !s.text.trim().is_empty());
    merged
}

fn make_chunk(doc: &Document, title: &str, section: Section) -> Chunk {
    let mut hasher = Sha256::new();
    hasher.update(section.text.as_bytes());
    let hash = format!("{:x}", hasher.finalize());

    Chunk {
        id: Uuid::new_v4().to_string(),
        source: doc.source.clone(),
        title: title.to_string(),
        root: doc.root,
        headers: section.headers,
        text: section.text,
        hash,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RootKind;
    use std::path::PathBuf;

    fn headers(h1: Option<&str>, h2: Option<&str>, h3: Option<&str>) -> HeaderPath {
        HeaderPath {
            h1: h1.map(String::from),
            h2: h2.map(String::from),
            h3: h3.map(String::from),
        }
    }

    #[test]
    fn test_header_nesting() {
        let text = "# Install\nintro\n## Setup\nsetup steps\n### Linux\napt install\n## Usage\nrun it";
        let sections = split_markdown(text);
        assert_eq!(sections.len(), 4);
        assert_eq!(sections[0].headers, headers(Some("Install"), None, None));
        assert_eq!(sections[0].text, "intro");
        assert_eq!(
            sections[2].headers,
            headers(Some("Install"), Some("Setup"), Some("Linux"))
        );
        // A new H2 clears the H3 from the previous subsection.
        assert_eq!(
            sections[3].headers,
            headers(Some("Install"), Some("Usage"), None)
        );
        assert_eq!(sections[3].text, "run it");
    }

    #[test]
    fn test_preamble_has_no_headers() {
        let sections = split_markdown("before any header\n# Title\nafter");
        assert_eq!(sections[0].headers, HeaderPath::default());
        assert_eq!(sections[0].text, "before any header");
    }

    #[test]
    fn test_blank_lines_merge_with_line_break() {
        let sections = split_markdown("# T\npara one\n\npara two");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].text, "para one  \npara two");
    }

    #[test]
    fn test_code_fence_hides_headers() {
        let text = "# Script\n```bash\n# not a header\necho hi\n```\nafter";
        let sections = split_markdown(text);
        assert_eq!(sections.len(), 1);
        assert!(sections[0].text.contains("# not a header"));
        assert!(sections[0].text.ends_with("after"));
    }

    #[test]
    fn test_deep_headers_and_tags_are_text() {
        let sections = split_markdown("# T\n#### Deep\n#tag");
        assert_eq!(sections.len(), 1);
        assert_eq!(sections[0].text, "#### Deep\n#tag");
    }

    #[test]
    fn test_empty_and_header_only_documents() {
        assert!(split_markdown("").is_empty());
        assert!(split_markdown("# Only\n## Headers\n").is_empty());
    }

    #[test]
    fn test_split_document_stamps_metadata() {
        let doc = Document {
            path: PathBuf::from("/data/summary/foo/bar.md"),
            source: "foo/bar.md".to_string(),
            root: RootKind::Summary,
            content: "# Bar\nsummary text".to_string(),
        };
        let chunks = split_document(&doc);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].title, "bar.md");
        assert_eq!(chunks[0].source, "foo/bar.md");
        assert_eq!(chunks[0].root, RootKind::Summary);
        assert_eq!(chunks[0].headers.h1.as_deref(), Some("Bar"));
        assert_eq!(chunks[0].hash.len(), 64);
    }
}
