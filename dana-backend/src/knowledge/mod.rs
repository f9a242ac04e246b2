//! Knowledge base file storage, search snippets and AI analysis

pub mod analyzer;
pub mod extract;

pub use analyzer::{AnalysisKind, KnowledgeAnalyzer};
pub use extract::{allowed_extension, extract_text, text_limit, ExtractError};

use std::io;
use std::path::{Path, PathBuf};

const SNIPPET_RADIUS: usize = 80;

/// Write an upload to `<upload_dir>/<user_id>/<uuid>.<ext>`
pub async fn store_upload(upload_dir: &Path, user_id: i64, extension: &str, bytes: &[u8]) -> io::Result<PathBuf> {
    let dir = upload_dir.join(user_id.to_string());
    tokio::fs::create_dir_all(&dir).await?;
    let path = dir.join(format!("{}.{}", uuid::Uuid::new_v4(), extension));
    tokio::fs::write(&path, bytes).await?;
    Ok(path)
}

/// Remove a stored upload; a file that is already gone is not an error
pub async fn remove_upload(path: &str) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
        _ => Ok(()),
    }
}

fn floor_boundary(s: &str, mut idx: usize) -> usize {
    while idx > 0 && !s.is_char_boundary(idx) {
        idx -= 1;
    }
    idx
}

fn ceil_boundary(s: &str, mut idx: usize) -> usize {
    while idx < s.len() && !s.is_char_boundary(idx) {
        idx += 1;
    }
    idx.min(s.len())
}

/// Text window around the first case-insensitive hit of `query`, or the head of the content
pub fn build_snippet(content: &str, query: &str) -> String {
    let hit = regex::RegexBuilder::new(&regex::escape(query.trim()))
        .case_insensitive(true)
        .build()
        .ok()
        .and_then(|re| re.find(content));

    let (start, end) = match hit {
        Some(m) if !query.trim().is_empty() => (
            floor_boundary(content, m.start().saturating_sub(SNIPPET_RADIUS)),
            ceil_boundary(content, m.end() + SNIPPET_RADIUS),
        ),
        _ => (0, ceil_boundary(content, SNIPPET_RADIUS * 2)),
    };

    let mut snippet = content[start..end].split_whitespace().collect::<Vec<_>>().join(" ");
    if start > 0 {
        snippet.insert_str(0, "...");
    }
    if end < content.len() {
        snippet.push_str("...");
    }
    snippet
}

/// Comma separated tag list, trimmed and de-duplicated
pub fn parse_tags(raw: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in raw.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        let tag = tag.to_lowercase();
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    tags
}
