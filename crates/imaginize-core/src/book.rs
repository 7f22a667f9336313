use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

/// Stable book identifier derived from the canonicalized source path, so
/// re-running the pipeline against the same file resumes the same book
/// directory rather than minting a new one (spec §4, "Data Model: expanded").
pub fn book_id_from_path(path: &Path) -> String {
    let canonical = path
        .canonicalize()
        .unwrap_or_else(|_| path.to_path_buf());
    let digest = Sha256::digest(canonical.to_string_lossy().as_bytes());
    format!("{digest:x}")
}

/// Root object for a single book (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Book {
    pub id: String,
    pub title: String,
    pub author: Option<String>,
    pub source_path: String,
    pub total_logical_pages: u32,
    pub total_chapters: u32,
    pub tokens_used_total: u64,
    pub last_updated: DateTime<Utc>,
}

impl Book {
    pub fn new(source_path: &Path, title: String, author: Option<String>) -> Self {
        Book {
            id: book_id_from_path(source_path),
            title,
            author,
            source_path: source_path.to_string_lossy().to_string(),
            total_logical_pages: 0,
            total_chapters: 0,
            tokens_used_total: 0,
            last_updated: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_path_yields_same_id() {
        let a = book_id_from_path(Path::new("/tmp/does-not-exist-a.epub"));
        let b = book_id_from_path(Path::new("/tmp/does-not-exist-a.epub"));
        assert_eq!(a, b);
    }

    #[test]
    fn different_paths_yield_different_ids() {
        let a = book_id_from_path(Path::new("/tmp/does-not-exist-a.epub"));
        let b = book_id_from_path(Path::new("/tmp/does-not-exist-b.epub"));
        assert_ne!(a, b);
    }
}
