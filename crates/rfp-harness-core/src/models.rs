//! Core data models shared by the retrieval and answering pipeline.
//!
//! These types describe tenant scopes, indexed files, stored chunks,
//! nearest-neighbour hits, and the context windows assembled from them.

use serde::{Deserialize, Serialize};

/// The `(user, project)` pair that filters every retrieval and storage
/// operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Scope {
    pub user_id: i64,
    pub project_id: i64,
}

impl Scope {
    pub fn new(user_id: i64, project_id: i64) -> Self {
        Self {
            user_id,
            project_id,
        }
    }
}

impl std::fmt::Display for Scope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "user {} / project {}", self.user_id, self.project_id)
    }
}

/// Origin of an indexed file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    /// An uploaded document (PDF, PPT, spreadsheet, text).
    File,
    /// A crawled web page.
    Website,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::File => "file",
            FileKind::Website => "website",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "file" => Some(FileKind::File),
            "website" => Some(FileKind::Website),
            _ => None,
        }
    }
}

/// A file registered in a project.
#[derive(Debug, Clone, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub user_id: i64,
    pub project_id: i64,
    pub kind: FileKind,
    pub name: Option<String>,
    pub link: Option<String>,
    pub is_indexed: bool,
}

impl FileRecord {
    /// Human-readable label: the link for crawled pages, the filename otherwise.
    pub fn display_name(&self) -> String {
        let label = match self.kind {
            FileKind::Website => self.link.as_deref().or(self.name.as_deref()),
            FileKind::File => self.name.as_deref().or(self.link.as_deref()),
        };
        label
            .map(str::to_string)
            .unwrap_or_else(|| format!("file {}", self.id))
    }
}

/// Text of a stored chunk, as returned by a range lookup.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkText {
    pub chunk_number: i64,
    pub text: String,
}

/// One nearest-neighbour hit from the vector index.
///
/// Positional and ownership metadata is optional because index entries
/// may carry incomplete restrict tokens; the window assembler skips those.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchPoint {
    pub vector_id: String,
    pub file_id: Option<i64>,
    pub user_id: Option<i64>,
    pub chunk_number: Option<i64>,
    /// Similarity reported by the index. Ranking uses list order only.
    pub distance: f64,
}

/// A contiguous run of chunks around a match, labelled with its source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    pub source: String,
    pub text: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: FileKind, name: Option<&str>, link: Option<&str>) -> FileRecord {
        FileRecord {
            id: 7,
            user_id: 1,
            project_id: 2,
            kind,
            name: name.map(str::to_string),
            link: link.map(str::to_string),
            is_indexed: true,
        }
    }

    #[test]
    fn website_uses_link() {
        let r = record(FileKind::Website, None, Some("https://example.com/a"));
        assert_eq!(r.display_name(), "https://example.com/a");
    }

    #[test]
    fn file_uses_name() {
        let r = record(FileKind::File, Some("pricing.pdf"), None);
        assert_eq!(r.display_name(), "pricing.pdf");
    }

    #[test]
    fn missing_labels_fall_back_to_id() {
        let r = record(FileKind::File, None, None);
        assert_eq!(r.display_name(), "file 7");
    }

    #[test]
    fn file_kind_round_trips_through_str() {
        for kind in [FileKind::File, FileKind::Website] {
            assert_eq!(FileKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(FileKind::parse("folder"), None);
    }
}
