//! Domain types for the knowledge pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Where a piece of text came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceMetadata {
    /// File name or other origin label
    pub source_name: String,

    /// 1-based page number for paginated sources
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<u32>,

    /// Section heading, when the source has one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub section: Option<String>,
}

impl SourceMetadata {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
            page: None,
            section: None,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page = Some(page);
        self
    }

    pub fn with_section(mut self, section: impl Into<String>) -> Self {
        self.section = Some(section.into());
        self
    }

    /// Human-readable location within the source ("page 3", "Symptoms").
    pub fn location(&self) -> String {
        match (&self.page, &self.section) {
            (Some(page), Some(section)) => format!("page {}, {}", page, section),
            (Some(page), None) => format!("page {}", page),
            (None, Some(section)) => section.clone(),
            (None, None) => String::new(),
        }
    }
}

/// A loaded source document. Never modified after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    pub metadata: SourceMetadata,
    /// SHA-256 over source name, page and text; used to skip re-ingestion
    pub content_hash: String,
}

impl Document {
    pub fn new(text: impl Into<String>, metadata: SourceMetadata) -> Self {
        let text = text.into();
        let content_hash = content_hash(&metadata, &text);
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            text,
            metadata,
            content_hash,
        }
    }
}

fn content_hash(metadata: &SourceMetadata, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(metadata.source_name.as_bytes());
    hasher.update([0u8]);
    hasher.update(metadata.page.unwrap_or(0).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// A contiguous slice of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// `<document_id>:<position>`
    pub id: String,
    pub document_id: String,
    /// Ordinal within the document, starting at 0
    pub position: usize,
    pub text: String,
    /// Character offset of the first character (inclusive)
    pub char_start: usize,
    /// Character offset after the last character (exclusive)
    pub char_end: usize,
    pub metadata: SourceMetadata,
}

/// A chunk and its embedding, as persisted in the vector index.
#[derive(Debug, Clone)]
pub struct IndexEntry {
    pub chunk: Chunk,
    pub vector: Vec<f32>,
}

/// Document-level row stored alongside the entries.
#[derive(Debug, Clone)]
pub struct DocumentRecord {
    pub id: String,
    pub content_hash: String,
    pub metadata: SourceMetadata,
    pub char_count: usize,
}

impl From<&Document> for DocumentRecord {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            content_hash: doc.content_hash.clone(),
            metadata: doc.metadata.clone(),
            char_count: doc.text.chars().count(),
        }
    }
}

/// Documents and entries written to the index in one transaction.
#[derive(Debug, Clone, Default)]
pub struct IndexBatch {
    pub documents: Vec<DocumentRecord>,
    pub entries: Vec<IndexEntry>,
}

impl IndexBatch {
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty() && self.entries.is_empty()
    }
}

/// A chunk with its similarity to the query.
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// Ranked search hits, best first.
#[derive(Debug, Clone, Default)]
pub struct RetrievalResult {
    pub hits: Vec<ScoredChunk>,
}

impl RetrievalResult {
    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn texts(&self) -> Vec<&str> {
        self.hits.iter().map(|hit| hit.chunk.text.as_str()).collect()
    }

    pub fn max_score(&self) -> f32 {
        self.hits.first().map(|hit| hit.score).unwrap_or(0.0)
    }
}

/// User-facing reference to a passage an answer drew on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceRef {
    pub source: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub location: String,
    pub snippet: String,
}

/// Answer returned to the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    pub text: String,

    pub sources: Vec<SourceRef>,

    /// False when no passages backed the answer
    pub grounded: bool,

    /// Highest similarity among retrieved passages
    #[serde(skip_serializing, default)]
    pub max_score: f32,
}

impl Answer {
    /// Answer given without calling the model when nothing relevant was found.
    pub fn insufficient_information(question: &str) -> Self {
        Self {
            text: format!(
                "There is insufficient information in the available documents to answer \"{}\". \
                 Please consult a qualified doctor for advice about your situation.",
                question.trim()
            ),
            sources: Vec::new(),
            grounded: false,
            max_score: 0.0,
        }
    }
}

/// Outcome of an ingest run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    /// Documents produced by the loader
    pub documents_seen: usize,
    /// Documents newly written to the index
    pub documents_indexed: usize,
    /// Documents already present (same content hash)
    pub documents_skipped: usize,
    /// Files that could not be read as text
    pub files_skipped: usize,
    pub chunks_indexed: usize,
}

/// Summary of a vector index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexStats {
    pub documents: usize,
    pub chunks: usize,
    pub dimensions: usize,
    pub scheme: String,
    pub created_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_hash_stable_across_ids() {
        let a = Document::new("Cycles vary.", SourceMetadata::new("guide.md"));
        let b = Document::new("Cycles vary.", SourceMetadata::new("guide.md"));
        assert_ne!(a.id, b.id);
        assert_eq!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_content_hash_includes_page() {
        let a = Document::new("Same text", SourceMetadata::new("guide.pdf").with_page(1));
        let b = Document::new("Same text", SourceMetadata::new("guide.pdf").with_page(2));
        assert_ne!(a.content_hash, b.content_hash);
    }

    #[test]
    fn test_location() {
        assert_eq!(SourceMetadata::new("a").location(), "");
        assert_eq!(SourceMetadata::new("a").with_page(3).location(), "page 3");
        assert_eq!(
            SourceMetadata::new("a").with_page(3).with_section("Symptoms").location(),
            "page 3, Symptoms"
        );
    }

    #[test]
    fn test_insufficient_information_answer() {
        let answer = Answer::insufficient_information("  What is PCOS? ");
        assert!(answer.text.contains("insufficient information"));
        assert!(answer.text.contains("\"What is PCOS?\""));
        assert!(!answer.grounded);
        assert!(answer.sources.is_empty());
    }
}
