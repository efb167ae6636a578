use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Lowercase hex SHA-256 of a document's bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentDigest(String);

impl ContentDigest {
    pub fn new(hex: impl Into<String>) -> Self {
        Self(hex.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentDigest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentKind {
    Searchable,
    Scanned,
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DocumentKind::Searchable => f.write_str("searchable"),
            DocumentKind::Scanned => f.write_str("scanned"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub source: String,
    pub hash: ContentDigest,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VectorRecord {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub embedding: Vec<f32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoredChunk {
    pub id: String,
    pub text: String,
    pub metadata: ChunkMetadata,
    pub score: f32,
}

/// How the ingestion run decides that a digest was seen before.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DedupMode {
    /// Digests are loaded once when the run starts; documents committed during
    /// the run are not added to the set.
    #[default]
    Snapshot,
    /// The store is asked for every document.
    Live,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct IngestionOptions {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub dedup_mode: DedupMode,
    pub ocr_dpi: u32,
    pub ocr_workers: Option<usize>,
}

impl Default for IngestionOptions {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            chunk_overlap: 50,
            dedup_mode: DedupMode::Snapshot,
            ocr_dpi: 300,
            ocr_workers: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CommittedDocument {
    pub path: PathBuf,
    pub source: String,
    pub digest: ContentDigest,
    pub kind: DocumentKind,
    pub chunk_count: usize,
    pub text_path: PathBuf,
    pub ingested_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct SkippedPdf {
    pub path: PathBuf,
    pub reason: String,
}

/// Extracted fine but yielded no non-blank chunk, so nothing was stored and
/// the digest stays unknown to the store.
#[derive(Debug, Clone)]
pub struct EmptyDocument {
    pub path: PathBuf,
    pub digest: ContentDigest,
    pub kind: DocumentKind,
    pub text_path: PathBuf,
}

#[derive(Debug, Clone, Default)]
pub struct IngestionReport {
    pub committed: Vec<CommittedDocument>,
    pub deduplicated: Vec<PathBuf>,
    pub empty: Vec<EmptyDocument>,
    pub skipped_files: Vec<SkippedPdf>,
}

impl IngestionReport {
    pub fn chunk_count(&self) -> usize {
        self.committed.iter().map(|doc| doc.chunk_count).sum()
    }
}
