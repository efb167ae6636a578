use crate::chunking::{build_chunks, RecursiveCharacterSplitter};
use crate::classifier::classify_pages;
use crate::error::IngestError;
use crate::extractor::{join_pages, PdfExtractor, ScannedExtractor};
use crate::hashing::ContentHasher;
use crate::models::{
    ChunkMetadata, CommittedDocument, ContentDigest, DedupMode, DocumentKind, EmptyDocument,
    IngestionOptions, IngestionReport, SkippedPdf,
};
use crate::traits::VectorStore;
use chrono::Utc;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

/// `.pdf` files (any case) directly inside `folder`. Subfolders are not visited.
pub fn discover_pdf_files(folder: &Path) -> Result<Vec<PathBuf>, IngestError> {
    if !folder.is_dir() {
        return Err(IngestError::InvalidArgument(format!(
            "input folder does not exist: {}",
            folder.display()
        )));
    }

    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        let is_pdf = entry
            .path()
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));

        if is_pdf {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    Ok(files)
}

fn document_name(path: &Path) -> Result<String, IngestError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| {
            IngestError::MissingFileName(format!("path missing filename: {}", path.display()))
        })
}

fn text_file_name(source: &str) -> String {
    let stem = Path::new(source)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(source);
    format!("{stem}.txt")
}

enum Outcome {
    Committed(CommittedDocument),
    Empty(EmptyDocument),
    Deduplicated,
}

/// Offline pass that turns a folder of PDFs into stored chunks, skipping
/// documents whose content digest the store already holds.
pub struct IngestionPipeline<S: VectorStore> {
    store: S,
    text_layer: Box<dyn PdfExtractor>,
    scanned: ScannedExtractor,
    splitter: RecursiveCharacterSplitter,
    dedup_mode: DedupMode,
    texts_dir: PathBuf,
}

impl<S: VectorStore> IngestionPipeline<S> {
    pub fn new(
        store: S,
        text_layer: Box<dyn PdfExtractor>,
        scanned: ScannedExtractor,
        options: &IngestionOptions,
        texts_dir: impl Into<PathBuf>,
    ) -> Result<Self, IngestError> {
        Ok(Self {
            store,
            text_layer,
            scanned,
            splitter: RecursiveCharacterSplitter::from_options(options)?,
            dedup_mode: options.dedup_mode,
            texts_dir: texts_dir.into(),
        })
    }

    pub async fn run(&self, folder: &Path) -> Result<IngestionReport, IngestError> {
        let files = discover_pdf_files(folder)?;
        let mut report = IngestionReport::default();

        if files.is_empty() {
            warn!(folder = %folder.display(), "no pdf files found");
            return Ok(report);
        }

        let snapshot = match self.dedup_mode {
            DedupMode::Snapshot => Some(self.store.stored_digests().await?),
            DedupMode::Live => None,
        };

        for path in files {
            match self.ingest_document(&path, snapshot.as_ref()).await {
                Ok(Outcome::Committed(document)) => {
                    info!(
                        path = %path.display(),
                        kind = %document.kind,
                        chunks = document.chunk_count,
                        "committed document"
                    );
                    report.committed.push(document);
                }
                Ok(Outcome::Empty(document)) => {
                    warn!(
                        path = %path.display(),
                        kind = %document.kind,
                        "no text recovered, nothing stored"
                    );
                    report.empty.push(document);
                }
                Ok(Outcome::Deduplicated) => {
                    info!(path = %path.display(), "content already stored, skipping");
                    report.deduplicated.push(path);
                }
                Err(error) => {
                    warn!(path = %path.display(), reason = %error, "skipped pdf");
                    report.skipped_files.push(SkippedPdf {
                        path,
                        reason: error.to_string(),
                    });
                }
            }
        }

        Ok(report)
    }

    async fn already_stored(
        &self,
        digest: &ContentDigest,
        snapshot: Option<&HashSet<ContentDigest>>,
    ) -> Result<bool, IngestError> {
        match snapshot {
            Some(known) => Ok(known.contains(digest)),
            None => Ok(self.store.contains_digest(digest).await?),
        }
    }

    async fn ingest_document(
        &self,
        path: &Path,
        snapshot: Option<&HashSet<ContentDigest>>,
    ) -> Result<Outcome, IngestError> {
        let source = document_name(path)?;
        let digest = tokio::task::block_in_place(|| ContentHasher::digest_file(path))?;

        if self.already_stored(&digest, snapshot).await? {
            return Ok(Outcome::Deduplicated);
        }

        let (kind, text) = tokio::task::block_in_place(|| self.extract_text(path))?;

        let text_path = self.write_extracted_text(&source, &text)?;

        let metadata = ChunkMetadata {
            source: source.clone(),
            hash: digest.clone(),
        };
        let chunks = build_chunks(&text, &metadata, &self.splitter);
        let chunk_count = chunks.len();

        if chunks.is_empty() {
            return Ok(Outcome::Empty(EmptyDocument {
                path: path.to_path_buf(),
                digest,
                kind,
                text_path,
            }));
        }

        let texts = chunks.iter().map(|chunk| chunk.text.clone()).collect::<Vec<_>>();
        let metadatas = chunks
            .into_iter()
            .map(|chunk| chunk.metadata)
            .collect::<Vec<_>>();
        self.store.insert(&texts, &metadatas).await?;

        Ok(Outcome::Committed(CommittedDocument {
            path: path.to_path_buf(),
            source,
            digest,
            kind,
            chunk_count,
            text_path,
            ingested_at: Utc::now(),
        }))
    }

    /// Runs on a blocking section: lopdf parsing, `pdftoppm` and the OCR pool.
    fn extract_text(&self, path: &Path) -> Result<(DocumentKind, String), IngestError> {
        let (kind, pages) = classify_pages(self.text_layer.as_ref(), path);
        let text = match kind {
            DocumentKind::Searchable => join_pages(&pages),
            DocumentKind::Scanned => self.scanned.extract(path)?,
        };
        Ok((kind, text))
    }

    fn write_extracted_text(&self, source: &str, text: &str) -> Result<PathBuf, IngestError> {
        fs::create_dir_all(&self.texts_dir)?;
        let text_path = self.texts_dir.join(text_file_name(source));
        fs::write(&text_path, text)?;
        Ok(text_path)
    }
}
