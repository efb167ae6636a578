pub mod answer;
pub mod chunking;
pub mod classifier;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod hashing;
pub mod ingest;
pub mod llm;
pub mod models;
pub mod ocr;
pub mod reset;
pub mod stores;
pub mod traits;

#[cfg(test)]
pub(crate) mod fixtures;

pub use answer::{
    Answer, ChatSession, Exchange, ReplCommand, RetrievalAnswerer, ERROR_RESPONSE,
    FALLBACK_RESPONSE, SYSTEM_PROMPT,
};
pub use chunking::{build_chunks, RecursiveCharacterSplitter};
pub use classifier::{classify, classify_pages};
pub use config::{
    EmbedderBackend, ModelConfig, OcrConfig, PathsConfig, RagConfig, RetrievalConfig,
    StoreBackend, StoreConfig,
};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{AnswerError, ConfigError, IngestError, ModelError, StoreError};
pub use extractor::{
    extract_searchable_text, join_pages, LopdfExtractor, PageImage, PageRasterizer, PageText,
    PdfExtractor, PdftoppmRasterizer, ScannedExtractor,
};
pub use hashing::ContentHasher;
pub use ingest::{discover_pdf_files, IngestionPipeline};
pub use llm::OllamaChatModel;
pub use models::{
    Chunk, ChunkMetadata, CommittedDocument, ContentDigest, DedupMode, DocumentKind,
    EmptyDocument, IngestionOptions, IngestionReport, ScoredChunk, SkippedPdf, VectorRecord,
};
pub use ocr::{
    HttpOcrEngine, HttpOcrEngineFactory, OcrDetection, OcrEndpointConfig, OcrEngine,
    OcrEngineFactory, UnconfiguredOcr,
};
pub use reset::reset_workspace;
pub use stores::{LocalVectorStore, QdrantStore};
pub use traits::{ChatModel, VectorStore};
