//! Run configuration.
//!
//! A [`RagConfig`] is built once per command (defaults, then an optional TOML
//! file, then CLI overrides) and handed to the constructors of every client.

use crate::error::ConfigError;
use crate::models::IngestionOptions;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    pub paths: PathsConfig,
    pub ingestion: IngestionOptions,
    pub ocr: OcrConfig,
    pub models: ModelConfig,
    pub store: StoreConfig,
    pub retrieval: RetrievalConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub input_dir: PathBuf,
    pub texts_dir: PathBuf,
    pub store_dir: PathBuf,
    pub collection: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: PathBuf::from("PDFs"),
            texts_dir: PathBuf::from("output_texts"),
            store_dir: PathBuf::from("vector_database"),
            collection: "pdf_embeddings".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OcrConfig {
    pub endpoint: Option<String>,
    pub api_key: Option<String>,
    pub pdftoppm: String,
    pub timeout_secs: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            api_key: None,
            pdftoppm: "pdftoppm".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub ollama_url: String,
    pub chat_model: String,
    pub embedding_model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            ollama_url: "http://localhost:11434".to_string(),
            chat_model: "mistral".to_string(),
            embedding_model: "mxbai-embed-large".to_string(),
            temperature: 0.1,
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Local,
    #[default]
    Qdrant,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EmbedderBackend {
    #[default]
    Ollama,
    Ngram,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: StoreBackend,
    pub qdrant_url: String,
    pub embedder: EmbedderBackend,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Qdrant,
            qdrant_url: "http://localhost:6333".to_string(),
            embedder: EmbedderBackend::Ollama,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 20 }
    }
}

impl RagConfig {
    /// Defaults when `path` is `None`, otherwise the TOML file layered over them.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
                    path: path.display().to_string(),
                    source,
                })?;
                Self::from_toml_str(&raw)?
            }
            None => Self::default(),
        };

        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let ingestion = &self.ingestion;
        if ingestion.chunk_size == 0 {
            return Err(ConfigError::Invalid("ingestion.chunk_size must be > 0".to_string()));
        }
        if ingestion.chunk_overlap >= ingestion.chunk_size {
            return Err(ConfigError::Invalid(format!(
                "ingestion.chunk_overlap ({}) must be smaller than chunk_size ({})",
                ingestion.chunk_overlap, ingestion.chunk_size
            )));
        }
        if ingestion.ocr_dpi == 0 {
            return Err(ConfigError::Invalid("ingestion.ocr_dpi must be > 0".to_string()));
        }
        if ingestion.ocr_workers == Some(0) {
            return Err(ConfigError::Invalid("ingestion.ocr_workers must be > 0".to_string()));
        }
        if self.retrieval.top_k == 0 {
            return Err(ConfigError::Invalid("retrieval.top_k must be > 0".to_string()));
        }
        Ok(())
    }
}
