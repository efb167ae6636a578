use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{ChunkMetadata, ScoredChunk, VectorRecord};
use crate::traits::{ensure_matching_lengths, VectorStore};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct CollectionFile {
    records: Vec<VectorRecord>,
}

/// Offline store for tests and air-gapped runs (`--store local`). The whole
/// collection lives in memory, is ranked by a linear cosine scan, and is
/// rewritten to `<root>/<collection>.json` after every mutation. Production
/// ingestion goes through [`QdrantStore`](crate::stores::QdrantStore).
pub struct LocalVectorStore<E> {
    file: PathBuf,
    embedder: E,
    records: Mutex<Vec<VectorRecord>>,
}

impl<E: Embedder> LocalVectorStore<E> {
    pub fn open(root: &Path, collection: &str, embedder: E) -> Result<Self, StoreError> {
        fs::create_dir_all(root)?;
        let file = root.join(format!("{collection}.json"));

        let records = if file.exists() {
            let raw = fs::read(&file)?;
            serde_json::from_slice::<CollectionFile>(&raw)?.records
        } else {
            Vec::new()
        };

        Ok(Self {
            file,
            embedder,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.file
    }

    pub fn len(&self) -> Result<usize, StoreError> {
        Ok(self.lock()?.len())
    }

    pub fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.lock()?.is_empty())
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<VectorRecord>>, StoreError> {
        self.records
            .lock()
            .map_err(|_| StoreError::Request("local store lock poisoned".to_string()))
    }

    fn persist(&self, records: &[VectorRecord]) -> Result<(), StoreError> {
        if let Some(parent) = self.file.parent() {
            fs::create_dir_all(parent)?;
        }

        let body = serde_json::to_vec(&CollectionFile {
            records: records.to_vec(),
        })?;
        let staging = self.file.with_extension("json.tmp");
        fs::write(&staging, body)?;
        fs::rename(&staging, &self.file)?;
        Ok(())
    }
}

#[async_trait]
impl<E: Embedder> VectorStore for LocalVectorStore<E> {
    async fn insert(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<Vec<String>, StoreError> {
        ensure_matching_lengths(texts, metadatas)?;
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let embeddings = self.embedder.embed_batch(texts).await?;
        let fresh = texts
            .iter()
            .zip(metadatas)
            .zip(embeddings)
            .map(|((text, metadata), embedding)| VectorRecord {
                id: Uuid::new_v4().to_string(),
                text: text.clone(),
                metadata: metadata.clone(),
                embedding,
            })
            .collect::<Vec<_>>();
        let ids = fresh.iter().map(|record| record.id.clone()).collect();

        let mut records = self.lock()?;
        let mut next = Vec::with_capacity(records.len() + fresh.len());
        next.extend(records.iter().cloned());
        next.extend(fresh);
        self.persist(&next)?;
        *records = next;
        Ok(ids)
    }

    async fn query_similar(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 || self.is_empty()? {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let records = self.lock()?;

        let mut scored = records
            .iter()
            .map(|record| ScoredChunk {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
                score: cosine_similarity(&query_vector, &record.embedding),
            })
            .collect::<Vec<_>>();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(k);
        Ok(scored)
    }

    async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, StoreError> {
        Ok(self
            .lock()?
            .iter()
            .map(|record| record.metadata.clone())
            .collect())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let mut records = self.lock()?;
        match fs::remove_file(&self.file) {
            Ok(()) => {}
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {}
            Err(error) => return Err(error.into()),
        }
        records.clear();
        Ok(())
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    if left.len() != right.len() || left.is_empty() {
        return 0.0;
    }

    let dot = left.iter().zip(right).map(|(a, b)| a * b).sum::<f32>();
    let left_norm = left.iter().map(|value| value * value).sum::<f32>().sqrt();
    let right_norm = right.iter().map(|value| value * value).sum::<f32>().sqrt();

    if left_norm == 0.0 || right_norm == 0.0 {
        0.0
    } else {
        dot / (left_norm * right_norm)
    }
}
