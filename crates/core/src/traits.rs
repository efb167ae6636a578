use crate::error::{ModelError, StoreError};
use crate::models::{ChunkMetadata, ContentDigest, ScoredChunk};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Embeds and stores one record per text; returns the new record ids.
    async fn insert(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<Vec<String>, StoreError>;

    async fn query_similar(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, StoreError>;

    async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, StoreError>;

    async fn clear(&self) -> Result<(), StoreError>;

    async fn stored_digests(&self) -> Result<HashSet<ContentDigest>, StoreError> {
        Ok(self
            .list_all_metadata()
            .await?
            .into_iter()
            .map(|metadata| metadata.hash)
            .collect())
    }

    async fn contains_digest(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        Ok(self
            .list_all_metadata()
            .await?
            .iter()
            .any(|metadata| &metadata.hash == digest))
    }
}

#[async_trait]
impl<T: VectorStore + ?Sized> VectorStore for Arc<T> {
    async fn insert(
        &self,
        texts: &[String],
        metadatas: &[ChunkMetadata],
    ) -> Result<Vec<String>, StoreError> {
        (**self).insert(texts, metadatas).await
    }

    async fn query_similar(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        (**self).query_similar(query, k).await
    }

    async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, StoreError> {
        (**self).list_all_metadata().await
    }

    async fn clear(&self) -> Result<(), StoreError> {
        (**self).clear().await
    }

    async fn stored_digests(&self) -> Result<HashSet<ContentDigest>, StoreError> {
        (**self).stored_digests().await
    }

    async fn contains_digest(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        (**self).contains_digest(digest).await
    }
}

#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, ModelError>;
}

#[async_trait]
impl<T: ChatModel + ?Sized> ChatModel for Arc<T> {
    async fn complete(
        &self,
        system_prompt: &str,
        context: &str,
        question: &str,
    ) -> Result<String, ModelError> {
        (**self).complete(system_prompt, context, question).await
    }
}

pub(crate) fn ensure_matching_lengths(
    texts: &[String],
    metadatas: &[ChunkMetadata],
) -> Result<(), StoreError> {
    if texts.len() != metadatas.len() {
        return Err(StoreError::Request(format!(
            "metadata count {} doesn't match text count {}",
            metadatas.len(),
            texts.len()
        )));
    }
    Ok(())
}
