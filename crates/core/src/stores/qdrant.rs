use crate::embeddings::Embedder;
use crate::error::StoreError;
use crate::models::{ChunkMetadata, ContentDigest, ScoredChunk};
use crate::traits::{ensure_matching_lengths, VectorStore};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use uuid::Uuid;

const SCROLL_PAGE_SIZE: usize = 256;

pub struct QdrantStore<E> {
    endpoint: String,
    collection: String,
    client: Client,
    embedder: E,
}

impl<E: Embedder> QdrantStore<E> {
    pub fn new(endpoint: impl Into<String>, collection: impl Into<String>, embedder: E) -> Self {
        Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            client: Client::new(),
            embedder,
        }
    }

    fn collection_url(&self) -> String {
        format!("{}/collections/{}", self.endpoint, self.collection)
    }

    async fn ensure_collection(&self, vector_size: usize) -> Result<(), StoreError> {
        let existing = self.client.get(self.collection_url()).send().await?;
        if existing.status().is_success() {
            return Ok(());
        }
        if existing.status() != StatusCode::NOT_FOUND {
            return Err(backend_error(existing.status()));
        }

        let response = self
            .client
            .put(self.collection_url())
            .json(&json!({
                "vectors": { "size": vector_size, "distance": "Cosine" },
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }
        Ok(())
    }
}

fn backend_error(status: StatusCode) -> StoreError {
    StoreError::BackendResponse {
        backend: "qdrant".to_string(),
        details: status.to_string(),
    }
}

fn payload_metadata(payload: Option<&Value>) -> ChunkMetadata {
    let field = |name: &str| {
        payload
            .and_then(|payload| payload.get(name))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string()
    };

    ChunkMetadata {
        source: field("source"),
        hash: ContentDigest::new(field("hash")),
    }
}

fn point_id(point: &Value) -> String {
    match point.get("id") {
        Some(Value::String(id)) => id.clone(),
        Some(Value::Number(id)) => id.to_string(),
        _ => String::new(),
    }
}

#[async_trait]
impl<E: Embedder> VectorStore for QdrantStore<E> {
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
        let vector_size = embeddings.first().map(Vec::len).unwrap_or_default();
        self.ensure_collection(vector_size).await?;

        let mut ids = Vec::with_capacity(texts.len());
        let points = texts
            .iter()
            .zip(metadatas)
            .zip(embeddings.iter())
            .map(|((text, metadata), embedding)| {
                if embedding.len() != vector_size {
                    return Err(StoreError::Request(format!(
                        "embedding dimension {} != {}",
                        embedding.len(),
                        vector_size
                    )));
                }

                let id = Uuid::new_v4().to_string();
                ids.push(id.clone());
                Ok(json!({
                    "id": id,
                    "vector": embedding,
                    "payload": {
                        "text": text,
                        "source": metadata.source,
                        "hash": metadata.hash,
                    },
                }))
            })
            .collect::<Result<Vec<_>, StoreError>>()?;

        let response = self
            .client
            .put(format!("{}/points?wait=true", self.collection_url()))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        Ok(ids)
    }

    async fn query_similar(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, StoreError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let query_vector = self.embedder.embed(query).await?;
        let response = self
            .client
            .post(format!("{}/points/search", self.collection_url()))
            .json(&json!({
                "vector": query_vector,
                "limit": k,
                "with_payload": true,
            }))
            .send()
            .await?;

        // A cleared store has no collection; that is an empty result, not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .map(|hit| ScoredChunk {
                id: point_id(hit),
                text: hit
                    .pointer("/payload/text")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
                metadata: payload_metadata(hit.get("payload")),
                score: hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0) as f32,
            })
            .collect())
    }

    async fn list_all_metadata(&self) -> Result<Vec<ChunkMetadata>, StoreError> {
        let mut metadata = Vec::new();
        let mut offset = Value::Null;

        loop {
            let response = self
                .client
                .post(format!("{}/points/scroll", self.collection_url()))
                .json(&json!({
                    "limit": SCROLL_PAGE_SIZE,
                    "with_payload": ["source", "hash"],
                    "with_vector": false,
                    "offset": offset,
                }))
                .send()
                .await?;

            if response.status() == StatusCode::NOT_FOUND {
                return Ok(metadata);
            }
            if !response.status().is_success() {
                return Err(backend_error(response.status()));
            }

            let parsed: Value = response.json().await?;
            if let Some(points) = parsed.pointer("/result/points").and_then(Value::as_array) {
                metadata.extend(points.iter().map(|point| payload_metadata(point.get("payload"))));
            }

            match parsed.pointer("/result/next_page_offset") {
                Some(next) if !next.is_null() => offset = next.clone(),
                _ => break,
            }
        }

        Ok(metadata)
    }

    async fn clear(&self) -> Result<(), StoreError> {
        let response = self.client.delete(self.collection_url()).send().await?;
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            Ok(())
        } else {
            Err(backend_error(response.status()))
        }
    }

    async fn contains_digest(&self, digest: &ContentDigest) -> Result<bool, StoreError> {
        let response = self
            .client
            .post(format!("{}/points/count", self.collection_url()))
            .json(&json!({
                "exact": true,
                "filter": {
                    "must": [{ "key": "hash", "match": { "value": digest } }],
                },
            }))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !response.status().is_success() {
            return Err(backend_error(response.status()));
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0)
            > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payload_fields_map_to_metadata() {
        let payload = json!({ "text": "x", "source": "manual.pdf", "hash": "abc" });
        let metadata = payload_metadata(Some(&payload));
        assert_eq!(metadata.source, "manual.pdf");
        assert_eq!(metadata.hash.as_str(), "abc");
    }

    #[test]
    fn point_ids_accept_uuid_and_integer_forms() {
        assert_eq!(point_id(&json!({ "id": "5f0c" })), "5f0c");
        assert_eq!(point_id(&json!({ "id": 17 })), "17");
        assert_eq!(point_id(&json!({})), "");
    }

    use crate::embeddings::CharacterNgramEmbedder;
    use httpmock::Method::{DELETE, GET, POST, PUT};
    use httpmock::MockServer;

    fn store(server: &MockServer) -> QdrantStore<CharacterNgramEmbedder> {
        QdrantStore::new(
            server.base_url(),
            "docs",
            CharacterNgramEmbedder { dimensions: 4 },
        )
    }

    fn metadata(source: &str, hash: &str) -> ChunkMetadata {
        ChunkMetadata {
            source: source.to_string(),
            hash: ContentDigest::new(hash),
        }
    }

    #[tokio::test]
    async fn insert_creates_missing_collection_then_upserts() -> Result<(), StoreError> {
        let server = MockServer::start_async().await;
        let lookup = server
            .mock_async(|when, then| {
                when.method(GET).path("/collections/docs");
                then.status(404);
            })
            .await;
        let create = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs")
                    .body_contains("\"distance\":\"Cosine\"")
                    .body_contains("\"size\":4");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        let upsert = server
            .mock_async(|when, then| {
                when.method(PUT)
                    .path("/collections/docs/points")
                    .query_param("wait", "true")
                    .body_contains("\"source\":\"invoice.pdf\"")
                    .body_contains("\"hash\":\"aa\"")
                    .body_contains("\"text\":\"Invoice #42\"");
                then.status(200).json_body(json!({ "result": { "status": "completed" } }));
            })
            .await;

        let ids = store(&server)
            .insert(
                &["Invoice #42".to_string(), "total due $100".to_string()],
                &[metadata("invoice.pdf", "aa"), metadata("invoice.pdf", "aa")],
            )
            .await?;

        lookup.assert_async().await;
        create.assert_async().await;
        upsert.assert_async().await;
        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        Ok(())
    }

    #[tokio::test]
    async fn search_hits_become_scored_chunks() -> Result<(), StoreError> {
        let server = MockServer::start_async().await;
        let search = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/search")
                    .body_contains("\"limit\":3")
                    .body_contains("\"with_payload\":true");
                then.status(200).json_body(json!({
                    "result": [
                        {
                            "id": "p1",
                            "score": 0.75,
                            "payload": { "text": "Invoice #42", "source": "invoice.pdf", "hash": "aa" }
                        }
                    ]
                }));
            })
            .await;

        let hits = store(&server).query_similar("invoice number", 3).await?;

        search.assert_async().await;
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].id, "p1");
        assert_eq!(hits[0].text, "Invoice #42");
        assert_eq!(hits[0].metadata, metadata("invoice.pdf", "aa"));
        assert!((hits[0].score - 0.75).abs() < f32::EPSILON);
        Ok(())
    }

    #[tokio::test]
    async fn cleared_collection_returns_no_matches() -> Result<(), StoreError> {
        let server = MockServer::start_async().await;
        let drop_collection = server
            .mock_async(|when, then| {
                when.method(DELETE).path("/collections/docs");
                then.status(200).json_body(json!({ "result": true }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/search");
                then.status(404);
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/scroll");
                then.status(404);
            })
            .await;

        let store = store(&server);
        store.clear().await?;

        drop_collection.assert_async().await;
        assert!(store.query_similar("Invoice #42", 20).await?.is_empty());
        assert!(store.list_all_metadata().await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn metadata_listing_follows_scroll_offsets() -> Result<(), StoreError> {
        let server = MockServer::start_async().await;
        let first = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/scroll")
                    .body_contains("\"offset\":null");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "p1", "payload": { "source": "a.pdf", "hash": "aa" } }
                        ],
                        "next_page_offset": 7
                    }
                }));
            })
            .await;
        let second = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/scroll")
                    .body_contains("\"offset\":7");
                then.status(200).json_body(json!({
                    "result": {
                        "points": [
                            { "id": "p7", "payload": { "source": "b.pdf", "hash": "bb" } }
                        ],
                        "next_page_offset": null
                    }
                }));
            })
            .await;

        let listed = store(&server).list_all_metadata().await?;

        first.assert_async().await;
        second.assert_async().await;
        assert_eq!(listed, vec![metadata("a.pdf", "aa"), metadata("b.pdf", "bb")]);
        Ok(())
    }

    #[tokio::test]
    async fn digest_lookup_counts_with_hash_filter() -> Result<(), StoreError> {
        let server = MockServer::start_async().await;
        let known = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/count")
                    .body_contains("\"key\":\"hash\"")
                    .body_contains("\"value\":\"aa\"");
                then.status(200).json_body(json!({ "result": { "count": 3 } }));
            })
            .await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/collections/docs/points/count")
                    .body_contains("\"value\":\"bb\"");
                then.status(200).json_body(json!({ "result": { "count": 0 } }));
            })
            .await;

        let store = store(&server);
        assert!(store.contains_digest(&ContentDigest::new("aa")).await?);
        assert!(!store.contains_digest(&ContentDigest::new("bb")).await?);
        known.assert_async().await;
        Ok(())
    }

    #[tokio::test]
    async fn server_errors_surface_as_backend_responses() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/collections/docs/points/search");
                then.status(500);
            })
            .await;

        let result = store(&server).query_similar("anything", 5).await;
        assert!(matches!(result, Err(StoreError::BackendResponse { .. })));
    }
}
