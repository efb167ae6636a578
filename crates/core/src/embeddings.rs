use crate::error::ModelError;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 128;

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError>;

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            vectors.push(self.embed(text).await?);
        }
        Ok(vectors)
    }
}

#[async_trait]
impl<T: Embedder + ?Sized> Embedder for Arc<T> {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        (**self).embed(text).await
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        (**self).embed_batch(texts).await
    }
}

/// Offline embedder: hashed character trigrams, L2 normalised.
#[derive(Debug, Clone, Copy)]
pub struct CharacterNgramEmbedder {
    pub dimensions: usize,
}

impl Default for CharacterNgramEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl CharacterNgramEmbedder {
    /// Blocking form of [`Embedder::embed`], used by tests and `--embedder ngram`
    /// runs that have no embedding server to call.
    pub fn embed_sync(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl Embedder for CharacterNgramEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        Ok(self.embed_sync(text))
    }
}

#[derive(Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Embeddings from a local Ollama server (`/api/embed`).
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    client: Client,
}

impl OllamaEmbedder {
    pub fn new(
        endpoint: impl Into<String>,
        model: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ModelError> {
        Ok(Self {
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            model: model.into(),
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl Embedder for OllamaEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ModelError> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().ok_or_else(|| {
            ModelError::InvalidResponse("ollama returned no embedding".to_string())
        })
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ModelError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ModelError::BackendResponse {
                backend: "ollama".to_string(),
                details: format!("{status}: {body}"),
            });
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(ModelError::InvalidResponse(format!(
                "asked for {} embeddings, got {}",
                texts.len(),
                parsed.embeddings.len()
            )));
        }

        Ok(parsed.embeddings)
    }
}

#[cfg(test)]
mod tests {
    use super::{CharacterNgramEmbedder, Embedder, OllamaEmbedder};
    use crate::ModelError;
    use httpmock::{Method::POST, MockServer};
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn embedder_is_deterministic() -> Result<(), ModelError> {
        let embedder = CharacterNgramEmbedder::default();
        let first = embedder.embed("Invoice total and due date").await?;
        let second = embedder.embed("Invoice total and due date").await?;
        assert_eq!(first, second);
        Ok(())
    }

    #[test]
    fn embedder_outputs_expected_length() {
        let embedder = CharacterNgramEmbedder { dimensions: 32 };
        let vector = embedder.embed_sync("abc");
        assert_eq!(vector.len(), 32);
    }

    #[tokio::test]
    async fn batch_embedding_keeps_input_order() -> Result<(), ModelError> {
        let embedder = CharacterNgramEmbedder::default();
        let texts = vec!["first".to_string(), "second".to_string()];
        let vectors = embedder.embed_batch(&texts).await?;
        assert_eq!(vectors[0], embedder.embed_sync("first"));
        assert_eq!(vectors[1], embedder.embed_sync("second"));
        Ok(())
    }

    fn ollama(server: &MockServer) -> Result<OllamaEmbedder, ModelError> {
        OllamaEmbedder::new(
            server.base_url(),
            "mxbai-embed-large",
            Duration::from_secs(5),
        )
    }

    #[tokio::test]
    async fn ollama_batch_posts_model_and_inputs() -> Result<(), ModelError> {
        let server = MockServer::start_async().await;
        let embed = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/embed")
                    .body_contains("\"model\":\"mxbai-embed-large\"")
                    .body_contains("\"input\":[\"first\",\"second\"]");
                then.status(200)
                    .json_body(json!({ "embeddings": [[0.5, 0.25], [0.125, 1.0]] }));
            })
            .await;

        let texts = vec!["first".to_string(), "second".to_string()];
        let vectors = ollama(&server)?.embed_batch(&texts).await?;

        embed.assert_async().await;
        assert_eq!(vectors, vec![vec![0.5, 0.25], vec![0.125, 1.0]]);
        Ok(())
    }

    #[tokio::test]
    async fn ollama_short_batch_is_rejected() -> Result<(), ModelError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(200).json_body(json!({ "embeddings": [[0.5, 0.25]] }));
            })
            .await;

        let texts = vec!["first".to_string(), "second".to_string()];
        let result = ollama(&server)?.embed_batch(&texts).await;
        assert!(matches!(result, Err(ModelError::InvalidResponse(_))));
        Ok(())
    }

    #[tokio::test]
    async fn ollama_error_status_is_reported() -> Result<(), ModelError> {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/embed");
                then.status(500).body("model failed to load");
            })
            .await;

        let result = ollama(&server)?.embed("first").await;
        match result {
            Err(ModelError::BackendResponse { details, .. }) => {
                assert!(details.contains("model failed to load"))
            }
            other => panic!("expected backend error, got {other:?}"),
        }
        Ok(())
    }
}
