//! Embedding provider abstraction.
//!
//! Chunk text is turned into vectors by an [`EmbeddingClient`]. The default implementation is a
//! deterministic, dependency-free placeholder so the rest of the pipeline (chunking, vector
//! store, sync, query) can be exercised without a live Ollama/OpenAI endpoint; `get_embedding_client`
//! is the single seam a real HTTP-backed provider would be wired in behind.

use async_trait::async_trait;
use thiserror::Error;

use crate::config::get_config;

/// Errors raised by embedding providers.
#[derive(Debug, Error)]
pub enum EmbeddingClientError {
    /// Provider was unable to produce embeddings for the supplied input.
    #[error("failed to generate embeddings: {0}")]
    GenerationFailed(String),
}

/// Interface implemented by embedding backends.
#[async_trait]
pub trait EmbeddingClient {
    /// Produce an embedding vector for each supplied chunk of text, in order.
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError>;

    /// The dimensionality this client produces, used for model-fingerprint checks.
    fn dimension(&self) -> usize;

    /// A stable identifier for the provider+model pair, used for model-fingerprint checks.
    fn fingerprint(&self) -> String;
}

/// Deterministic placeholder embedding client: hashes bytes into vector slots and L2-normalizes.
///
/// This keeps the query/sync pipeline fully testable without a live model endpoint. A real
/// provider (Ollama, OpenAI) would implement the same trait and be selected by
/// `get_embedding_client` based on `Config::embedding_provider`.
pub struct DeterministicClient {
    dimension: usize,
    fingerprint: String,
}

impl DeterministicClient {
    /// Build a new deterministic client for the given dimension and fingerprint label.
    pub fn new(dimension: usize, fingerprint: String) -> Self {
        Self {
            dimension,
            fingerprint,
        }
    }

    fn encode(text: &str, dimension: usize) -> Vec<f32> {
        let mut embedding = vec![0.0_f32; dimension];

        if text.is_empty() {
            return embedding;
        }

        for (idx, byte) in text.bytes().enumerate() {
            let position = idx % dimension;
            embedding[position] += f32::from(byte) / 255.0;
        }

        let norm = embedding
            .iter()
            .map(|value| value * value)
            .sum::<f32>()
            .sqrt();

        if norm > 0.0 {
            for value in &mut embedding {
                *value /= norm;
            }
        }

        embedding
    }
}

#[async_trait]
impl EmbeddingClient for DeterministicClient {
    async fn generate_embeddings(
        &self,
        texts: Vec<String>,
    ) -> Result<Vec<Vec<f32>>, EmbeddingClientError> {
        if self.dimension == 0 {
            return Err(EmbeddingClientError::GenerationFailed(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if texts.is_empty() {
            return Err(EmbeddingClientError::GenerationFailed(
                "no texts provided".to_string(),
            ));
        }

        tracing::debug!(dimension = self.dimension, count = texts.len(), "generating embeddings");

        Ok(texts
            .into_iter()
            .map(|text| Self::encode(&text, self.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn fingerprint(&self) -> String {
        self.fingerprint.clone()
    }
}

/// Build an embedding client suitable for the current configuration.
pub fn get_embedding_client() -> Box<dyn EmbeddingClient + Send + Sync> {
    let config = get_config();
    let fingerprint = format!("{:?}:{}", config.embedding_provider, config.embedding_model);
    Box::new(DeterministicClient::new(config.embedding_dimension, fingerprint))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn generates_normalized_vectors() {
        let client = DeterministicClient::new(8, "test:model".to_string());
        let vectors = client
            .generate_embeddings(vec!["hello".to_string(), "world".to_string()])
            .await
            .expect("embeddings");

        assert_eq!(vectors.len(), 2);
        for vector in &vectors {
            assert_eq!(vector.len(), 8);
            let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
            assert!((norm - 1.0).abs() < 1e-4 || norm == 0.0);
        }
    }

    #[tokio::test]
    async fn rejects_empty_input() {
        let client = DeterministicClient::new(8, "test:model".to_string());
        let err = client.generate_embeddings(vec![]).await.unwrap_err();
        assert!(matches!(err, EmbeddingClientError::GenerationFailed(_)));
    }

    #[tokio::test]
    async fn is_deterministic_across_calls() {
        let client = DeterministicClient::new(16, "test:model".to_string());
        let a = client
            .generate_embeddings(vec!["same text".to_string()])
            .await
            .unwrap();
        let b = client
            .generate_embeddings(vec!["same text".to_string()])
            .await
            .unwrap();
        assert_eq!(a, b);
    }
}
