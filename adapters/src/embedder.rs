//! Dense-vector embedding capability.
//!
//! Supports an OpenAI-compatible remote embedder and a deterministic local
//! feature-hashing embedder. Batch output is always positionally aligned
//! with the input texts.

use std::hash::{DefaultHasher, Hash, Hasher};

use async_trait::async_trait;
use futures::{FutureExt, StreamExt};
use serde::Deserialize;
use tracing::{debug, info};

use crate::context::{OpContext, ProgressStage, ProgressStatus};
use crate::error::{AdapterError, Result};

/// Capability interface for embedding.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Short name used in error context.
    fn name(&self) -> &str;

    /// Dimension of the produced vectors.
    fn dimension(&self) -> usize;

    /// Embed each text into a dense vector.
    ///
    /// Returns exactly one vector per input, in input order.
    async fn embed(&self, texts: &[String], ctx: &OpContext) -> Result<Vec<Vec<f32>>>;
}

/// OpenAI-compatible embedding client.
pub struct OpenAiEmbedder {
    api_key: Option<String>,
    base_url: String,
    client: reqwest::Client,
    model: String,
    dimension: usize,
    batch_size: usize,
    max_concurrent: usize,
}

impl OpenAiEmbedder {
    /// Create a client reading the API key from `OPENAI_API_KEY`.
    pub fn new() -> Self {
        Self {
            api_key: std::env::var("OPENAI_API_KEY").ok(),
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
            model: "text-embedding-3-small".to_string(),
            dimension: 1536,
            batch_size: 64,
            max_concurrent: 4,
        }
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Set the API base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set the model and its output dimension.
    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    /// Set the number of texts per request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the number of concurrently in-flight requests.
    pub fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent.max(1);
        self
    }

    async fn embed_batch(&self, api_key: &str, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let body = serde_json::json!({
            "input": texts,
            "model": self.model,
        });

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .header("Authorization", format!("Bearer {api_key}"))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::TOO_MANY_REQUESTS {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(60);
            return Err(AdapterError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(AdapterError::ApiRequest(format!("API error: {error_text}")));
        }

        let parsed: EmbeddingsResponse = response.json().await?;
        if parsed.data.len() != texts.len() {
            return Err(AdapterError::Misaligned {
                expected: texts.len(),
                actual: parsed.data.len(),
            });
        }

        // The API reports an index per item; honor it rather than assuming
        // response order.
        let mut vectors = vec![Vec::new(); texts.len()];
        for item in parsed.data {
            if item.index >= vectors.len() {
                return Err(AdapterError::InvalidResponse(format!(
                    "embedding index {} out of range",
                    item.index
                )));
            }
            vectors[item.index] = item.embedding;
        }

        Ok(vectors)
    }
}

impl Default for OpenAiEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn name(&self) -> &str {
        "openai"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], ctx: &OpContext) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let api_key = self
            .api_key
            .clone()
            .ok_or_else(|| AdapterError::NotConfigured("missing OpenAI API key".to_string()))?;

        ctx.started(ProgressStage::Embedding);
        debug!("embedding {} texts with model {}", texts.len(), self.model);

        let batches: Vec<&[String]> = texts.chunks(self.batch_size).collect();
        let total_batches = batches.len();

        // Bounded fan-out: batches run concurrently and land in indexed
        // slots, so the join is order-preserving.
        let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; total_batches];
        let mut futs = Vec::with_capacity(total_batches);
        for (batch_index, chunk) in batches.into_iter().enumerate() {
            let api_key = api_key.clone();
            futs.push(
                async move {
                    ctx.checkpoint()?;
                    let vectors = self.embed_batch(&api_key, chunk).await?;
                    Ok::<(usize, Vec<Vec<f32>>), AdapterError>((batch_index, vectors))
                }
                .boxed(),
            );
        }
        let mut stream = futures::stream::iter(futs).buffer_unordered(self.max_concurrent);

        let mut done = 0usize;
        while let Some(result) = stream.next().await {
            let (batch_index, vectors) = result?;
            slots[batch_index] = Some(vectors);
            done += 1;
            ctx.emit(
                ProgressStage::Embedding,
                ProgressStatus::Progress,
                Some(done as f32 / total_batches as f32),
                None,
            );
        }
        drop(stream);

        let mut all = Vec::with_capacity(texts.len());
        for slot in slots {
            let vectors = slot.ok_or_else(|| {
                AdapterError::InvalidResponse("missing embedding batch".to_string())
            })?;
            all.extend(vectors);
        }

        if all.len() != texts.len() {
            return Err(AdapterError::Misaligned {
                expected: texts.len(),
                actual: all.len(),
            });
        }

        info!("embedded {} texts", all.len());
        ctx.completed(ProgressStage::Embedding);
        Ok(all)
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingItem {
    embedding: Vec<f32>,
    index: usize,
}

/// Deterministic feature-hashing embedder.
///
/// Each whitespace token hashes to a signed bucket; the accumulated vector is
/// L2-normalized. Not a semantic model, but deterministic and cheap, which
/// makes the full pipeline testable offline.
pub struct HashEmbedder {
    dimension: usize,
}

impl HashEmbedder {
    /// Create an embedder with the given output dimension.
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension: dimension.max(1),
        }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for token in text.split_whitespace() {
            let token = token
                .trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase();
            if token.is_empty() {
                continue;
            }

            let mut hasher = DefaultHasher::new();
            token.hash(&mut hasher);
            let hash = hasher.finish();

            let bucket = (hash % self.dimension as u64) as usize;
            let sign = if hash & (1 << 63) == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let magnitude: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for x in &mut vector {
                *x /= magnitude;
            }
        }

        vector
    }
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self::new(256)
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn embed(&self, texts: &[String], ctx: &OpContext) -> Result<Vec<Vec<f32>>> {
        ctx.started(ProgressStage::Embedding);

        let mut vectors = Vec::with_capacity(texts.len());
        for text in texts {
            ctx.checkpoint()?;
            vectors.push(self.embed_one(text));
        }

        ctx.completed(ProgressStage::Embedding);
        Ok(vectors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_hash_embedder_deterministic() {
        let embedder = HashEmbedder::new(64);
        let texts = vec!["a dog barks".to_string()];

        let first = embedder.embed(&texts, &OpContext::new()).await.unwrap();
        let second = embedder.embed(&texts, &OpContext::new()).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(first[0].len(), 64);
    }

    #[tokio::test]
    async fn test_hash_embedder_overlap_scores_higher() {
        let embedder = HashEmbedder::new(256);
        let texts = vec![
            "the dog sleeps".to_string(),
            "a dog".to_string(),
            "quantum chromodynamics".to_string(),
        ];
        let vectors = embedder.embed(&texts, &OpContext::new()).await.unwrap();

        let dot = |a: &[f32], b: &[f32]| -> f32 {
            a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
        };

        assert!(dot(&vectors[0], &vectors[1]) > dot(&vectors[0], &vectors[2]));
    }

    #[tokio::test]
    async fn test_openai_embedder_batches() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "data": [
                    { "embedding": [1.0, 0.0], "index": 0 },
                    { "embedding": [0.0, 1.0], "index": 1 },
                ],
                "model": "test",
            })))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new()
            .with_api_key("test-key")
            .with_base_url(server.uri())
            .with_model("test", 2);

        let texts = vec!["one".to_string(), "two".to_string()];
        let vectors = embedder.embed(&texts, &OpContext::new()).await.unwrap();

        assert_eq!(vectors.len(), 2);
        assert_eq!(vectors[0], vec![1.0, 0.0]);
        assert_eq!(vectors[1], vec![0.0, 1.0]);
    }

    #[tokio::test]
    async fn test_openai_embedder_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).insert_header("retry-after", "7"))
            .mount(&server)
            .await;

        let embedder = OpenAiEmbedder::new()
            .with_api_key("test-key")
            .with_base_url(server.uri());

        let result = embedder
            .embed(&["x".to_string()], &OpContext::new())
            .await;

        assert!(matches!(
            result,
            Err(AdapterError::RateLimited { retry_after_secs: 7 })
        ));
    }

    #[tokio::test]
    async fn test_openai_embedder_requires_key() {
        let embedder = OpenAiEmbedder::new().with_base_url("http://localhost:1");
        let embedder = OpenAiEmbedder {
            api_key: None,
            ..embedder
        };

        let result = embedder.embed(&["x".to_string()], &OpContext::new()).await;
        assert!(matches!(result, Err(AdapterError::NotConfigured(_))));
    }
}
