//! Ollama 로컬 임베딩 (`POST {base}/api/embed`)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::retry::RetryPolicy;

/// 요청당 최대 입력 수
const MAX_BATCH: usize = 32;

/// Ollama 임베딩 구현체
///
/// 알려지지 않은 모델의 차원은 첫 응답에서 기록됩니다.
#[derive(Debug)]
pub struct OllamaEmbedding {
    endpoint: String,
    model: String,
    client: reqwest::Client,
    dimension: AtomicUsize,
    retry: RetryPolicy,
}

impl OllamaEmbedding {
    pub fn new(base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            client,
            dimension: AtomicUsize::new(known_dimension(model)),
            retry: RetryPolicy::default(),
        })
    }

    /// 재시도 정책 교체
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbedRequest {
            model: &self.model,
            input: inputs,
        };

        let request = &request;
        let endpoint = self.endpoint.as_str();
        let body = self
            .retry
            .execute("Ollama embedding", || {
                self.client.post(endpoint).json(request).send()
            })
            .await?;

        let response: EmbedResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama embedding response")?;
        if response.embeddings.len() != inputs.len() {
            bail!(
                "Ollama returned {} embeddings for {} inputs",
                response.embeddings.len(),
                inputs.len()
            );
        }

        if let Some(first) = response.embeddings.first() {
            self.dimension.store(first.len(), Ordering::Relaxed);
        }
        Ok(response.embeddings)
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// 자주 쓰는 모델의 차원 (모르면 0)
fn known_dimension(model: &str) -> usize {
    let name = model.split(':').next().unwrap_or(model);
    match name {
        "all-minilm" => 384,
        "nomic-embed-text" => 768,
        "mxbai-embed-large" => 1024,
        _ => 0,
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors.pop().context("Ollama returned no embedding")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for batch in texts.chunks(MAX_BATCH) {
            results.extend(self.request(batch).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension.load(Ordering::Relaxed)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
