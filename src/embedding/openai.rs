//! OpenAI 임베딩 (`POST {base}/embeddings`)

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::retry::RetryPolicy;

/// 요청당 최대 입력 수
const MAX_BATCH: usize = 100;

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    endpoint: String,
    model: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OpenAiEmbedding {
    pub fn new(api_key: String, base_url: &str, model: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            api_key,
            endpoint: format!("{}/embeddings", base_url.trim_end_matches('/')),
            model: model.to_string(),
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// 재시도 정책 교체
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 한 번의 API 호출로 임베딩
    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: inputs,
        };

        let request = &request;
        let endpoint = self.endpoint.as_str();
        let body = self
            .retry
            .execute("OpenAI embedding", || {
                self.client
                    .post(endpoint)
                    .bearer_auth(&self.api_key)
                    .json(request)
                    .send()
            })
            .await?;

        let mut response: EmbeddingsResponse =
            serde_json::from_str(&body).context("Failed to parse embedding response")?;
        if response.data.len() != inputs.len() {
            bail!(
                "OpenAI returned {} embeddings for {} inputs",
                response.data.len(),
                inputs.len()
            );
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

/// 모델별 출력 차원
fn model_dimension(model: &str) -> usize {
    match model {
        "text-embedding-3-large" => 3072,
        _ => 1536,
    }
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.request(&[text.to_string()]).await?;
        vectors
            .pop()
            .context("OpenAI returned no embedding")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for (i, batch) in texts.chunks(MAX_BATCH).enumerate() {
            tracing::debug!("Embedding batch {} ({} texts)", i + 1, batch.len());
            results.extend(self.request(batch).await?);
        }
        Ok(results)
    }

    fn dimension(&self) -> usize {
        model_dimension(&self.model)
    }

    fn name(&self) -> &str {
        &self.model
    }
}
