//! Ollama 로컬 LLM (`POST {base}/api/generate`)

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::LlmProvider;
use crate::retry::RetryPolicy;

pub struct OllamaChat {
    base_url: String,
    model: String,
    temperature: f32,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl OllamaChat {
    pub fn new(base_url: &str, model: &str, temperature: f32) -> Result<Self> {
        // 로컬 CPU 추론은 느릴 수 있음
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            temperature,
            client,
            retry: RetryPolicy::default(),
        })
    }

    /// 재시도 정책 교체
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// 설치된 모델 목록 (`GET /api/tags`)
    pub async fn list_models(&self) -> Result<Vec<String>> {
        let tags: TagsResponse = self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
            .with_context(|| format!("Ollama server unreachable at {}", self.base_url))?
            .error_for_status()
            .context("Ollama server returned an error")?
            .json()
            .await
            .context("Failed to parse Ollama model list")?;

        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Debug, Deserialize)]
struct ModelTag {
    name: String,
}

/// 태그 생략 시 `:latest`와 같은 모델로 취급
pub fn same_model(installed: &str, wanted: &str) -> bool {
    let normalize = |name: &str| {
        if name.contains(':') {
            name.to_string()
        } else {
            format!("{}:latest", name)
        }
    };
    normalize(installed) == normalize(wanted)
}

#[async_trait]
impl LlmProvider for OllamaChat {
    async fn generate(&self, prompt: &str) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
            },
        };

        let request = &request;
        let url = format!("{}/api/generate", self.base_url);
        let url = url.as_str();
        let body = self
            .retry
            .execute("Ollama generate", || self.client.post(url).json(request).send())
            .await?;

        let response: GenerateResponse =
            serde_json::from_str(&body).context("Failed to parse Ollama response")?;
        Ok(response.response)
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model(&self) -> &str {
        &self.model
    }

    async fn health_check(&self) -> Result<()> {
        let models = self.list_models().await?;
        if !models.iter().any(|m| same_model(m, &self.model)) {
            bail!(
                "Model {} is not installed in Ollama.\n\
                 Run: ollama pull {}",
                self.model,
                self.model
            );
        }
        Ok(())
    }
}
