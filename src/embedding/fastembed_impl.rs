//! FastEmbed 로컬 임베딩 (프로세스 내 ONNX 모델)

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::Mutex;

use super::EmbeddingProvider;
use crate::config::FASTEMBED_MODEL;

/// all-MiniLM-L6-v2 출력 차원
const DIMENSION: usize = 384;

/// FastEmbed 기반 임베딩
pub struct FastEmbedder {
    model: Arc<Mutex<TextEmbedding>>,
}

impl FastEmbedder {
    /// 모델 로드 (최초 실행 시 다운로드)
    pub fn new() -> Result<Self> {
        tracing::info!("Initializing FastEmbed with model: {}", FASTEMBED_MODEL);

        let options =
            InitOptions::new(EmbeddingModel::AllMiniLML6V2).with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| anyhow!("Failed to initialize FastEmbed model: {}", e))?;

        tracing::info!("FastEmbed model loaded successfully");
        Ok(Self {
            model: Arc::new(Mutex::new(model)),
        })
    }
}

#[async_trait]
impl EmbeddingProvider for FastEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        vectors.pop().context("FastEmbed returned no embedding")
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        tracing::debug!("Embedding {} texts", texts.len());

        // 동기 모델이므로 blocking 태스크에서 실행
        let model = self.model.clone();
        let texts = texts.to_vec();
        tokio::task::spawn_blocking(move || {
            let model = model.blocking_lock();
            model.embed(texts, None)
        })
        .await
        .context("Embedding task join error")?
        .map_err(|e| anyhow!("Embedding failed: {}", e))
    }

    fn dimension(&self) -> usize {
        DIMENSION
    }

    fn name(&self) -> &str {
        FASTEMBED_MODEL
    }
}
