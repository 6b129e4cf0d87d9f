//! 임베딩 모듈 - 텍스트 벡터화 프로바이더
//!
//! 설정된 백엔드(OpenAI, Gemini, Ollama, FastEmbed)에 따라 프로바이더를 만듭니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(&settings)?;
//! let embedding = embedder.embed("料金プランについて").await?;
//! ```

mod gemini;
mod ollama;
mod openai;
mod rate_limit;
#[cfg(feature = "local-embed")]
mod fastembed_impl;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{EmbeddingBackend, Settings};

pub use gemini::{GeminiEmbedding, DEFAULT_DIMENSION, GEMINI_EMBEDDING_MODEL};
pub use ollama::OllamaEmbedding;
pub use openai::OpenAiEmbedding;
pub use rate_limit::RateLimiter;
#[cfg(feature = "local-embed")]
pub use fastembed_impl::FastEmbedder;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수 (아직 모르면 0)
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 설정에 맞는 임베딩 프로바이더 생성
pub fn create_embedder(settings: &Settings) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match settings.embedding_backend {
        EmbeddingBackend::OpenAi => {
            let key = settings.require_openai_key()?;
            Arc::new(OpenAiEmbedding::new(
                key.to_string(),
                &settings.openai.base_url,
                &settings.openai.embedding_model,
            )?)
        }
        EmbeddingBackend::Gemini => {
            let key = settings.require_gemini_key()?;
            Arc::new(GeminiEmbedding::new(
                key.to_string(),
                &settings.gemini.base_url,
            )?)
        }
        EmbeddingBackend::Ollama => Arc::new(OllamaEmbedding::new(
            &settings.ollama.base_url,
            &settings.ollama.embedding_model,
        )?),
        EmbeddingBackend::FastEmbed => create_fastembed()?,
    };

    tracing::info!(
        "Using {} embeddings ({})",
        settings.embedding_backend.as_str(),
        embedder.name()
    );
    Ok(embedder)
}

#[cfg(feature = "local-embed")]
fn create_fastembed() -> Result<Arc<dyn EmbeddingProvider>> {
    Ok(Arc::new(FastEmbedder::new()?))
}

#[cfg(not(feature = "local-embed"))]
fn create_fastembed() -> Result<Arc<dyn EmbeddingProvider>> {
    anyhow::bail!(
        "FastEmbed embeddings require the `local-embed` feature.\n\
         Rebuild with: cargo build --features local-embed\n\
         Or set EMBEDDING_PROVIDER=ollama"
    )
}

// ============================================================================
// Tests
// ============================================================================
