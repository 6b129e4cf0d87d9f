//! LLM 모듈 - 답변 생성 프로바이더
//!
//! 프롬프트 하나를 보내고 생성된 텍스트를 받는 단순한 인터페이스입니다.

mod gemini;
mod ollama;
mod openai;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::config::{LlmBackend, Settings};

pub use gemini::GeminiChat;
pub use ollama::{same_model, OllamaChat};
pub use openai::OpenAiChat;

/// LLM 프로바이더 트레이트
#[async_trait]
pub trait LlmProvider: Send + Sync {
    /// 프롬프트로 텍스트 생성
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// 프로바이더 이름
    fn name(&self) -> &str;

    /// 모델 이름
    fn model(&self) -> &str;

    /// 서버/키/모델 사용 가능 여부 확인
    async fn health_check(&self) -> Result<()>;
}

/// 설정에 맞는 LLM 프로바이더 생성
pub fn create_llm(settings: &Settings) -> Result<Arc<dyn LlmProvider>> {
    let llm: Arc<dyn LlmProvider> = match settings.llm_backend {
        LlmBackend::OpenAi => Arc::new(OpenAiChat::new(
            settings.require_openai_key()?.to_string(),
            &settings.openai.base_url,
            &settings.openai.chat_model,
            settings.temperature,
        )?),
        LlmBackend::Ollama => Arc::new(OllamaChat::new(
            &settings.ollama.base_url,
            &settings.ollama.chat_model,
            settings.temperature,
        )?),
        LlmBackend::Gemini => Arc::new(GeminiChat::new(
            settings.require_gemini_key()?.to_string(),
            &settings.gemini.base_url,
            &settings.gemini.model,
            settings.temperature,
        )?),
    };

    tracing::info!("Using {} LLM ({})", llm.name(), llm.model());
    Ok(llm)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned(), None).unwrap()
    }

    #[test]
    fn test_create_llm_per_mode() {
        let llm = create_llm(&settings(&[])).unwrap();
        assert_eq!(llm.name(), "ollama");
        assert_eq!(llm.model(), "gemma2:2b");

        let llm = create_llm(&settings(&[
            ("CHATBOT_MODE", "openai"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(llm.name(), "openai");
        assert_eq!(llm.model(), "gpt-4o-mini");

        let llm = create_llm(&settings(&[
            ("CHATBOT_MODE", "gemini"),
            ("GEMINI_API_KEY", "k"),
        ]))
        .unwrap();
        assert_eq!(llm.name(), "gemini");
    }

    #[test]
    fn test_missing_key_is_error() {
        assert!(create_llm(&settings(&[("CHATBOT_MODE", "openai")])).is_err());
        assert!(create_llm(&settings(&[("CHATBOT_MODE", "gemini")])).is_err());
    }
}
