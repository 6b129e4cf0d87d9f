//! 설정 모듈 - 환경변수 기반 런타임 설정
//!
//! `.env` 파일은 main에서 dotenvy로 먼저 로드됩니다.
//! 실제 해석은 키 조회 함수 위에서 동작하므로 테스트에서 프로세스 환경을 건드리지 않습니다.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

use crate::crawler::CrawlerConfig;

// ============================================================================
// Backend Selection
// ============================================================================

/// 백엔드 모드 (유료 클라우드 / 로컬 무료 / 대체 클라우드)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// OpenAI 임베딩 + OpenAI 채팅
    OpenAi,
    /// 로컬 임베딩 + Ollama (또는 OpenAI 채팅)
    Free,
    /// 로컬 임베딩 + Gemini 채팅
    Gemini,
}

impl BackendMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendMode::OpenAi => "openai",
            BackendMode::Free => "free",
            BackendMode::Gemini => "gemini",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendMode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(BackendMode::OpenAi),
            "free" | "local" => Ok(BackendMode::Free),
            "gemini" => Ok(BackendMode::Gemini),
            other => bail!("Unknown mode: {}. Must be openai, free, or gemini", other),
        }
    }
}

/// 임베딩 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingBackend {
    OpenAi,
    Gemini,
    Ollama,
    /// 프로세스 내 ONNX 모델 (`local-embed` feature)
    FastEmbed,
}

impl EmbeddingBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmbeddingBackend::OpenAi => "openai",
            EmbeddingBackend::Gemini => "gemini",
            EmbeddingBackend::Ollama => "ollama",
            EmbeddingBackend::FastEmbed => "fastembed",
        }
    }

    /// 로컬에서 동작하는 (API 키 불필요) 백엔드인지
    pub fn is_local(&self) -> bool {
        matches!(self, EmbeddingBackend::Ollama | EmbeddingBackend::FastEmbed)
    }
}

impl FromStr for EmbeddingBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbeddingBackend::OpenAi),
            "gemini" => Ok(EmbeddingBackend::Gemini),
            "ollama" => Ok(EmbeddingBackend::Ollama),
            "fastembed" | "huggingface" => Ok(EmbeddingBackend::FastEmbed),
            other => bail!(
                "Unknown embedding provider: {}. Must be openai, gemini, ollama, or fastembed",
                other
            ),
        }
    }
}

/// LLM 백엔드
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    OpenAi,
    Ollama,
    Gemini,
}

impl LlmBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            LlmBackend::OpenAi => "openai",
            LlmBackend::Ollama => "ollama",
            LlmBackend::Gemini => "gemini",
        }
    }
}

// ============================================================================
// Provider Settings
// ============================================================================

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_OLLAMA_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    pub api_key: Option<String>,
    pub base_url: String,
    pub model: String,
}

#[derive(Debug, Clone)]
pub struct OllamaSettings {
    pub base_url: String,
    pub chat_model: String,
    pub embedding_model: String,
}

// ============================================================================
// Settings
// ============================================================================

/// 전체 런타임 설정
#[derive(Debug, Clone)]
pub struct Settings {
    pub mode: BackendMode,
    pub embedding_backend: EmbeddingBackend,
    pub llm_backend: LlmBackend,

    pub openai: OpenAiSettings,
    pub gemini: GeminiSettings,
    pub ollama: OllamaSettings,

    /// LLM 샘플링 온도
    pub temperature: f32,
    /// 질문당 검색할 청크 수
    pub retrieval_k: usize,
    /// 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 청크 오버랩 (문자 수)
    pub chunk_overlap: usize,

    pub crawler: CrawlerConfig,

    /// 크롤링 결과 JSON 경로
    pub articles_path: PathBuf,
    /// LanceDB 디렉토리
    pub vector_db_dir: PathBuf,

    pub update_interval: Duration,
    pub scheduler_enabled: bool,
    pub run_initial_update: bool,

    pub server_host: String,
    pub server_port: u16,
    pub static_dir: PathBuf,
    /// 설정 시 일별 로그 파일도 기록
    pub log_dir: Option<PathBuf>,
}

impl Settings {
    /// 프로세스 환경변수에서 로드
    pub fn from_env(mode_override: Option<BackendMode>) -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), mode_override)
    }

    /// 임의의 키 조회 함수로 로드
    pub fn from_lookup<F>(lookup: F, mode_override: Option<BackendMode>) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = EnvReader { lookup };

        let mode = match mode_override {
            Some(mode) => mode,
            None => env.parse_or("CHATBOT_MODE", BackendMode::Free)?,
        };
        let use_local_llm = env.bool_or("USE_LOCAL_LLM", true)?;

        let (default_embedding, llm_backend) = match mode {
            BackendMode::OpenAi => (EmbeddingBackend::OpenAi, LlmBackend::OpenAi),
            BackendMode::Free if use_local_llm => (default_local_embedding(), LlmBackend::Ollama),
            BackendMode::Free => (EmbeddingBackend::OpenAi, LlmBackend::OpenAi),
            BackendMode::Gemini => (default_local_embedding(), LlmBackend::Gemini),
        };
        let embedding_backend = env.parse_or("EMBEDDING_PROVIDER", default_embedding)?;

        let openai = OpenAiSettings {
            api_key: env.get("OPENAI_API_KEY"),
            base_url: env.string_or("OPENAI_BASE_URL", DEFAULT_OPENAI_BASE_URL),
            chat_model: env.string_or("OPENAI_MODEL", "gpt-4o-mini"),
            embedding_model: env.string_or("OPENAI_EMBEDDING_MODEL", "text-embedding-ada-002"),
        };

        let gemini = GeminiSettings {
            api_key: env.get("GEMINI_API_KEY").or_else(|| env.get("GOOGLE_AI_API_KEY")),
            base_url: env.string_or("GEMINI_BASE_URL", DEFAULT_GEMINI_BASE_URL),
            model: env.string_or("GEMINI_MODEL", "gemini-1.5-flash"),
        };

        let ollama = OllamaSettings {
            base_url: env.string_or("OLLAMA_BASE_URL", DEFAULT_OLLAMA_BASE_URL),
            chat_model: env.string_or("LOCAL_LLM_MODEL", "gemma2:2b"),
            embedding_model: env.string_or("LOCAL_EMBEDDING_MODEL", "all-minilm"),
        };

        let chunk_size: usize = env.parse_or("CHUNK_SIZE", 1000)?;
        let chunk_overlap: usize = env.parse_or("CHUNK_OVERLAP", 200)?;
        if chunk_overlap > chunk_size {
            bail!(
                "CHUNK_OVERLAP ({}) must not exceed CHUNK_SIZE ({})",
                chunk_overlap,
                chunk_size
            );
        }

        let retrieval_k: usize = env.parse_or("RETRIEVAL_K", 4)?;
        if retrieval_k == 0 {
            bail!("RETRIEVAL_K must be at least 1");
        }

        let defaults = CrawlerConfig::default();
        let crawler = CrawlerConfig {
            base_url: env.string_or("CRAWLER_BASE_URL", &defaults.base_url),
            strategy: env.parse_or("CRAWL_STRATEGY", defaults.strategy)?,
            request_delay: Duration::from_millis(
                env.parse_or("CRAWL_DELAY_MS", defaults.request_delay.as_millis() as u64)?,
            ),
            timeout: defaults.timeout,
            category_label: env.string_or("CRAWL_CATEGORY_LABEL", &defaults.category_label),
        };

        let interval_hours: u64 = env.parse_or("UPDATE_INTERVAL_HOURS", 24)?;
        if interval_hours == 0 {
            bail!("UPDATE_INTERVAL_HOURS must be at least 1");
        }
        let scheduler_enabled = env.bool_or("SCHEDULER_ENABLED", mode == BackendMode::OpenAi)?;
        let run_initial_update = env.bool_or("RUN_INITIAL_UPDATE", scheduler_enabled)?;

        let server_port = match env.get("SERVER_PORT").or_else(|| env.get("PORT")) {
            Some(raw) => raw
                .parse::<u16>()
                .with_context(|| format!("Invalid SERVER_PORT: {}", raw))?,
            None => 5000,
        };

        Ok(Self {
            mode,
            embedding_backend,
            llm_backend,
            openai,
            gemini,
            ollama,
            temperature: env.parse_or("LLM_TEMPERATURE", 0.7)?,
            retrieval_k,
            chunk_size,
            chunk_overlap,
            crawler,
            articles_path: PathBuf::from(env.string_or("ARTICLES_PATH", "data/articles.json")),
            vector_db_dir: PathBuf::from(env.string_or("VECTOR_DB_DIR", "vector_db")),
            update_interval: Duration::from_secs(interval_hours * 60 * 60),
            scheduler_enabled,
            run_initial_update,
            server_host: env.string_or("SERVER_HOST", "0.0.0.0"),
            server_port,
            static_dir: PathBuf::from(env.string_or("STATIC_DIR", "static")),
            log_dir: env.get("LOG_DIR").map(PathBuf::from),
        })
    }

    /// OpenAI API 키 (없으면 에러)
    pub fn require_openai_key(&self) -> Result<&str> {
        self.openai.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "OPENAI_API_KEY not set.\n\
                 Set: export OPENAI_API_KEY=your-api-key"
            )
        })
    }

    /// Gemini API 키 (없으면 에러)
    ///
    /// 우선순위: GEMINI_API_KEY > GOOGLE_AI_API_KEY
    pub fn require_gemini_key(&self) -> Result<&str> {
        self.gemini.api_key.as_deref().ok_or_else(|| {
            anyhow!(
                "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set.\n\
                 Set: export GEMINI_API_KEY=your-api-key\n\
                 Get your API key at: https://aistudio.google.com/app/apikey"
            )
        })
    }

    /// 현재 LLM 모델 이름
    pub fn llm_model(&self) -> &str {
        match self.llm_backend {
            LlmBackend::OpenAi => &self.openai.chat_model,
            LlmBackend::Ollama => &self.ollama.chat_model,
            LlmBackend::Gemini => &self.gemini.model,
        }
    }

    /// 현재 임베딩 모델 이름
    pub fn embedding_model(&self) -> &str {
        match self.embedding_backend {
            EmbeddingBackend::OpenAi => &self.openai.embedding_model,
            EmbeddingBackend::Gemini => crate::embedding::GEMINI_EMBEDDING_MODEL,
            EmbeddingBackend::Ollama => &self.ollama.embedding_model,
            EmbeddingBackend::FastEmbed => FASTEMBED_MODEL,
        }
    }

    /// Ollama 서버가 필요한 구성인지
    pub fn uses_ollama(&self) -> bool {
        self.llm_backend == LlmBackend::Ollama || self.embedding_backend == EmbeddingBackend::Ollama
    }
}

/// fastembed 로컬 모델
pub const FASTEMBED_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";

/// 로컬 임베딩 기본값: feature가 켜져 있으면 프로세스 내 모델, 아니면 Ollama
fn default_local_embedding() -> EmbeddingBackend {
    if cfg!(feature = "local-embed") {
        EmbeddingBackend::FastEmbed
    } else {
        EmbeddingBackend::Ollama
    }
}

// ============================================================================
// Env Reader
// ============================================================================

struct EnvReader<F> {
    lookup: F,
}

impl<F> EnvReader<F>
where
    F: Fn(&str) -> Option<String>,
{
    /// 빈 문자열은 미설정으로 취급
    fn get(&self, key: &str) -> Option<String> {
        (self.lookup)(key)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string_or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn parse_or<T>(&self, key: &str, default: T) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw
                .parse::<T>()
                .map_err(|e| anyhow!("Invalid {}: {} ({})", key, raw, e)),
            None => Ok(default),
        }
    }

    fn bool_or(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            Some(raw) => match raw.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => bail!("Invalid {}: {} (expected true or false)", key, raw),
            },
            None => Ok(default),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use crate::crawler::CrawlStrategy;

    fn load(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned(), None)
    }

    #[test]
    fn test_defaults() {
        let settings = load(&[]).unwrap();
        assert_eq!(settings.mode, BackendMode::Free);
        assert_eq!(settings.llm_backend, LlmBackend::Ollama);
        assert!(settings.embedding_backend.is_local());
        assert_eq!(settings.llm_model(), "gemma2:2b");
        assert_eq!(settings.chunk_size, 1000);
        assert_eq!(settings.chunk_overlap, 200);
        assert_eq!(settings.retrieval_k, 4);
        assert_eq!(settings.server_port, 5000);
        assert_eq!(settings.update_interval, Duration::from_secs(24 * 3600));
        assert!(!settings.scheduler_enabled);
        assert!(settings.uses_ollama());
        assert_eq!(settings.articles_path, PathBuf::from("data/articles.json"));
    }

    #[test]
    fn test_openai_mode_enables_scheduler() {
        let settings = load(&[("CHATBOT_MODE", "openai"), ("OPENAI_API_KEY", "sk-test")]).unwrap();
        assert_eq!(settings.embedding_backend, EmbeddingBackend::OpenAi);
        assert_eq!(settings.llm_backend, LlmBackend::OpenAi);
        assert_eq!(settings.llm_model(), "gpt-4o-mini");
        assert!(settings.scheduler_enabled);
        assert!(settings.run_initial_update);
        assert_eq!(settings.require_openai_key().unwrap(), "sk-test");
    }

    #[test]
    fn test_free_mode_without_local_llm_uses_openai() {
        let settings = load(&[("USE_LOCAL_LLM", "false")]).unwrap();
        assert_eq!(settings.llm_backend, LlmBackend::OpenAi);
        assert_eq!(settings.embedding_backend, EmbeddingBackend::OpenAi);
        assert!(settings.require_openai_key().is_err());
    }

    #[test]
    fn test_gemini_mode_key_fallback() {
        let settings = load(&[
            ("CHATBOT_MODE", "gemini"),
            ("GOOGLE_AI_API_KEY", "g-key"),
            ("EMBEDDING_PROVIDER", "ollama"),
        ])
        .unwrap();
        assert_eq!(settings.llm_backend, LlmBackend::Gemini);
        assert_eq!(settings.embedding_backend, EmbeddingBackend::Ollama);
        assert_eq!(settings.require_gemini_key().unwrap(), "g-key");
        assert_eq!(settings.llm_model(), "gemini-1.5-flash");
    }

    #[test]
    fn test_mode_override_wins() {
        let map: HashMap<String, String> =
            [("CHATBOT_MODE".to_string(), "gemini".to_string())].into_iter().collect();
        let settings =
            Settings::from_lookup(|key| map.get(key).cloned(), Some(BackendMode::OpenAi)).unwrap();
        assert_eq!(settings.mode, BackendMode::OpenAi);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(load(&[("CHATBOT_MODE", "claude")]).is_err());
        assert!(load(&[("CHUNK_SIZE", "abc")]).is_err());
        assert!(load(&[("CHUNK_SIZE", "100"), ("CHUNK_OVERLAP", "200")]).is_err());
        assert!(load(&[("USE_LOCAL_LLM", "maybe")]).is_err());
        assert!(load(&[("UPDATE_INTERVAL_HOURS", "0")]).is_err());
        assert!(load(&[("SERVER_PORT", "99999")]).is_err());
    }

    #[test]
    fn test_empty_values_are_ignored() {
        let settings = load(&[("OPENAI_API_KEY", "  "), ("SERVER_PORT", "")]).unwrap();
        assert!(settings.openai.api_key.is_none());
        assert_eq!(settings.server_port, 5000);
    }

    #[test]
    fn test_crawler_settings() {
        let settings = load(&[
            ("CRAWLER_BASE_URL", "https://help.dmobile.jp/hc/ja"),
            ("CRAWL_STRATEGY", "article-links"),
            ("CRAWL_DELAY_MS", "500"),
        ])
        .unwrap();
        assert_eq!(settings.crawler.base_url, "https://help.dmobile.jp/hc/ja");
        assert_eq!(settings.crawler.strategy, CrawlStrategy::ArticleLinks);
        assert_eq!(settings.crawler.request_delay, Duration::from_millis(500));
    }
}
