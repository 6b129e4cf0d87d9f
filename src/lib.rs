//! helpdesk-rag - 헬프센터 RAG 서포트 챗봇
//!
//! 헬프센터 기사를 크롤링해 LanceDB에 임베딩으로 저장하고,
//! 질문과 가까운 기사 청크를 근거로 LLM이 답변합니다.
//! OpenAI / 로컬(Ollama, fastembed) / Gemini 백엔드를 지원합니다.

pub mod chatbot;
pub mod cli;
pub mod config;
pub mod crawler;
pub mod embedding;
pub mod knowledge;
pub mod llm;
pub mod logging;
pub mod retry;
pub mod scheduler;
pub mod server;

// Re-exports
pub use chatbot::{ChatResponse, Source, SupportChatbot};
pub use config::{BackendMode, Settings};
pub use crawler::{Article, CrawlStrategy, CrawlerConfig, HelpCenterCrawler};
pub use embedding::{create_embedder, EmbeddingProvider};
pub use knowledge::{
    IndexReport, LanceVectorStore, RecursiveCharacterSplitter, Retriever, SearchResult,
    VectorStore, VectorStoreManager,
};
pub use llm::{create_llm, LlmProvider};
pub use scheduler::{UpdateReport, UpdateScheduler};
