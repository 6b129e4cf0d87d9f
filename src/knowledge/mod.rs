//! Knowledge 모듈 - 헬프센터 기사 벡터 인덱스
//!
//! - Document: 기사 → 문서 → 청크 (메타데이터 복사)
//! - Splitter: 재귀 문자 분할 (문자 단위 길이, 오버랩)
//! - LanceDB: 청크 + 메타데이터 + 임베딩 영속화, ANN 검색
//! - Manager: 인덱스 생성/갱신/검색, 챗봇용 Retriever

mod document;
mod lance;
mod manager;
mod splitter;
mod vector;

// Re-exports
pub use document::{prepare_documents, split_documents, ArticleDocument, Chunk, ChunkMetadata};
pub use lance::LanceVectorStore;
pub use manager::{IndexReport, Retriever, VectorStoreManager};
pub use splitter::{Chunker, RecursiveCharacterSplitter, DEFAULT_SEPARATORS};
pub use vector::{doc_key, SearchResult, VectorEntry, VectorStore};
