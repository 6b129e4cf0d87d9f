//! Vector Store - 벡터 검색 트레이트 및 유틸리티
//!
//! LanceDB ANN (Approximate Nearest Neighbor) 검색을 사용합니다.

use anyhow::{bail, Result};
use async_trait::async_trait;
use sha2::{Digest, Sha256};

use super::document::ChunkMetadata;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 기사 키 (URL의 SHA-256)
    pub doc_key: String,
    /// 청크 인덱스 (0-based)
    pub chunk_index: i32,
    /// 청크 텍스트
    pub chunk_text: String,
    /// 출처 메타데이터
    pub metadata: ChunkMetadata,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub doc_key: String,
    pub chunk_index: i32,
    pub chunk_text: String,
    pub metadata: ChunkMetadata,
    /// 유사도 스코어 (0.0 ~ 1.0, 거리 기반)
    pub similarity: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 벡터 검색 (가까운 순)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// doc_key로 벡터 삭제
    async fn delete_by_doc_key(&self, doc_key: &str) -> Result<usize>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 특정 doc_key의 임베딩 존재 여부
    async fn has_embeddings(&self, doc_key: &str) -> Result<bool>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 기사 URL → doc_key (소문자 hex SHA-256)
pub fn doc_key(url: &str) -> String {
    format!("{:x}", Sha256::digest(url.as_bytes()))
}

/// 필터 식에 넣기 전 doc_key 검증 (hex만 허용)
pub(crate) fn validate_doc_key(key: &str) -> Result<()> {
    if key.is_empty() || !key.chars().all(|c| c.is_ascii_hexdigit()) {
        bail!("Invalid doc_key: {}", key);
    }
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_doc_key_is_sha256_hex() {
        // echo -n "abc" | sha256sum
        assert_eq!(
            doc_key("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_doc_key_stable_and_distinct() {
        let a = doc_key("https://help.example.com/hc/ja/articles/1");
        let b = doc_key("https://help.example.com/hc/ja/articles/2");
        assert_eq!(a, doc_key("https://help.example.com/hc/ja/articles/1"));
        assert_ne!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn test_validate_doc_key() {
        assert!(validate_doc_key(&doc_key("x")).is_ok());
        assert!(validate_doc_key("abc' OR 1=1").is_err());
        assert!(validate_doc_key("").is_err());
    }
}
