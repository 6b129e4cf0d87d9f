//! Vector Store Manager - 인덱스 생성/갱신/검색
//!
//! 기사 JSON을 문서 → 청크 → 임베딩으로 변환해 LanceDB에 저장하고,
//! 질문을 임베딩해 가까운 청크를 찾습니다.
//! 같은 URL의 기사를 다시 인덱싱하면 이전 청크는 교체됩니다.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::config::Settings;
use crate::crawler::{load_from_json, Article};
use crate::embedding::{create_embedder, EmbeddingProvider};

use super::document::{prepare_documents, split_documents};
use super::lance::LanceVectorStore;
use super::splitter::RecursiveCharacterSplitter;
use super::vector::{doc_key, SearchResult, VectorEntry, VectorStore};

// ============================================================================
// Retriever Trait
// ============================================================================

/// 질문에 관련된 청크를 찾는 검색기
#[async_trait]
pub trait Retriever: Send + Sync {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>>;
}

// ============================================================================
// Types
// ============================================================================

/// 인덱싱 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// 인덱싱된 기사 수 (본문 있는 것만)
    pub articles: usize,
    /// 저장된 청크 수
    pub chunks: usize,
    /// 교체되어 삭제된 이전 청크 수
    pub replaced: usize,
}

// ============================================================================
// VectorStoreManager
// ============================================================================

/// 벡터 저장소 관리자
pub struct VectorStoreManager {
    db_dir: PathBuf,
    embedder: Arc<dyn EmbeddingProvider>,
    splitter: RecursiveCharacterSplitter,
    store: RwLock<Option<LanceVectorStore>>,
}

impl VectorStoreManager {
    /// 새 관리자 생성 (저장소는 `load_or_create`에서 열림)
    pub fn new(
        db_dir: impl Into<PathBuf>,
        embedder: Arc<dyn EmbeddingProvider>,
        splitter: RecursiveCharacterSplitter,
    ) -> Self {
        Self {
            db_dir: db_dir.into(),
            embedder,
            splitter,
            store: RwLock::new(None),
        }
    }

    /// 설정의 임베딩 백엔드/청크 크기/DB 경로로 생성
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let embedder = create_embedder(settings)?;
        let splitter =
            RecursiveCharacterSplitter::new(settings.chunk_size, settings.chunk_overlap)?;
        Ok(Self::new(&settings.vector_db_dir, embedder, splitter))
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    /// 임베딩 프로바이더 이름
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }

    /// 저장소가 열려 있는지
    pub async fn is_loaded(&self) -> bool {
        self.store.read().await.is_some()
    }

    /// 저장소 열기 (없으면 생성)
    pub async fn load_or_create(&self) -> Result<()> {
        let existed = self.db_dir.exists();
        let store = LanceVectorStore::open(&self.db_dir)
            .await
            .with_context(|| format!("Failed to open vector store: {}", self.db_dir.display()))?;

        if existed {
            tracing::info!("Loaded existing vector store from {}", self.db_dir.display());
        } else {
            tracing::info!("Created new vector store at {}", self.db_dir.display());
        }

        *self.store.write().await = Some(store);
        Ok(())
    }

    /// 기사 JSON 로드 (실패 시 빈 목록)
    pub fn load_articles_from_json(&self, path: &Path) -> Vec<Article> {
        match load_from_json(path) {
            Ok(articles) => articles,
            Err(e) => {
                tracing::error!("Error loading articles: {:#}", e);
                Vec::new()
            }
        }
    }

    /// 기사 인덱싱
    ///
    /// 저장소가 열려 있지 않으면 먼저 엽니다.
    pub async fn index_articles(&self, articles: &[Article]) -> Result<IndexReport> {
        let documents = prepare_documents(articles);
        if documents.is_empty() {
            tracing::warn!("No documents to index");
            return Ok(IndexReport::default());
        }

        let chunks = split_documents(&documents, &self.splitter);
        tracing::info!(
            "Split {} documents into {} chunks",
            documents.len(),
            chunks.len()
        );

        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .context("Failed to embed chunks")?;
        if embeddings.len() != chunks.len() {
            bail!(
                "Embedding count mismatch: {} chunks, {} embeddings",
                chunks.len(),
                embeddings.len()
            );
        }

        let entries: Vec<VectorEntry> = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| VectorEntry {
                doc_key: doc_key(&chunk.metadata.url),
                chunk_index: i32::try_from(chunk.chunk_index).unwrap_or(i32::MAX),
                chunk_text: chunk.text,
                metadata: chunk.metadata,
                embedding,
            })
            .collect();

        if !self.is_loaded().await {
            self.load_or_create().await?;
        }
        let guard = self.store.read().await;
        let store = guard
            .as_ref()
            .context("Vector store not loaded")?;

        // 새 배치가 기존 테이블에 들어갈 수 없으면 이전 청크를 지우기 전에 중단
        store.ensure_compatible(&entries).await?;

        // 같은 기사의 이전 청크 제거
        let mut replaced = 0;
        let keys: HashSet<&str> = entries.iter().map(|e| e.doc_key.as_str()).collect();
        for key in keys {
            replaced += store.delete_by_doc_key(key).await?;
        }

        let inserted = store.insert_batch(&entries).await?;
        tracing::info!(
            "Indexed {} articles ({} chunks, {} replaced)",
            documents.len(),
            inserted,
            replaced
        );

        Ok(IndexReport {
            articles: documents.len(),
            chunks: inserted,
            replaced,
        })
    }

    /// 유사 청크 검색
    ///
    /// 저장소가 열려 있지 않으면 에러를 기록하고 빈 결과를 돌려줍니다.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        let guard = self.store.read().await;
        let Some(store) = guard.as_ref() else {
            tracing::error!("Vector store not loaded");
            return Ok(Vec::new());
        };

        let query_embedding = self
            .embedder
            .embed(query)
            .await
            .context("Failed to embed query")?;

        store.search(&query_embedding, k).await
    }

    /// JSON 파일로부터 인덱스 갱신
    pub async fn update_index(&self, path: &Path) -> Result<IndexReport> {
        self.load_or_create().await?;

        let articles = self.load_articles_from_json(path);
        if articles.is_empty() {
            tracing::warn!("No articles to index");
            return Ok(IndexReport::default());
        }

        self.index_articles(&articles).await
    }

    /// 저장된 청크 수
    pub async fn stats(&self) -> Result<usize> {
        match self.store.read().await.as_ref() {
            Some(store) => store.count().await,
            None => Ok(0),
        }
    }
}

#[async_trait]
impl Retriever for VectorStoreManager {
    async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.search(query, k).await
    }
}

// ============================================================================
// Tests
// ============================================================================
