//! LanceDB Vector Store - 청크 + 메타데이터 + 임베딩 영속화
//!
//! 임베딩 차원은 고정하지 않고 첫 삽입 배치에서 결정됩니다.
//! ref: https://lancedb.github.io/lancedb/

use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use arrow_array::{
    Array, FixedSizeListArray, Float32Array, Int32Array, RecordBatch, RecordBatchIterator,
    StringArray,
};
use arrow_schema::{DataType, Field, Schema};
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::connection::Connection;
use lancedb::query::{ExecutableQuery, QueryBase};
use lancedb::table::Table;

use super::document::ChunkMetadata;
use super::vector::{validate_doc_key, SearchResult, VectorEntry, VectorStore};

/// 청크 테이블 이름
const TABLE_NAME: &str = "chunks";

/// 메타데이터 문자열 컬럼
const METADATA_COLUMNS: [&str; 4] = ["title", "url", "category", "crawled_at"];

// ============================================================================
// LanceVectorStore
// ============================================================================

/// LanceDB 벡터 저장소 구현
pub struct LanceVectorStore {
    db: Connection,
}

impl LanceVectorStore {
    /// LanceDB 저장소 열기 (디렉토리가 없으면 생성)
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .context("Failed to create LanceDB directory")?;
            }
        }

        let path_str = path
            .to_str()
            .ok_or_else(|| anyhow!("Invalid path encoding"))?;

        let db = lancedb::connect(path_str)
            .execute()
            .await
            .context("Failed to connect to LanceDB")?;

        Ok(Self { db })
    }

    /// 기존 테이블의 임베딩 차원 (테이블이 없으면 None)
    pub async fn embedding_dimension(&self) -> Result<Option<usize>> {
        let Some(table) = self.open_table().await? else {
            return Ok(None);
        };

        let schema = table.schema().await.context("Failed to read table schema")?;
        let field = schema
            .field_with_name("embedding")
            .context("Missing embedding column")?;
        match field.data_type() {
            DataType::FixedSizeList(_, size) => Ok(Some(usize::try_from(*size)?)),
            other => bail!("Unexpected embedding column type: {:?}", other),
        }
    }

    /// 엔트리들이 기존 테이블에 들어갈 수 있는지 확인
    ///
    /// 배치 안의 차원이 모두 같고, 테이블이 있으면 그 차원과도 같아야 합니다.
    pub async fn ensure_compatible(&self, entries: &[VectorEntry]) -> Result<()> {
        let Some(dimension) = batch_dimension(entries)? else {
            return Ok(());
        };

        if let Some(existing) = self.embedding_dimension().await? {
            if existing != dimension {
                bail!(
                    "Embedding dimension mismatch with existing index: expected {}, got {} \
                     (use a fresh vector store directory after switching embedding models)",
                    existing,
                    dimension
                );
            }
        }
        Ok(())
    }

    /// 청크 테이블 스키마
    fn create_schema(dimension: i32) -> Schema {
        let mut fields = vec![
            Field::new("doc_key", DataType::Utf8, false),
            Field::new("chunk_index", DataType::Int32, false),
            Field::new("chunk_text", DataType::Utf8, false),
        ];
        fields.extend(
            METADATA_COLUMNS
                .iter()
                .map(|name| Field::new(*name, DataType::Utf8, false)),
        );
        fields.push(Field::new(
            "embedding",
            DataType::FixedSizeList(
                Arc::new(Field::new("item", DataType::Float32, true)),
                dimension,
            ),
            false,
        ));
        Schema::new(fields)
    }

    /// 엔트리들을 Arrow RecordBatch로 변환
    fn entries_to_batch(entries: &[VectorEntry]) -> Result<RecordBatch> {
        let Some(dimension) = batch_dimension(entries)? else {
            bail!("Cannot create batch from empty entries");
        };
        let dimension = i32::try_from(dimension).context("Embedding dimension too large")?;

        let doc_keys: Vec<&str> = entries.iter().map(|e| e.doc_key.as_str()).collect();
        let chunk_indices: Vec<i32> = entries.iter().map(|e| e.chunk_index).collect();
        let chunk_texts: Vec<&str> = entries.iter().map(|e| e.chunk_text.as_str()).collect();
        let titles: Vec<&str> = entries.iter().map(|e| e.metadata.title.as_str()).collect();
        let urls: Vec<&str> = entries.iter().map(|e| e.metadata.url.as_str()).collect();
        let categories: Vec<&str> = entries.iter().map(|e| e.metadata.category.as_str()).collect();
        let crawled: Vec<&str> = entries
            .iter()
            .map(|e| e.metadata.crawled_at.as_str())
            .collect();

        let embeddings_flat: Vec<f32> = entries
            .iter()
            .flat_map(|e| e.embedding.iter().copied())
            .collect();

        let values = Float32Array::from(embeddings_flat);
        let field = Arc::new(Field::new("item", DataType::Float32, true));
        let embeddings_list = FixedSizeListArray::try_new(
            field,
            dimension,
            Arc::new(values) as Arc<dyn Array>,
            None,
        )
        .context("Failed to create embedding array")?;

        let batch = RecordBatch::try_new(
            Arc::new(Self::create_schema(dimension)),
            vec![
                Arc::new(StringArray::from(doc_keys)),
                Arc::new(Int32Array::from(chunk_indices)),
                Arc::new(StringArray::from(chunk_texts)),
                Arc::new(StringArray::from(titles)),
                Arc::new(StringArray::from(urls)),
                Arc::new(StringArray::from(categories)),
                Arc::new(StringArray::from(crawled)),
                Arc::new(embeddings_list),
            ],
        )
        .context("Failed to create RecordBatch")?;

        Ok(batch)
    }

    /// 테이블 존재 여부 확인
    async fn table_exists(&self) -> bool {
        self.db
            .table_names()
            .execute()
            .await
            .map(|names| names.iter().any(|name| name == TABLE_NAME))
            .unwrap_or(false)
    }

    /// 테이블 열기 (없으면 None)
    async fn open_table(&self) -> Result<Option<Table>> {
        if !self.table_exists().await {
            return Ok(None);
        }

        let table = self
            .db
            .open_table(TABLE_NAME)
            .execute()
            .await
            .context("Failed to open table")?;
        Ok(Some(table))
    }
}

/// 배치의 공통 임베딩 차원 (빈 배치면 None)
fn batch_dimension(entries: &[VectorEntry]) -> Result<Option<usize>> {
    let Some(first) = entries.first() else {
        return Ok(None);
    };

    let dimension = first.embedding.len();
    if dimension == 0 {
        bail!("Embedding must not be empty");
    }
    if let Some(bad) = entries.iter().find(|e| e.embedding.len() != dimension) {
        bail!(
            "Embedding dimension mismatch: expected {}, got {}",
            dimension,
            bad.embedding.len()
        );
    }
    Ok(Some(dimension))
}

/// 문자열 컬럼 조회
fn string_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a StringArray> {
    batch
        .column_by_name(name)
        .and_then(|c| c.as_any().downcast_ref::<StringArray>())
        .ok_or_else(|| anyhow!("Missing {} column", name))
}

#[async_trait]
impl VectorStore for LanceVectorStore {
    async fn insert_batch(&self, entries: &[VectorEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }

        self.ensure_compatible(entries).await?;
        let batch = Self::entries_to_batch(entries)?;
        let schema = batch.schema();
        let batches = RecordBatchIterator::new(vec![Ok(batch)], schema);

        match self.open_table().await? {
            Some(table) => {
                table
                    .add(batches)
                    .execute()
                    .await
                    .context("Failed to add vectors to table")?;
            }
            None => {
                self.db
                    .create_table(TABLE_NAME, batches)
                    .execute()
                    .await
                    .context("Failed to create table")?;
            }
        }

        Ok(entries.len())
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        let Some(table) = self.open_table().await? else {
            return Ok(vec![]);
        };

        let results = table
            .vector_search(query_embedding.to_vec())
            .context("Failed to create vector search")?
            .limit(limit)
            .execute()
            .await
            .context("Failed to execute vector search")?;

        let batches: Vec<RecordBatch> = results.try_collect().await?;
        let mut search_results = Vec::new();

        for batch in batches {
            let doc_keys = string_column(&batch, "doc_key")?;
            let chunk_texts = string_column(&batch, "chunk_text")?;
            let titles = string_column(&batch, "title")?;
            let urls = string_column(&batch, "url")?;
            let categories = string_column(&batch, "category")?;
            let crawled = string_column(&batch, "crawled_at")?;

            let chunk_indices = batch
                .column_by_name("chunk_index")
                .and_then(|c| c.as_any().downcast_ref::<Int32Array>())
                .ok_or_else(|| anyhow!("Missing chunk_index column"))?;

            // _distance 컬럼 (LanceDB가 자동 추가)
            let distances = batch
                .column_by_name("_distance")
                .and_then(|c| c.as_any().downcast_ref::<Float32Array>())
                .ok_or_else(|| anyhow!("Missing _distance column"))?;

            for i in 0..batch.num_rows() {
                let similarity = 1.0 / (1.0 + distances.value(i));

                search_results.push(SearchResult {
                    doc_key: doc_keys.value(i).to_string(),
                    chunk_index: chunk_indices.value(i),
                    chunk_text: chunk_texts.value(i).to_string(),
                    metadata: ChunkMetadata {
                        title: titles.value(i).to_string(),
                        url: urls.value(i).to_string(),
                        category: categories.value(i).to_string(),
                        crawled_at: crawled.value(i).to_string(),
                    },
                    similarity,
                });
            }
        }

        // 배치 경계와 무관하게 가까운 순
        search_results.sort_by(|a, b| b.similarity.total_cmp(&a.similarity));
        search_results.truncate(limit);

        Ok(search_results)
    }

    async fn delete_by_doc_key(&self, doc_key: &str) -> Result<usize> {
        validate_doc_key(doc_key)?;

        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        let filter = format!("doc_key = '{}'", doc_key);
        let matching = table
            .count_rows(Some(filter.clone()))
            .await
            .context("Failed to count rows for doc_key")?;
        if matching == 0 {
            return Ok(0);
        }

        table
            .delete(&filter)
            .await
            .context("Failed to delete vectors")?;

        Ok(matching)
    }

    async fn count(&self) -> Result<usize> {
        let Some(table) = self.open_table().await? else {
            return Ok(0);
        };

        table.count_rows(None).await.context("Failed to count rows")
    }

    async fn has_embeddings(&self, doc_key: &str) -> Result<bool> {
        validate_doc_key(doc_key)?;

        let Some(table) = self.open_table().await? else {
            return Ok(false);
        };

        let filter = format!("doc_key = '{}'", doc_key);
        let count = table
            .count_rows(Some(filter))
            .await
            .context("Failed to count rows for doc_key")?;

        Ok(count > 0)
    }
}

// ============================================================================
// Tests
// ============================================================================
