//! Document Preparer - 기사 → 문서 → 청크 변환

use serde::{Deserialize, Serialize};

use super::splitter::Chunker;
use crate::crawler::Article;

/// 청크마다 복사되는 출처 메타데이터
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub url: String,
    pub category: String,
    pub crawled_at: String,
}

/// 분할 전 문서 (기사 1건 = 문서 1건)
#[derive(Debug, Clone, PartialEq)]
pub struct ArticleDocument {
    pub page_content: String,
    pub metadata: ChunkMetadata,
}

/// 분할된 청크
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    /// 문서 내 순번 (0-based)
    pub chunk_index: usize,
    pub metadata: ChunkMetadata,
}

/// 본문이 있는 기사만 문서로 변환
pub fn prepare_documents(articles: &[Article]) -> Vec<ArticleDocument> {
    articles
        .iter()
        .filter(|article| !article.content.trim().is_empty())
        .map(|article| ArticleDocument {
            page_content: article.content.clone(),
            metadata: ChunkMetadata {
                title: article.title.clone(),
                url: article.url.clone(),
                category: article.category.clone(),
                crawled_at: article.crawled_at.clone(),
            },
        })
        .collect()
}

/// 문서들을 청크로 분할
pub fn split_documents(documents: &[ArticleDocument], chunker: &dyn Chunker) -> Vec<Chunk> {
    documents
        .iter()
        .flat_map(|doc| {
            chunker
                .chunk(&doc.page_content)
                .into_iter()
                .enumerate()
                .map(|(chunk_index, text)| Chunk {
                    text,
                    chunk_index,
                    metadata: doc.metadata.clone(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::splitter::RecursiveCharacterSplitter;

    fn article(title: &str, content: &str) -> Article {
        Article {
            title: title.to_string(),
            content: content.to_string(),
            url: format!("https://help.example.com/hc/ja/articles/{}", title),
            category: "FAQ".to_string(),
            crawled_at: "2024-01-01T00:00:00+00:00".to_string(),
        }
    }

    #[test]
    fn test_prepare_skips_empty_content() {
        let docs = prepare_documents(&[article("a", "本文"), article("b", "  ")]);
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].page_content, "本文");
        assert_eq!(docs[0].metadata.title, "a");
        assert_eq!(docs[0].metadata.category, "FAQ");
    }

    #[test]
    fn test_prepare_missing_metadata_is_empty() {
        let bare = Article {
            content: "content only".to_string(),
            ..Default::default()
        };
        let docs = prepare_documents(&[bare]);
        assert_eq!(docs[0].metadata, ChunkMetadata::default());
    }

    #[test]
    fn test_split_copies_metadata() {
        let splitter = RecursiveCharacterSplitter::new(10, 0).unwrap();
        let docs = prepare_documents(&[article("long", "aaaa bbbb cccc dddd")]);
        let chunks = split_documents(&docs, &splitter);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
        assert!(chunks.iter().all(|c| c.metadata == docs[0].metadata));
    }
}
