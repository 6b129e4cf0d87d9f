//! 챗봇 모듈 - 검색 증강 답변 생성
//!
//! 질문 → 관련 청크 검색 → 프롬프트 구성 → LLM 호출 → 출처와 함께 응답

use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::knowledge::{Retriever, SearchResult};
use crate::llm::LlmProvider;

/// 답변 생성 프롬프트 (`{context}`, `{question}` 치환)
pub const PROMPT_TEMPLATE: &str = "あなたはJTBCのサポートデスクのアシスタントです。
以下の情報を基に、ユーザーの質問に親切に、わかりやすく日本語で回答してください。

参考情報:
{context}

質問: {question}

回答: 情報を基に、丁寧に説明してください。参考情報に関連する内容が見つからない場合は、
「申し訳ございませんが、その情報は現在のサポートページには見つかりませんでした。
詳しくは公式サポートページをご確認いただくか、直接お問い合わせください。」と回答してください。";

/// 처리 실패 시 답변
pub const FALLBACK_ANSWER: &str =
    "申し訳ございません。回答の生成中にエラーが発生しました。もう一度お試しください。";

/// 기본 검색 청크 수
pub const DEFAULT_K: usize = 4;

/// 출처 발췌 길이 (문자)
const EXCERPT_CHARS: usize = 200;

/// 추천 질문
const SUGGESTED_QUESTIONS: [&str; 4] = [
    "総務省への届出について教えてください",
    "JTBC一次代理店とは何ですか？",
    "活動準備で必要なことを教えてください",
    "よくある質問を教えてください",
];

// ============================================================================
// Types
// ============================================================================

/// 답변 출처
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub category: String,
    pub excerpt: String,
}

/// 챗봇 응답
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    pub sources: Vec<Source>,
}

impl ChatResponse {
    /// 실패 응답 (출처 없음)
    pub fn fallback() -> Self {
        Self {
            answer: FALLBACK_ANSWER.to_string(),
            sources: Vec::new(),
        }
    }
}

// ============================================================================
// SupportChatbot
// ============================================================================

/// 서포트 챗봇
pub struct SupportChatbot {
    retriever: Arc<dyn Retriever>,
    llm: Arc<dyn LlmProvider>,
    k: usize,
}

impl SupportChatbot {
    pub fn new(retriever: Arc<dyn Retriever>, llm: Arc<dyn LlmProvider>, k: usize) -> Self {
        Self {
            retriever,
            llm,
            k: k.max(1),
        }
    }

    /// LLM 프로바이더 이름
    pub fn llm_name(&self) -> &str {
        self.llm.name()
    }

    /// LLM 모델 이름
    pub fn model(&self) -> &str {
        self.llm.model()
    }

    /// 질문에 답변
    ///
    /// 검색이나 생성이 실패하면 에러를 기록하고 고정 사과 메시지를 돌려줍니다.
    pub async fn ask(&self, question: &str) -> ChatResponse {
        tracing::info!("Processing question: {}", question);

        match self.answer(question).await {
            Ok(response) => {
                tracing::info!(
                    "Response generated successfully ({} sources)",
                    response.sources.len()
                );
                response
            }
            Err(e) => {
                tracing::error!("Error generating response: {:#}", e);
                ChatResponse::fallback()
            }
        }
    }

    async fn answer(&self, question: &str) -> Result<ChatResponse> {
        let results = self.retriever.retrieve(question, self.k).await?;
        let prompt = build_prompt(&results, question);
        let answer = self.llm.generate(&prompt).await?;

        Ok(ChatResponse {
            answer,
            sources: results.iter().map(to_source).collect(),
        })
    }

    /// 추천 질문 목록
    pub fn suggested_questions(&self) -> Vec<String> {
        SUGGESTED_QUESTIONS.iter().map(|q| q.to_string()).collect()
    }
}

/// 검색 결과를 컨텍스트로 넣은 프롬프트
fn build_prompt(results: &[SearchResult], question: &str) -> String {
    let context = results
        .iter()
        .map(|r| r.chunk_text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    fill_template(PROMPT_TEMPLATE, &context, question)
}

/// `{context}`/`{question}` 자리표시자를 한 번에 치환
///
/// 치환된 값 안의 자리표시자 문자열은 그대로 남습니다.
fn fill_template(template: &str, context: &str, question: &str) -> String {
    let mut prompt = String::with_capacity(template.len() + context.len() + question.len());
    let mut rest = template;

    while let Some(pos) = rest.find('{') {
        prompt.push_str(&rest[..pos]);
        let tail = &rest[pos..];
        if let Some(after) = tail.strip_prefix("{context}") {
            prompt.push_str(context);
            rest = after;
        } else if let Some(after) = tail.strip_prefix("{question}") {
            prompt.push_str(question);
            rest = after;
        } else {
            prompt.push('{');
            rest = &tail[1..];
        }
    }
    prompt.push_str(rest);
    prompt
}

fn to_source(result: &SearchResult) -> Source {
    let excerpt: String = result.chunk_text.chars().take(EXCERPT_CHARS).collect();
    Source {
        title: result.metadata.title.clone(),
        url: result.metadata.url.clone(),
        category: result.metadata.category.clone(),
        excerpt: format!("{}...", excerpt),
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::ChunkMetadata;
    use anyhow::bail;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct FixedRetriever {
        results: Vec<SearchResult>,
        fail: bool,
    }

    #[async_trait]
    impl Retriever for FixedRetriever {
        async fn retrieve(&self, _query: &str, k: usize) -> Result<Vec<SearchResult>> {
            if self.fail {
                bail!("index unavailable");
            }
            Ok(self.results.iter().take(k).cloned().collect())
        }
    }

    /// 받은 프롬프트를 기록하는 LLM
    #[derive(Default)]
    struct RecordingLlm {
        prompts: Mutex<Vec<String>>,
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for RecordingLlm {
        async fn generate(&self, prompt: &str) -> Result<String> {
            if self.fail {
                bail!("model crashed");
            }
            self.prompts.lock().unwrap().push(prompt.to_string());
            Ok("回答です".to_string())
        }

        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn result(title: &str, text: &str) -> SearchResult {
        SearchResult {
            doc_key: crate::knowledge::doc_key(title),
            chunk_index: 0,
            chunk_text: text.to_string(),
            metadata: ChunkMetadata {
                title: title.to_string(),
                url: format!("https://help.example.com/{}", title),
                category: "FAQ".to_string(),
                crawled_at: String::new(),
            },
            similarity: 0.9,
        }
    }

    fn retriever(results: Vec<SearchResult>) -> Arc<FixedRetriever> {
        Arc::new(FixedRetriever {
            results,
            fail: false,
        })
    }

    #[tokio::test]
    async fn test_ask_builds_prompt_and_sources() {
        let llm = Arc::new(RecordingLlm::default());
        let chatbot = SupportChatbot::new(
            retriever(vec![result("届出", "届出の手順"), result("料金", "料金の説明")]),
            llm.clone(),
            DEFAULT_K,
        );

        let response = chatbot.ask("届出について").await;
        assert_eq!(response.answer, "回答です");
        assert_eq!(response.sources.len(), 2);
        assert_eq!(response.sources[0].title, "届出");
        assert_eq!(response.sources[0].excerpt, "届出の手順...");

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("参考情報:\n届出の手順\n\n料金の説明\n"));
        assert!(prompts[0].contains("質問: 届出について"));
        assert!(!prompts[0].contains("{context}"));
    }

    #[tokio::test]
    async fn test_placeholder_in_article_text_is_kept() {
        let llm = Arc::new(RecordingLlm::default());
        let chatbot = SupportChatbot::new(
            retriever(vec![result("テンプレ", "件名に{question}と書いてください")]),
            llm.clone(),
            DEFAULT_K,
        );

        chatbot.ask("書き方は？").await;

        let prompts = llm.prompts.lock().unwrap();
        assert!(prompts[0].contains("件名に{question}と書いてください"));
        assert_eq!(prompts[0].matches("書き方は？").count(), 1);
    }

    #[test]
    fn test_fill_template_keeps_unknown_braces() {
        assert_eq!(
            fill_template("{a} {context}/{question}", "c", "q"),
            "{a} c/q"
        );
    }

    #[tokio::test]
    async fn test_respects_k() {
        let llm = Arc::new(RecordingLlm::default());
        let results = (0..6).map(|i| result(&format!("t{}", i), "x")).collect();
        let chatbot = SupportChatbot::new(retriever(results), llm, 4);

        assert_eq!(chatbot.ask("q").await.sources.len(), 4);
    }

    #[tokio::test]
    async fn test_excerpt_truncated_to_200_chars() {
        let long = "あ".repeat(300);
        let chatbot = SupportChatbot::new(
            retriever(vec![result("long", &long)]),
            Arc::new(RecordingLlm::default()),
            DEFAULT_K,
        );

        let response = chatbot.ask("q").await;
        let excerpt = &response.sources[0].excerpt;
        assert_eq!(excerpt.chars().count(), 203);
        assert!(excerpt.ends_with("..."));
    }

    #[tokio::test]
    async fn test_llm_failure_returns_fallback() {
        let llm = Arc::new(RecordingLlm {
            fail: true,
            ..Default::default()
        });
        let chatbot = SupportChatbot::new(retriever(vec![result("a", "b")]), llm, DEFAULT_K);

        assert_eq!(chatbot.ask("q").await, ChatResponse::fallback());
    }

    #[tokio::test]
    async fn test_retriever_failure_returns_fallback() {
        let chatbot = SupportChatbot::new(
            Arc::new(FixedRetriever {
                results: vec![],
                fail: true,
            }),
            Arc::new(RecordingLlm::default()),
            DEFAULT_K,
        );

        let response = chatbot.ask("q").await;
        assert_eq!(response.answer, FALLBACK_ANSWER);
        assert!(response.sources.is_empty());
    }

    #[test]
    fn test_suggested_questions() {
        let chatbot = SupportChatbot::new(
            retriever(vec![]),
            Arc::new(RecordingLlm::default()),
            DEFAULT_K,
        );
        let suggestions = chatbot.suggested_questions();
        assert_eq!(suggestions.len(), 4);
        assert_eq!(suggestions[0], "総務省への届出について教えてください");
    }
}
