//! 웹 서버 모듈 - 챗봇 API + 정적 UI
//!
//! 서버는 바로 바인딩하고, 인덱스 로드/챗봇 생성/스케줄러 시작은
//! 백그라운드 태스크에서 진행합니다. 그동안 `/api/status`는 `chatbot_ready: false`를 보고합니다.

mod error;
mod handlers;
mod router;
mod state;

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::net::TcpListener;

use crate::config::Settings;

pub use error::ApiError;
pub use router::router;
pub use state::{AppState, Services};

/// 서버 실행 (Ctrl+C로 종료)
pub async fn serve(settings: Settings) -> Result<()> {
    let bind_addr = format!("{}:{}", settings.server_host, settings.server_port);
    let listener = TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", bind_addr))?;
    let addr = listener.local_addr()?;
    tracing::info!("Listening on http://{}", addr);

    let state = Arc::new(AppState::new(settings));

    let init_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = initialize(&init_state).await {
            tracing::error!("Error initializing application: {:#}", e);
        }
    });

    axum::serve(listener, router(state.clone()))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    if let Some(services) = state.services().await {
        services.scheduler.stop().await;
    }
    tracing::info!("Server stopped");
    Ok(())
}

/// 서비스 구성 후 상태에 등록하고, 설정에 따라 스케줄러 시작
pub async fn initialize(state: &AppState) -> Result<()> {
    let settings = &state.settings;
    tracing::info!(
        "Starting in {} mode (LLM: {}, embeddings: {})",
        settings.mode,
        settings.llm_model(),
        settings.embedding_model()
    );

    let services = Services::build(settings).await?;
    state.install(services.clone()).await;

    if settings.scheduler_enabled {
        tracing::info!(
            "Starting scheduler (interval: {} hours)...",
            settings.update_interval.as_secs() / 3600
        );
        services.scheduler.start(settings.run_initial_update).await;
    }

    tracing::info!("Application initialized successfully");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::time::Duration;

    use anyhow::bail;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tempfile::TempDir;

    use crate::chatbot::{SupportChatbot, FALLBACK_ANSWER};
    use crate::crawler::{CrawlStrategy, CrawlerConfig, HelpCenterCrawler};
    use crate::embedding::EmbeddingProvider;
    use crate::knowledge::{RecursiveCharacterSplitter, VectorStoreManager};
    use crate::llm::LlmProvider;
    use crate::scheduler::UpdateScheduler;

    struct ConstEmbedder;

    #[async_trait]
    impl EmbeddingProvider for ConstEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
            Ok(vec![1.0, 0.0])
        }

        fn dimension(&self) -> usize {
            2
        }

        fn name(&self) -> &str {
            "const"
        }
    }

    struct EchoLlm {
        fail: bool,
    }

    #[async_trait]
    impl LlmProvider for EchoLlm {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            if self.fail {
                bail!("offline");
            }
            Ok("テスト回答".to_string())
        }

        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        async fn health_check(&self) -> Result<()> {
            Ok(())
        }
    }

    fn settings(dir: &TempDir) -> Settings {
        let vars: HashMap<String, String> = [
            ("STATIC_DIR", dir.path().join("static")),
            ("VECTOR_DB_DIR", dir.path().join("vector_db")),
            ("ARTICLES_PATH", dir.path().join("articles.json")),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.display().to_string()))
        .collect();
        Settings::from_lookup(|key| vars.get(key).cloned(), None).unwrap()
    }

    fn services(dir: &TempDir, llm_fails: bool) -> Services {
        let manager = Arc::new(VectorStoreManager::new(
            dir.path().join("vector_db"),
            Arc::new(ConstEmbedder),
            RecursiveCharacterSplitter::default(),
        ));
        let chatbot = Arc::new(SupportChatbot::new(
            manager.clone(),
            Arc::new(EchoLlm { fail: llm_fails }),
            4,
        ));
        // 닿지 않는 주소 (갱신은 빈 결과로 끝남)
        let crawler = HelpCenterCrawler::new(CrawlerConfig {
            base_url: "http://127.0.0.1:9/hc/ja".to_string(),
            strategy: CrawlStrategy::ArticleLinks,
            request_delay: Duration::ZERO,
            timeout: Duration::from_secs(1),
            category_label: "サポート".to_string(),
        })
        .unwrap();
        let scheduler = Arc::new(UpdateScheduler::new(
            crawler,
            manager.clone(),
            dir.path().join("articles.json"),
            Duration::from_secs(3600),
        ));

        Services {
            chatbot,
            manager,
            scheduler,
        }
    }

    /// 임의 포트로 서버 기동 후 base URL 반환
    async fn spawn_server(state: Arc<AppState>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router(state)).await.unwrap();
        });
        format!("http://{}", addr)
    }

    #[tokio::test]
    async fn test_not_initialized_responses() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(settings(&dir)));
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let status: Value = client
            .get(format!("{}/api/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["status"], "running");
        assert_eq!(status["chatbot_ready"], false);
        assert_eq!(status["scheduler_running"], false);
        assert_eq!(status["mode"], "free");
        assert_eq!(status["model"], "gemma2:2b");

        let resp = client
            .post(format!("{}/api/chat", base))
            .json(&json!({"question": "届出"}))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Chatbot not initialized");

        let resp = client
            .get(format!("{}/api/suggestions", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);

        let resp = client
            .post(format!("{}/api/update", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 500);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["error"], "Scheduler not initialized");
    }

    #[tokio::test]
    async fn test_empty_question_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(settings(&dir)));
        state.install(services(&dir, false)).await;
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        for payload in [json!({}), json!({"question": "  "})] {
            let resp = client
                .post(format!("{}/api/chat", base))
                .json(&payload)
                .send()
                .await
                .unwrap();
            assert_eq!(resp.status(), 400);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["error"], "No question provided");
        }
    }

    #[tokio::test]
    async fn test_missing_or_invalid_body_is_bad_request() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(settings(&dir)));
        state.install(services(&dir, false)).await;
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let requests = [
            client.post(format!("{}/api/chat", base)),
            client
                .post(format!("{}/api/chat", base))
                .header("content-type", "application/json")
                .body("not json"),
            client
                .post(format!("{}/api/chat", base))
                .header("content-type", "text/plain")
                .body("届出"),
        ];
        for request in requests {
            let resp = request.send().await.unwrap();
            assert_eq!(resp.status(), 400);
            let body: Value = resp.json().await.unwrap();
            assert_eq!(body["error"], "No question provided");
        }
    }

    #[tokio::test]
    async fn test_chat_and_suggestions() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(settings(&dir)));
        let services = services(&dir, false);
        services.manager.load_or_create().await.unwrap();
        state.install(services).await;
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let body: Value = client
            .post(format!("{}/api/chat", base))
            .json(&json!({"question": "料金は？"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["answer"], "テスト回答");
        assert!(body["sources"].as_array().unwrap().is_empty());

        let body: Value = client
            .get(format!("{}/api/suggestions", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["suggestions"].as_array().unwrap().len(), 4);

        let status: Value = client
            .get(format!("{}/api/status", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(status["chatbot_ready"], true);
        assert_eq!(status["indexed_chunks"], 0);
    }

    #[tokio::test]
    async fn test_chat_llm_failure_returns_apology() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(settings(&dir)));
        state.install(services(&dir, true)).await;
        let base = spawn_server(state).await;

        let body: Value = reqwest::Client::new()
            .post(format!("{}/api/chat", base))
            .json(&json!({"question": "q"}))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(body["answer"], FALLBACK_ANSWER);
    }

    #[tokio::test]
    async fn test_manual_update_reports_counts() {
        let dir = TempDir::new().unwrap();
        let state = Arc::new(AppState::new(settings(&dir)));
        state.install(services(&dir, false)).await;
        let base = spawn_server(state).await;

        let resp = reqwest::Client::new()
            .post(format!("{}/api/update", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
        let body: Value = resp.json().await.unwrap();
        assert_eq!(body["message"], "Update triggered successfully");
        assert_eq!(body["articles"], 0);
    }

    #[tokio::test]
    async fn test_initialize_survives_failed_initial_index() {
        use crate::crawler::{save_to_json, Article};
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let ollama = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/embed"))
            .respond_with(
                ResponseTemplate::new(400).set_body_json(json!({"error": "model not found"})),
            )
            .mount(&ollama)
            .await;

        let dir = TempDir::new().unwrap();
        let articles_path = dir.path().join("articles.json");
        save_to_json(
            &[Article {
                title: "届出".to_string(),
                content: "総務省への届出".to_string(),
                url: "https://help.example.com/hc/ja/articles/1".to_string(),
                category: "FAQ".to_string(),
                crawled_at: "2024-01-01T00:00:00+00:00".to_string(),
            }],
            &articles_path,
        )
        .unwrap();

        let vars: HashMap<String, String> = [
            ("EMBEDDING_PROVIDER".to_string(), "ollama".to_string()),
            ("OLLAMA_BASE_URL".to_string(), ollama.uri()),
            ("SCHEDULER_ENABLED".to_string(), "false".to_string()),
            (
                "VECTOR_DB_DIR".to_string(),
                dir.path().join("vector_db").display().to_string(),
            ),
            ("ARTICLES_PATH".to_string(), articles_path.display().to_string()),
        ]
        .into_iter()
        .collect();
        let settings = Settings::from_lookup(|key| vars.get(key).cloned(), None).unwrap();
        let state = AppState::new(settings);

        initialize(&state).await.unwrap();

        let services = state.services().await.expect("services installed");
        assert_eq!(services.manager.stats().await.unwrap(), 0);
        assert!(!services.scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_index_page_served() {
        let dir = TempDir::new().unwrap();
        let static_dir = dir.path().join("static");
        std::fs::create_dir_all(static_dir.join("js")).unwrap();
        std::fs::write(static_dir.join("index.html"), "<html>chat</html>").unwrap();
        std::fs::write(static_dir.join("js").join("app.js"), "console.log(1)").unwrap();

        let state = Arc::new(AppState::new(settings(&dir)));
        let base = spawn_server(state).await;
        let client = reqwest::Client::new();

        let page = client.get(&base).send().await.unwrap().text().await.unwrap();
        assert_eq!(page, "<html>chat</html>");

        let resp = client
            .get(format!("{}/static/js/app.js", base))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), 200);
    }
}
