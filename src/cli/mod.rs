//! CLI 모듈
//!
//! helpdesk-rag CLI 명령어 정의 및 구현

use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::chatbot::DEFAULT_K;
use crate::config::{BackendMode, EmbeddingBackend, LlmBackend, Settings};
use crate::crawler::{load_from_json, save_to_json, HelpCenterCrawler};
use crate::knowledge::{LanceVectorStore, VectorStore, VectorStoreManager};
use crate::llm::{create_llm, same_model, OllamaChat};
use crate::server::{self, Services};

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "helpdesk-rag")]
#[command(version, about = "헬프센터 RAG 서포트 챗봇", long_about = None)]
pub struct Cli {
    /// 백엔드 모드 (openai, free, gemini). CHATBOT_MODE보다 우선
    #[arg(long, global = true, value_parser = parse_mode)]
    pub mode: Option<BackendMode>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 웹 서버 실행 (챗봇 API + UI)
    Serve,

    /// 초기 설정: 백엔드 확인 → 크롤링 → 인덱스 생성
    Setup {
        /// 크롤링을 건너뛰고 기존 JSON으로 인덱싱
        #[arg(long)]
        skip_crawl: bool,
    },

    /// 헬프센터 크롤링 후 JSON 저장
    Crawl {
        /// 저장 경로 (기본: ARTICLES_PATH)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 기사 JSON으로 벡터 인덱스 갱신
    Index {
        /// 기사 JSON 경로 (기본: ARTICLES_PATH)
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// 챗봇에 질문
    Ask {
        /// 질문
        question: String,
    },

    /// 벡터 인덱스 검색
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value_t = DEFAULT_K)]
        limit: usize,
    },

    /// 상태 확인
    Status,
}

fn parse_mode(value: &str) -> Result<BackendMode, String> {
    value.parse().map_err(|e: anyhow::Error| e.to_string())
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli, settings: Settings) -> Result<()> {
    match cli.command {
        Commands::Serve => server::serve(settings).await,
        Commands::Setup { skip_crawl } => cmd_setup(&settings, skip_crawl).await,
        Commands::Crawl { output } => {
            let output = output.unwrap_or_else(|| settings.articles_path.clone());
            cmd_crawl(&settings, &output).await.map(|_| ())
        }
        Commands::Index { input } => {
            let input = input.unwrap_or_else(|| settings.articles_path.clone());
            cmd_index(&settings, &input).await
        }
        Commands::Ask { question } => cmd_ask(&settings, &question).await,
        Commands::Search { query, limit } => cmd_search(&settings, &query, limit).await,
        Commands::Status => cmd_status(&settings).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 초기 설정 명령어 (setup)
///
/// 로컬 백엔드를 쓰면 Ollama 서버와 모델을 먼저 확인합니다.
async fn cmd_setup(settings: &Settings, skip_crawl: bool) -> Result<()> {
    println!("[*] 모드: {}", settings.mode);
    println!("    LLM: {}", settings.llm_model());
    println!("    임베딩: {}", settings.embedding_model());
    println!();

    if settings.uses_ollama() {
        check_ollama(settings).await?;
    }

    if !skip_crawl {
        let count = cmd_crawl(settings, &settings.articles_path).await?;
        if count == 0 {
            bail!("기사를 가져오지 못했습니다. CRAWLER_BASE_URL을 확인하세요");
        }
        println!();
    }

    cmd_index(settings, &settings.articles_path).await?;

    println!();
    println!("[OK] 설정 완료. 서버 실행: helpdesk-rag serve");
    Ok(())
}

/// Ollama 서버 연결 및 필요한 모델 설치 여부 확인
async fn check_ollama(settings: &Settings) -> Result<()> {
    let ollama = &settings.ollama;
    println!("[*] Ollama 서버 확인 중: {}", ollama.base_url);

    let client = OllamaChat::new(&ollama.base_url, &ollama.chat_model, settings.temperature)?;
    let models = client.list_models().await.context(
        "Ollama 서버에 연결할 수 없습니다. `ollama serve`로 서버를 실행하세요",
    )?;
    println!("[OK] Ollama 서버 응답 ({} 모델 설치됨)", models.len());

    let mut required = Vec::new();
    if settings.llm_backend == LlmBackend::Ollama {
        required.push(ollama.chat_model.as_str());
    }
    if settings.embedding_backend == EmbeddingBackend::Ollama {
        required.push(ollama.embedding_model.as_str());
    }

    let missing: Vec<&str> = required
        .into_iter()
        .filter(|wanted| !models.iter().any(|m| same_model(m, wanted)))
        .collect();

    if !missing.is_empty() {
        let commands: Vec<String> = missing.iter().map(|m| format!("  ollama pull {}", m)).collect();
        bail!(
            "필요한 모델이 설치되어 있지 않습니다:\n{}",
            commands.join("\n")
        );
    }

    println!("[OK] 필요한 모델 설치 확인");
    println!();
    Ok(())
}

/// 크롤링 명령어 (crawl)
///
/// 저장한 기사 수를 반환합니다. 기사가 없으면 파일을 쓰지 않습니다.
async fn cmd_crawl(settings: &Settings, output: &Path) -> Result<usize> {
    println!("[*] 크롤링 중: {}", settings.crawler.base_url);

    let crawler =
        HelpCenterCrawler::new(settings.crawler.clone()).context("HelpCenterCrawler 생성 실패")?;
    let articles = crawler.crawl_all().await;

    if articles.is_empty() {
        println!("[!] 수집된 기사가 없습니다.");
        return Ok(0);
    }

    save_to_json(&articles, output).context("기사 저장 실패")?;
    println!(
        "[OK] 기사 {} 건 저장: {}",
        articles.len(),
        output.display()
    );

    Ok(articles.len())
}

/// 인덱싱 명령어 (index)
async fn cmd_index(settings: &Settings, input: &Path) -> Result<()> {
    if !input.exists() {
        bail!(
            "기사 파일이 없습니다: {}\n먼저 실행: helpdesk-rag crawl",
            input.display()
        );
    }

    println!("[*] 인덱스 생성 중: {}", input.display());

    let manager = VectorStoreManager::from_settings(settings)?;
    let report = manager
        .update_index(input)
        .await
        .context("인덱스 갱신 실패")?;

    println!(
        "[OK] 기사 {} 건 → 청크 {} 개 인덱싱 (교체 {})",
        report.articles, report.chunks, report.replaced
    );
    println!("     DB: {}", manager.db_dir().display());

    Ok(())
}

/// 질문 명령어 (ask)
async fn cmd_ask(settings: &Settings, question: &str) -> Result<()> {
    let services = Services::build(settings)
        .await
        .context("챗봇 초기화 실패")?;

    println!("[*] 질문: {}", question);
    let response = services.chatbot.ask(question).await;

    println!();
    println!("{}", response.answer);

    if !response.sources.is_empty() {
        println!();
        println!("[OK] 참고 기사 ({} 건):", response.sources.len());
        for (i, source) in response.sources.iter().enumerate() {
            println!("{}. [{}] {}", i + 1, source.category, source.title);
            println!("   URL: {}", source.url);
        }
    }

    Ok(())
}

/// 검색 명령어 (search)
///
/// LLM 없이 벡터 검색 결과만 출력합니다.
async fn cmd_search(settings: &Settings, query: &str, limit: usize) -> Result<()> {
    println!("[*] 검색 중: \"{}\"", query);

    let manager = VectorStoreManager::from_settings(settings)?;
    manager.load_or_create().await?;
    let results = manager.search(query, limit).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        println!(
            "{}. [유사도: {:.4}] {} #{}",
            i + 1,
            result.similarity,
            result.metadata.title,
            result.chunk_index
        );
        println!("   URL: {}", result.metadata.url);
        println!("   내용: {}", truncate_text(&result.chunk_text, 200));
        println!();
    }

    Ok(())
}

/// 상태 명령어 (status)
///
/// API 키 없이도 확인할 수 있도록 저장소를 직접 엽니다.
async fn cmd_status(settings: &Settings) -> Result<()> {
    println!("helpdesk-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    println!("[*] 모드: {}", settings.mode);
    println!(
        "    LLM: {} ({})",
        settings.llm_model(),
        settings.llm_backend.as_str()
    );
    println!(
        "    임베딩: {} ({})",
        settings.embedding_model(),
        settings.embedding_backend.as_str()
    );
    println!("    헬프센터: {}", settings.crawler.base_url);

    // LLM 준비 상태
    match create_llm(settings) {
        Ok(llm) => match llm.health_check().await {
            Ok(()) => println!("[OK] LLM: 사용 가능"),
            Err(e) => println!("[!] LLM: {:#}", e),
        },
        Err(e) => println!("[!] LLM: {:#}", e),
    }

    // 기사 JSON
    let articles_path = &settings.articles_path;
    match std::fs::metadata(articles_path) {
        Ok(meta) => {
            let count = load_from_json(articles_path).map(|a| a.len()).unwrap_or(0);
            println!(
                "[OK] 기사 파일: {} 건 ({})",
                count,
                format_bytes(meta.len() as usize)
            );
            println!("     {}", articles_path.display());
        }
        Err(_) => {
            println!("[!] 기사 파일 없음: {}", articles_path.display());
            println!("    실행: helpdesk-rag crawl");
        }
    }

    // 벡터 인덱스
    if settings.vector_db_dir.exists() {
        match LanceVectorStore::open(&settings.vector_db_dir).await {
            Ok(store) => match store.count().await {
                Ok(count) => println!("[OK] 벡터 인덱스: {} 청크", count),
                Err(e) => println!("[!] 벡터 통계 조회 실패: {:#}", e),
            },
            Err(e) => println!("[!] 벡터 저장소 열기 실패: {:#}", e),
        }
    } else {
        println!("[!] 벡터 인덱스 없음: {}", settings.vector_db_dir.display());
        println!("    실행: helpdesk-rag index");
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

/// 바이트 크기 포맷팅
fn format_bytes(bytes: usize) -> String {
    const KB: usize = 1024;
    const MB: usize = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

// ============================================================================
// Tests
// ============================================================================
