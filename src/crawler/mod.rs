//! 크롤러 모듈 - 헬프센터 카테고리/기사 수집
//!
//! 헬프센터(Zendesk 계열 `/hc/<locale>` 구조) 사이트를 돌며
//! 기사 제목과 본문을 추출하고 JSON 파일로 저장합니다.
//!
//! 두 가지 수집 전략을 지원합니다:
//! - `Categories`: 메인 → 카테고리/섹션 → 기사 순으로 탐색
//! - `ArticleLinks`: 메인 페이지의 기사 링크만 바로 수집

use std::collections::HashSet;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use regex::Regex;
use reqwest::header::{self, HeaderMap, HeaderValue};
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use url::Url;

/// 브라우저와 동일한 User-Agent (일부 헬프센터는 봇 UA를 차단)
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
                          (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

/// 본문 후보 셀렉터 (우선순위 순)
const CONTENT_SELECTORS: &[&str] = &[
    "div.article-body",
    ".article-body",
    "div.article-content",
    "article.article",
    "div.content",
    "div.main-content",
    "article",
    "main",
];

/// 텍스트 추출 시 건너뛸 요소
const SKIPPED_ELEMENTS: &[&str] = &["script", "style", "noscript", "template"];

// ============================================================================
// Types
// ============================================================================

/// 크롤링된 기사
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Article {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub content: String,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub category: String,
    /// ISO-8601 수집 시각
    #[serde(default)]
    pub crawled_at: String,
}

/// 카테고리 또는 기사 링크
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageLink {
    pub title: String,
    pub url: String,
}

/// 수집 전략
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlStrategy {
    /// 카테고리/섹션 페이지를 거쳐 기사 수집
    Categories,
    /// 메인 페이지의 기사 링크만 수집
    ArticleLinks,
}

impl FromStr for CrawlStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "categories" => Ok(CrawlStrategy::Categories),
            "article-links" | "articles" => Ok(CrawlStrategy::ArticleLinks),
            other => bail!(
                "Unknown crawl strategy: {}. Must be categories or article-links",
                other
            ),
        }
    }
}

/// 크롤러 설정
#[derive(Debug, Clone)]
pub struct CrawlerConfig {
    /// 헬프센터 루트 (예: https://biz.help.jtbc.info/hc/ja)
    pub base_url: String,
    pub strategy: CrawlStrategy,
    /// 요청 간 대기 시간
    pub request_delay: Duration,
    /// 요청 타임아웃
    pub timeout: Duration,
    /// `ArticleLinks` 전략에서 모든 기사에 붙일 카테고리명
    pub category_label: String,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://biz.help.jtbc.info/hc/ja".to_string(),
            strategy: CrawlStrategy::Categories,
            request_delay: Duration::from_secs(1),
            timeout: Duration::from_secs(30),
            category_label: "サポート".to_string(),
        }
    }
}

// ============================================================================
// HelpCenterCrawler
// ============================================================================

/// 헬프센터 크롤러
pub struct HelpCenterCrawler {
    client: reqwest::Client,
    config: CrawlerConfig,
    base: Url,
    listing_re: Regex,
    article_re: Regex,
}

impl HelpCenterCrawler {
    /// 새 크롤러 생성
    pub fn new(config: CrawlerConfig) -> Result<Self> {
        let base = Url::parse(&config.base_url)
            .with_context(|| format!("잘못된 크롤링 URL: {}", config.base_url))?;

        // /hc/ja 처럼 끝 슬래시 없는 경로 기준
        let base_path = base.path().trim_end_matches('/').to_string();
        let listing_re = Regex::new(&format!(
            "{}/(categories|sections)/",
            regex::escape(&base_path)
        ))
        .context("카테고리 패턴 생성 실패")?;
        let article_re = Regex::new(&format!("{}/articles/", regex::escape(&base_path)))
            .context("기사 패턴 생성 실패")?;

        let mut headers = HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static(
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,*/*;q=0.8",
            ),
        );
        headers.insert(
            header::ACCEPT_LANGUAGE,
            HeaderValue::from_static("ja,en-US;q=0.9,en;q=0.8"),
        );

        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .default_headers(headers)
            .gzip(true)
            .timeout(config.timeout)
            .build()
            .context("HTTP 클라이언트 생성 실패")?;

        Ok(Self {
            client,
            config,
            base,
            listing_re,
            article_re,
        })
    }

    /// 설정 참조
    pub fn config(&self) -> &CrawlerConfig {
        &self.config
    }

    /// 페이지 HTML 가져오기 (2xx 외 상태는 에러)
    async fn fetch_page(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .context("HTTP 요청 실패")?
            .error_for_status()
            .context("HTTP 오류 응답")?;

        response.text().await.context("응답 본문 읽기 실패")
    }

    /// 카테고리/섹션 목록
    pub async fn get_categories(&self) -> Vec<PageLink> {
        match self.fetch_page(self.base.as_str()).await {
            Ok(html) => {
                let categories = self.extract_links(&html, &self.listing_re);
                tracing::info!("Found {} categories", categories.len());
                categories
            }
            Err(e) => {
                tracing::error!("Error fetching categories: {:#}", e);
                Vec::new()
            }
        }
    }

    /// 카테고리 페이지의 기사 목록
    pub async fn get_articles_from_category(&self, category_url: &str) -> Vec<PageLink> {
        match self.fetch_page(category_url).await {
            Ok(html) => {
                let articles = self.extract_links(&html, &self.article_re);
                tracing::info!("Found {} articles in category", articles.len());
                articles
            }
            Err(e) => {
                tracing::error!("Error fetching articles from {}: {:#}", category_url, e);
                Vec::new()
            }
        }
    }

    /// 메인 페이지의 기사 URL (중복 제거, 발견 순서 유지)
    pub async fn get_article_links(&self) -> Vec<String> {
        let html = match self.fetch_page(self.base.as_str()).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Error fetching article links: {:#}", e);
                return Vec::new();
            }
        };

        let document = Html::parse_document(&html);
        let mut seen = HashSet::new();
        let mut urls = Vec::new();

        for (href, _) in anchors(&document) {
            if let Some(url) = self.resolve(&href) {
                if url.path().contains("/articles/") && seen.insert(url.to_string()) {
                    urls.push(url.to_string());
                }
            }
        }

        tracing::info!("Found {} article URLs", urls.len());
        urls
    }

    /// 기사 상세 내용
    ///
    /// 제목과 본문이 모두 없거나 요청이 실패하면 `None`
    pub async fn get_article_content(&self, article_url: &str) -> Option<Article> {
        let html = match self.fetch_page(article_url).await {
            Ok(html) => html,
            Err(e) => {
                tracing::error!("Error fetching article content from {}: {:#}", article_url, e);
                return None;
            }
        };

        let (title, content) = parse_article(&html);
        if title.is_empty() && content.is_empty() {
            tracing::warn!("No content found for {}", article_url);
            return None;
        }

        Some(Article {
            title,
            content,
            url: article_url.to_string(),
            category: String::new(),
            crawled_at: Utc::now().to_rfc3339(),
        })
    }

    /// 전체 크롤링
    ///
    /// 본문이 빈 기사는 건너뛰고, 같은 실행 안에서 이미 방문한 카테고리/기사 URL은 다시 가져오지 않습니다.
    pub async fn crawl_all(&self) -> Vec<Article> {
        tracing::info!(
            "Starting full crawl of {} ({:?})",
            self.base,
            self.config.strategy
        );

        let mut visited = HashSet::new();
        let mut articles = Vec::new();

        match self.config.strategy {
            CrawlStrategy::Categories => {
                for category in self.get_categories().await {
                    // 네비게이션과 본문에 같은 카테고리가 중복 노출될 수 있음
                    if !visited.insert(category.url.clone()) {
                        continue;
                    }
                    tracing::info!("Crawling category: {}", category.title);
                    self.pause().await;

                    for link in self.get_articles_from_category(&category.url).await {
                        if !visited.insert(link.url.clone()) {
                            continue;
                        }
                        self.pause().await;
                        self.collect(&link.url, &category.title, &mut articles).await;
                    }
                }
            }
            CrawlStrategy::ArticleLinks => {
                let urls = self.get_article_links().await;
                if urls.is_empty() {
                    tracing::error!("No article URLs found");
                }
                let total = urls.len();
                for (i, url) in urls.into_iter().enumerate() {
                    if !visited.insert(url.clone()) {
                        continue;
                    }
                    tracing::info!("Crawling article {}/{}: {}", i + 1, total, url);
                    self.collect(&url, &self.config.category_label, &mut articles)
                        .await;
                    self.pause().await;
                }
            }
        }

        tracing::info!("Crawl completed. Total articles: {}", articles.len());
        articles
    }

    /// 기사 하나를 가져와 본문이 있으면 추가
    async fn collect(&self, url: &str, category: &str, articles: &mut Vec<Article>) {
        if let Some(mut article) = self.get_article_content(url).await {
            if article.content.is_empty() {
                tracing::debug!("Skipping article without body: {}", url);
                return;
            }
            article.category = category.to_string();
            tracing::info!("Crawled: {}", article.title);
            articles.push(article);
        }
    }

    /// 요청 간 대기
    async fn pause(&self) {
        if !self.config.request_delay.is_zero() {
            tokio::time::sleep(self.config.request_delay).await;
        }
    }

    /// href를 절대 URL로 변환 (fragment 제거)
    fn resolve(&self, href: &str) -> Option<Url> {
        let mut url = self.base.join(href).ok()?;
        url.set_fragment(None);
        Some(url)
    }

    /// 패턴에 맞는 링크 추출 (텍스트가 있는 것만)
    fn extract_links(&self, html: &str, pattern: &Regex) -> Vec<PageLink> {
        let document = Html::parse_document(html);

        anchors(&document)
            .into_iter()
            .filter(|(_, title)| !title.is_empty())
            .filter_map(|(href, title)| {
                let url = self.resolve(&href)?;
                pattern.is_match(url.path()).then(|| PageLink {
                    title,
                    url: url.to_string(),
                })
            })
            .collect()
    }
}

// ============================================================================
// HTML Extraction
// ============================================================================

/// 모든 `<a href>`의 (href, 텍스트)
fn anchors(document: &Html) -> Vec<(String, String)> {
    let Ok(selector) = Selector::parse("a[href]") else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|a| {
            let href = a.value().attr("href")?.trim().to_string();
            let text = a.text().collect::<String>().trim().to_string();
            Some((href, text))
        })
        .collect()
}

/// 기사 HTML에서 (제목, 본문) 추출
fn parse_article(html: &str) -> (String, String) {
    let document = Html::parse_document(html);
    (extract_title(&document), extract_content(&document))
}

/// 제목 추출: `<h1>` 우선, 없으면 `<title>`
fn extract_title(document: &Html) -> String {
    for tag in ["h1", "title"] {
        if let Ok(selector) = Selector::parse(tag) {
            if let Some(element) = document.select(&selector).next() {
                let title = element.text().collect::<String>().trim().to_string();
                if !title.is_empty() {
                    return title;
                }
            }
        }
    }

    String::new()
}

/// 본문 추출: 첫 번째로 매칭되는 후보 요소의 텍스트
fn extract_content(document: &Html) -> String {
    for selector_str in CONTENT_SELECTORS {
        if let Ok(selector) = Selector::parse(selector_str) {
            if let Some(element) = document.select(&selector).next() {
                let text = extract_text_from_element(&element);
                if !text.is_empty() {
                    return text;
                }
            }
        }
    }

    String::new()
}

/// 요소의 텍스트 노드를 줄 단위로 결합 (스크립트/스타일 제외)
fn extract_text_from_element(element: &ElementRef) -> String {
    let mut lines = Vec::new();

    for node in element.descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };

        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map(|el| SKIPPED_ELEMENTS.contains(&el.name()))
                .unwrap_or(false)
        });
        if hidden {
            continue;
        }

        let trimmed = text.trim();
        if !trimmed.is_empty() {
            lines.push(trimmed);
        }
    }

    lines.join("\n")
}

// ============================================================================
// JSON Persistence
// ============================================================================

/// 기사 목록을 JSON 파일로 저장 (부모 디렉토리 자동 생성)
pub fn save_to_json(articles: &[Article], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("디렉토리 생성 실패: {}", parent.display()))?;
        }
    }

    let json = serde_json::to_string_pretty(articles).context("기사 직렬화 실패")?;
    std::fs::write(path, json).with_context(|| format!("파일 쓰기 실패: {}", path.display()))?;

    tracing::info!("Saved {} articles to {}", articles.len(), path.display());
    Ok(())
}

/// JSON 파일에서 기사 목록 로드
pub fn load_from_json(path: &Path) -> Result<Vec<Article>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("파일 읽기 실패: {}", path.display()))?;
    let articles: Vec<Article> =
        serde_json::from_str(&raw).with_context(|| format!("JSON 파싱 실패: {}", path.display()))?;

    tracing::info!("Loaded {} articles from {}", articles.len(), path.display());
    Ok(articles)
}

// ============================================================================
// Tests
// ============================================================================
