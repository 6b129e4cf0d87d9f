//! 스케줄러 모듈 - 주기적 크롤링 + 인덱스 갱신
//!
//! 하나의 tokio 백그라운드 태스크가 `interval`마다 `update_data`를 실행합니다.
//! 수동 갱신(`/api/update`)과 예약 실행은 같은 잠금으로 직렬화됩니다.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;

use crate::crawler::{save_to_json, HelpCenterCrawler};
use crate::knowledge::VectorStoreManager;

/// 갱신 결과
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// 크롤링된 기사 수
    pub articles: usize,
    /// 인덱싱된 청크 수
    pub chunks: usize,
}

/// 데이터 갱신 스케줄러
pub struct UpdateScheduler {
    crawler: HelpCenterCrawler,
    manager: Arc<VectorStoreManager>,
    articles_path: PathBuf,
    interval: Duration,
    update_lock: Mutex<()>,
    last_report: RwLock<Option<UpdateReport>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl UpdateScheduler {
    pub fn new(
        crawler: HelpCenterCrawler,
        manager: Arc<VectorStoreManager>,
        articles_path: impl Into<PathBuf>,
        interval: Duration,
    ) -> Self {
        Self {
            crawler,
            manager,
            articles_path: articles_path.into(),
            interval,
            update_lock: Mutex::new(()),
            last_report: RwLock::new(None),
            task: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// 크롤링 → JSON 저장 → 인덱스 갱신
    pub async fn update_data(&self) -> Result<UpdateReport> {
        let _guard = self.update_lock.lock().await;

        let started_at = Utc::now();
        tracing::info!("Starting data update at {}", started_at);

        let articles = self.crawler.crawl_all().await;
        if articles.is_empty() {
            tracing::warn!("No articles crawled");
            let report = UpdateReport {
                started_at,
                finished_at: Utc::now(),
                articles: 0,
                chunks: 0,
            };
            *self.last_report.write().await = Some(report.clone());
            return Ok(report);
        }

        save_to_json(&articles, &self.articles_path)?;

        let index = self
            .manager
            .update_index(&self.articles_path)
            .await
            .context("Failed to update vector store")?;
        tracing::info!("Vector store updated successfully");

        let report = UpdateReport {
            started_at,
            finished_at: Utc::now(),
            articles: articles.len(),
            chunks: index.chunks,
        };
        tracing::info!("Update completed at {}", report.finished_at);

        *self.last_report.write().await = Some(report.clone());
        Ok(report)
    }

    /// 에러를 기록만 하는 실행 (예약 실행용)
    async fn run_logged(&self) {
        if let Err(e) = self.update_data().await {
            tracing::error!("Error during scheduled update: {:#}", e);
        }
    }

    /// 백그라운드 실행 시작 (이미 실행 중이면 무시)
    pub async fn start(self: &Arc<Self>, run_initial: bool) {
        let mut task = self.task.lock().await;
        if task.as_ref().is_some_and(|handle| !handle.is_finished()) {
            tracing::warn!("Scheduler already running");
            return;
        }

        let scheduler = Arc::clone(self);
        *task = Some(tokio::spawn(async move {
            if run_initial {
                tracing::info!("Running initial data update...");
                scheduler.run_logged().await;
            }

            let period = scheduler.interval;
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            loop {
                ticker.tick().await;
                scheduler.run_logged().await;
            }
        }));

        tracing::info!(
            "Scheduler started. Will update every {} hours",
            self.interval.as_secs() / 3600
        );
    }

    /// 백그라운드 실행 중지
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
            tracing::info!("Scheduler stopped");
        }
    }

    /// 백그라운드 태스크가 살아 있는지
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }

    /// 마지막 갱신 결과
    pub async fn last_report(&self) -> Option<UpdateReport> {
        self.last_report.read().await.clone()
    }
}
