//! 서버 공유 상태
//!
//! 서버는 먼저 바인딩하고 챗봇/스케줄러는 백그라운드에서 준비되므로
//! 서비스 묶음은 초기화가 끝날 때까지 비어 있습니다.

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;

use crate::chatbot::SupportChatbot;
use crate::config::Settings;
use crate::crawler::HelpCenterCrawler;
use crate::knowledge::VectorStoreManager;
use crate::llm::create_llm;
use crate::scheduler::UpdateScheduler;

/// 초기화가 끝난 서비스 묶음
#[derive(Clone)]
pub struct Services {
    pub chatbot: Arc<SupportChatbot>,
    pub manager: Arc<VectorStoreManager>,
    pub scheduler: Arc<UpdateScheduler>,
}

impl Services {
    /// 설정으로 전체 서비스 구성
    ///
    /// 인덱스가 비어 있고 기사 JSON이 있으면 먼저 인덱싱합니다.
    /// 이 초기 인덱싱이 실패해도 서비스는 구성되며, 이후 `/api/update`로 다시 만들 수 있습니다.
    pub async fn build(settings: &Settings) -> Result<Self> {
        tracing::info!("Initializing vector store...");
        let manager = Arc::new(VectorStoreManager::from_settings(settings)?);
        manager.load_or_create().await?;

        if manager.stats().await? == 0 && settings.articles_path.exists() {
            tracing::info!(
                "Vector store is empty, indexing {}",
                settings.articles_path.display()
            );
            if let Err(e) = manager.update_index(&settings.articles_path).await {
                tracing::warn!("Failed to build initial index, continuing without it: {:#}", e);
            }
        }

        tracing::info!("Initializing chatbot...");
        let llm = create_llm(settings)?;
        let chatbot = Arc::new(SupportChatbot::new(
            manager.clone(),
            llm,
            settings.retrieval_k,
        ));

        let crawler = HelpCenterCrawler::new(settings.crawler.clone())?;
        let scheduler = Arc::new(UpdateScheduler::new(
            crawler,
            manager.clone(),
            &settings.articles_path,
            settings.update_interval,
        ));

        Ok(Self {
            chatbot,
            manager,
            scheduler,
        })
    }
}

/// 애플리케이션 상태
pub struct AppState {
    pub settings: Settings,
    services: RwLock<Option<Services>>,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            services: RwLock::new(None),
        }
    }

    /// 준비된 서비스 (초기화 전이면 None)
    pub async fn services(&self) -> Option<Services> {
        self.services.read().await.clone()
    }

    /// 초기화된 서비스 등록
    pub async fn install(&self, services: Services) {
        *self.services.write().await = Some(services);
    }
}
