//! HTTP 핸들러

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use super::error::ApiError;
use super::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub question: Option<String>,
}

/// `POST /api/chat`
pub async fn chat(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    // 본문이 없거나 JSON이 아니면 질문이 없는 것으로 취급
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            tracing::debug!("Rejected chat body: {}", rejection.body_text());
            ChatRequest { question: None }
        }
    };

    let question = request
        .question
        .as_deref()
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .ok_or_else(|| ApiError::BadRequest("No question provided".to_string()))?;

    let services = state
        .services()
        .await
        .ok_or_else(|| ApiError::internal("Chatbot not initialized"))?;

    Ok(Json(services.chatbot.ask(question).await))
}

/// `GET /api/suggestions`
pub async fn suggestions(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let services = state
        .services()
        .await
        .ok_or_else(|| ApiError::internal("Chatbot not initialized"))?;

    Ok(Json(json!({
        "suggestions": services.chatbot.suggested_questions()
    })))
}

/// `GET /api/status`
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let settings = &state.settings;
    let services = state.services().await;

    let (scheduler_running, indexed_chunks, last_update) = match &services {
        Some(services) => {
            let chunks = services.manager.stats().await.unwrap_or_else(|e| {
                tracing::warn!("Failed to count indexed chunks: {:#}", e);
                0
            });
            (
                services.scheduler.is_running().await,
                chunks,
                services.scheduler.last_report().await,
            )
        }
        None => (false, 0, None),
    };

    Json(json!({
        "status": "running",
        "chatbot_ready": services.is_some(),
        "scheduler_running": scheduler_running,
        "mode": settings.mode.as_str(),
        "model": settings.llm_model(),
        "embeddings": settings.embedding_model(),
        "indexed_chunks": indexed_chunks,
        "last_update": last_update,
    }))
}

/// `POST /api/update`
pub async fn trigger_update(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ApiError> {
    let services = state
        .services()
        .await
        .ok_or_else(|| ApiError::internal("Scheduler not initialized"))?;

    let report = services.scheduler.update_data().await.map_err(|e| {
        tracing::error!("Error triggering update: {:#}", e);
        ApiError::Internal(format!("{:#}", e))
    })?;

    Ok(Json(json!({
        "message": "Update triggered successfully",
        "articles": report.articles,
        "chunks": report.chunks,
    })))
}
