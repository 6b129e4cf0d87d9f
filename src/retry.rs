//! HTTP 재시도 정책 - 임베딩/LLM 프로바이더 공용
//!
//! 전송 실패, 429, 5xx 응답은 지수 백오프로 재시도하고
//! 그 외 실패 응답은 본문의 에러 메시지와 함께 즉시 실패합니다.

use std::future::Future;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};

/// 최대 재시도 횟수
pub const MAX_RETRIES: u32 = 3;
/// 재시도 시 초기 백오프 (ms)
pub const INITIAL_BACKOFF_MS: u64 = 2000;

/// 재시도 정책
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub initial_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: MAX_RETRIES,
            initial_backoff: Duration::from_millis(INITIAL_BACKOFF_MS),
        }
    }
}

impl RetryPolicy {
    /// 재시도 없는 정책
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            initial_backoff: Duration::ZERO,
        }
    }

    /// n번째 시도(0-based) 후 대기 시간
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.initial_backoff * 2u32.saturating_pow(attempt)
    }

    /// 요청을 실행하고 성공 응답 본문을 반환
    ///
    /// `send`는 시도마다 새 요청을 만들어 보냅니다.
    pub async fn execute<F, Fut>(&self, label: &str, mut send: F) -> Result<String>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = reqwest::Result<reqwest::Response>>,
    {
        let mut last_error: Option<anyhow::Error> = None;

        for attempt in 0..=self.max_retries {
            let response = match send().await {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Some(anyhow!("Failed to send {} request: {}", label, e));
                    self.wait(label, "Request failed", attempt).await;
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .with_context(|| format!("Failed to read {} response body", label))?;

            if status.is_success() {
                return Ok(body);
            }

            if status.as_u16() == 429 || status.is_server_error() {
                last_error = Some(anyhow!(
                    "{} API error ({}): {}",
                    label,
                    status,
                    error_message(&body)
                ));
                self.wait(label, "Retryable status", attempt).await;
                continue;
            }

            bail!("{} API error ({}): {}", label, status, error_message(&body));
        }

        Err(last_error.unwrap_or_else(|| {
            anyhow!("{} request failed after {} retries", label, self.max_retries)
        }))
    }

    /// 남은 시도가 있으면 백오프 대기
    async fn wait(&self, label: &str, reason: &str, attempt: u32) {
        if attempt >= self.max_retries {
            return;
        }

        let backoff = self.backoff(attempt);
        tracing::warn!(
            "{} ({}), retrying in {:?} (attempt {}/{})",
            reason,
            label,
            backoff,
            attempt + 1,
            self.max_retries
        );
        tokio::time::sleep(backoff).await;
    }
}

/// 에러 응답 본문에서 메시지 추출
///
/// `{"error": {"message": ..}}` (OpenAI, Gemini) 와 `{"error": ".."}` (Ollama) 형식을 지원하고,
/// 그 외에는 본문을 그대로 돌려줍니다.
pub fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let error = parsed.as_ref().and_then(|v| v.get("error"));

    match error {
        Some(serde_json::Value::String(message)) => message.clone(),
        Some(obj) => obj
            .get("message")
            .and_then(|m| m.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| obj.to_string()),
        None => body.trim().to_string(),
    }
}
