//! LLM 모듈 - 텍스트 생성 (chat completion)
//!
//! OpenAI 호환 `/chat/completions` 엔드포인트를 한 번 호출하여 답변을 생성합니다.
//! 스트리밍과 멀티턴 상태는 다루지 않습니다.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::{get_openai_api_key, openai_base_url, DEFAULT_OPENAI_BASE_URL};
use crate::embedding::openai::OpenAiErrorEnvelope;
use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 대화 메시지
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// 생성 요청
#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

// ============================================================================
// CompletionProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 요청 한 건에 대한 응답 텍스트
    async fn complete(&self, request: ChatRequest) -> Result<String>;

    fn name(&self) -> &str;
}

// ============================================================================
// OpenAiChat
// ============================================================================

/// OpenAI 호환 chat completion 클라이언트
#[derive(Debug)]
pub struct OpenAiChat {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiChat {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(120))
            .build()?;

        Ok(Self {
            api_key,
            client,
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
        })
    }

    /// `OPENAI_API_KEY`, `OPENAI_BASE_URL`에서 생성
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(get_openai_api_key()?)?.with_base_url(openai_base_url()))
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl CompletionProvider for OpenAiChat {
    async fn complete(&self, request: ChatRequest) -> Result<String> {
        let url = format!("{}/chat/completions", self.base_url);
        tracing::debug!(
            "Chat completion: model={}, messages={}",
            request.model,
            request.messages.len()
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<OpenAiErrorEnvelope>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            tracing::error!("Chat completion failed ({}): {}", status, message);
            return Err(RagError::api("OpenAI", status.as_u16(), message));
        }

        let parsed: ChatResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Generation(format!("failed to parse chat response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Generation("response contained no choices".to_string()))?;

        if choice.finish_reason.as_deref() == Some("length") {
            tracing::warn!("Answer truncated at max_tokens={}", request.max_tokens);
        }

        Ok(choice.message.content.unwrap_or_default().trim().to_string())
    }

    fn name(&self) -> &str {
        "openai"
    }
}

// ============================================================================
// Tests
// ============================================================================
