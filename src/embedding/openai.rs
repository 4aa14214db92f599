//! OpenAI 임베딩 프로바이더 (기본값)
//!
//! `/v1/embeddings`는 배치 입력을 지원하므로 여러 키워드를 한 번에 보냅니다.
//! ref: https://platform.openai.com/docs/api-reference/embeddings

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::EmbeddingProvider;
use crate::config::{get_openai_api_key, openai_base_url};
use crate::error::{RagError, Result};

/// 기본 임베딩 모델
pub const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// text-embedding-3-small 차원
pub const DEFAULT_DIMENSION: usize = 1536;

/// 요청당 최대 입력 수
const MAX_BATCH: usize = 100;

/// OpenAI 임베딩 구현체
#[derive(Debug)]
pub struct OpenAiEmbedding {
    api_key: String,
    client: reqwest::Client,
    base_url: String,
    model: String,
    dimension: usize,
}

impl OpenAiEmbedding {
    pub fn new(api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            api_key,
            client,
            base_url: crate::config::DEFAULT_OPENAI_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            dimension: DEFAULT_DIMENSION,
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

    /// 모델과 차원 지정 (text-embedding-3-* 는 dimensions 축소 지원)
    pub fn with_model(mut self, model: impl Into<String>, dimension: usize) -> Self {
        self.model = model.into();
        self.dimension = dimension;
        self
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<Vec<f32>>> {
        let request = EmbeddingsRequest {
            model: &self.model,
            input: inputs,
            dimensions: Some(self.dimension),
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
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
            return Err(RagError::api("OpenAI", status.as_u16(), message));
        }

        let mut parsed: EmbeddingsResponse = serde_json::from_str(&body)
            .map_err(|e| RagError::Embedding(format!("failed to parse embeddings response: {}", e)))?;

        if parsed.data.len() != inputs.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                inputs.len(),
                parsed.data.len()
            )));
        }

        // 응답 순서는 index 필드 기준
        parsed.data.sort_by_key(|d| d.index);
        Ok(parsed.data.into_iter().map(|d| d.embedding).collect())
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// OpenAI 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorEnvelope {
    pub error: OpenAiErrorDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct OpenAiErrorDetail {
    pub message: String,
}

#[async_trait]
impl EmbeddingProvider for OpenAiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        self.request(&[text.to_string()])
            .await?
            .pop()
            .ok_or_else(|| RagError::Embedding("empty embeddings response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());

        for (i, batch) in texts.chunks(MAX_BATCH).enumerate() {
            tracing::debug!(
                "Embedding batch {}/{}",
                i + 1,
                texts.len().div_ceil(MAX_BATCH)
            );
            results.extend(self.request(batch).await?);
        }

        Ok(results)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Tests
// ============================================================================
