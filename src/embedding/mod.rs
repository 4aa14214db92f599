//! 임베딩 모듈 - 키워드 텍스트 벡터화
//!
//! 키워드 레코드와 질의문을 벡터로 변환하는 임베딩 프로바이더입니다.
//! 기본값은 OpenAI 임베딩, `KEYWORD_RAG_EMBEDDER=gemini`이면 Gemini를 사용합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = create_embedder(EmbedderKind::OpenAi)?;
//! let embedding = embedder.embed("Keyword: seo | Search Volume: 1000").await?;
//! ```

mod gemini;
pub(crate) mod openai;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EmbedderKind;
use crate::error::Result;

pub use gemini::{get_api_key, has_api_key, GeminiEmbedding};
pub use openai::OpenAiEmbedding;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 고정 차원 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더(모델) 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 생성
///
/// 환경변수에서 API 키를 읽습니다.
pub fn create_embedder(kind: EmbedderKind) -> Result<Arc<dyn EmbeddingProvider>> {
    let embedder: Arc<dyn EmbeddingProvider> = match kind {
        EmbedderKind::OpenAi => Arc::new(OpenAiEmbedding::from_env()?),
        EmbedderKind::Gemini => Arc::new(GeminiEmbedding::from_env()?),
    };

    tracing::info!(
        "Using {} embedding (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}
