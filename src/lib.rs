//! keyword-rag - Google Ads 키워드 RAG 시스템
//!
//! Google Ads 키워드 아이디어를 수집해 벡터 인덱스에 저장하고,
//! 질의와 유사한 키워드를 컨텍스트로 GPT 답변을 생성합니다.
//!
//! - ads: Google Ads `generateKeywordIdeas` 추출기
//! - auth: OAuth2 refresh token 발급
//! - knowledge: 키워드 레코드 + SQLite 벡터 인덱스
//! - rag: 수집/질의 오케스트레이션

pub mod ads;
pub mod auth;
pub mod cli;
pub mod config;
pub mod embedding;
pub mod error;
pub mod knowledge;
pub mod llm;
pub mod rag;

// Re-exports
pub use ads::{GoogleAdsKeywordExtractor, KeywordSource};
pub use auth::{GoogleAdsOAuth2, RefreshTokenSource};
pub use config::{get_data_dir, AdsConfig, EmbedderKind};
pub use embedding::{create_embedder, EmbeddingProvider, GeminiEmbedding, OpenAiEmbedding};
pub use error::{ApiErrorKind, RagError, Result};
pub use knowledge::{
    Competition, KeywordData, KeywordIndex, KeywordVectorStore, SearchResult, VectorStore,
};
pub use llm::{ChatMessage, ChatRequest, CompletionProvider, OpenAiChat};
pub use rag::{GptKeywordRag, KeywordStats, RagConfig};
