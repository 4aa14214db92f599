//! RAG 모듈 - 키워드 수집, 검색, 답변 생성
//!
//! GptKeywordRag가 추출기, 벡터 저장소, 생성 모델을 소유하고
//! 수집(추출 -> 저장)과 질의(검색 -> 프롬프트 -> 생성) 파이프라인을 실행합니다.

mod prompt;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::ads::{normalize_seeds, KeywordSource};
use crate::config::{openai_model, DEFAULT_OPENAI_MODEL};
use crate::error::{RagError, Result};
use crate::knowledge::{Competition, KeywordData, KeywordVectorStore, SearchResult};
use crate::llm::{ChatMessage, ChatRequest, CompletionProvider};

pub use prompt::{
    build_user_prompt, format_keyword_context, format_thousands, NO_KEYWORD_DATA, SYSTEM_PROMPT,
};

/// 기본 검색 키워드 수
pub const DEFAULT_MAX_KEYWORDS: usize = 10;

/// 고검색량 기준 (월간 검색 수 초과)
pub const HIGH_VOLUME_THRESHOLD: u64 = 10_000;

// ============================================================================
// RagConfig
// ============================================================================

/// 생성 설정
#[derive(Debug, Clone)]
pub struct RagConfig {
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    /// 컨텍스트 블록 최대 길이 (문자)
    pub max_context_chars: usize,
    /// 수집 시 언어 ID (None이면 English)
    pub language_id: Option<String>,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_OPENAI_MODEL.to_string(),
            max_tokens: 1500,
            temperature: 0.7,
            max_context_chars: 6000,
            language_id: None,
        }
    }
}

impl RagConfig {
    /// `OPENAI_MODEL` 반영
    pub fn from_env() -> Self {
        Self {
            model: openai_model(),
            ..Self::default()
        }
    }
}

// ============================================================================
// KeywordStats
// ============================================================================

/// 저장된 키워드 통계
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct KeywordStats {
    pub total_keywords: usize,
    pub avg_search_volume: f64,
    pub median_search_volume: f64,
    /// 상단 입찰가 상한 평균
    pub avg_cpc: f64,
    pub competition_distribution: BTreeMap<String, usize>,
    pub high_volume_keywords: usize,
    pub low_competition_keywords: usize,
}

impl KeywordStats {
    /// 레코드 목록에서 계산 (비어있으면 모두 0)
    pub fn from_keywords(keywords: &[KeywordData]) -> Self {
        if keywords.is_empty() {
            return Self::default();
        }

        let n = keywords.len();
        let mut volumes: Vec<u64> = Vec::with_capacity(n);
        let mut volume_sum = 0f64;
        let mut cpc_sum = 0f64;
        let mut distribution = BTreeMap::new();
        let mut high_volume = 0;
        let mut low_competition = 0;

        for kd in keywords {
            volumes.push(kd.search_volume);
            volume_sum += kd.search_volume as f64;
            cpc_sum += kd.cpc_high;
            *distribution
                .entry(kd.competition.as_str().to_string())
                .or_insert(0) += 1;
            if kd.search_volume > HIGH_VOLUME_THRESHOLD {
                high_volume += 1;
            }
            if kd.competition == Competition::Low {
                low_competition += 1;
            }
        }

        volumes.sort_unstable();
        let median = if n % 2 == 1 {
            volumes[n / 2] as f64
        } else {
            (volumes[n / 2 - 1] as f64 + volumes[n / 2] as f64) / 2.0
        };

        Self {
            total_keywords: n,
            avg_search_volume: volume_sum / n as f64,
            median_search_volume: median,
            avg_cpc: cpc_sum / n as f64,
            competition_distribution: distribution,
            high_volume_keywords: high_volume,
            low_competition_keywords: low_competition,
        }
    }
}

// ============================================================================
// GptKeywordRag
// ============================================================================

/// 키워드 RAG 오케스트레이터
///
/// 추출기가 없으면 질의 전용으로 동작합니다 (수집 시 `Config` 에러).
/// 생성 모델이 없으면 수집 전용입니다 (질의 시 `Config` 에러).
pub struct GptKeywordRag {
    source: Option<Box<dyn KeywordSource>>,
    store: KeywordVectorStore,
    llm: Option<Box<dyn CompletionProvider>>,
    config: RagConfig,
}

impl GptKeywordRag {
    pub fn new(store: KeywordVectorStore, llm: Box<dyn CompletionProvider>) -> Self {
        Self {
            source: None,
            store,
            llm: Some(llm),
            config: RagConfig::default(),
        }
    }

    /// 생성 모델 없이 생성 (수집/검색/통계 전용)
    pub fn ingest_only(store: KeywordVectorStore) -> Self {
        Self {
            source: None,
            store,
            llm: None,
            config: RagConfig::default(),
        }
    }

    /// 키워드 추출기 연결
    pub fn with_source(mut self, source: Box<dyn KeywordSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn with_config(mut self, config: RagConfig) -> Self {
        self.config = config;
        self
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn store(&self) -> &KeywordVectorStore {
        &self.store
    }

    /// 시드 키워드로 아이디어를 가져와 저장소에 추가
    ///
    /// 가져오기 성공 후 저장이 실패해도 되돌리지 않습니다.
    ///
    /// # Returns
    /// 저장소에 반영된 레코드 수
    pub async fn update_keyword_data(
        &self,
        seeds: &[String],
        location_ids: &[String],
    ) -> Result<usize> {
        let seeds = normalize_seeds(seeds);
        if seeds.is_empty() {
            return Err(RagError::InvalidInput(
                "at least one seed keyword is required".to_string(),
            ));
        }

        let source = self.source.as_ref().ok_or_else(|| {
            RagError::Config("no keyword source configured (google-ads.yaml)".to_string())
        })?;

        tracing::info!("Fetching keyword data for: {:?}", seeds);
        let keywords = source
            .get_keyword_ideas(&seeds, location_ids, self.config.language_id.as_deref())
            .await?;

        let added = self.store.add(&keywords).await.map_err(|e| {
            tracing::error!("Failed to store {} fetched keywords: {}", keywords.len(), e);
            e
        })?;

        tracing::info!("Added {} keywords to vector store", added);
        Ok(added)
    }

    /// 생성 없이 검색만
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.store.search(query, k).await
    }

    /// 질의 응답
    ///
    /// 상위 `max_keywords`개 키워드를 컨텍스트로 모델을 한 번 호출합니다.
    pub async fn query(
        &self,
        user_query: &str,
        max_keywords: usize,
        include_recommendations: bool,
    ) -> Result<String> {
        if user_query.trim().is_empty() {
            return Err(RagError::InvalidInput("query must not be empty".to_string()));
        }
        let llm = self.llm.as_ref().ok_or_else(|| {
            RagError::Config("no completion model configured (OPENAI_API_KEY)".to_string())
        })?;

        let results = self.store.search(user_query, max_keywords).await?;
        tracing::debug!("Retrieved {} keywords for query", results.len());

        let context = format_keyword_context(&results, self.config.max_context_chars);
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: vec![
                ChatMessage::system(SYSTEM_PROMPT),
                ChatMessage::user(build_user_prompt(
                    user_query,
                    &context,
                    include_recommendations,
                )),
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
        };

        llm.complete(request).await.map_err(|e| {
            tracing::error!("Answer generation failed: {}", e);
            e
        })
    }

    /// 저장된 키워드 통계
    pub async fn get_keyword_stats(&self) -> Result<KeywordStats> {
        let keywords = self.store.keywords().await?;
        Ok(KeywordStats::from_keywords(&keywords))
    }
}

// ============================================================================
// Tests
// ============================================================================
