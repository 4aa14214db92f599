//! Google Ads 키워드 추출기
//!
//! KeywordPlanIdeaService `generateKeywordIdeas` REST 엔드포인트를 호출하여
//! 시드 키워드에서 키워드 아이디어를 가져옵니다.
//!
//! ref: https://developers.google.com/google-ads/api/rest/reference/rest/latest/customers/generateKeywordIdeas

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize};

use crate::auth::RefreshTokenSource;
use crate::config::{normalize_customer_id, AdsConfig};
use crate::error::{RagError, Result};
use crate::knowledge::{Competition, KeywordData, DEFAULT_CURRENCY};

/// Google Ads REST 기본 주소
pub const DEFAULT_ADS_BASE_URL: &str = "https://googleads.googleapis.com";

/// Google Ads API 버전
pub const DEFAULT_API_VERSION: &str = "v17";

/// 기본 언어 (English)
pub const DEFAULT_LANGUAGE_ID: &str = "1000";

/// 요청당 최대 시드 키워드 수
pub const MAX_SEEDS_PER_REQUEST: usize = 20;

const MICROS_PER_UNIT: f64 = 1_000_000.0;

// ============================================================================
// KeywordSource Trait
// ============================================================================

/// 키워드 아이디어 공급자
#[async_trait]
pub trait KeywordSource: Send + Sync {
    /// 시드 키워드로 키워드 아이디어 조회
    ///
    /// 시드가 비어있으면 네트워크 호출 전에 `InvalidInput`을 반환합니다.
    async fn get_keyword_ideas(
        &self,
        seeds: &[String],
        location_ids: &[String],
        language_id: Option<&str>,
    ) -> Result<Vec<KeywordData>>;
}

// ============================================================================
// Request / Response
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateKeywordIdeasRequest<'a> {
    language: String,
    geo_target_constants: Vec<String>,
    keyword_plan_network: &'static str,
    keyword_seed: KeywordSeed<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page_token: Option<&'a str>,
}

#[derive(Debug, Serialize)]
struct KeywordSeed<'a> {
    keywords: &'a [String],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateKeywordIdeasResponse {
    #[serde(default)]
    results: Vec<KeywordIdeaResult>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordIdeaResult {
    #[serde(default)]
    text: String,
    #[serde(default)]
    keyword_idea_metrics: Option<KeywordIdeaMetrics>,
}

/// int64 필드는 JSON에서 문자열로 옵니다
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct KeywordIdeaMetrics {
    #[serde(default, deserialize_with = "deserialize_int64")]
    avg_monthly_searches: Option<u64>,
    #[serde(default)]
    competition: Option<String>,
    #[serde(default, deserialize_with = "deserialize_int64")]
    competition_index: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_int64")]
    low_top_of_page_bid_micros: Option<u64>,
    #[serde(default, deserialize_with = "deserialize_int64")]
    high_top_of_page_bid_micros: Option<u64>,
}

fn deserialize_int64<'de, D>(deserializer: D) -> std::result::Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Int64 {
        Number(u64),
        Text(String),
    }

    match Option::<Int64>::deserialize(deserializer)? {
        Some(Int64::Number(n)) => Ok(Some(n)),
        Some(Int64::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
        None => Ok(None),
    }
}

/// Google API 에러 응답
#[derive(Debug, Deserialize)]
struct GoogleErrorEnvelope {
    error: GoogleErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GoogleErrorDetail {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

impl KeywordIdeaResult {
    fn into_keyword_data(self, location_ids: &[String], language_id: &str) -> KeywordData {
        let metrics = self.keyword_idea_metrics.unwrap_or_default();
        let competition = metrics
            .competition
            .as_deref()
            .map(Competition::from_api)
            .unwrap_or(Competition::Unspecified);

        KeywordData {
            keyword: self.text,
            search_volume: metrics.avg_monthly_searches.unwrap_or(0),
            competition,
            competition_index: metrics
                .competition_index
                .map(|i| i.min(100) as u8),
            cpc_low: micros_to_units(metrics.low_top_of_page_bid_micros),
            cpc_high: micros_to_units(metrics.high_top_of_page_bid_micros),
            currency_code: DEFAULT_CURRENCY.to_string(),
            location_ids: location_ids.to_vec(),
            language_id: Some(language_id.to_string()),
            fetched_at: Utc::now(),
        }
    }
}

fn micros_to_units(micros: Option<u64>) -> f64 {
    micros.map(|m| m as f64 / MICROS_PER_UNIT).unwrap_or(0.0)
}

// ============================================================================
// Helpers
// ============================================================================

/// 시드 정리: trim, 빈 값 제거, 대소문자 무시 중복 제거 (순서 유지)
pub fn normalize_seeds(seeds: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    seeds
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(s.to_lowercase()))
        .map(str::to_string)
        .collect()
}

/// "2840" 또는 "geoTargetConstants/2840" -> "2840"
fn strip_resource_prefix<'a>(id: &'a str, prefix: &str) -> &'a str {
    let id = id.trim();
    id.strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix('/'))
        .unwrap_or(id)
}

// ============================================================================
// GoogleAdsKeywordExtractor
// ============================================================================

/// Google Ads REST 키워드 아이디어 클라이언트
pub struct GoogleAdsKeywordExtractor {
    client: reqwest::Client,
    tokens: RefreshTokenSource,
    developer_token: String,
    login_customer_id: Option<String>,
    customer_id: String,
    base_url: String,
    api_version: String,
}

impl GoogleAdsKeywordExtractor {
    /// google-ads.yaml 자격 증명과 고객 ID로 생성
    pub fn new(config: &AdsConfig, customer_id: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            tokens: RefreshTokenSource::from_ads_config(config)?,
            developer_token: config.developer_token.clone(),
            login_customer_id: config.login_customer_id.clone(),
            customer_id: normalize_customer_id(customer_id)?,
            base_url: DEFAULT_ADS_BASE_URL.to_string(),
            api_version: DEFAULT_API_VERSION.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = version.into();
        self
    }

    /// access token 공급자 교체 (토큰 엔드포인트 지정 등)
    pub fn with_token_source(mut self, tokens: RefreshTokenSource) -> Self {
        self.tokens = tokens;
        self
    }

    pub fn customer_id(&self) -> &str {
        &self.customer_id
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/{}/customers/{}:generateKeywordIdeas",
            self.base_url, self.api_version, self.customer_id
        )
    }

    /// 한 페이지 요청
    async fn fetch_page(
        &self,
        access_token: &str,
        request: &GenerateKeywordIdeasRequest<'_>,
    ) -> Result<GenerateKeywordIdeasResponse> {
        let mut builder = self
            .client
            .post(self.endpoint())
            .bearer_auth(access_token)
            .header("developer-token", &self.developer_token)
            .json(request);

        if let Some(login_id) = &self.login_customer_id {
            builder = builder.header("login-customer-id", login_id);
        }

        let response = builder.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<GoogleErrorEnvelope>(&body)
                .map(|e| match e.error.status {
                    Some(s) => format!("{}: {}", s, e.error.message),
                    None => e.error.message,
                })
                .unwrap_or(body);
            tracing::error!("Google Ads API error ({}): {}", status, message);
            return Err(RagError::api("Google Ads", status.as_u16(), message));
        }

        if body.trim().is_empty() {
            return Ok(GenerateKeywordIdeasResponse::default());
        }
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl KeywordSource for GoogleAdsKeywordExtractor {
    async fn get_keyword_ideas(
        &self,
        seeds: &[String],
        location_ids: &[String],
        language_id: Option<&str>,
    ) -> Result<Vec<KeywordData>> {
        let seeds = normalize_seeds(seeds);
        if seeds.is_empty() {
            return Err(RagError::InvalidInput(
                "at least one seed keyword is required".to_string(),
            ));
        }

        let location_ids: Vec<String> = location_ids
            .iter()
            .map(|id| strip_resource_prefix(id, "geoTargetConstants").to_string())
            .filter(|id| !id.is_empty())
            .collect();
        let language_id =
            strip_resource_prefix(language_id.unwrap_or(DEFAULT_LANGUAGE_ID), "languageConstants")
                .to_string();

        let access_token = self.tokens.access_token().await?;

        let mut seen = HashSet::new();
        let mut keywords = Vec::new();

        for chunk in seeds.chunks(MAX_SEEDS_PER_REQUEST) {
            let mut page_token: Option<String> = None;
            let mut used_tokens = HashSet::new();
            let mut page = 0usize;

            loop {
                let response = {
                    let request = GenerateKeywordIdeasRequest {
                        language: format!("languageConstants/{}", language_id),
                        geo_target_constants: location_ids
                            .iter()
                            .map(|id| format!("geoTargetConstants/{}", id))
                            .collect(),
                        keyword_plan_network: "GOOGLE_SEARCH",
                        keyword_seed: KeywordSeed { keywords: chunk },
                        page_token: page_token.as_deref(),
                    };
                    self.fetch_page(&access_token, &request).await?
                };
                page += 1;
                tracing::debug!(
                    "Fetched page {} ({} ideas) for {} seeds",
                    page,
                    response.results.len(),
                    chunk.len()
                );

                for result in response.results {
                    if result.text.trim().is_empty() {
                        continue;
                    }
                    // 중복 아이디어는 첫 번째만 유지 (저장소와 같은 키)
                    let keyword = result.into_keyword_data(&location_ids, &language_id);
                    if seen.insert(keyword.dedup_key()) {
                        keywords.push(keyword);
                    }
                }

                match response.next_page_token.filter(|t| !t.is_empty()) {
                    Some(token) if used_tokens.insert(token.clone()) => page_token = Some(token),
                    Some(token) => {
                        tracing::warn!("Page token {:?} repeated, stopping pagination", token);
                        break;
                    }
                    None => break,
                }
            }
        }

        tracing::info!(
            "Fetched {} keyword ideas from {} seeds",
            keywords.len(),
            seeds.len()
        );
        Ok(keywords)
    }
}

// ============================================================================
// Tests
// ============================================================================
