//! 키워드 데이터 - Google Ads 키워드 아이디어 레코드
//!
//! 추출기가 생성하고, 벡터 저장소와 프롬프트 포매팅이 소비합니다.
//! 한 번 생성된 레코드는 수정하지 않고, 갱신은 재수집으로 처리합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// 기본 통화 코드
pub const DEFAULT_CURRENCY: &str = "USD";

// ============================================================================
// Competition
// ============================================================================

/// 경쟁 수준
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Competition {
    Low,
    Medium,
    High,
    /// API가 UNSPECIFIED / UNKNOWN을 반환했거나 값이 없음
    Unspecified,
}

impl Competition {
    /// API enum 이름에서 변환 ("LOW", "MEDIUM", "HIGH")
    pub fn from_api(value: &str) -> Self {
        match value.trim().to_uppercase().as_str() {
            "LOW" => Competition::Low,
            "MEDIUM" => Competition::Medium,
            "HIGH" => Competition::High,
            _ => Competition::Unspecified,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Competition::Low => "LOW",
            Competition::Medium => "MEDIUM",
            Competition::High => "HIGH",
            Competition::Unspecified => "UNSPECIFIED",
        }
    }
}

impl std::fmt::Display for Competition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// KeywordData
// ============================================================================

/// 키워드 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeywordData {
    /// 키워드 텍스트 (비어있으면 안 됨)
    pub keyword: String,
    /// 월평균 검색량
    pub search_volume: u64,
    /// 경쟁 수준
    pub competition: Competition,
    /// 경쟁 지수 (0~100)
    pub competition_index: Option<u8>,
    /// 페이지 상단 입찰가 하한
    pub cpc_low: f64,
    /// 페이지 상단 입찰가 상한
    pub cpc_high: f64,
    /// 통화 코드
    pub currency_code: String,
    /// 지역 타겟 ID (geoTargetConstants)
    pub location_ids: Vec<String>,
    /// 언어 ID (languageConstants)
    pub language_id: Option<String>,
    /// 수집 시각
    pub fetched_at: DateTime<Utc>,
}

impl KeywordData {
    /// 최소 필드로 레코드 생성 (나머지는 기본값)
    pub fn new(keyword: impl Into<String>, search_volume: u64, competition: Competition) -> Self {
        Self {
            keyword: keyword.into(),
            search_volume,
            competition,
            competition_index: None,
            cpc_low: 0.0,
            cpc_high: 0.0,
            currency_code: DEFAULT_CURRENCY.to_string(),
            location_ids: Vec::new(),
            language_id: None,
            fetched_at: Utc::now(),
        }
    }

    /// 입찰가 범위 지정
    pub fn with_cpc(mut self, low: f64, high: f64) -> Self {
        self.cpc_low = low;
        self.cpc_high = high;
        self
    }

    /// 지역/언어 태그 지정
    pub fn with_targeting(mut self, location_ids: Vec<String>, language_id: Option<String>) -> Self {
        self.location_ids = location_ids;
        self.language_id = language_id;
        self
    }

    /// 불변식 검사
    pub fn validate(&self) -> Result<()> {
        if self.keyword.trim().is_empty() {
            return Err(RagError::InvalidInput("keyword text must not be empty".to_string()));
        }
        if !self.cpc_low.is_finite() || self.cpc_low < 0.0 {
            return Err(RagError::InvalidInput(format!(
                "cpc_low must be a non-negative amount: {} ({})",
                self.cpc_low, self.keyword
            )));
        }
        if !self.cpc_high.is_finite() || self.cpc_high < 0.0 {
            return Err(RagError::InvalidInput(format!(
                "cpc_high must be a non-negative amount: {} ({})",
                self.cpc_high, self.keyword
            )));
        }
        Ok(())
    }

    /// 임베딩용 텍스트 표현 (키워드 + 지표)
    pub fn embedding_text(&self) -> String {
        format!(
            "Keyword: {} | Search Volume: {} | Competition: {} | CPC: ${:.2}-${:.2}",
            self.keyword, self.search_volume, self.competition, self.cpc_low, self.cpc_high
        )
    }

    /// 중복 제거 키
    ///
    /// 소문자 + 공백 정리된 키워드, 정렬된 지역 ID, 언어 ID의 조합입니다.
    /// 같은 키로 다시 추가하면 기존 레코드를 대체합니다.
    pub fn dedup_key(&self) -> String {
        let keyword = self
            .keyword
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
            .to_lowercase();

        let mut locations = self.location_ids.clone();
        locations.sort();
        locations.dedup();

        format!(
            "{}|{}|{}",
            keyword,
            locations.join(","),
            self.language_id.as_deref().unwrap_or("")
        )
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_competition_from_api() {
        assert_eq!(Competition::from_api("LOW"), Competition::Low);
        assert_eq!(Competition::from_api("medium"), Competition::Medium);
        assert_eq!(Competition::from_api("HIGH"), Competition::High);
        assert_eq!(Competition::from_api("UNSPECIFIED"), Competition::Unspecified);
        assert_eq!(Competition::from_api("UNKNOWN"), Competition::Unspecified);
    }

    #[test]
    fn test_embedding_text() {
        let kd = KeywordData::new("seo services", 1000, Competition::Low).with_cpc(1.5, 4.25);
        assert_eq!(
            kd.embedding_text(),
            "Keyword: seo services | Search Volume: 1000 | Competition: LOW | CPC: $1.50-$4.25"
        );
    }

    #[test]
    fn test_validate() {
        assert!(KeywordData::new("seo", 10, Competition::Low).validate().is_ok());
        assert!(KeywordData::new("  ", 10, Competition::Low).validate().is_err());
        assert!(KeywordData::new("seo", 10, Competition::Low)
            .with_cpc(-1.0, 2.0)
            .validate()
            .is_err());
        assert!(KeywordData::new("seo", 10, Competition::Low)
            .with_cpc(0.0, f64::NAN)
            .validate()
            .is_err());
    }

    #[test]
    fn test_dedup_key_normalizes_text_and_locations() {
        let a = KeywordData::new("SEO  Services", 10, Competition::Low).with_targeting(
            vec!["2840".to_string(), "2826".to_string()],
            Some("1000".to_string()),
        );
        let b = KeywordData::new("seo services", 99, Competition::High).with_targeting(
            vec!["2826".to_string(), "2840".to_string()],
            Some("1000".to_string()),
        );
        assert_eq!(a.dedup_key(), b.dedup_key());

        let c = KeywordData::new("seo services", 10, Competition::Low);
        assert_ne!(a.dedup_key(), c.dedup_key());
    }

    #[test]
    fn test_competition_serde() {
        let json = serde_json::to_string(&Competition::Medium).unwrap();
        assert_eq!(json, "\"MEDIUM\"");
    }
}
