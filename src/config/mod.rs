//! 설정 모듈 - google-ads.yaml + 환경변수
//!
//! Google Ads 자격 증명은 YAML 파일에서, 나머지 설정은 환경변수에서 읽습니다.
//!
//! ## 환경변수
//! - `OPENAI_API_KEY`: OpenAI API 키 (응답 생성, 기본 임베딩)
//! - `GOOGLE_ADS_CUSTOMER_ID`: Google Ads 고객 ID
//! - `GOOGLE_ADS_CONFIG_PATH`: google-ads.yaml 경로 (기본값: ./google-ads.yaml)
//! - `KEYWORD_RAG_DATA_DIR`: 데이터 디렉토리
//! - `OPENAI_BASE_URL`, `OPENAI_MODEL`: OpenAI 호환 엔드포인트/모델
//! - `KEYWORD_RAG_EMBEDDER`: 임베딩 프로바이더 (`openai` | `gemini`)

use std::path::{Path, PathBuf};

use serde::{Deserialize, Deserializer};

use crate::error::{RagError, Result};

/// 기본 OpenAI API 주소
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// 기본 생성 모델
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4";

/// 기본 google-ads.yaml 경로
pub const DEFAULT_ADS_CONFIG_PATH: &str = "./google-ads.yaml";

// ============================================================================
// Data Directory
// ============================================================================

/// 데이터 디렉토리 경로
///
/// `KEYWORD_RAG_DATA_DIR`가 있으면 그 경로, 없으면 `~/.keyword-rag/`
pub fn get_data_dir() -> PathBuf {
    if let Some(dir) = env_var("KEYWORD_RAG_DATA_DIR") {
        return PathBuf::from(dir);
    }

    dirs::data_local_dir()
        .or_else(dirs::home_dir)
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".keyword-rag")
}

/// 인덱스 파일 경로 (데이터 디렉토리/keywords.db)
pub fn index_path(data_dir: &Path) -> PathBuf {
    data_dir.join("keywords.db")
}

// ============================================================================
// google-ads.yaml
// ============================================================================

/// Google Ads API 자격 증명 (google-ads.yaml)
///
/// 공식 클라이언트 라이브러리와 같은 키 이름을 사용합니다.
/// 알 수 없는 키(`use_proto_plus` 등)는 무시합니다.
#[derive(Debug, Clone, Deserialize)]
pub struct AdsConfig {
    pub developer_token: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
    #[serde(default, deserialize_with = "deserialize_optional_id")]
    pub login_customer_id: Option<String>,
}

impl AdsConfig {
    /// YAML 파일에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RagError::Config(format!(
                "failed to read Google Ads config {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_yaml_str(&content)
    }

    /// YAML 문자열에서 파싱
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let mut config: AdsConfig = serde_yaml::from_str(content)?;
        config.login_customer_id = config
            .login_customer_id
            .map(|id| normalize_customer_id(&id))
            .transpose()?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("developer_token", &self.developer_token),
            ("client_id", &self.client_id),
            ("client_secret", &self.client_secret),
            ("refresh_token", &self.refresh_token),
        ] {
            if value.trim().is_empty() {
                return Err(RagError::Config(format!(
                    "google-ads.yaml: `{}` must not be empty",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// YAML에서 숫자 또는 문자열로 적힌 ID 허용
fn deserialize_optional_id<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawId {
        Number(u64),
        Text(String),
    }

    Ok(match Option::<RawId>::deserialize(deserializer)? {
        Some(RawId::Number(n)) => Some(n.to_string()),
        Some(RawId::Text(s)) if !s.trim().is_empty() => Some(s),
        _ => None,
    })
}

/// 고객 ID 정규화 ("123-456-7890" -> "1234567890")
pub fn normalize_customer_id(raw: &str) -> Result<String> {
    let id: String = raw.trim().chars().filter(|c| *c != '-').collect();
    if id.is_empty() || !id.chars().all(|c| c.is_ascii_digit()) {
        return Err(RagError::InvalidInput(format!(
            "customer id must contain only digits and dashes: {:?}",
            raw
        )));
    }
    Ok(id)
}

// ============================================================================
// Environment
// ============================================================================

/// 비어있지 않은 환경변수 값
pub fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// OpenAI API 키 로드
pub fn get_openai_api_key() -> Result<String> {
    env_var("OPENAI_API_KEY").ok_or_else(|| {
        RagError::Config("OPENAI_API_KEY environment variable is required".to_string())
    })
}

/// OpenAI API 키 존재 여부
pub fn has_openai_api_key() -> bool {
    env_var("OPENAI_API_KEY").is_some()
}

/// Google Ads 고객 ID 로드 (정규화됨)
pub fn get_customer_id() -> Result<String> {
    let raw = env_var("GOOGLE_ADS_CUSTOMER_ID").ok_or_else(|| {
        RagError::Config("GOOGLE_ADS_CUSTOMER_ID environment variable is required".to_string())
    })?;
    normalize_customer_id(&raw)
}

/// google-ads.yaml 경로
pub fn ads_config_path() -> PathBuf {
    PathBuf::from(
        env_var("GOOGLE_ADS_CONFIG_PATH").unwrap_or_else(|| DEFAULT_ADS_CONFIG_PATH.to_string()),
    )
}

/// OpenAI 호환 API 주소
pub fn openai_base_url() -> String {
    env_var("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string())
}

/// 생성 모델 이름
pub fn openai_model() -> String {
    env_var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string())
}

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EmbedderKind {
    #[default]
    OpenAi,
    Gemini,
}

impl EmbedderKind {
    pub fn parse(value: &str) -> Result<Self> {
        match value.trim().to_lowercase().as_str() {
            "openai" => Ok(EmbedderKind::OpenAi),
            "gemini" => Ok(EmbedderKind::Gemini),
            other => Err(RagError::Config(format!(
                "unknown embedder {:?} (expected `openai` or `gemini`)",
                other
            ))),
        }
    }

    /// `KEYWORD_RAG_EMBEDDER` 환경변수에서 결정 (기본값: openai)
    pub fn from_env() -> Result<Self> {
        match env_var("KEYWORD_RAG_EMBEDDER") {
            Some(value) => Self::parse(&value),
            None => Ok(EmbedderKind::default()),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_YAML: &str = r#"
developer_token: dev-token
client_id: client.apps.googleusercontent.com
client_secret: secret
refresh_token: 1//refresh
login_customer_id: 123-456-7890
use_proto_plus: true
"#;

    #[test]
    fn test_parse_ads_config() {
        let config = AdsConfig::from_yaml_str(SAMPLE_YAML).unwrap();
        assert_eq!(config.developer_token, "dev-token");
        assert_eq!(config.refresh_token, "1//refresh");
        assert_eq!(config.login_customer_id, Some("1234567890".to_string()));
    }

    #[test]
    fn test_parse_numeric_login_customer_id() {
        let yaml = "developer_token: a\nclient_id: b\nclient_secret: c\nrefresh_token: d\nlogin_customer_id: 9876543210\n";
        let config = AdsConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.login_customer_id, Some("9876543210".to_string()));
    }

    #[test]
    fn test_missing_login_customer_id() {
        let yaml = "developer_token: a\nclient_id: b\nclient_secret: c\nrefresh_token: d\n";
        let config = AdsConfig::from_yaml_str(yaml).unwrap();
        assert!(config.login_customer_id.is_none());
    }

    #[test]
    fn test_empty_credential_rejected() {
        let yaml = "developer_token: ''\nclient_id: b\nclient_secret: c\nrefresh_token: d\n";
        let err = AdsConfig::from_yaml_str(yaml).unwrap_err();
        assert!(err.to_string().contains("developer_token"));
    }

    #[test]
    fn test_load_missing_file() {
        let result = AdsConfig::load(Path::new("/nonexistent/google-ads.yaml"));
        assert!(matches!(result, Err(RagError::Config(_))));
    }

    #[test]
    fn test_normalize_customer_id() {
        assert_eq!(normalize_customer_id("123-456-7890").unwrap(), "1234567890");
        assert_eq!(normalize_customer_id(" 1234567890 ").unwrap(), "1234567890");
        assert!(normalize_customer_id("abc-123").is_err());
        assert!(normalize_customer_id("").is_err());
    }

    #[test]
    fn test_embedder_kind_parse() {
        assert_eq!(EmbedderKind::parse("OpenAI").unwrap(), EmbedderKind::OpenAi);
        assert_eq!(EmbedderKind::parse("gemini").unwrap(), EmbedderKind::Gemini);
        assert!(EmbedderKind::parse("faiss").is_err());
    }

    #[test]
    fn test_index_path() {
        let path = index_path(Path::new("/tmp/data"));
        assert_eq!(path, PathBuf::from("/tmp/data/keywords.db"));
    }
}
