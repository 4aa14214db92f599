//! 에러 타입 - keyword-rag 공통 에러 분류
//!
//! 라이브러리 코드는 모두 [`RagError`]를 반환합니다.
//! CLI 레이어에서는 anyhow로 감싸 컨텍스트를 덧붙입니다.

use thiserror::Error;

/// 업스트림 API 에러 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiErrorKind {
    /// 인증 실패 (401, 403)
    Authentication,
    /// 쿼터 초과 (429)
    Quota,
    /// 잘못된 요청 (400)
    InvalidRequest,
    /// 기타
    Other,
}

impl ApiErrorKind {
    /// HTTP 상태 코드로 에러 종류 결정
    pub fn from_status(status: u16) -> Self {
        match status {
            401 | 403 => ApiErrorKind::Authentication,
            429 => ApiErrorKind::Quota,
            400 => ApiErrorKind::InvalidRequest,
            _ => ApiErrorKind::Other,
        }
    }
}

impl std::fmt::Display for ApiErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ApiErrorKind::Authentication => "authentication",
            ApiErrorKind::Quota => "quota exceeded",
            ApiErrorKind::InvalidRequest => "invalid request",
            ApiErrorKind::Other => "error",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{service} API {kind} ({status}): {message}")]
    Api {
        service: &'static str,
        kind: ApiErrorKind,
        status: u16,
        message: String,
    },

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OAuth2 authentication failed: {0}")]
    Auth(String),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("generation failed: {0}")]
    Generation(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("embedding dimension mismatch: index has {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

impl RagError {
    /// HTTP 상태 코드와 응답 본문으로 API 에러 생성
    pub fn api(service: &'static str, status: u16, message: impl Into<String>) -> Self {
        RagError::Api {
            service,
            kind: ApiErrorKind::from_status(status),
            status,
            message: message.into(),
        }
    }

    /// API 에러 종류 (API 에러가 아니면 None)
    pub fn api_kind(&self) -> Option<ApiErrorKind> {
        match self {
            RagError::Api { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, RagError>;
