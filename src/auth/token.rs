//! OAuth2 토큰 엔드포인트 호출
//!
//! 인증 코드 교환과 refresh token 갱신을 담당합니다.
//! ref: https://developers.google.com/identity/protocols/oauth2/native-app

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::Mutex;

use crate::config::AdsConfig;
use crate::error::{RagError, Result};

/// Google OAuth2 토큰 엔드포인트
pub const GOOGLE_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Google OAuth2 토큰 폐기 엔드포인트
pub const GOOGLE_REVOKE_URI: &str = "https://oauth2.googleapis.com/revoke";

/// 만료 판정 여유 시간 (초)
pub(crate) const EXPIRY_SKEW_SECS: i64 = 60;

/// 토큰 엔드포인트 응답
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub token_type: Option<String>,
}

impl TokenResponse {
    /// 만료 시각 계산
    pub fn expiry(&self) -> Option<DateTime<Utc>> {
        self.expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs))
    }
}

#[derive(Debug, Deserialize)]
struct TokenError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// HTTP 클라이언트 생성 (30초 타임아웃)
pub(crate) fn http_client() -> Result<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(Duration::from_secs(30))
        .build()?)
}

/// 토큰 엔드포인트에 form 요청
async fn post_token_request(
    client: &reqwest::Client,
    token_uri: &str,
    form: &[(&str, &str)],
) -> Result<TokenResponse> {
    let response = client.post(token_uri).form(form).send().await?;
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        let message = serde_json::from_str::<TokenError>(&body)
            .map(|e| match e.error_description {
                Some(desc) => format!("{}: {}", e.error, desc),
                None => e.error,
            })
            .unwrap_or(body);
        return Err(RagError::Auth(format!("token endpoint returned {}: {}", status, message)));
    }

    serde_json::from_str(&body)
        .map_err(|e| RagError::Auth(format!("failed to parse token response: {}", e)))
}

/// 인증 코드 -> 토큰 교환
pub async fn exchange_code(
    client: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    code: &str,
    code_verifier: &str,
    redirect_uri: &str,
) -> Result<TokenResponse> {
    if code.trim().is_empty() {
        return Err(RagError::InvalidInput("authorization code must not be empty".to_string()));
    }

    post_token_request(
        client,
        token_uri,
        &[
            ("grant_type", "authorization_code"),
            ("code", code.trim()),
            ("client_id", client_id),
            ("client_secret", client_secret),
            ("code_verifier", code_verifier),
            ("redirect_uri", redirect_uri),
        ],
    )
    .await
}

/// refresh token으로 access token 갱신
pub async fn refresh_access_token(
    client: &reqwest::Client,
    token_uri: &str,
    client_id: &str,
    client_secret: &str,
    refresh_token: &str,
) -> Result<TokenResponse> {
    post_token_request(
        client,
        token_uri,
        &[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ],
    )
    .await
}

/// 토큰 폐기 (refresh token을 넘기면 연결된 access token도 함께 폐기)
pub async fn revoke_token(client: &reqwest::Client, revoke_uri: &str, token: &str) -> Result<()> {
    let response = client
        .post(revoke_uri)
        .form(&[("token", token)])
        .send()
        .await?;
    let status = response.status();

    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::Auth(format!("token revocation returned {}: {}", status, body)));
    }
    Ok(())
}

// ============================================================================
// RefreshTokenSource
// ============================================================================

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expiry: Option<DateTime<Utc>>,
}

/// google-ads.yaml의 refresh token으로 access token을 발급/캐시
///
/// 만료 60초 전까지 같은 토큰을 재사용합니다.
#[derive(Debug)]
pub struct RefreshTokenSource {
    client: reqwest::Client,
    token_uri: String,
    client_id: String,
    client_secret: String,
    refresh_token: String,
    cached: Mutex<Option<CachedToken>>,
}

impl RefreshTokenSource {
    pub fn new(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        refresh_token: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            client: http_client()?,
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            refresh_token: refresh_token.into(),
            cached: Mutex::new(None),
        })
    }

    /// google-ads.yaml 자격 증명으로 생성
    pub fn from_ads_config(config: &AdsConfig) -> Result<Self> {
        Self::new(
            config.client_id.clone(),
            config.client_secret.clone(),
            config.refresh_token.clone(),
        )
    }

    pub fn with_token_uri(mut self, token_uri: impl Into<String>) -> Self {
        self.token_uri = token_uri.into();
        self
    }

    /// 유효한 access token 반환 (필요 시 갱신)
    pub async fn access_token(&self) -> Result<String> {
        let mut cached = self.cached.lock().await;

        if let Some(token) = cached.as_ref() {
            let fresh = token
                .expiry
                .map(|exp| exp - chrono::Duration::seconds(EXPIRY_SKEW_SECS) > Utc::now())
                .unwrap_or(true);
            if fresh {
                return Ok(token.access_token.clone());
            }
        }

        tracing::debug!("Refreshing Google Ads access token");
        let response = refresh_access_token(
            &self.client,
            &self.token_uri,
            &self.client_id,
            &self.client_secret,
            &self.refresh_token,
        )
        .await?;

        let token = CachedToken {
            access_token: response.access_token.clone(),
            expiry: response.expiry(),
        };
        *cached = Some(token);

        Ok(response.access_token)
    }
}

// ============================================================================
// Tests
// ============================================================================
