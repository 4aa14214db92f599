//! OAuth2 모듈 - Google Ads API refresh token 발급
//!
//! Installed-app 플로우로 refresh token을 얻어 google-ads.yaml에 쓸 수 있게 합니다.
//! 브라우저를 여는 부분은 다루지 않습니다: 동의 URL을 출력하고,
//! 사용자가 리다이렉트 주소의 `code` 값을 붙여넣으면 토큰으로 교환합니다.
//!
//! ref: https://developers.google.com/google-ads/api/docs/oauth/cloud-project

mod token;

use std::path::{Path, PathBuf};

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use url::Url;

use crate::error::{RagError, Result};

pub use token::{
    exchange_code, refresh_access_token, revoke_token, RefreshTokenSource, TokenResponse,
    GOOGLE_REVOKE_URI, GOOGLE_TOKEN_URI,
};

/// Google Ads API OAuth2 scopes
pub const SCOPES: [&str; 3] = [
    "https://www.googleapis.com/auth/adwords",
    "https://www.googleapis.com/auth/userinfo.email",
    "https://www.googleapis.com/auth/userinfo.profile",
];

/// Google 동의 화면 주소
pub const GOOGLE_AUTH_URI: &str = "https://accounts.google.com/o/oauth2/auth";

/// 기본 리다이렉트 (loopback, 코드는 주소창에서 복사)
pub const DEFAULT_REDIRECT_URI: &str = "http://localhost";

/// 기본 토큰 캐시 파일
pub const DEFAULT_TOKEN_FILE: &str = "token.json";

// ============================================================================
// Client Secrets
// ============================================================================

/// client_secrets.json 내용
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URI.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URI.to_string()
}

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

impl ClientSecrets {
    /// Google Cloud Console에서 받은 JSON 파일 로드
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(RagError::Config(format!(
                "client secrets file not found: {}\n\
                 Download OAuth2 client credentials (Desktop application) from \
                 https://console.cloud.google.com/apis/credentials",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    pub fn from_json_str(content: &str) -> Result<Self> {
        let file: ClientSecretsFile = serde_json::from_str(content)?;
        file.installed.or(file.web).ok_or_else(|| {
            RagError::Config("client secrets must contain an `installed` or `web` section".to_string())
        })
    }

    /// 리다이렉트 주소 (파일에 있으면 첫 번째, 없으면 http://localhost)
    pub fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_REDIRECT_URI)
    }
}

/// client_secrets.json 템플릿
pub fn client_secrets_template() -> String {
    let template = serde_json::json!({
        "installed": {
            "client_id": "your-client-id.apps.googleusercontent.com",
            "project_id": "your-project-id",
            "auth_uri": GOOGLE_AUTH_URI,
            "token_uri": GOOGLE_TOKEN_URI,
            "auth_provider_x509_cert_url": "https://www.googleapis.com/oauth2/v1/certs",
            "client_secret": "your-client-secret",
            "redirect_uris": [DEFAULT_REDIRECT_URI]
        }
    });
    serde_json::to_string_pretty(&template).unwrap_or_default()
}

// ============================================================================
// Credentials (token cache)
// ============================================================================

/// 캐시되는 OAuth2 자격 증명
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    pub scopes: Vec<String>,
    pub expiry: Option<DateTime<Utc>>,
}

impl Credentials {
    /// 만료 여부 (60초 여유)
    pub fn is_expired(&self) -> bool {
        self.expiry
            .map(|exp| exp - chrono::Duration::seconds(token::EXPIRY_SKEW_SECS) <= Utc::now())
            .unwrap_or(false)
    }

    /// 토큰 응답을 반영 (refresh token이 없으면 기존 값 유지)
    fn apply(&mut self, response: TokenResponse) {
        self.expiry = response.expiry();
        self.access_token = response.access_token;
        if let Some(refresh) = response.refresh_token {
            self.refresh_token = Some(refresh);
        }
        if let Some(scope) = response.scope {
            self.scopes = scope.split_whitespace().map(str::to_string).collect();
        }
    }

    /// 토큰 캐시 파일 로드 (없으면 None)
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    /// 토큰 캐시 저장 (임시 파일에 쓴 뒤 rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())
    }
}

/// 토큰 정보 요약
#[derive(Debug, Clone, Serialize)]
pub struct TokenInfo {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_uri: String,
    pub client_id: String,
    pub scopes: Vec<String>,
    pub expiry: Option<String>,
    pub expired: bool,
}

// ============================================================================
// Authorization Request (PKCE)
// ============================================================================

/// 동의 URL과 교환에 필요한 PKCE verifier/state
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// PKCE code verifier (64자 hex)
fn generate_code_verifier() -> String {
    format!(
        "{}{}",
        uuid::Uuid::new_v4().simple(),
        uuid::Uuid::new_v4().simple()
    )
}

/// PKCE S256 code challenge
pub fn code_challenge(verifier: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()))
}

/// 사용자가 붙여넣은 값에서 인증 코드 추출
///
/// 코드만 붙여넣거나, 리다이렉트된 주소 전체(`http://localhost/?state=..&code=..`)를
/// 붙여넣을 수 있습니다. 주소에 state가 있으면 요청의 state와 일치해야 합니다.
pub fn parse_authorization_response(input: &str, expected_state: &str) -> Result<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(RagError::InvalidInput("authorization code must not be empty".to_string()));
    }

    let Ok(url) = Url::parse(input) else {
        return Ok(input.to_string());
    };

    let mut code = None;
    let mut state = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => {
                return Err(RagError::Auth(format!("authorization denied: {}", value)));
            }
            _ => {}
        }
    }

    if let Some(state) = state {
        if state != expected_state {
            return Err(RagError::Auth("state mismatch in authorization response".to_string()));
        }
    }

    code.ok_or_else(|| {
        RagError::InvalidInput("redirect URL does not contain a `code` parameter".to_string())
    })
}

// ============================================================================
// GoogleAdsOAuth2
// ============================================================================

/// Google Ads API OAuth2 핸들러
pub struct GoogleAdsOAuth2 {
    secrets: ClientSecrets,
    token_file: PathBuf,
    revoke_uri: String,
    client: reqwest::Client,
    credentials: Option<Credentials>,
}

impl GoogleAdsOAuth2 {
    /// client_secrets.json과 토큰 캐시 경로로 생성
    pub fn new(client_secrets_file: &Path, token_file: &Path) -> Result<Self> {
        let secrets = ClientSecrets::load(client_secrets_file)?;
        Self::with_secrets(secrets, token_file)
    }

    pub fn with_secrets(secrets: ClientSecrets, token_file: &Path) -> Result<Self> {
        Ok(Self {
            secrets,
            token_file: token_file.to_path_buf(),
            revoke_uri: GOOGLE_REVOKE_URI.to_string(),
            client: token::http_client()?,
            credentials: None,
        })
    }

    pub fn with_revoke_uri(mut self, revoke_uri: impl Into<String>) -> Self {
        self.revoke_uri = revoke_uri.into();
        self
    }

    pub fn token_file(&self) -> &Path {
        &self.token_file
    }

    /// 동의 화면 URL 생성
    ///
    /// `access_type=offline` + `prompt=consent`로 refresh token을 항상 받습니다.
    pub fn authorization_request(&self) -> Result<AuthorizationRequest> {
        let code_verifier = generate_code_verifier();
        let state = uuid::Uuid::new_v4().to_string();
        let redirect_uri = self.secrets.redirect_uri().to_string();

        let mut url = Url::parse(&self.secrets.auth_uri)
            .map_err(|e| RagError::Config(format!("invalid auth_uri: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("client_id", &self.secrets.client_id)
            .append_pair("redirect_uri", &redirect_uri)
            .append_pair("response_type", "code")
            .append_pair("scope", &SCOPES.join(" "))
            .append_pair("access_type", "offline")
            .append_pair("prompt", "consent")
            .append_pair("state", &state)
            .append_pair("code_challenge", &code_challenge(&code_verifier))
            .append_pair("code_challenge_method", "S256");

        Ok(AuthorizationRequest {
            url: url.to_string(),
            state,
            code_verifier,
            redirect_uri,
        })
    }

    /// 인증 코드를 토큰으로 교환하고 캐시에 저장
    pub async fn exchange_code(
        &mut self,
        code: &str,
        request: &AuthorizationRequest,
    ) -> Result<&Credentials> {
        let response = exchange_code(
            &self.client,
            &self.secrets.token_uri,
            &self.secrets.client_id,
            &self.secrets.client_secret,
            code,
            &request.code_verifier,
            &request.redirect_uri,
        )
        .await?;

        let mut credentials = Credentials {
            access_token: String::new(),
            refresh_token: None,
            token_uri: self.secrets.token_uri.clone(),
            client_id: self.secrets.client_id.clone(),
            client_secret: self.secrets.client_secret.clone(),
            scopes: SCOPES.iter().map(|s| s.to_string()).collect(),
            expiry: None,
        };
        credentials.apply(response);

        if credentials.refresh_token.is_none() {
            tracing::warn!("Token response did not include a refresh token");
        }

        credentials.save(&self.token_file)?;
        tracing::info!("Saved OAuth2 credentials to {:?}", self.token_file);
        Ok(&*self.credentials.insert(credentials))
    }

    /// 캐시된 자격 증명으로 인증 (만료 시 갱신)
    ///
    /// 캐시가 없으면 `auth login`으로 먼저 발급해야 합니다.
    pub async fn authenticate(&mut self) -> Result<&Credentials> {
        let mut credentials = match self.credentials.take() {
            Some(c) => c,
            None => Credentials::load(&self.token_file)?.ok_or_else(|| {
                RagError::Auth(format!(
                    "no cached credentials at {}; run the authorization flow first",
                    self.token_file.display()
                ))
            })?,
        };

        if credentials.is_expired() {
            let refresh_token = credentials.refresh_token.clone().ok_or_else(|| {
                RagError::Auth("access token expired and no refresh token is available".to_string())
            })?;

            tracing::info!("Access token expired, refreshing");
            let response = refresh_access_token(
                &self.client,
                &credentials.token_uri,
                &credentials.client_id,
                &credentials.client_secret,
                &refresh_token,
            )
            .await?;
            credentials.apply(response);
            credentials.save(&self.token_file)?;
        }

        Ok(&*self.credentials.insert(credentials))
    }

    /// refresh token 반환
    pub async fn get_refresh_token(&mut self) -> Result<Option<String>> {
        Ok(self.authenticate().await?.refresh_token.clone())
    }

    /// 토큰 정보 요약
    pub async fn get_token_info(&mut self) -> Result<TokenInfo> {
        let credentials = self.authenticate().await?;
        Ok(TokenInfo {
            access_token: credentials.access_token.clone(),
            refresh_token: credentials.refresh_token.clone(),
            token_uri: credentials.token_uri.clone(),
            client_id: credentials.client_id.clone(),
            scopes: credentials.scopes.clone(),
            expiry: credentials.expiry.map(|e| e.to_rfc3339()),
            expired: credentials.is_expired(),
        })
    }

    /// 현재 refresh token을 평문 파일로 저장
    pub async fn save_refresh_token(&mut self, path: &Path) -> Result<String> {
        let refresh_token = self
            .get_refresh_token()
            .await?
            .ok_or_else(|| RagError::Auth("no refresh token available".to_string()))?;
        write_atomic(path, refresh_token.as_bytes())?;
        tracing::info!("Refresh token saved to {:?}", path);
        Ok(refresh_token)
    }

    /// 자격 증명 폐기 후 토큰 캐시 삭제
    ///
    /// 폐기 요청이 실패해도 캐시 파일은 삭제합니다.
    ///
    /// # Returns
    /// 캐시 파일이 있었는지 여부
    pub async fn revoke_credentials(&mut self) -> Result<bool> {
        let credentials = match self.credentials.take() {
            Some(c) => Some(c),
            None => Credentials::load(&self.token_file).unwrap_or_else(|e| {
                tracing::warn!("Unreadable token cache, skipping revocation: {}", e);
                None
            }),
        };

        if let Some(credentials) = credentials {
            let token = credentials
                .refresh_token
                .as_deref()
                .unwrap_or(&credentials.access_token);
            match revoke_token(&self.client, &self.revoke_uri, token).await {
                Ok(()) => tracing::info!("Credentials revoked"),
                Err(e) => tracing::warn!("Failed to revoke credentials: {}", e),
            }
        }

        if self.token_file.exists() {
            std::fs::remove_file(&self.token_file)?;
            tracing::info!("Removed token cache {:?}", self.token_file);
            return Ok(true);
        }
        Ok(false)
    }
}

/// 임시 파일에 쓴 뒤 rename (중간에 중단돼도 기존 파일 보존)
fn write_atomic(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    std::fs::write(&tmp_path, contents)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};
    use tempfile::TempDir;

    fn secrets(token_uri: &str) -> ClientSecrets {
        ClientSecrets {
            client_id: "cid.apps.googleusercontent.com".to_string(),
            client_secret: "secret".to_string(),
            auth_uri: GOOGLE_AUTH_URI.to_string(),
            token_uri: token_uri.to_string(),
            redirect_uris: vec![],
        }
    }

    #[test]
    fn test_parse_installed_client_secrets() {
        let parsed = ClientSecrets::from_json_str(&client_secrets_template()).unwrap();
        assert_eq!(parsed.client_id, "your-client-id.apps.googleusercontent.com");
        assert_eq!(parsed.token_uri, GOOGLE_TOKEN_URI);
        assert_eq!(parsed.redirect_uri(), DEFAULT_REDIRECT_URI);
    }

    #[test]
    fn test_client_secrets_requires_section() {
        let err = ClientSecrets::from_json_str(r#"{"other":{}}"#).unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[test]
    fn test_missing_client_secrets_file() {
        let err = ClientSecrets::load(Path::new("/nonexistent/client_secrets.json")).unwrap_err();
        assert!(err.to_string().contains("client secrets file not found"));
    }

    #[test]
    fn test_code_challenge_rfc7636_vector() {
        // RFC 7636 Appendix B
        assert_eq!(
            code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn test_parse_authorization_response() {
        assert_eq!(parse_authorization_response(" 4/abc ", "s1").unwrap(), "4/abc");
        assert_eq!(
            parse_authorization_response("http://localhost/?state=s1&code=4%2Fabc&scope=x", "s1")
                .unwrap(),
            "4/abc"
        );
        assert!(matches!(
            parse_authorization_response("http://localhost/?state=other&code=4/abc", "s1"),
            Err(RagError::Auth(_))
        ));
        assert!(matches!(
            parse_authorization_response("http://localhost/?error=access_denied", "s1"),
            Err(RagError::Auth(_))
        ));
        assert!(matches!(
            parse_authorization_response("http://localhost/?state=s1", "s1"),
            Err(RagError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_authorization_url() {
        let dir = TempDir::new().unwrap();
        let oauth =
            GoogleAdsOAuth2::with_secrets(secrets(GOOGLE_TOKEN_URI), &dir.path().join("t.json"))
                .unwrap();

        let request = oauth.authorization_request().unwrap();
        let url = Url::parse(&request.url).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "cid.apps.googleusercontent.com");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["code_challenge"], code_challenge(&request.code_verifier));
        assert_eq!(pairs["state"], request.state);
        assert!(pairs["scope"].contains("https://www.googleapis.com/auth/adwords"));
        assert_eq!(request.code_verifier.len(), 64);
    }

    #[tokio::test]
    async fn test_exchange_code_saves_cache() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::AllOf(vec![
                Matcher::UrlEncoded("grant_type".into(), "authorization_code".into()),
                Matcher::UrlEncoded("code".into(), "4/abc".into()),
            ]))
            .with_status(200)
            .with_body(
                r#"{"access_token":"ya29.a","expires_in":3599,"refresh_token":"1//r","token_type":"Bearer"}"#,
            )
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token.json");
        let mut oauth = GoogleAdsOAuth2::with_secrets(
            secrets(&format!("{}/token", server.url())),
            &token_file,
        )
        .unwrap();

        let request = oauth.authorization_request().unwrap();
        let credentials = oauth.exchange_code("4/abc", &request).await.unwrap();
        assert_eq!(credentials.refresh_token.as_deref(), Some("1//r"));

        let cached = Credentials::load(&token_file).unwrap().unwrap();
        assert_eq!(cached.access_token, "ya29.a");
        assert!(!cached.is_expired());
    }

    #[tokio::test]
    async fn test_authenticate_refreshes_expired_and_keeps_refresh_token() {
        let mut server = Server::new_async().await;
        let _mock = server
            .mock("POST", "/token")
            .match_body(Matcher::UrlEncoded("grant_type".into(), "refresh_token".into()))
            .with_status(200)
            .with_body(r#"{"access_token":"ya29.new","expires_in":3599}"#)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token.json");
        let token_uri = format!("{}/token", server.url());

        Credentials {
            access_token: "ya29.old".to_string(),
            refresh_token: Some("1//keep".to_string()),
            token_uri: token_uri.clone(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            expiry: Some(Utc::now() - chrono::Duration::hours(1)),
        }
        .save(&token_file)
        .unwrap();

        let mut oauth = GoogleAdsOAuth2::with_secrets(secrets(&token_uri), &token_file).unwrap();
        let info = oauth.get_token_info().await.unwrap();

        assert_eq!(info.access_token, "ya29.new");
        assert_eq!(info.refresh_token.as_deref(), Some("1//keep"));
        assert!(!info.expired);

        let refresh_file = dir.path().join("refresh_token.txt");
        let saved = oauth.save_refresh_token(&refresh_file).await.unwrap();
        assert_eq!(saved, "1//keep");
        assert_eq!(std::fs::read_to_string(&refresh_file).unwrap(), "1//keep");
    }

    #[tokio::test]
    async fn test_revoke_removes_cache_even_on_failure() {
        let mut server = Server::new_async().await;
        let revoke = server
            .mock("POST", "/revoke")
            .match_body(Matcher::UrlEncoded("token".into(), "1//r".into()))
            .with_status(400)
            .with_body(r#"{"error":"invalid_token"}"#)
            .expect(1)
            .create_async()
            .await;

        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token.json");
        Credentials {
            access_token: "ya29.a".to_string(),
            refresh_token: Some("1//r".to_string()),
            token_uri: GOOGLE_TOKEN_URI.to_string(),
            client_id: "cid".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![],
            expiry: None,
        }
        .save(&token_file)
        .unwrap();

        let mut oauth = GoogleAdsOAuth2::with_secrets(secrets(GOOGLE_TOKEN_URI), &token_file)
            .unwrap()
            .with_revoke_uri(format!("{}/revoke", server.url()));

        assert!(oauth.revoke_credentials().await.unwrap());
        assert!(!token_file.exists());
        revoke.assert_async().await;

        assert!(!oauth.revoke_credentials().await.unwrap());
    }

    #[tokio::test]
    async fn test_revoke_removes_corrupt_cache() {
        let dir = TempDir::new().unwrap();
        let token_file = dir.path().join("token.json");
        std::fs::write(&token_file, "{not json").unwrap();

        let mut oauth = GoogleAdsOAuth2::with_secrets(secrets(GOOGLE_TOKEN_URI), &token_file)
            .unwrap()
            .with_revoke_uri("http://127.0.0.1:1/revoke");

        assert!(oauth.revoke_credentials().await.unwrap());
        assert!(!token_file.exists());
    }

    #[tokio::test]
    async fn test_authenticate_without_cache() {
        let dir = TempDir::new().unwrap();
        let mut oauth = GoogleAdsOAuth2::with_secrets(
            secrets(GOOGLE_TOKEN_URI),
            &dir.path().join("missing.json"),
        )
        .unwrap();

        let err = oauth.authenticate().await.unwrap_err();
        assert!(matches!(err, RagError::Auth(_)));
    }
}
