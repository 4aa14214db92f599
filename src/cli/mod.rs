//! CLI 모듈
//!
//! keyword-rag CLI 명령어 정의 및 구현

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};

use crate::ads::GoogleAdsKeywordExtractor;
use crate::auth::{client_secrets_template, parse_authorization_response, GoogleAdsOAuth2};
use crate::config::{
    ads_config_path, get_customer_id, get_data_dir, has_openai_api_key, index_path, AdsConfig,
    EmbedderKind,
};
use crate::embedding::{create_embedder, has_api_key};
use crate::knowledge::{KeywordIndex, KeywordVectorStore, VectorStore};
use crate::llm::OpenAiChat;
use crate::rag::{format_thousands, GptKeywordRag, KeywordStats, RagConfig, DEFAULT_MAX_KEYWORDS};

/// 기본 client_secrets.json 경로
const DEFAULT_CLIENT_SECRETS: &str = "client_secrets.json";

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "keyword-rag")]
#[command(version, about = "Google Ads 키워드 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// 시드 키워드로 Google Ads 키워드 아이디어를 수집
    Ingest {
        /// 시드 키워드
        #[arg(required = true)]
        keywords: Vec<String>,

        /// 지역 타겟 ID (예: 2840 = 미국), 여러 번 지정 가능
        #[arg(short, long = "location")]
        locations: Vec<String>,

        /// 언어 ID (기본값: 1000 = English)
        #[arg(long)]
        language: Option<String>,
    },

    /// 키워드 데이터 기반 질의 응답
    Query {
        /// 질문
        query: String,

        /// 컨텍스트에 포함할 키워드 수
        #[arg(short, long, default_value_t = DEFAULT_MAX_KEYWORDS)]
        limit: usize,

        /// 전략 추천 생략
        #[arg(long)]
        no_recommendations: bool,
    },

    /// 유사 키워드 검색 (생성 없음)
    Search {
        /// 검색 쿼리
        query: String,

        /// 결과 개수 제한
        #[arg(short, long, default_value = "5")]
        limit: usize,
    },

    /// 저장된 키워드 통계
    Stats {
        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 인덱스 전체 삭제
    Clear {
        /// 확인 없이 삭제
        #[arg(short, long)]
        yes: bool,
    },

    /// 상태 확인
    Status,

    /// Google Ads OAuth2 인증
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// 동의 URL 출력 후 붙여넣은 코드를 토큰으로 교환
    Login {
        #[command(flatten)]
        files: AuthFiles,
    },

    /// 캐시된 토큰 갱신 및 refresh token 출력
    Refresh {
        #[command(flatten)]
        files: AuthFiles,

        /// refresh token을 저장할 파일
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 토큰 정보 출력
    Info {
        #[command(flatten)]
        files: AuthFiles,
    },

    /// 자격 증명 폐기 및 토큰 캐시 삭제
    Revoke {
        #[command(flatten)]
        files: AuthFiles,
    },

    /// client_secrets.json 템플릿 출력
    Template,
}

#[derive(clap::Args)]
pub struct AuthFiles {
    /// OAuth2 클라이언트 파일
    #[arg(long, default_value = DEFAULT_CLIENT_SECRETS)]
    client_secrets: PathBuf,

    /// 토큰 캐시 파일 (기본값: 데이터 디렉토리/token.json)
    #[arg(long)]
    token_file: Option<PathBuf>,
}

impl AuthFiles {
    fn token_file(&self) -> PathBuf {
        self.token_file
            .clone()
            .unwrap_or_else(|| get_data_dir().join(crate::auth::DEFAULT_TOKEN_FILE))
    }

    fn oauth(&self) -> Result<GoogleAdsOAuth2> {
        GoogleAdsOAuth2::new(&self.client_secrets, &self.token_file())
            .context("OAuth2 클라이언트 초기화 실패")
    }
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Ingest {
            keywords,
            locations,
            language,
        } => cmd_ingest(&keywords, &locations, language).await,
        Commands::Query {
            query,
            limit,
            no_recommendations,
        } => cmd_query(&query, limit, !no_recommendations).await,
        Commands::Search { query, limit } => cmd_search(&query, limit).await,
        Commands::Stats { json } => cmd_stats(json).await,
        Commands::Clear { yes } => cmd_clear(yes).await,
        Commands::Status => cmd_status().await,
        Commands::Auth { command } => match command {
            AuthCommands::Login { files } => cmd_auth_login(&files).await,
            AuthCommands::Refresh { files, output } => {
                cmd_auth_refresh(&files, output.as_deref()).await
            }
            AuthCommands::Info { files } => cmd_auth_info(&files).await,
            AuthCommands::Revoke { files } => cmd_auth_revoke(&files).await,
            AuthCommands::Template => {
                println!("{}", client_secrets_template());
                Ok(())
            }
        },
    }
}

// ============================================================================
// Setup
// ============================================================================

fn ensure_openai_key() -> Result<()> {
    if !has_openai_api_key() {
        bail!(
            "OpenAI API 키가 설정되지 않았습니다.\n\n\
             설정 방법:\n  \
             export OPENAI_API_KEY=your-api-key\n\n\
             API 키 발급: https://platform.openai.com/api-keys"
        );
    }
    Ok(())
}

/// 저장소 열기 (임베딩 프로바이더 포함)
fn open_store() -> Result<KeywordVectorStore> {
    let kind = EmbedderKind::from_env()?;
    if kind == EmbedderKind::OpenAi {
        ensure_openai_key()?;
    }

    let embedder = create_embedder(kind).context("임베딩 프로바이더 생성 실패")?;
    let path = index_path(&get_data_dir());
    KeywordVectorStore::open(&path, embedder).context("키워드 인덱스 열기 실패")
}

/// 질의 전용 RAG (Google Ads 자격 증명 불필요)
fn build_query_rag() -> Result<GptKeywordRag> {
    ensure_openai_key()?;
    let store = open_store()?;
    let llm = OpenAiChat::from_env().context("OpenAI 클라이언트 생성 실패")?;
    Ok(GptKeywordRag::new(store, Box::new(llm)).with_config(RagConfig::from_env()))
}

/// 인덱스만 열기 (API 키 불필요)
fn open_index() -> Result<KeywordIndex> {
    let path = index_path(&get_data_dir());
    KeywordIndex::open(&path).context("키워드 인덱스 열기 실패")
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 수집 명령어 (ingest)
///
/// Google Ads에서 키워드 아이디어를 가져와 인덱스에 추가합니다.
async fn cmd_ingest(keywords: &[String], locations: &[String], language: Option<String>) -> Result<()> {
    let config_path = ads_config_path();
    let ads_config = AdsConfig::load(&config_path).with_context(|| {
        format!(
            "google-ads.yaml 로드 실패: {}\n\
             GOOGLE_ADS_CONFIG_PATH로 경로를 지정할 수 있습니다.",
            config_path.display()
        )
    })?;
    let customer_id = get_customer_id()?;

    let extractor = GoogleAdsKeywordExtractor::new(&ads_config, &customer_id)
        .context("Google Ads 클라이언트 생성 실패")?;

    let store = open_store()?;
    let config = RagConfig {
        language_id: language,
        ..RagConfig::from_env()
    };
    let rag = GptKeywordRag::ingest_only(store)
        .with_source(Box::new(extractor))
        .with_config(config);

    println!("[*] 키워드 아이디어 수집 중: {}", keywords.join(", "));
    if !locations.is_empty() {
        println!("    지역: {}", locations.join(", "));
    }

    let added = rag
        .update_keyword_data(keywords, locations)
        .await
        .context("키워드 수집 실패")?;

    let total = rag.store().count().await?;
    println!("[OK] {} 개 키워드 저장 (전체: {} 개)", added, total);

    Ok(())
}

/// 질의 명령어 (query)
async fn cmd_query(query: &str, limit: usize, include_recommendations: bool) -> Result<()> {
    let rag = build_query_rag()?;

    if rag.store().count().await? == 0 {
        println!("[!] 저장된 키워드가 없습니다. 먼저 `keyword-rag ingest`를 실행하세요.");
    }

    println!("[*] 답변 생성 중: \"{}\"", query);

    let answer = rag
        .query(query, limit, include_recommendations)
        .await
        .context("답변 생성 실패")?;

    println!();
    println!("{}", answer);

    Ok(())
}

/// 검색 명령어 (search)
async fn cmd_search(query: &str, limit: usize) -> Result<()> {
    let store = open_store()?;

    println!("[*] 검색 중: \"{}\"", query);

    let results = store.search(query, limit).await.context("검색 실패")?;

    if results.is_empty() {
        println!("\n[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("\n[OK] 검색 결과 ({} 건):\n", results.len());

    for (i, result) in results.iter().enumerate() {
        let kd = &result.keyword;
        println!(
            "{}. [점수: {:.4}] {}",
            i + 1,
            result.similarity,
            truncate_text(&kd.keyword, 60)
        );
        println!(
            "   검색량: {}/월 | 경쟁: {} | CPC: ${:.2} - ${:.2}",
            format_thousands(kd.search_volume),
            kd.competition,
            kd.cpc_low,
            kd.cpc_high
        );
        println!();
    }

    Ok(())
}

/// 통계 명령어 (stats)
async fn cmd_stats(json: bool) -> Result<()> {
    let index = open_index()?;
    let keywords = index.keywords().await.context("키워드 조회 실패")?;
    let stats = KeywordStats::from_keywords(&keywords);

    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    if stats.total_keywords == 0 {
        println!("[!] 저장된 키워드가 없습니다.");
        return Ok(());
    }

    println!("[OK] 키워드 통계\n");
    println!("  전체 키워드:      {}", format_thousands(stats.total_keywords as u64));
    println!("  평균 검색량:      {:.1}", stats.avg_search_volume);
    println!("  검색량 중앙값:    {:.1}", stats.median_search_volume);
    println!("  평균 CPC (상한):  ${:.2}", stats.avg_cpc);
    println!("  고검색량 키워드:  {}", stats.high_volume_keywords);
    println!("  저경쟁 키워드:    {}", stats.low_competition_keywords);
    println!();
    println!("  경쟁 분포:");
    for (level, count) in &stats.competition_distribution {
        println!("    {:<12} {}", level, count);
    }

    Ok(())
}

/// 삭제 명령어 (clear)
async fn cmd_clear(yes: bool) -> Result<()> {
    let index = open_index()?;
    let count = index.count().await?;

    if count == 0 {
        println!("[!] 삭제할 키워드가 없습니다.");
        return Ok(());
    }

    if !yes && !confirm(&format!("{} 개 키워드를 모두 삭제할까요?", count))? {
        println!("[!] 취소되었습니다.");
        return Ok(());
    }

    let deleted = index.clear().await.context("인덱스 삭제 실패")?;
    println!("[OK] {} 개 키워드 삭제됨", deleted);

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status() -> Result<()> {
    println!("keyword-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();

    let data_dir = get_data_dir();
    println!("[*] 데이터 디렉토리: {}", data_dir.display());

    if has_openai_api_key() {
        println!("[OK] OpenAI API 키: 설정됨");
    } else {
        println!("[!] OpenAI API 키: 미설정");
        println!("    설정: export OPENAI_API_KEY=your-key");
    }

    match EmbedderKind::from_env() {
        Ok(EmbedderKind::Gemini) => {
            let state = if has_api_key() { "설정됨" } else { "API 키 미설정" };
            println!("[*] 임베딩: Gemini ({})", state);
        }
        Ok(EmbedderKind::OpenAi) => println!("[*] 임베딩: OpenAI"),
        Err(e) => println!("[!] 임베딩 설정 오류: {}", e),
    }

    let config_path = ads_config_path();
    match AdsConfig::load(&config_path) {
        Ok(config) => {
            println!("[OK] google-ads.yaml: {}", config_path.display());
            if let Some(login) = config.login_customer_id {
                println!("     login-customer-id: {}", login);
            }
        }
        Err(e) => println!("[!] google-ads.yaml: {}", e),
    }

    match get_customer_id() {
        Ok(id) => println!("[OK] 고객 ID: {}", id),
        Err(_) => println!("[!] 고객 ID: 미설정 (GOOGLE_ADS_CUSTOMER_ID)"),
    }

    match open_index() {
        Ok(index) => match index.info().await {
            Ok(info) => {
                println!("[OK] 저장된 키워드: {} 개", format_thousands(info.count as u64));
                if let (Some(dimension), Some(model)) = (info.dimension, info.model) {
                    println!("     임베딩: {} ({} 차원)", model, dimension);
                }
            }
            Err(e) => println!("[!] 인덱스 조회 실패: {}", e),
        },
        Err(e) => println!("[!] {:#}", e),
    }

    Ok(())
}

// ============================================================================
// Auth Commands
// ============================================================================

/// 동의 URL 출력 → 코드 입력 → 토큰 교환
async fn cmd_auth_login(files: &AuthFiles) -> Result<()> {
    let mut oauth = files.oauth()?;
    let request = oauth.authorization_request()?;

    println!("[*] 아래 URL을 브라우저에서 열고 권한을 승인하세요:\n");
    println!("{}\n", request.url);
    println!(
        "승인 후 이동한 주소({}...) 전체 또는 code 값을 붙여넣으세요.",
        request.redirect_uri
    );

    let input = prompt_line("> ")?;
    let code = parse_authorization_response(&input, &request.state)?;

    let credentials = oauth
        .exchange_code(&code, &request)
        .await
        .context("인증 코드 교환 실패")?;

    println!("\n[OK] 인증 완료 (토큰 캐시: {})", files.token_file().display());
    match &credentials.refresh_token {
        Some(token) => {
            println!("     refresh_token: {}", token);
            println!("     google-ads.yaml의 refresh_token에 위 값을 넣으세요.");
        }
        None => println!("[!] refresh token이 발급되지 않았습니다. 앱 접근 권한을 해제한 뒤 다시 시도하세요."),
    }

    Ok(())
}

async fn cmd_auth_refresh(files: &AuthFiles, output: Option<&Path>) -> Result<()> {
    let mut oauth = files.oauth()?;

    match output {
        Some(path) => {
            oauth
                .save_refresh_token(path)
                .await
                .context("refresh token 저장 실패")?;
            println!("[OK] refresh token 저장: {}", path.display());
        }
        None => match oauth.get_refresh_token().await.context("인증 실패")? {
            Some(token) => println!("{}", token),
            None => bail!("캐시된 refresh token이 없습니다. `keyword-rag auth login`을 먼저 실행하세요."),
        },
    }

    Ok(())
}

async fn cmd_auth_info(files: &AuthFiles) -> Result<()> {
    let mut oauth = files.oauth()?;
    let info = oauth.get_token_info().await.context("인증 실패")?;

    println!("[OK] 토큰 정보\n");
    println!("  access_token:  {}", truncate_text(&info.access_token, 24));
    println!(
        "  refresh_token: {}",
        info.refresh_token
            .as_deref()
            .map(|t| truncate_text(t, 24))
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  token_uri:     {}", info.token_uri);
    println!("  client_id:     {}", info.client_id);
    println!("  expiry:        {}", info.expiry.as_deref().unwrap_or("-"));
    println!("  expired:       {}", info.expired);
    println!("  scopes:");
    for scope in &info.scopes {
        println!("    {}", scope);
    }

    Ok(())
}

async fn cmd_auth_revoke(files: &AuthFiles) -> Result<()> {
    let mut oauth = files.oauth()?;

    if oauth.revoke_credentials().await? {
        println!("[OK] 토큰 캐시 삭제: {}", oauth.token_file().display());
    } else {
        println!("[!] 토큰 캐시가 없습니다: {}", oauth.token_file().display());
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

fn prompt_line(prompt: &str) -> Result<String> {
    print!("{}", prompt);
    std::io::stdout().flush()?;
    let mut line = String::new();
    std::io::stdin()
        .read_line(&mut line)
        .context("입력 읽기 실패")?;
    Ok(line.trim().to_string())
}

fn confirm(question: &str) -> Result<bool> {
    let answer = prompt_line(&format!("{} [y/N] ", question))?;
    Ok(is_yes(&answer))
}

fn is_yes(answer: &str) -> bool {
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
