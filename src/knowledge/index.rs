//! Keyword Index - rusqlite 기반 단일 파일 벡터 인덱스
//!
//! 임베딩 벡터와 키워드 메타데이터를 한 SQLite 파일에 함께 저장합니다.
//! 배치 추가는 하나의 트랜잭션이므로 인덱스와 메타데이터가 어긋나지 않습니다.
//!
//! 검색은 정규화된 벡터의 내적(= 코사인 유사도)으로 전체를 스캔하는
//! exact (flat) 검색입니다.
//!
//! 저장 위치: ~/.keyword-rag/keywords.db

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OpenFlags, OptionalExtension, Row};

use super::keyword::{Competition, KeywordData};
use super::vector::{dot, l2_normalize, IndexInfo, SearchResult, VectorEntry, VectorStore};
use crate::error::{RagError, Result};

const META_DIMENSION: &str = "dimension";
const META_MODEL: &str = "model";

const SELECT_COLUMNS: &str = "keyword, search_volume, competition, competition_index, cpc_low, \
     cpc_high, currency_code, location_ids, language_id, fetched_at, embedding";

// ============================================================================
// KeywordIndex
// ============================================================================

/// SQLite 벡터 인덱스
pub struct KeywordIndex {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl KeywordIndex {
    /// 인덱스 열기 (없으면 빈 인덱스 생성)
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let index = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        index.initialize()?;
        Ok(index)
    }

    /// DB 경로 반환
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| {
            RagError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                format!("index lock poisoned: {}", e),
            ))
        })
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS keywords (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                dedup_key TEXT NOT NULL UNIQUE,
                keyword TEXT NOT NULL,
                search_volume INTEGER NOT NULL,
                competition TEXT NOT NULL,
                competition_index INTEGER,
                cpc_low REAL NOT NULL,
                cpc_high REAL NOT NULL,
                currency_code TEXT NOT NULL,
                location_ids TEXT NOT NULL,
                language_id TEXT,
                fetched_at TEXT NOT NULL,
                embedding BLOB NOT NULL
            );

            CREATE TABLE IF NOT EXISTS index_meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            "#,
        )?;

        tracing::debug!("Keyword index initialized at {:?}", self.db_path);
        Ok(())
    }

    fn upsert_batch_sync(&self, entries: &[VectorEntry], model: &str) -> Result<usize> {
        let Some(first) = entries.first() else {
            return Ok(0);
        };

        let dimension = first.embedding.len();
        if dimension == 0 {
            return Err(RagError::InvalidInput("embedding must not be empty".to_string()));
        }

        for entry in entries {
            entry.keyword.validate()?;
            if entry.embedding.len() != dimension {
                return Err(RagError::DimensionMismatch {
                    expected: dimension,
                    actual: entry.embedding.len(),
                });
            }
        }

        // 같은 배치 안의 중복 키는 마지막 레코드만 남김
        let mut positions: HashMap<String, usize> = HashMap::new();
        let mut unique: Vec<(String, &VectorEntry)> = Vec::with_capacity(entries.len());
        for entry in entries {
            let key = entry.keyword.dedup_key();
            match positions.get(&key) {
                Some(&i) => unique[i].1 = entry,
                None => {
                    positions.insert(key.clone(), unique.len());
                    unique.push((key, entry));
                }
            }
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;

        // 차원 일관성: 기존 인덱스 차원과 다르면 아무것도 쓰지 않음
        match read_meta(&tx, META_DIMENSION)? {
            Some(stored) => {
                let expected = parse_dimension(&stored)?;
                if expected != dimension {
                    return Err(RagError::DimensionMismatch {
                        expected,
                        actual: dimension,
                    });
                }
            }
            None => write_meta(&tx, META_DIMENSION, &dimension.to_string())?,
        }

        if let Some(previous) = read_meta(&tx, META_MODEL)? {
            if previous != model {
                tracing::warn!(
                    "Index was built with embedding model {}, now adding with {}",
                    previous,
                    model
                );
            }
        }
        write_meta(&tx, META_MODEL, model)?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO keywords (dedup_key, keyword, search_volume, competition,
                    competition_index, cpc_low, cpc_high, currency_code, location_ids,
                    language_id, fetched_at, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                 ON CONFLICT(dedup_key) DO UPDATE SET
                    keyword = excluded.keyword,
                    search_volume = excluded.search_volume,
                    competition = excluded.competition,
                    competition_index = excluded.competition_index,
                    cpc_low = excluded.cpc_low,
                    cpc_high = excluded.cpc_high,
                    currency_code = excluded.currency_code,
                    location_ids = excluded.location_ids,
                    language_id = excluded.language_id,
                    fetched_at = excluded.fetched_at,
                    embedding = excluded.embedding",
            )?;

            for (key, entry) in &unique {
                let kd = &entry.keyword;
                let mut embedding = entry.embedding.clone();
                l2_normalize(&mut embedding);

                stmt.execute(params![
                    key,
                    kd.keyword,
                    to_sql_int(kd.search_volume),
                    kd.competition.as_str(),
                    kd.competition_index.map(i64::from),
                    kd.cpc_low,
                    kd.cpc_high,
                    kd.currency_code,
                    serde_json::to_string(&kd.location_ids)?,
                    kd.language_id,
                    kd.fetched_at.to_rfc3339(),
                    encode_embedding(&embedding),
                ])?;
            }
        }

        tx.commit()?;
        tracing::debug!("Upserted {} entries into {:?}", unique.len(), self.db_path);
        Ok(unique.len())
    }

    fn search_sync(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        if limit == 0 {
            return Ok(vec![]);
        }

        let conn = self.lock()?;

        let Some(stored) = read_meta(&conn, META_DIMENSION)? else {
            return Ok(vec![]);
        };
        let dimension = parse_dimension(&stored)?;
        if query_embedding.len() != dimension {
            return Err(RagError::DimensionMismatch {
                expected: dimension,
                actual: query_embedding.len(),
            });
        }

        let mut query = query_embedding.to_vec();
        l2_normalize(&mut query);

        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM keywords ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_entry)?;

        let mut scored = Vec::new();
        for row in rows {
            let entry = row?;
            if entry.embedding.len() != dimension {
                tracing::warn!(
                    "Skipping corrupt embedding for keyword {:?}",
                    entry.keyword.keyword
                );
                continue;
            }
            scored.push(SearchResult {
                similarity: dot(&query, &entry.embedding),
                keyword: entry.keyword,
            });
        }

        // 동점이면 삽입 순서 유지 (stable sort)
        scored.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(limit);

        Ok(scored)
    }

    fn count_sync(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM keywords", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn keywords_sync(&self) -> Result<Vec<KeywordData>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM keywords ORDER BY id",
            SELECT_COLUMNS
        ))?;
        let keywords = stmt
            .query_map([], row_to_entry)?
            .map(|r| r.map(|entry| entry.keyword))
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(keywords)
    }

    fn info_sync(&self) -> Result<IndexInfo> {
        let count = self.count_sync()?;
        let conn = self.lock()?;
        let dimension = read_meta(&conn, META_DIMENSION)?
            .map(|d| parse_dimension(&d))
            .transpose()?;
        let model = read_meta(&conn, META_MODEL)?;
        Ok(IndexInfo {
            count,
            dimension,
            model,
        })
    }

    fn clear_sync(&self) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let deleted = tx.execute("DELETE FROM keywords", [])?;
        tx.execute("DELETE FROM index_meta", [])?;
        tx.commit()?;
        tracing::info!("Cleared keyword index ({} entries)", deleted);
        Ok(deleted)
    }
}

#[async_trait]
impl VectorStore for KeywordIndex {
    async fn upsert_batch(&self, entries: &[VectorEntry], model: &str) -> Result<usize> {
        self.upsert_batch_sync(entries, model)
    }

    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>> {
        self.search_sync(query_embedding, limit)
    }

    async fn count(&self) -> Result<usize> {
        self.count_sync()
    }

    async fn keywords(&self) -> Result<Vec<KeywordData>> {
        self.keywords_sync()
    }

    async fn info(&self) -> Result<IndexInfo> {
        self.info_sync()
    }

    async fn clear(&self) -> Result<usize> {
        self.clear_sync()
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn read_meta(conn: &Connection, key: &str) -> Result<Option<String>> {
    let value = conn
        .query_row(
            "SELECT value FROM index_meta WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value)
}

fn parse_dimension(stored: &str) -> Result<usize> {
    stored.parse::<usize>().map_err(|_| {
        RagError::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            format!("corrupt index metadata: dimension = {:?}", stored),
        ))
    })
}

fn write_meta(conn: &Connection, key: &str, value: &str) -> Result<()> {
    conn.execute(
        "INSERT INTO index_meta (key, value) VALUES (?1, ?2)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        params![key, value],
    )?;
    Ok(())
}

fn row_to_entry(row: &Row<'_>) -> rusqlite::Result<VectorEntry> {
    let search_volume: i64 = row.get(1)?;
    let competition: String = row.get(2)?;
    let competition_index: Option<i64> = row.get(3)?;
    let location_ids: String = row.get(7)?;
    let fetched_at: String = row.get(9)?;
    let embedding: Vec<u8> = row.get(10)?;

    Ok(VectorEntry {
        keyword: KeywordData {
            keyword: row.get(0)?,
            search_volume: search_volume.max(0) as u64,
            competition: Competition::from_api(&competition),
            competition_index: competition_index.and_then(|i| u8::try_from(i).ok()),
            cpc_low: row.get(4)?,
            cpc_high: row.get(5)?,
            currency_code: row.get(6)?,
            location_ids: serde_json::from_str(&location_ids)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(7, Type::Text, Box::new(e)))?,
            language_id: row.get(8)?,
            fetched_at: parse_datetime(&fetched_at)
                .map_err(|e| rusqlite::Error::FromSqlConversionFailure(9, Type::Text, Box::new(e)))?,
        },
        embedding: decode_embedding(&embedding),
    })
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

/// RFC3339 문자열을 DateTime<Utc>로 파싱
fn parse_datetime(s: &str) -> std::result::Result<DateTime<Utc>, chrono::ParseError> {
    DateTime::parse_from_rfc3339(s).map(|dt| dt.with_timezone(&Utc))
}

/// f32 벡터 -> little-endian 바이트
fn encode_embedding(v: &[f32]) -> Vec<u8> {
    v.iter().flat_map(|x| x.to_le_bytes()).collect()
}

/// little-endian 바이트 -> f32 벡터 (남는 바이트는 버림)
fn decode_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_index() -> (TempDir, KeywordIndex) {
        let dir = TempDir::new().unwrap();
        let index = KeywordIndex::open(&dir.path().join("keywords.db")).unwrap();
        (dir, index)
    }

    fn entry(keyword: &str, volume: u64, embedding: Vec<f32>) -> VectorEntry {
        VectorEntry {
            keyword: KeywordData::new(keyword, volume, Competition::Low).with_cpc(0.5, 2.0),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_upsert_and_count() {
        let (_dir, index) = create_test_index();

        let n = index
            .upsert_batch(
                &[entry("seo", 1000, vec![1.0, 0.0]), entry("ppc", 500, vec![0.0, 1.0])],
                "test-model",
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(index.count().await.unwrap(), 2);

        let info = index.info().await.unwrap();
        assert_eq!(info.count, 2);
        assert_eq!(info.dimension, Some(2));
        assert_eq!(info.model.as_deref(), Some("test-model"));
    }

    #[tokio::test]
    async fn test_upsert_replaces_same_keyword() {
        let (_dir, index) = create_test_index();

        index
            .upsert_batch(&[entry("SEO", 1000, vec![1.0, 0.0])], "m")
            .await
            .unwrap();
        index
            .upsert_batch(&[entry("seo", 2000, vec![0.0, 1.0])], "m")
            .await
            .unwrap();

        assert_eq!(index.count().await.unwrap(), 1);
        let keywords = index.keywords().await.unwrap();
        assert_eq!(keywords[0].keyword, "seo");
        assert_eq!(keywords[0].search_volume, 2000);
    }

    #[tokio::test]
    async fn test_search_empty_index() {
        let (_dir, index) = create_test_index();
        let results = index.search(&[1.0, 0.0], 5).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_search_ranking_and_limit() {
        let (_dir, index) = create_test_index();

        index
            .upsert_batch(
                &[
                    entry("a", 1, vec![1.0, 0.0, 0.0]),
                    entry("b", 1, vec![0.7, 0.7, 0.0]),
                    entry("c", 1, vec![0.0, 0.0, 1.0]),
                ],
                "m",
            )
            .await
            .unwrap();

        let results = index.search(&[1.0, 0.1, 0.0], 2).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].keyword.keyword, "a");
        assert_eq!(results[1].keyword.keyword, "b");
        assert!(results[0].similarity >= results[1].similarity);

        assert!(index.search(&[1.0, 0.0, 0.0], 0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch_rejected_atomically() {
        let (_dir, index) = create_test_index();

        index
            .upsert_batch(&[entry("a", 1, vec![1.0, 0.0])], "m")
            .await
            .unwrap();

        let err = index
            .upsert_batch(&[entry("b", 1, vec![1.0, 0.0, 0.0])], "m")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RagError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        ));

        // 배치 내부 불일치
        let err = index
            .upsert_batch(
                &[entry("c", 1, vec![1.0, 0.0]), entry("d", 1, vec![1.0])],
                "m",
            )
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));

        assert_eq!(index.count().await.unwrap(), 1);

        let err = index.search(&[1.0], 5).await.unwrap_err();
        assert!(matches!(err, RagError::DimensionMismatch { .. }));
    }

    #[tokio::test]
    async fn test_persist_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keywords.db");
        let query = [0.9, 0.3, 0.1];

        let before = {
            let index = KeywordIndex::open(&path).unwrap();
            index
                .upsert_batch(
                    &[
                        entry("a", 10, vec![1.0, 0.0, 0.0]),
                        entry("b", 20, vec![0.0, 1.0, 0.0]),
                        entry("c", 30, vec![0.5, 0.5, 0.5]),
                    ],
                    "m",
                )
                .await
                .unwrap();
            index.search(&query, 3).await.unwrap()
        };

        let reopened = KeywordIndex::open(&path).unwrap();
        assert_eq!(reopened.count().await.unwrap(), 3);

        let after = reopened.search(&query, 3).await.unwrap();
        let names = |r: &[SearchResult]| {
            r.iter()
                .map(|s| s.keyword.keyword.clone())
                .collect::<Vec<_>>()
        };
        assert_eq!(names(&before), names(&after));
    }

    #[tokio::test]
    async fn test_keyword_fields_roundtrip() {
        let (_dir, index) = create_test_index();

        let mut kd = KeywordData::new("running shoes", 74000, Competition::High)
            .with_cpc(0.81, 2.37)
            .with_targeting(vec!["2840".to_string()], Some("1000".to_string()));
        kd.competition_index = Some(100);

        index
            .upsert_batch(
                &[VectorEntry {
                    keyword: kd.clone(),
                    embedding: vec![0.2, 0.4],
                }],
                "m",
            )
            .await
            .unwrap();

        let stored = index.keywords().await.unwrap().remove(0);
        assert_eq!(stored.keyword, kd.keyword);
        assert_eq!(stored.search_volume, 74000);
        assert_eq!(stored.competition, Competition::High);
        assert_eq!(stored.competition_index, Some(100));
        assert_eq!(stored.location_ids, vec!["2840".to_string()]);
        assert_eq!(stored.language_id.as_deref(), Some("1000"));
        assert_eq!(
            stored.fetched_at.timestamp_micros(),
            kd.fetched_at.timestamp_micros()
        );
    }

    #[tokio::test]
    async fn test_clear() {
        let (_dir, index) = create_test_index();
        index
            .upsert_batch(&[entry("a", 1, vec![1.0, 0.0])], "m")
            .await
            .unwrap();

        assert_eq!(index.clear().await.unwrap(), 1);
        assert_eq!(index.count().await.unwrap(), 0);

        // 재구축 후에는 다른 차원도 허용
        index
            .upsert_batch(&[entry("a", 1, vec![1.0, 0.0, 0.0])], "m2")
            .await
            .unwrap();
        assert_eq!(index.info().await.unwrap().dimension, Some(3));
    }

    #[tokio::test]
    async fn test_duplicate_keys_in_batch_counted_once() {
        let (_dir, index) = create_test_index();

        let n = index
            .upsert_batch(
                &[
                    entry("seo tools", 100, vec![1.0, 0.0]),
                    entry("SEO  tools", 300, vec![0.0, 1.0]),
                    entry("ppc", 50, vec![1.0, 1.0]),
                ],
                "m",
            )
            .await
            .unwrap();
        assert_eq!(n, 2);
        assert_eq!(index.count().await.unwrap(), 2);

        let keywords = index.keywords().await.unwrap();
        assert_eq!(keywords[0].keyword, "SEO  tools");
        assert_eq!(keywords[0].search_volume, 300);
    }

    #[tokio::test]
    async fn test_corrupt_row_is_an_error() {
        let (_dir, index) = create_test_index();
        index
            .upsert_batch(&[entry("a", 1, vec![1.0, 0.0])], "m")
            .await
            .unwrap();

        index
            .lock()
            .unwrap()
            .execute(
                "UPDATE keywords SET location_ids = 'garbage', fetched_at = 'nope'",
                [],
            )
            .unwrap();

        assert!(index.keywords().await.is_err());
        assert!(index.search(&[1.0, 0.0], 5).await.is_err());
    }

    #[tokio::test]
    async fn test_corrupt_dimension_meta_is_an_error() {
        let (_dir, index) = create_test_index();
        index
            .upsert_batch(&[entry("a", 1, vec![1.0, 0.0])], "m")
            .await
            .unwrap();

        write_meta(&index.lock().unwrap(), META_DIMENSION, "two").unwrap();

        let err = index.search(&[1.0, 0.0], 5).await.unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
        let err = index
            .upsert_batch(&[entry("b", 1, vec![0.0, 1.0])], "m")
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Io(_)));
        assert!(index.info().await.is_err());
    }

    #[test]
    fn test_embedding_encoding() {
        let v = vec![0.25, -1.5, 3.0];
        assert_eq!(decode_embedding(&encode_embedding(&v)), v);
        assert_eq!(decode_embedding(&[0, 0, 0]), Vec::<f32>::new());
    }
}
