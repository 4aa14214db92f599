//! Keyword Vector Store - 임베딩 + 인덱스 결합
//!
//! 키워드 레코드를 임베딩하여 인덱스에 저장하고,
//! 질의문을 임베딩하여 가장 유사한 키워드를 찾습니다.

use std::path::Path;
use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::index::KeywordIndex;
use super::keyword::KeywordData;
use super::vector::{IndexInfo, SearchResult, VectorEntry, VectorStore};

// ============================================================================
// KeywordVectorStore
// ============================================================================

/// 키워드 벡터 저장소
///
/// 임베딩 모델과 인덱스를 명시적으로 소유하는 컨텍스트 객체입니다.
pub struct KeywordVectorStore {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Box<dyn VectorStore>,
}

impl KeywordVectorStore {
    /// 임베딩 프로바이더와 인덱스로 생성
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, index: Box<dyn VectorStore>) -> Self {
        Self { embedder, index }
    }

    /// 인덱스 파일을 열어 생성 (없으면 빈 인덱스)
    pub fn open(path: &Path, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index = KeywordIndex::open(path)?;
        Ok(Self::new(embedder, Box::new(index)))
    }

    /// 키워드 추가 (임베딩 + upsert + 저장)
    ///
    /// # Returns
    /// 인덱스에 반영된 레코드 수
    pub async fn add(&self, keywords: &[KeywordData]) -> Result<usize> {
        if keywords.is_empty() {
            return Ok(0);
        }

        for kd in keywords {
            kd.validate()?;
        }

        let texts: Vec<String> = keywords.iter().map(KeywordData::embedding_text).collect();
        let embeddings = self.embedder.embed_batch(&texts).await?;

        if embeddings.len() != keywords.len() {
            return Err(RagError::Embedding(format!(
                "expected {} embeddings, got {}",
                keywords.len(),
                embeddings.len()
            )));
        }

        let entries: Vec<VectorEntry> = keywords
            .iter()
            .cloned()
            .zip(embeddings)
            .map(|(keyword, embedding)| VectorEntry { keyword, embedding })
            .collect();

        let added = self.index.upsert_batch(&entries, self.embedder.name()).await?;
        tracing::debug!("Indexed {} keywords with {}", added, self.embedder.name());
        Ok(added)
    }

    /// 유사 키워드 검색
    ///
    /// 인덱스가 비어있으면 임베딩 호출 없이 빈 결과를 반환합니다.
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.index.count().await? == 0 {
            return Ok(vec![]);
        }

        let query_embedding = self.embedder.embed(query).await?;
        self.index.search(&query_embedding, k).await
    }

    /// 저장된 키워드 수
    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }

    /// 저장된 모든 키워드
    pub async fn keywords(&self) -> Result<Vec<KeywordData>> {
        self.index.keywords().await
    }

    /// 인덱스 메타데이터
    pub async fn info(&self) -> Result<IndexInfo> {
        self.index.info().await
    }

    /// 인덱스 전체 삭제
    pub async fn clear(&self) -> Result<usize> {
        self.index.clear().await
    }

    /// 임베딩 프로바이더 이름
    pub fn embedder_name(&self) -> &str {
        self.embedder.name()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::keyword::Competition;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    /// 키워드 텍스트에 포함된 단어로 벡터를 만드는 테스트용 임베더
    struct WordEmbedder {
        calls: AtomicUsize,
    }

    const VOCAB: [&str; 4] = ["seo", "ppc", "low", "competition"];

    #[async_trait]
    impl EmbeddingProvider for WordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let lower = text.to_lowercase();
            Ok(VOCAB
                .iter()
                .map(|w| if lower.contains(w) { 1.0 } else { 0.0 })
                .collect())
        }

        fn dimension(&self) -> usize {
            VOCAB.len()
        }

        fn name(&self) -> &str {
            "word-embedder"
        }
    }

    fn create_store() -> (TempDir, Arc<WordEmbedder>, KeywordVectorStore) {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(WordEmbedder {
            calls: AtomicUsize::new(0),
        });
        let store = KeywordVectorStore::open(&dir.path().join("keywords.db"), embedder.clone())
            .unwrap();
        (dir, embedder, store)
    }

    #[tokio::test]
    async fn test_search_empty_store_skips_embedding() {
        let (_dir, embedder, store) = create_store();

        let results = store.search("anything", 5).await.unwrap();
        assert!(results.is_empty());
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_add_and_search() {
        let (_dir, _embedder, store) = create_store();

        let added = store
            .add(&[
                KeywordData::new("seo", 1000, Competition::Low),
                KeywordData::new("ppc", 500, Competition::High),
            ])
            .await
            .unwrap();
        assert_eq!(added, 2);
        assert_eq!(store.count().await.unwrap(), 2);

        let results = store.search("seo tips", 5).await.unwrap();
        assert!(results.len() <= 5);
        assert_eq!(results[0].keyword.keyword, "seo");
        for pair in results.windows(2) {
            assert!(pair[0].similarity >= pair[1].similarity);
        }

        let info = store.info().await.unwrap();
        assert_eq!(info.model.as_deref(), Some("word-embedder"));
    }

    #[tokio::test]
    async fn test_add_rejects_invalid_record() {
        let (_dir, embedder, store) = create_store();

        let err = store
            .add(&[KeywordData::new("", 10, Competition::Low)])
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::InvalidInput(_)));
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 0);
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_add_empty_is_noop() {
        let (_dir, _embedder, store) = create_store();
        assert_eq!(store.add(&[]).await.unwrap(), 0);
    }
}
