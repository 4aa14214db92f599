//! Vector Store - 벡터 인덱스 트레이트 및 유틸리티
//!
//! 인덱스 엔트리 = (임베딩 벡터, KeywordData) 쌍입니다.
//! 모든 엔트리의 임베딩 차원은 동일해야 합니다.

use async_trait::async_trait;

use super::keyword::KeywordData;
use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 키워드 레코드
    pub keyword: KeywordData,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

/// 검색 결과
#[derive(Debug, Clone)]
pub struct SearchResult {
    /// 키워드 레코드
    pub keyword: KeywordData,
    /// 코사인 유사도 (-1.0 ~ 1.0)
    pub similarity: f32,
}

/// 인덱스 메타데이터
#[derive(Debug, Clone, Default)]
pub struct IndexInfo {
    /// 엔트리 수
    pub count: usize,
    /// 임베딩 차원 (비어있으면 None)
    pub dimension: Option<usize>,
    /// 인덱스를 만든 임베딩 모델 이름
    pub model: Option<String>,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 인덱스의 공통 인터페이스입니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 엔트리 배치 upsert (한 트랜잭션), 반영된 엔트리 수 반환
    async fn upsert_batch(&self, entries: &[VectorEntry], model: &str) -> Result<usize>;

    /// 벡터 검색 (유사도 내림차순, 최대 limit 개)
    async fn search(&self, query_embedding: &[f32], limit: usize) -> Result<Vec<SearchResult>>;

    /// 엔트리 수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 모든 키워드 (삽입 순서)
    async fn keywords(&self) -> Result<Vec<KeywordData>>;

    /// 인덱스 메타데이터
    async fn info(&self) -> Result<IndexInfo>;

    /// 전체 삭제 (인덱스 재구축용)
    async fn clear(&self) -> Result<usize>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// L2 정규화 (영벡터는 그대로)
///
/// 정규화된 벡터끼리의 내적이 곧 코사인 유사도입니다.
pub fn l2_normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// 내적
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cosine_similarity_same() {
        let a = vec![1.0, 0.0, 0.0];
        let b = vec![1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &b) - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_orthogonal() {
        let a = vec![1.0, 0.0, 0.0];
        let c = vec![0.0, 1.0, 0.0];
        assert!((cosine_similarity(&a, &c) - 0.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_opposite() {
        let a = vec![1.0, 0.0, 0.0];
        let d = vec![-1.0, 0.0, 0.0];
        assert!((cosine_similarity(&a, &d) - -1.0).abs() < 0.0001);
    }

    #[test]
    fn test_cosine_similarity_empty() {
        let a: Vec<f32> = vec![];
        let b: Vec<f32> = vec![];
        assert_eq!(cosine_similarity(&a, &b), 0.0);
    }

    #[test]
    fn test_l2_normalize() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 0.0001);
        assert!((v[1] - 0.8).abs() < 0.0001);

        let mut zero = vec![0.0, 0.0];
        l2_normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dot_of_normalized_equals_cosine() {
        let mut a = vec![1.0, 2.0, 3.0];
        let mut b = vec![-2.0, 0.5, 4.0];
        let expected = cosine_similarity(&a, &b);
        l2_normalize(&mut a);
        l2_normalize(&mut b);
        assert!((dot(&a, &b) - expected).abs() < 0.0001);
    }
}
