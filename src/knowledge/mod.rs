//! Knowledge 모듈 - 키워드 벡터 저장소
//!
//! - Keyword: Google Ads 키워드 레코드
//! - Index: SQLite 단일 파일 벡터 인덱스 (트랜잭션 upsert)
//! - Store: 임베딩 + 인덱스 결합, 유사도 검색

mod index;
mod keyword;
mod store;
mod vector;

// Re-exports
pub use index::KeywordIndex;
pub use keyword::{Competition, KeywordData, DEFAULT_CURRENCY};
pub use store::KeywordVectorStore;
pub use vector::{
    cosine_similarity, dot, l2_normalize, IndexInfo, SearchResult, VectorEntry, VectorStore,
};
