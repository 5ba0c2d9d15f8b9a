//! Knowledge 모듈 - 검색 및 답변 합성 엔진
//!
//! - Chunker: 단어 경계를 인식하는 슬라이딩 윈도우 분할
//! - Store: 메모리 문서/청크 레지스트리
//! - VectorIndex: 정확한 L2 k-NN 검색 (연속 slab)
//! - Retriever: 질의 임베딩 → 검색 → 임계값 필터 → 청크 해석
//! - Synthesizer: 문서별 최적 청크에서 문장 추출, 인용과 신뢰도 계산
//! - Engine: 위 구성요소를 묶는 `AnswerEngine`

pub mod text;

mod chunker;
mod engine;
mod retriever;
mod store;
mod synthesizer;
mod vector;

// Re-exports
pub use chunker::{
    chunker_from_config, ChunkConfig, ChunkDraft, ChunkedPage, Chunker, SlidingWindowChunker,
};
pub use engine::{AnswerEngine, EngineStats, IngestReport};
pub use retriever::{QueryCandidate, Retriever};
pub use store::{
    Chunk, ChunkId, Document, DocumentId, DocumentSummary, KnowledgeStore, Page, StoreStats,
};
pub use synthesizer::{confidence, Answer, Citation, LexicalScorer, SentenceScorer, Synthesizer};
pub use vector::{
    l2_normalize, similarity_from_distance, squared_l2, FlatIndex, IndexHit, VectorIndex,
};
