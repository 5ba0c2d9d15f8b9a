//! citeqa - 문서 기반 인용 질의응답
//!
//! 사용자 문서를 청크로 나눠 벡터 인덱스에 넣고, 질문에 가장 가까운 구절을
//! 문서별로 골라 인용과 신뢰도가 포함된 추출형 답변을 만듭니다.
//!
//! ```rust,ignore
//! let config = EngineConfig::default();
//! let embedder = create_embedder(EmbedderKind::Hash, &config)?;
//! let engine = AnswerEngine::new(config, embedder)?;
//!
//! engine.ingest("loan", "loan.pdf", vec![Page::new(1, text)]).await?;
//! let answer = engine.answer("What is the interest rate?").await?;
//! ```

pub mod cli;
pub mod collector;
pub mod config;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod knowledge;

// Re-exports
pub use config::{EngineConfig, EngineConfigBuilder};
pub use embedding::{
    create_embedder, CachedEmbedding, EmbedderKind, EmbedderPool, EmbeddingProvider,
    GeminiEmbedding, HashEmbedding,
};
pub use error::{RagError, Result};
pub use knowledge::{
    Answer, AnswerEngine, Chunk, ChunkId, Citation, Document, DocumentId, FlatIndex,
    IngestReport, Page, QueryCandidate, Retriever, Synthesizer, VectorIndex,
};
