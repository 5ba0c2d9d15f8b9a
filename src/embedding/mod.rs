//! 임베딩 모듈 - 텍스트 벡터화
//!
//! 엔진은 `EmbeddingProvider` 트레이트에만 의존하므로 모델을 교체해도
//! Retriever/Synthesizer는 바뀌지 않습니다.
//!
//! - `HashEmbedding`: 결정적 로컬 임베딩 (기본값, 네트워크 없음)
//! - `GeminiEmbedding`: Gemini API 임베딩
//! - `CachedEmbedding`: 임의 프로바이더 위의 콘텐츠 해시 캐시
//! - `EmbedderPool`: 배치를 여러 태스크로 병렬 처리
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = HashEmbedding::new(384)?;
//! let vector = embedder.embed("What is the interest rate?").await?;
//! ```

mod cache;
mod gemini;
mod hashing;
mod pool;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::EngineConfig;
use crate::error::{RagError, Result};

pub use cache::{CacheStats, CachedEmbedding};
pub use gemini::{get_api_key, has_api_key, GeminiEmbedding, GEMINI_DIMENSIONS};
pub use hashing::HashEmbedding;
pub use pool::EmbedderPool;

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 같은 모델에 같은 텍스트를 넣으면 같은 벡터가 나와야 합니다. 정규화 후 빈
/// 텍스트이거나 모델의 최대 입력 길이를 넘으면 `EmbeddingFailure`를 반환합니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (입력 순서 유지, 텍스트별 결과)
    ///
    /// 기본 구현은 순차 호출입니다. 하나가 실패해도 나머지는 계속됩니다.
    async fn embed_batch(&self, texts: &[String]) -> Vec<Result<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await);
        }
        results
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 프로바이더 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Factory Function
// ============================================================================

/// 임베딩 프로바이더 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum EmbedderKind {
    /// 로컬 해시 임베딩
    #[default]
    Hash,
    /// Gemini API
    Gemini,
}

/// 설정에 맞는 임베딩 프로바이더 생성
///
/// 원격 프로바이더는 `CachedEmbedding`으로 감싸 반복 호출을 줄입니다.
pub fn create_embedder(
    kind: EmbedderKind,
    config: &EngineConfig,
) -> Result<Arc<dyn EmbeddingProvider>> {
    match kind {
        EmbedderKind::Hash => {
            let embedder = HashEmbedding::new(config.embedding_dim)?
                .with_max_input_chars(config.max_input_chars);
            tracing::info!(
                "Using hash embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(embedder))
        }
        EmbedderKind::Gemini => {
            if !has_api_key() {
                return Err(RagError::InvalidConfig(
                    "GEMINI_API_KEY or GOOGLE_AI_API_KEY not set".to_string(),
                ));
            }
            let embedder = GeminiEmbedding::from_env_with_dimension(config.embedding_dim)?
                .with_max_input_chars(config.max_input_chars);
            if config.chunk_size > embedder.max_input_chars() {
                return Err(RagError::InvalidConfig(format!(
                    "chunk_size ({}) exceeds the Gemini input limit ({} chars)",
                    config.chunk_size,
                    embedder.max_input_chars()
                )));
            }
            tracing::info!(
                "Using Gemini API embedding (dimension: {})",
                embedder.dimension()
            );
            Ok(Arc::new(CachedEmbedding::new(Arc::new(embedder))))
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
