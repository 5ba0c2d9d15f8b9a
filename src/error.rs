//! 에러 타입
//!
//! 라이브러리 코어는 `RagError`를 반환하고, CLI와 추출기는 `anyhow`로 감쌉니다.
//!
//! - 검증 에러 (`InvalidConfig`, `EmptyQuery`, `DimensionMismatch`, ...): 호출 단위로 치명적
//! - `EmbeddingFailure`: 수집 중에는 청크 단위로 건너뛰고, 질의 중에는 호출 실패
//!
//! 인덱스/저장소 불일치와 "결과 없음"은 에러가 아니므로 여기에 없습니다.

use thiserror::Error;

use crate::knowledge::DocumentId;

/// RAG 엔진 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 잘못된 설정 (예: chunk_overlap >= chunk_size)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// 정규화 후 비어있는 질의
    #[error("Query is empty after normalization")]
    EmptyQuery,

    /// 임베더와 인덱스의 차원 불일치
    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// 이미 수집된 문서 ID
    #[error("Document '{0}' already exists")]
    DuplicateDocument(DocumentId),

    /// 잘못된 문서 입력 (빈 ID 등)
    #[error("Invalid document: {0}")]
    InvalidDocument(String),

    /// 단일 텍스트 임베딩 실패
    #[error("Embedding failed ({provider}): {message}")]
    EmbeddingFailure { provider: String, message: String },
}

impl RagError {
    /// 임베딩 실패 생성 헬퍼
    pub fn embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingFailure {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// 호출자가 입력을 고쳐야 하는 검증 에러인지 여부
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidConfig(_)
                | Self::EmptyQuery
                | Self::DimensionMismatch { .. }
                | Self::DuplicateDocument(_)
                | Self::InvalidDocument(_)
        )
    }
}

/// RAG 연산 결과 타입
pub type Result<T> = std::result::Result<T, RagError>;
