//! 해시 임베딩 - 결정적 로컬 모델
//!
//! 정규화된 단어 토큰을 SHA-256 다이제스트로 버킷에 매핑하는 feature hashing.
//! 불용어는 가중치를 낮추고, 결과 벡터는 L2 정규화합니다.
//! 모든 성분이 0 이상이므로 두 벡터의 코사인은 0 이상입니다.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};
use crate::knowledge::text::{is_stopword, normalize_query, tokenize};
use crate::knowledge::l2_normalize;

use super::EmbeddingProvider;

const PROVIDER_NAME: &str = "hash-embedding";

/// 불용어 가중치
const STOPWORD_WEIGHT: f32 = 0.2;

/// 기본 최대 입력 길이 (문자 수)
const DEFAULT_MAX_INPUT_CHARS: usize = 8192;

/// 결정적 해시 임베딩
#[derive(Debug, Clone)]
pub struct HashEmbedding {
    dimension: usize,
    max_input_chars: usize,
}

impl HashEmbedding {
    /// 차원을 지정하여 생성
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            max_input_chars: DEFAULT_MAX_INPUT_CHARS,
        })
    }

    /// 최대 입력 길이 지정
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars;
        self
    }

    /// 동기 임베딩 (CPU 연산만 수행)
    pub fn embed_text(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = normalize_query(text);
        if normalized.is_empty() {
            return Err(RagError::embedding(PROVIDER_NAME, "text is empty"));
        }

        let length = normalized.chars().count();
        if length > self.max_input_chars {
            return Err(RagError::embedding(
                PROVIDER_NAME,
                format!(
                    "text too long: {} chars (max {})",
                    length, self.max_input_chars
                ),
            ));
        }

        let tokens = tokenize(&normalized);
        if tokens.is_empty() {
            return Err(RagError::embedding(PROVIDER_NAME, "text has no word tokens"));
        }

        let mut vector = vec![0.0f32; self.dimension];
        for token in &tokens {
            let weight = if is_stopword(token) { STOPWORD_WEIGHT } else { 1.0 };
            vector[self.bucket(token)] += weight;
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }

    fn bucket(&self, token: &str) -> usize {
        let digest = Sha256::digest(token.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        (u64::from_le_bytes(bytes) % self.dimension as u64) as usize
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.embed_text(text)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        PROVIDER_NAME
    }
}
