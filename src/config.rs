//! 엔진 설정
//!
//! 생성 시점에 한 번 검증되는 불변 설정 객체입니다. 각 컴포넌트는 생성자에서
//! 이 설정을 받으며, 연산 도중 다시 읽지 않습니다.
//!
//! ## 로딩 순서
//! 1. `EngineConfig::default()`
//! 2. `from_json_file()` - JSON 설정 파일 (선택)
//! 3. `from_env()` - `CITEQA_*` 환경변수 오버레이

use std::path::Path;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// 환경변수 접두사
const ENV_PREFIX: &str = "CITEQA_";

// ============================================================================
// EngineConfig
// ============================================================================

/// 검색/요약 엔진 설정
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 연속 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 청크로 인정되는 최소 길이 (trim 후 문자 수)
    pub min_content_length: usize,
    /// 단어 경계를 찾기 위해 뒤로 살펴볼 최대 문자 수
    pub boundary_lookback: usize,
    /// 임베딩 차원
    pub embedding_dim: usize,
    /// 검색 후보 수
    pub top_k: usize,
    /// 최소 유사도 (0.0 ~ 1.0)
    pub similarity_threshold: f32,
    /// 문서당 답변에 포함할 최대 문장 수
    pub max_sentences_per_source: usize,
    /// 배치 임베딩 동시 실행 수
    pub embed_concurrency: usize,
    /// 임베딩 입력 최대 길이 (문자 수)
    pub max_input_chars: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 200,
            min_content_length: 50,
            boundary_lookback: 50,
            embedding_dim: 384,
            top_k: 5,
            similarity_threshold: 0.3,
            max_sentences_per_source: 2,
            embed_concurrency: 4,
            max_input_chars: 8192,
        }
    }
}

impl EngineConfig {
    /// 빌더 생성
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// 설정 검증
    ///
    /// 잘못된 조합은 보정하지 않고 에러로 반환합니다.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size must be greater than zero"));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(invalid(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.embedding_dim == 0 {
            return Err(invalid("embedding_dim must be greater than zero"));
        }
        if self.top_k == 0 {
            return Err(invalid("top_k must be greater than zero"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid(format!(
                "similarity_threshold ({}) must be within [0, 1]",
                self.similarity_threshold
            )));
        }
        if self.max_sentences_per_source == 0 {
            return Err(invalid("max_sentences_per_source must be greater than zero"));
        }
        if self.embed_concurrency == 0 {
            return Err(invalid("embed_concurrency must be greater than zero"));
        }
        if self.max_input_chars == 0 {
            return Err(invalid("max_input_chars must be greater than zero"));
        }
        if self.chunk_size > self.max_input_chars {
            return Err(invalid(format!(
                "chunk_size ({}) must not exceed max_input_chars ({})",
                self.chunk_size, self.max_input_chars
            )));
        }
        Ok(())
    }

    /// 기본값 위에 `CITEQA_*` 환경변수를 적용
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides()
    }

    /// JSON 설정 파일에서 로드 (없는 필드는 기본값)
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("failed to read config {:?}: {}", path, e)))?;
        let config: Self = serde_json::from_str(&raw)
            .map_err(|e| invalid(format!("failed to parse config {:?}: {}", path, e)))?;
        config.validate()?;
        Ok(config)
    }

    /// 현재 설정에 환경변수 오버라이드 적용 후 검증
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// 조회 함수로 오버라이드 적용 (테스트에서 환경변수 대신 사용)
    fn with_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        override_field(&lookup, "CHUNK_SIZE", &mut self.chunk_size)?;
        override_field(&lookup, "CHUNK_OVERLAP", &mut self.chunk_overlap)?;
        override_field(&lookup, "MIN_CONTENT_LENGTH", &mut self.min_content_length)?;
        override_field(&lookup, "BOUNDARY_LOOKBACK", &mut self.boundary_lookback)?;
        override_field(&lookup, "EMBEDDING_DIM", &mut self.embedding_dim)?;
        override_field(&lookup, "TOP_K", &mut self.top_k)?;
        override_field(&lookup, "SIMILARITY_THRESHOLD", &mut self.similarity_threshold)?;
        override_field(
            &lookup,
            "MAX_SENTENCES_PER_SOURCE",
            &mut self.max_sentences_per_source,
        )?;
        override_field(&lookup, "EMBED_CONCURRENCY", &mut self.embed_concurrency)?;
        override_field(&lookup, "MAX_INPUT_CHARS", &mut self.max_input_chars)?;

        self.validate()?;
        Ok(self)
    }
}

fn override_field<F, T>(lookup: &F, key: &str, slot: &mut T) -> Result<()>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let name = format!("{}{}", ENV_PREFIX, key);
    if let Some(raw) = lookup(&name) {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(());
        }
        *slot = raw
            .parse()
            .map_err(|e| invalid(format!("{}={:?}: {}", name, raw, e)))?;
        tracing::debug!("Config override from {}", name);
    }
    Ok(())
}

fn invalid(message: impl Into<String>) -> RagError {
    RagError::InvalidConfig(message.into())
}

// ============================================================================
// Builder
// ============================================================================

/// 검증된 `EngineConfig`를 만드는 빌더
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    pub fn min_content_length(mut self, length: usize) -> Self {
        self.config.min_content_length = length;
        self
    }

    pub fn boundary_lookback(mut self, lookback: usize) -> Self {
        self.config.boundary_lookback = lookback;
        self
    }

    pub fn embedding_dim(mut self, dim: usize) -> Self {
        self.config.embedding_dim = dim;
        self
    }

    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = threshold;
        self
    }

    pub fn max_sentences_per_source(mut self, count: usize) -> Self {
        self.config.max_sentences_per_source = count;
        self
    }

    pub fn embed_concurrency(mut self, concurrency: usize) -> Self {
        self.config.embed_concurrency = concurrency;
        self
    }

    pub fn max_input_chars(mut self, chars: usize) -> Self {
        self.config.max_input_chars = chars;
        self
    }

    /// 검증 후 설정 반환
    pub fn build(self) -> Result<EngineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_is_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.top_k, 5);
        assert!((config.similarity_threshold - 0.3).abs() < f32::EPSILON);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let result = EngineConfig::builder()
            .chunk_size(100)
            .chunk_overlap(100)
            .build();
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_invalid_values_are_rejected_not_clamped() {
        assert!(EngineConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
        assert!(EngineConfig::builder().embedding_dim(0).build().is_err());
        assert!(EngineConfig::builder().top_k(0).build().is_err());
        assert!(EngineConfig::builder().similarity_threshold(1.5).build().is_err());
        assert!(EngineConfig::builder().similarity_threshold(-0.1).build().is_err());
        assert!(EngineConfig::builder().similarity_threshold(f32::NAN).build().is_err());
    }

    #[test]
    fn test_chunk_size_must_fit_embedder_input() {
        let result = EngineConfig::builder()
            .chunk_size(10_000)
            .chunk_overlap(100)
            .build();
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));

        let result = EngineConfig::builder()
            .chunk_size(600)
            .chunk_overlap(100)
            .max_input_chars(500)
            .build();
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));

        // 같으면 허용
        let config = EngineConfig::builder()
            .chunk_size(500)
            .chunk_overlap(100)
            .max_input_chars(500)
            .build()
            .unwrap();
        assert_eq!(config.chunk_size, config.max_input_chars);
    }

    #[test]
    fn test_builder_sets_fields() {
        let config = EngineConfig::builder()
            .chunk_size(200)
            .chunk_overlap(20)
            .min_content_length(10)
            .embedding_dim(64)
            .top_k(3)
            .similarity_threshold(0.5)
            .build()
            .unwrap();

        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 20);
        assert_eq!(config.min_content_length, 10);
        assert_eq!(config.embedding_dim, 64);
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("CITEQA_CHUNK_SIZE", "300"),
            ("CITEQA_CHUNK_OVERLAP", "30"),
            ("CITEQA_SIMILARITY_THRESHOLD", "0.25"),
            ("CITEQA_TOP_K", ""),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.chunk_size, 300);
        assert_eq!(config.chunk_overlap, 30);
        assert!((config.similarity_threshold - 0.25).abs() < f32::EPSILON);
        // 빈 값은 무시
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_override_parse_error() {
        let result = EngineConfig::default().with_overrides(|name| {
            (name == "CITEQA_TOP_K").then(|| "many".to_string())
        });
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_override_invalid_combination() {
        let result = EngineConfig::default().with_overrides(|name| {
            (name == "CITEQA_CHUNK_OVERLAP").then(|| "5000".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_json_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("citeqa.json");
        std::fs::write(&path, r#"{ "chunk_size": 400, "chunk_overlap": 40 }"#).unwrap();

        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.chunk_size, 400);
        assert_eq!(config.chunk_overlap, 40);
        assert_eq!(config.top_k, EngineConfig::default().top_k);
    }

    #[test]
    fn test_json_file_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{ "chunk_size": 10, "chunk_overlap": 10 }"#).unwrap();

        assert!(EngineConfig::from_json_file(&path).is_err());
        assert!(EngineConfig::from_json_file(&dir.path().join("missing.json")).is_err());
    }
}
