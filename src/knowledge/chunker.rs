//! Text Chunking Module
//!
//! 정규화된 페이지 텍스트를 겹치는 고정 크기 윈도우로 나눕니다.
//!
//! - 윈도우 길이 <= `chunk_size` 문자
//! - 단어 중간에서 잘리면 `boundary_lookback` 범위 안의 직전 공백으로 끝을 당김
//! - 다음 윈도우는 `end - chunk_overlap`에서 시작 (오버랩은 항상 정확히 `chunk_overlap`)
//! - trim 후 `min_content_length` 미만인 윈도우는 버림 (머리글, 쪽번호 등)

use serde::Serialize;

use crate::config::EngineConfig;
use crate::error::{RagError, Result};

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수)
    pub chunk_overlap: usize,
    /// 최소 내용 길이 (trim 후 문자 수)
    pub min_content_length: usize,
    /// 단어 경계 탐색 범위 (문자 수)
    pub boundary_lookback: usize,
}

impl From<&EngineConfig> for ChunkConfig {
    fn from(config: &EngineConfig) -> Self {
        Self {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            min_content_length: config.min_content_length,
            boundary_lookback: config.boundary_lookback,
        }
    }
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl ChunkConfig {
    /// 설정 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Types
// ============================================================================

/// 아직 ID가 없는 청크 (저장소가 ID를 부여)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkDraft {
    /// 페이지 번호
    pub page_number: u32,
    /// 청크 텍스트 (`page_text[start_offset..end_offset]`)
    pub text: String,
    /// 시작 바이트 오프셋
    pub start_offset: usize,
    /// 끝 바이트 오프셋 (exclusive)
    pub end_offset: usize,
}

/// 한 페이지의 청킹 결과
#[derive(Debug, Clone, Default)]
pub struct ChunkedPage {
    pub chunks: Vec<ChunkDraft>,
    /// 최소 길이 미달로 버려진 윈도우 수
    pub dropped: usize,
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 페이지 텍스트를 청크로 분할
    fn chunk(&self, text: &str, page_number: u32) -> ChunkedPage;

    /// 청커 이름
    fn name(&self) -> &'static str;
}

// ============================================================================
// SlidingWindowChunker
// ============================================================================

/// 단어 경계를 인식하는 슬라이딩 윈도우 청커
#[derive(Debug, Clone)]
pub struct SlidingWindowChunker {
    config: ChunkConfig,
}

impl SlidingWindowChunker {
    /// 설정으로 생성 (잘못된 설정은 에러)
    pub fn new(config: ChunkConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// 설정 참조
    pub fn config(&self) -> &ChunkConfig {
        &self.config
    }

    /// 윈도우 끝 조정
    ///
    /// 단어를 가르는 경우에만 직전 공백 뒤로 당깁니다. 당긴 윈도우도
    /// 오버랩보다 길어야 하므로 `start + overlap` 이하로는 내려가지 않습니다.
    fn adjust_end(&self, chars: &[char], start: usize, hard_end: usize) -> usize {
        if chars[hard_end - 1].is_whitespace() || chars[hard_end].is_whitespace() {
            return hard_end;
        }

        let floor = (start + self.config.chunk_overlap + 1)
            .max(hard_end.saturating_sub(self.config.boundary_lookback));

        (floor..hard_end)
            .rev()
            .find(|&p| chars[p - 1].is_whitespace())
            .unwrap_or(hard_end)
    }
}

impl Chunker for SlidingWindowChunker {
    fn chunk(&self, text: &str, page_number: u32) -> ChunkedPage {
        let mut page = ChunkedPage::default();
        if text.trim().is_empty() {
            return page;
        }

        let chars: Vec<char> = text.chars().collect();
        // 문자 인덱스 -> 바이트 오프셋 (마지막 원소는 text.len())
        let offsets: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let total = chars.len();

        let mut start = 0;
        loop {
            let hard_end = (start + self.config.chunk_size).min(total);
            let end = if hard_end < total {
                self.adjust_end(&chars, start, hard_end)
            } else {
                total
            };

            let window = &text[offsets[start]..offsets[end]];
            if window.trim().chars().count() >= self.config.min_content_length {
                page.chunks.push(ChunkDraft {
                    page_number,
                    text: window.to_string(),
                    start_offset: offsets[start],
                    end_offset: offsets[end],
                });
            } else {
                page.dropped += 1;
            }

            if end >= total {
                break;
            }
            start = end - self.config.chunk_overlap;
        }

        page
    }

    fn name(&self) -> &'static str {
        "SlidingWindowChunker"
    }
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 엔진 설정에서 청커 생성
pub fn chunker_from_config(config: &EngineConfig) -> Result<Box<dyn Chunker>> {
    Ok(Box::new(SlidingWindowChunker::new(ChunkConfig::from(config))?))
}

// ============================================================================
// Tests
// ============================================================================
