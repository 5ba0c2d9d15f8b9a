//! Google Gemini 임베딩
//!
//! ref: https://ai.google.dev/gemini-api/docs/embeddings
//!
//! 무료 티어 60 RPM 제한을 지키기 위한 rate limiter와 429 지수 백오프를 포함합니다.
//! 출력 벡터는 L2 정규화하여 로컬 임베딩과 같은 거리 척도를 사용합니다.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{RagError, Result};
use crate::knowledge::l2_normalize;
use crate::knowledge::text::normalize_query;

use super::EmbeddingProvider;

/// Gemini 임베딩 API 엔드포인트 (gemini-embedding-001 - MRL 지원)
const GEMINI_EMBED_URL: &str =
    "https://generativelanguage.googleapis.com/v1beta/models/gemini-embedding-001:embedContent";

const MODEL_NAME: &str = "gemini-embedding-001";

/// 지원 차원
pub const GEMINI_DIMENSIONS: [usize; 3] = [768, 1536, 3072];

/// 모델 입력 한도 (2048 토큰, 보수적으로 문자 수로 환산)
pub const MAX_INPUT_CHARS: usize = 8000;

/// Rate Limiter 설정 (Gemini 무료 티어: 60 RPM)
const RATE_LIMIT_RPM: usize = 60;
const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);
const MIN_DELAY: Duration = Duration::from_millis(1000);
/// 429 에러 시 최대 재시도 횟수
const MAX_RETRIES: u32 = 3;
const INITIAL_BACKOFF_MS: u64 = 2000;

// ============================================================================
// Rate Limiter
// ============================================================================

/// 슬라이딩 윈도우 + 최소 간격 rate limiter
#[derive(Debug)]
struct RateLimiter {
    requests: Vec<Instant>,
    max_requests: usize,
    window: Duration,
    min_delay: Duration,
    last_request: Option<Instant>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration, min_delay: Duration) -> Self {
        Self {
            requests: Vec::new(),
            max_requests,
            window,
            min_delay,
            last_request: None,
        }
    }

    /// 다음 요청까지 대기해야 하는 시간
    fn wait_time(&mut self, now: Instant) -> Duration {
        self.requests.retain(|&t| now.duration_since(t) < self.window);

        let gap = self
            .last_request
            .map(|last| self.min_delay.saturating_sub(now.duration_since(last)))
            .unwrap_or_default();

        let window_wait = if self.requests.len() >= self.max_requests {
            self.requests
                .first()
                .map(|&oldest| self.window.saturating_sub(now.duration_since(oldest)))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };

        gap.max(window_wait)
    }

    fn record(&mut self, at: Instant) {
        self.requests.push(at);
        self.last_request = Some(at);
    }

    async fn acquire(&mut self) {
        let wait = self.wait_time(Instant::now());
        if !wait.is_zero() {
            tracing::debug!("Rate limit: waiting {:?}", wait);
            tokio::time::sleep(wait).await;
        }
        self.record(Instant::now());
    }
}

// ============================================================================
// GeminiEmbedding
// ============================================================================

/// Google Gemini 임베딩 구현체
#[derive(Debug)]
pub struct GeminiEmbedding {
    api_key: String,
    client: reqwest::Client,
    dimension: usize,
    max_input_chars: usize,
    rate_limiter: Arc<Mutex<RateLimiter>>,
}

impl GeminiEmbedding {
    /// 차원을 지정하여 생성 (768, 1536, 3072 중 선택)
    pub fn with_dimension(api_key: String, dimension: usize) -> Result<Self> {
        if !GEMINI_DIMENSIONS.contains(&dimension) {
            return Err(RagError::InvalidConfig(format!(
                "Invalid Gemini dimension: {}. Must be 768, 1536, or 3072",
                dimension
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RagError::InvalidConfig(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            api_key,
            client,
            dimension,
            max_input_chars: MAX_INPUT_CHARS,
            rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
                RATE_LIMIT_RPM,
                RATE_LIMIT_WINDOW,
                MIN_DELAY,
            ))),
        })
    }

    /// 최대 입력 길이 지정 (모델 한도를 넘을 수 없음)
    pub fn with_max_input_chars(mut self, max_input_chars: usize) -> Self {
        self.max_input_chars = max_input_chars.min(MAX_INPUT_CHARS);
        self
    }

    pub fn max_input_chars(&self) -> usize {
        self.max_input_chars
    }

    /// 환경변수에서 API 키를 읽어 생성
    pub fn from_env_with_dimension(dimension: usize) -> Result<Self> {
        Self::with_dimension(get_api_key()?, dimension)
    }

    fn failure(message: impl Into<String>) -> RagError {
        RagError::embedding(MODEL_NAME, message)
    }

    fn backoff(attempt: u32) -> Duration {
        Duration::from_millis(INITIAL_BACKOFF_MS * 2u64.pow(attempt))
    }
}

/// Gemini API 요청 본문
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'static str,
    content: EmbedContent<'a>,
    task_type: &'static str,
    output_dimensionality: usize,
}

#[derive(Debug, Serialize)]
struct EmbedContent<'a> {
    parts: [EmbedPart<'a>; 1],
}

#[derive(Debug, Serialize)]
struct EmbedPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Debug, Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct GeminiError {
    error: GeminiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct GeminiErrorDetail {
    message: String,
    #[serde(default)]
    status: String,
}

#[async_trait]
impl EmbeddingProvider for GeminiEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let normalized = normalize_query(text);
        if normalized.is_empty() {
            return Err(Self::failure("text is empty"));
        }
        let length = normalized.chars().count();
        if length > self.max_input_chars {
            return Err(Self::failure(format!(
                "text too long: {} chars (max {})",
                length, self.max_input_chars
            )));
        }

        // 질의와 청크가 같은 공간을 공유하도록 대칭 태스크 사용
        let request = EmbedRequest {
            model: "models/gemini-embedding-001",
            content: EmbedContent {
                parts: [EmbedPart { text: &normalized }],
            },
            task_type: "SEMANTIC_SIMILARITY",
            output_dimensionality: self.dimension,
        };

        let mut last_error = Self::failure(format!("failed after {} retries", MAX_RETRIES));

        for attempt in 0..=MAX_RETRIES {
            self.rate_limiter.lock().await.acquire().await;

            // API 키는 URL이 아닌 헤더로 전송
            let response = match self
                .client
                .post(GEMINI_EMBED_URL)
                .header("x-goog-api-key", &self.api_key)
                .json(&request)
                .send()
                .await
            {
                Ok(resp) => resp,
                Err(e) => {
                    last_error = Self::failure(format!("request failed: {}", e));
                    if attempt < MAX_RETRIES {
                        tracing::warn!(
                            "Embedding request failed, retrying in {:?} (attempt {}/{})",
                            Self::backoff(attempt),
                            attempt + 1,
                            MAX_RETRIES
                        );
                        tokio::time::sleep(Self::backoff(attempt)).await;
                    }
                    continue;
                }
            };

            let status = response.status();
            let body = response
                .text()
                .await
                .map_err(|e| Self::failure(format!("failed to read response: {}", e)))?;

            if status.is_success() {
                let parsed: EmbedResponse = serde_json::from_str(&body)
                    .map_err(|e| Self::failure(format!("invalid response: {}", e)))?;
                let mut values = parsed.embedding.values;
                if values.len() != self.dimension {
                    return Err(Self::failure(format!(
                        "expected {} values, got {}",
                        self.dimension,
                        values.len()
                    )));
                }
                l2_normalize(&mut values);
                return Ok(values);
            }

            if status.as_u16() == 429 {
                last_error = Self::failure("rate limit exceeded (429)");
                if attempt < MAX_RETRIES {
                    tracing::warn!(
                        "Rate limit hit (429), backing off {:?} (attempt {}/{})",
                        Self::backoff(attempt),
                        attempt + 1,
                        MAX_RETRIES
                    );
                    tokio::time::sleep(Self::backoff(attempt)).await;
                }
                continue;
            }

            // 그 외 에러는 즉시 실패
            let message = match serde_json::from_str::<GeminiError>(&body) {
                Ok(error) => format!("{} ({})", error.error.message, error.error.status),
                Err(_) => format!("HTTP {}: {}", status, body),
            };
            return Err(Self::failure(message));
        }

        Err(last_error)
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        MODEL_NAME
    }
}

// ============================================================================
// API Key Management
// ============================================================================

/// API 키 로드
///
/// 우선순위:
/// 1. `GEMINI_API_KEY` 환경변수
/// 2. `GOOGLE_AI_API_KEY` 환경변수
pub fn get_api_key() -> Result<String> {
    for name in ["GEMINI_API_KEY", "GOOGLE_AI_API_KEY"] {
        if let Ok(key) = std::env::var(name) {
            if !key.is_empty() {
                tracing::debug!("Using API key from {}", name);
                return Ok(key);
            }
        }
    }

    Err(RagError::InvalidConfig(
        "API key not found. Set GEMINI_API_KEY or GOOGLE_AI_API_KEY environment variable."
            .to_string(),
    ))
}

/// API 키 존재 여부 확인
pub fn has_api_key() -> bool {
    get_api_key().is_ok()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_dimension() {
        let result = GeminiEmbedding::with_dimension("fake_key".to_string(), 999);
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_valid_dimensions() {
        for dim in GEMINI_DIMENSIONS {
            let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), dim).unwrap();
            assert_eq!(embedder.dimension(), dim);
        }
    }

    #[tokio::test]
    async fn test_empty_text_fails_without_request() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 768).unwrap();
        let result = embedder.embed("  \n ").await;
        assert!(matches!(result, Err(RagError::EmbeddingFailure { .. })));
    }

    #[tokio::test]
    async fn test_too_long_text_fails_without_request() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 768).unwrap();
        let long = "word ".repeat(MAX_INPUT_CHARS);
        assert!(embedder.embed(&long).await.is_err());
    }

    #[tokio::test]
    async fn test_configured_input_limit() {
        let embedder = GeminiEmbedding::with_dimension("fake_key".to_string(), 768)
            .unwrap()
            .with_max_input_chars(20);
        assert_eq!(embedder.max_input_chars(), 20);

        let result = embedder.embed("twenty one characters").await;
        assert!(matches!(result, Err(RagError::EmbeddingFailure { .. })));

        // 모델 한도 이상으로는 늘어나지 않음
        let capped = GeminiEmbedding::with_dimension("fake_key".to_string(), 768)
            .unwrap()
            .with_max_input_chars(MAX_INPUT_CHARS * 4);
        assert_eq!(capped.max_input_chars(), MAX_INPUT_CHARS);
    }

    #[test]
    fn test_rate_limiter_min_delay() {
        let mut limiter = RateLimiter::new(60, Duration::from_secs(60), Duration::from_secs(1));
        let start = Instant::now();
        assert_eq!(limiter.wait_time(start), Duration::ZERO);

        limiter.record(start);
        let wait = limiter.wait_time(start + Duration::from_millis(400));
        assert_eq!(wait, Duration::from_millis(600));
    }

    #[test]
    fn test_rate_limiter_window() {
        let mut limiter = RateLimiter::new(2, Duration::from_secs(10), Duration::ZERO);
        let start = Instant::now();
        limiter.record(start);
        limiter.record(start + Duration::from_secs(1));

        let wait = limiter.wait_time(start + Duration::from_secs(2));
        assert_eq!(wait, Duration::from_secs(8));

        // 윈도우가 지나면 대기 없음
        assert_eq!(limiter.wait_time(start + Duration::from_secs(12)), Duration::ZERO);
    }

    #[test]
    fn test_backoff_grows() {
        assert_eq!(GeminiEmbedding::backoff(0), Duration::from_millis(2000));
        assert_eq!(GeminiEmbedding::backoff(2), Duration::from_millis(8000));
    }
}
