//! 임베더 풀 - 동시 임베딩 실행
//!
//! 텍스트마다 tokio 태스크를 띄우고 세마포어로 동시 실행 수를 제한합니다.
//! 결과는 입력 순서대로 재조립됩니다.

use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;

use crate::error::{RagError, Result};

use super::EmbeddingProvider;

/// 동시 실행 제한이 있는 임베더 풀
pub struct EmbedderPool {
    embedder: Arc<dyn EmbeddingProvider>,
    semaphore: Arc<Semaphore>,
    max_concurrent: usize,
}

impl EmbedderPool {
    /// 풀 생성 (`max_concurrent`는 최소 1)
    pub fn new(embedder: Arc<dyn EmbeddingProvider>, max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            embedder,
            semaphore: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// 내부 임베더
    pub fn embedder(&self) -> Arc<dyn EmbeddingProvider> {
        Arc::clone(&self.embedder)
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// 전체 텍스트 임베딩 (입력 순서 유지, 텍스트별 결과)
    pub async fn embed_all(&self, texts: Vec<String>) -> Vec<Result<Vec<f32>>> {
        let total = texts.len();

        let handles: Vec<_> = texts
            .into_iter()
            .enumerate()
            .map(|(i, text)| {
                let embedder = Arc::clone(&self.embedder);
                let semaphore = Arc::clone(&self.semaphore);
                tokio::spawn(async move {
                    let _permit = semaphore.acquire_owned().await.map_err(|e| {
                        RagError::embedding(embedder.name(), format!("semaphore error: {}", e))
                    })?;
                    tracing::debug!("Embedding batch {}/{}", i + 1, total);
                    embedder.embed(&text).await
                })
            })
            .collect();

        join_all(handles)
            .await
            .into_iter()
            .map(|joined| {
                joined.unwrap_or_else(|e| {
                    Err(RagError::embedding(
                        self.embedder.name(),
                        format!("embedding task failed: {}", e),
                    ))
                })
            })
            .collect()
    }
}
