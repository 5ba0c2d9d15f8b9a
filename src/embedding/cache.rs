//! 임베딩 캐시 - 반복 임베딩 호출 제거
//!
//! 텍스트의 SHA-256 다이제스트를 키로 사용합니다. 용량을 넘으면 가장 오래
//! 접근하지 않은 10%를 제거합니다. 실패한 임베딩은 캐시하지 않습니다.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::RwLock;

use crate::error::Result;

use super::EmbeddingProvider;

/// 기본 최대 캐시 항목 수
const DEFAULT_CACHE_SIZE: usize = 10_000;

type CacheKey = [u8; 32];

#[derive(Debug, Clone)]
struct CacheEntry {
    vector: Vec<f32>,
    last_access: u64,
}

/// 캐시 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// 캐시 래퍼 프로바이더
pub struct CachedEmbedding {
    inner: Arc<dyn EmbeddingProvider>,
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
    max_size: usize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl CachedEmbedding {
    /// 기본 용량으로 생성
    pub fn new(inner: Arc<dyn EmbeddingProvider>) -> Self {
        Self::with_capacity(inner, DEFAULT_CACHE_SIZE)
    }

    /// 용량을 지정하여 생성
    pub fn with_capacity(inner: Arc<dyn EmbeddingProvider>, max_size: usize) -> Self {
        Self {
            inner,
            entries: RwLock::new(HashMap::new()),
            max_size: max_size.max(1),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// 현재 통계
    pub async fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self.entries.read().await.len(),
        }
    }

    fn key(text: &str) -> CacheKey {
        let mut key = [0u8; 32];
        key.copy_from_slice(&Sha256::digest(text.as_bytes()));
        key
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn evict_oldest(&self, entries: &mut HashMap<CacheKey, CacheEntry>) {
        let evict_count = (self.max_size / 10).max(1);

        let mut by_age: Vec<(CacheKey, u64)> = entries
            .iter()
            .map(|(key, entry)| (*key, entry.last_access))
            .collect();
        by_age.sort_unstable_by_key(|(_, access)| *access);

        for (key, _) in by_age.into_iter().take(evict_count) {
            entries.remove(&key);
        }
        self.evictions.fetch_add(evict_count as u64, Ordering::Relaxed);
        tracing::debug!("Evicted {} cached embeddings", evict_count);
    }
}

#[async_trait]
impl EmbeddingProvider for CachedEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = Self::key(text);

        {
            let mut entries = self.entries.write().await;
            if let Some(entry) = entries.get_mut(&key) {
                entry.last_access = self.tick();
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(entry.vector.clone());
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        let vector = self.inner.embed(text).await?;

        let mut entries = self.entries.write().await;
        if entries.len() >= self.max_size && !entries.contains_key(&key) {
            self.evict_oldest(&mut entries);
        }
        entries.insert(
            key,
            CacheEntry {
                vector: vector.clone(),
                last_access: self.tick(),
            },
        );

        Ok(vector)
    }

    fn dimension(&self) -> usize {
        self.inner.dimension()
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}
