//! Knowledge Store - 메모리 문서/청크 레지스트리
//!
//! 문서와 청크를 소유합니다. 벡터는 `VectorIndex`가 chunk_id로 보관하며,
//! 저장소는 텍스트와 메타데이터만 가집니다.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

use super::chunker::ChunkDraft;

// ============================================================================
// Identifiers
// ============================================================================

/// 문서 ID (호출자가 지정)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for DocumentId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for DocumentId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// 청크 ID (인덱스 안에서 유일, 저장소가 발급)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChunkId(u64);

impl ChunkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

// ============================================================================
// Types
// ============================================================================

/// 문서 페이지
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 페이지 번호 (1부터)
    pub number: u32,
    /// 정규화된 페이지 텍스트
    pub text: String,
}

impl Page {
    pub fn new(number: u32, text: impl Into<String>) -> Self {
        Self {
            number,
            text: text.into(),
        }
    }
}

/// 저장된 문서 (수집 후 불변)
#[derive(Debug, Clone, Serialize)]
pub struct Document {
    pub id: DocumentId,
    pub source_name: String,
    pub pages: Vec<Page>,
    pub ingested_at: DateTime<Utc>,
}

/// 저장된 청크
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub page_number: u32,
    pub text: String,
    /// 페이지 텍스트 내 시작 바이트 오프셋
    pub start_offset: usize,
    /// 페이지 텍스트 내 끝 바이트 오프셋 (exclusive)
    pub end_offset: usize,
}

/// 문서 목록 항목
#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub id: DocumentId,
    pub source_name: String,
    pub page_count: usize,
    pub chunk_count: usize,
    pub ingested_at: DateTime<Utc>,
}

/// 저장소 통계
#[derive(Debug, Clone, Default, Serialize)]
pub struct StoreStats {
    pub document_count: usize,
    pub chunk_count: usize,
    pub total_content_bytes: usize,
}

// ============================================================================
// KnowledgeStore
// ============================================================================

#[derive(Debug)]
struct StoredDocument {
    document: Document,
    chunk_ids: Vec<ChunkId>,
}

#[derive(Debug, Default)]
struct StoreInner {
    documents: HashMap<DocumentId, StoredDocument>,
    chunks: HashMap<ChunkId, Arc<Chunk>>,
}

/// Knowledge Store - 메모리 문서 저장소
#[derive(Debug, Default)]
pub struct KnowledgeStore {
    inner: RwLock<StoreInner>,
    next_chunk_id: AtomicU64,
}

impl KnowledgeStore {
    /// 빈 저장소 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 문서 존재 여부
    pub fn contains(&self, id: &DocumentId) -> bool {
        self.read().documents.contains_key(id)
    }

    /// 초안에 청크 ID 부여
    pub fn assign_ids(&self, document_id: &DocumentId, drafts: Vec<ChunkDraft>) -> Vec<Chunk> {
        drafts
            .into_iter()
            .map(|draft| Chunk {
                id: ChunkId(self.next_chunk_id.fetch_add(1, Ordering::Relaxed)),
                document_id: document_id.clone(),
                page_number: draft.page_number,
                text: draft.text,
                start_offset: draft.start_offset,
                end_offset: draft.end_offset,
            })
            .collect()
    }

    /// 문서와 청크 저장
    ///
    /// 같은 ID의 문서가 이미 있으면 `DuplicateDocument`. 문서는 교체되지 않습니다.
    pub fn insert(&self, document: Document, chunks: Vec<Chunk>) -> Result<()> {
        let mut inner = self.write();

        if inner.documents.contains_key(&document.id) {
            return Err(RagError::DuplicateDocument(document.id));
        }

        let chunk_ids = chunks.iter().map(|c| c.id).collect();
        for chunk in chunks {
            inner.chunks.insert(chunk.id, Arc::new(chunk));
        }

        tracing::debug!("Stored document: {} ({})", document.id, document.source_name);
        inner.documents.insert(
            document.id.clone(),
            StoredDocument {
                document,
                chunk_ids,
            },
        );

        Ok(())
    }

    /// 문서와 소속 청크 삭제, 삭제된 청크 ID 반환 (없으면 None)
    pub fn remove(&self, id: &DocumentId) -> Option<Vec<ChunkId>> {
        let mut inner = self.write();
        let stored = inner.documents.remove(id)?;

        for chunk_id in &stored.chunk_ids {
            inner.chunks.remove(chunk_id);
        }

        Some(stored.chunk_ids)
    }

    /// 청크와 소속 문서의 출처 이름을 함께 조회
    pub fn resolve(&self, id: ChunkId) -> Option<(Arc<Chunk>, String)> {
        let inner = self.read();
        let chunk = inner.chunks.get(&id)?;
        let document = inner.documents.get(&chunk.document_id)?;
        Some((Arc::clone(chunk), document.document.source_name.clone()))
    }

    /// 문서 조회
    pub fn document(&self, id: &DocumentId) -> Option<Document> {
        self.read().documents.get(id).map(|s| s.document.clone())
    }

    /// 문서의 청크 목록 (페이지/오프셋 순)
    pub fn chunks_of(&self, id: &DocumentId) -> Vec<Arc<Chunk>> {
        let inner = self.read();
        inner
            .documents
            .get(id)
            .map(|stored| {
                stored
                    .chunk_ids
                    .iter()
                    .filter_map(|chunk_id| inner.chunks.get(chunk_id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// 문서 목록 (ID 순)
    pub fn list_documents(&self) -> Vec<DocumentSummary> {
        let inner = self.read();
        let mut docs: Vec<DocumentSummary> = inner
            .documents
            .values()
            .map(|stored| DocumentSummary {
                id: stored.document.id.clone(),
                source_name: stored.document.source_name.clone(),
                page_count: stored.document.pages.len(),
                chunk_count: stored.chunk_ids.len(),
                ingested_at: stored.document.ingested_at,
            })
            .collect();
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        docs
    }

    /// 통계
    pub fn stats(&self) -> StoreStats {
        let inner = self.read();
        StoreStats {
            document_count: inner.documents.len(),
            chunk_count: inner.chunks.len(),
            total_content_bytes: inner
                .documents
                .values()
                .flat_map(|s| s.document.pages.iter())
                .map(|p| p.text.len())
                .sum(),
        }
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ============================================================================
// Tests
// ============================================================================
