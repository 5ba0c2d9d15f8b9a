//! Answer Engine - 수집과 질의를 묶는 파사드
//!
//! ## 수집
//! 페이지 정규화 → 청킹 → 병렬 임베딩 → (쓰기 게이트) 인덱스 + 저장소 반영
//!
//! ## 질의
//! Retriever → Synthesizer → 인용이 포함된 `Answer`
//!
//! 수집 반영과 문서 삭제는 엔진 수준의 쓰기 게이트로 직렬화됩니다. 검색은
//! 게이트를 잡지 않으며, 인덱스의 읽기/쓰기 잠금만으로 보호됩니다.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;

use crate::config::EngineConfig;
use crate::embedding::{EmbedderPool, EmbeddingProvider};
use crate::error::{RagError, Result};

use super::chunker::{chunker_from_config, ChunkDraft, Chunker};
use super::retriever::Retriever;
use super::store::{Chunk, Document, DocumentId, DocumentSummary, KnowledgeStore, Page, StoreStats};
use super::synthesizer::{Answer, LexicalScorer, SentenceScorer, Synthesizer};
use super::text::normalize_text;
use super::vector::{FlatIndex, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 문서 수집 결과 (부분 성공 허용)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestReport {
    pub document_id: DocumentId,
    /// 인덱스에 반영된 청크 수
    pub chunks_indexed: usize,
    /// 최소 길이 미달로 버려진 청크 수
    pub chunks_dropped: usize,
    /// 임베딩 실패로 건너뛴 청크 수
    pub chunks_failed: usize,
}

/// 엔진 통계
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    #[serde(flatten)]
    pub store: StoreStats,
    pub indexed_vectors: usize,
    pub embedder: String,
    pub dimension: usize,
}

// ============================================================================
// AnswerEngine
// ============================================================================

/// 인용 답변 엔진
pub struct AnswerEngine {
    config: EngineConfig,
    store: Arc<KnowledgeStore>,
    index: Arc<dyn VectorIndex>,
    pool: EmbedderPool,
    chunker: Box<dyn Chunker>,
    retriever: Retriever,
    synthesizer: Synthesizer,
    write_gate: Mutex<()>,
}

impl AnswerEngine {
    /// 기본 구성 (FlatIndex + LexicalScorer)
    ///
    /// 설정이 잘못되었거나 임베더 차원이 `embedding_dim`과 다르면 에러입니다.
    pub fn new(config: EngineConfig, embedder: Arc<dyn EmbeddingProvider>) -> Result<Self> {
        let index = Arc::new(FlatIndex::new(config.embedding_dim)?);
        Self::with_components(config, embedder, index, Box::new(LexicalScorer))
    }

    /// 인덱스와 문장 점수기를 지정하여 생성
    pub fn with_components(
        config: EngineConfig,
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        scorer: Box<dyn SentenceScorer>,
    ) -> Result<Self> {
        config.validate()?;

        if embedder.dimension() != config.embedding_dim {
            return Err(RagError::DimensionMismatch {
                expected: config.embedding_dim,
                actual: embedder.dimension(),
            });
        }
        if index.dimension() != config.embedding_dim {
            return Err(RagError::DimensionMismatch {
                expected: config.embedding_dim,
                actual: index.dimension(),
            });
        }

        let store = Arc::new(KnowledgeStore::new());
        let chunker = chunker_from_config(&config)?;
        let retriever = Retriever::new(Arc::clone(&embedder), Arc::clone(&index), Arc::clone(&store));
        let synthesizer = Synthesizer::new(scorer, config.max_sentences_per_source);
        let pool = EmbedderPool::new(embedder, config.embed_concurrency);

        tracing::info!(
            "Answer engine ready (embedder: {}, dimension: {}, concurrency: {}, chunker: {}, scorer: {})",
            pool.embedder().name(),
            config.embedding_dim,
            pool.max_concurrent(),
            chunker.name(),
            synthesizer.scorer_name()
        );

        Ok(Self {
            config,
            store,
            index,
            pool,
            chunker,
            retriever,
            synthesizer,
            write_gate: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 문서 수집
    ///
    /// 임베딩에 실패한 청크는 건너뛰고 개수만 보고합니다.
    ///
    /// # Errors
    /// - 빈 문서 ID: `InvalidDocument`
    /// - 이미 있는 문서 ID: `DuplicateDocument`
    pub async fn ingest(
        &self,
        document_id: impl Into<DocumentId>,
        source_name: impl Into<String>,
        pages: Vec<Page>,
    ) -> Result<IngestReport> {
        let document_id = document_id.into();
        let source_name = source_name.into();

        if document_id.as_str().trim().is_empty() {
            return Err(RagError::InvalidDocument(
                "document id must not be empty".to_string(),
            ));
        }
        if self.store.contains(&document_id) {
            return Err(RagError::DuplicateDocument(document_id));
        }

        // 1. 정규화 + 청킹
        let pages: Vec<Page> = pages
            .into_iter()
            .map(|page| Page::new(page.number, normalize_text(&page.text)))
            .collect();

        let mut drafts: Vec<ChunkDraft> = Vec::new();
        let mut dropped = 0;
        for page in &pages {
            let chunked = self.chunker.chunk(&page.text, page.number);
            dropped += chunked.dropped;
            drafts.extend(chunked.chunks);
        }

        if drafts.is_empty() {
            tracing::warn!("No chunks generated for document: {}", document_id);
        }

        // 2. 병렬 임베딩 (청크 순서 유지)
        let texts: Vec<String> = drafts.iter().map(|d| d.text.clone()).collect();
        let results = self.pool.embed_all(texts).await;

        let mut embedded_drafts = Vec::with_capacity(drafts.len());
        let mut vectors = Vec::with_capacity(drafts.len());
        let mut failed = 0;
        for (draft, result) in drafts.into_iter().zip(results) {
            match result {
                Ok(vector) => {
                    embedded_drafts.push(draft);
                    vectors.push(vector);
                }
                Err(e) => {
                    failed += 1;
                    tracing::warn!(
                        "Skipping chunk of {} (page {}, bytes {}..{}): {}",
                        document_id,
                        draft.page_number,
                        draft.start_offset,
                        draft.end_offset,
                        e
                    );
                }
            }
        }

        // 3. 반영 (쓰기 게이트)
        let chunks_indexed = {
            let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

            if self.store.contains(&document_id) {
                return Err(RagError::DuplicateDocument(document_id));
            }

            let chunks: Vec<Chunk> = self.store.assign_ids(&document_id, embedded_drafts);
            let entries: Vec<_> = chunks.iter().map(|c| c.id).zip(vectors).collect();
            self.index.add_batch(&entries)?;

            let document = Document {
                id: document_id.clone(),
                source_name: source_name.clone(),
                pages,
                ingested_at: Utc::now(),
            };
            let count = chunks.len();
            if let Err(e) = self.store.insert(document, chunks) {
                let ids: Vec<_> = entries.iter().map(|(id, _)| *id).collect();
                self.index.remove_many(&ids);
                return Err(e);
            }
            count
        };

        tracing::info!(
            "Ingested {} ({}): {} chunks indexed, {} dropped, {} failed",
            document_id,
            source_name,
            chunks_indexed,
            dropped,
            failed
        );

        Ok(IngestReport {
            document_id,
            chunks_indexed,
            chunks_dropped: dropped,
            chunks_failed: failed,
        })
    }

    /// 문서 삭제 (청크와 벡터 포함), 없으면 false
    pub fn remove_document(&self, document_id: &DocumentId) -> bool {
        let _gate = self.write_gate.lock().unwrap_or_else(PoisonError::into_inner);

        let Some(chunk_ids) = self.store.remove(document_id) else {
            return false;
        };
        let removed = self.index.remove_many(&chunk_ids);

        tracing::info!("Removed document {} ({} vectors)", document_id, removed);
        true
    }

    // ========================================================================
    // Query
    // ========================================================================

    /// 설정된 `top_k`와 임계값으로 답변
    pub async fn answer(&self, question: &str) -> Result<Answer> {
        self.answer_with(question, self.config.top_k, self.config.similarity_threshold)
            .await
    }

    /// `top_k`와 임계값을 지정하여 답변
    ///
    /// 관련 후보가 없으면 에러 대신 신뢰도 0의 빈 답변을 반환합니다.
    pub async fn answer_with(&self, question: &str, top_k: usize, threshold: f32) -> Result<Answer> {
        let candidates = self.retriever.retrieve(question, top_k, threshold).await?;
        let answer = self.synthesizer.synthesize(question, &candidates);

        tracing::info!(
            "Answered with {} citations from {} candidates (confidence {:.3})",
            answer.citations.len(),
            candidates.len(),
            answer.confidence
        );

        Ok(answer)
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// 문서 목록
    pub fn documents(&self) -> Vec<DocumentSummary> {
        self.store.list_documents()
    }

    pub fn document(&self, document_id: &DocumentId) -> Option<Document> {
        self.store.document(document_id)
    }

    /// 문서의 청크 목록
    pub fn chunks_of(&self, document_id: &DocumentId) -> Vec<Arc<Chunk>> {
        self.store.chunks_of(document_id)
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            store: self.store.stats(),
            indexed_vectors: self.index.len(),
            embedder: self.pool.embedder().name().to_string(),
            dimension: self.index.dimension(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
