//! Retriever - 질의 임베딩 → 벡터 검색 → 임계값 필터 → 청크 해석
//!
//! 인덱스와 저장소의 일관성은 삭제 구간이 끝난 뒤에 맞춰집니다. 검색 도중
//! 삭제된 청크 ID는 저장소에서 해석되지 않으므로 조용히 건너뜁니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::store::{Chunk, KnowledgeStore};
use super::text::normalize_query;
use super::vector::{similarity_from_distance, VectorIndex};

// ============================================================================
// Types
// ============================================================================

/// 검색 후보
#[derive(Debug, Clone)]
pub struct QueryCandidate {
    /// 해석된 청크
    pub chunk: Arc<Chunk>,
    /// 소속 문서의 출처 이름
    pub source_name: String,
    /// 제곱 L2 거리
    pub distance: f32,
    /// `1 - distance / 2` (단위 벡터에서는 코사인 유사도)
    pub similarity: f32,
}

// ============================================================================
// Retriever
// ============================================================================

/// 벡터 검색기
pub struct Retriever {
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    store: Arc<KnowledgeStore>,
}

impl Retriever {
    pub fn new(
        embedder: Arc<dyn EmbeddingProvider>,
        index: Arc<dyn VectorIndex>,
        store: Arc<KnowledgeStore>,
    ) -> Self {
        Self {
            embedder,
            index,
            store,
        }
    }

    /// 질의에 대한 후보 검색 (거리 오름차순)
    ///
    /// # Arguments
    /// * `query` - 질의 텍스트
    /// * `top_k` - 최대 후보 수 (> 0)
    /// * `threshold` - 최소 유사도 ([0, 1])
    ///
    /// # Errors
    /// - 정규화 후 빈 질의: `EmptyQuery`
    /// - 잘못된 `top_k` / `threshold`: `InvalidConfig`
    /// - 질의 임베딩 실패: `EmbeddingFailure`
    /// - 질의 벡터 차원 불일치: `DimensionMismatch`
    pub async fn retrieve(
        &self,
        query: &str,
        top_k: usize,
        threshold: f32,
    ) -> Result<Vec<QueryCandidate>> {
        let query = normalize_query(query);
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if top_k == 0 {
            return Err(RagError::InvalidConfig(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&threshold) {
            return Err(RagError::InvalidConfig(format!(
                "similarity threshold must be within [0, 1], got {}",
                threshold
            )));
        }

        // 1. 질의 임베딩
        let vector = self.embedder.embed(&query).await?;

        // 2. 정확한 k-NN 검색
        let hits = self.index.search(&vector, top_k)?;
        let hit_count = hits.len();

        // 3~5. 임계값 필터, 저장소 해석 (순서 유지)
        let mut candidates = Vec::with_capacity(hit_count);
        for hit in hits {
            let similarity = similarity_from_distance(hit.distance);
            if similarity < threshold {
                continue;
            }

            match self.store.resolve(hit.chunk_id) {
                Some((chunk, source_name)) => candidates.push(QueryCandidate {
                    chunk,
                    source_name,
                    distance: hit.distance,
                    similarity,
                }),
                None => {
                    tracing::debug!("Skipping unresolved chunk id: {}", hit.chunk_id);
                }
            }
        }

        tracing::debug!(
            "Retrieved {} candidates ({} hits, threshold {:.2})",
            candidates.len(),
            hit_count,
            threshold
        );

        Ok(candidates)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashEmbedding;
    use crate::knowledge::chunker::ChunkDraft;
    use crate::knowledge::store::{Document, DocumentId, Page};
    use crate::knowledge::vector::FlatIndex;

    const DIM: usize = 64;

    struct Fixture {
        retriever: Retriever,
        embedder: Arc<HashEmbedding>,
        index: Arc<FlatIndex>,
        store: Arc<KnowledgeStore>,
    }

    fn fixture() -> Fixture {
        fixture_with_dim(DIM)
    }

    fn fixture_with_dim(dim: usize) -> Fixture {
        let embedder = Arc::new(HashEmbedding::new(dim).unwrap());
        let index = Arc::new(FlatIndex::new(dim).unwrap());
        let store = Arc::new(KnowledgeStore::new());
        let retriever = Retriever::new(embedder.clone(), index.clone(), store.clone());
        Fixture {
            retriever,
            embedder,
            index,
            store,
        }
    }

    /// 한 페이지, 한 청크짜리 문서를 저장소와 인덱스에 넣음
    fn add(fx: &Fixture, id: &str, text: &str) -> crate::knowledge::ChunkId {
        let doc_id = DocumentId::from(id);
        let chunks = fx.store.assign_ids(
            &doc_id,
            vec![ChunkDraft {
                page_number: 1,
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
            }],
        );
        let chunk_id = chunks[0].id;
        fx.index
            .add(chunk_id, &fx.embedder.embed_text(text).unwrap())
            .unwrap();
        fx.store
            .insert(
                Document {
                    id: doc_id,
                    source_name: format!("{}.txt", id),
                    pages: vec![Page::new(1, text)],
                    ingested_at: chrono::Utc::now(),
                },
                chunks,
            )
            .unwrap();
        chunk_id
    }

    #[tokio::test]
    async fn test_empty_query() {
        let fx = fixture();
        assert!(matches!(
            fx.retriever.retrieve("  \n ", 5, 0.3).await,
            Err(RagError::EmptyQuery)
        ));
    }

    #[tokio::test]
    async fn test_invalid_parameters() {
        let fx = fixture();
        assert!(fx.retriever.retrieve("rate", 0, 0.3).await.is_err());
        assert!(fx.retriever.retrieve("rate", 5, 1.5).await.is_err());
        assert!(fx.retriever.retrieve("rate", 5, -0.1).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_index_returns_nothing() {
        let fx = fixture();
        assert!(fx.retriever.retrieve("rate", 5, 0.0).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_ranked_ascending_distance() {
        let fx = fixture();
        add(&fx, "loan", "The loan bears interest at a fixed annual rate of 6.75%.");
        add(&fx, "fruit", "Bananas grow in tropical climates near the equator.");

        let candidates = fx
            .retriever
            .retrieve("What is the interest rate?", 5, 0.0)
            .await
            .unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].chunk.document_id.as_str(), "loan");
        assert_eq!(candidates[0].source_name, "loan.txt");
        assert!(candidates[0].distance <= candidates[1].distance);
        assert!(candidates[0].similarity >= candidates[1].similarity);
    }

    #[tokio::test]
    async fn test_threshold_filters() {
        let fx = fixture();
        add(&fx, "loan", "The loan bears interest at a fixed annual rate of 6.75%.");

        // 정확히 같은 텍스트는 유사도 1.0
        let exact = fx
            .retriever
            .retrieve("The loan bears interest at a fixed annual rate of 6.75%.", 5, 1.0)
            .await
            .unwrap();
        assert_eq!(exact.len(), 1);

        let filtered = fx
            .retriever
            .retrieve("Bananas grow near the equator", 5, 1.0)
            .await
            .unwrap();
        assert!(filtered.is_empty());
    }

    #[tokio::test]
    async fn test_default_threshold_drops_unrelated() {
        let fx = fixture_with_dim(384);
        add(&fx, "loan", "The loan bears interest at a fixed annual rate of 6.75%.");
        add(&fx, "fruit", "Bananas grow in tropical climates near the equator.");

        let candidates = fx
            .retriever
            .retrieve("What is the interest rate?", 5, 0.3)
            .await
            .unwrap();
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].chunk.document_id.as_str(), "loan");
        assert!(candidates[0].similarity >= 0.3);

        let unrelated = fx
            .retriever
            .retrieve("quantum chromodynamics gluon", 5, 0.3)
            .await
            .unwrap();
        assert!(unrelated.is_empty());
    }

    #[tokio::test]
    async fn test_unresolved_ids_skipped() {
        let fx = fixture();
        let chunk_id = add(&fx, "loan", "The loan bears interest at a fixed annual rate.");

        // 저장소에서만 삭제 (삭제 경합 상황)
        fx.store.remove(&DocumentId::from("loan"));
        assert!(fx.index.contains(chunk_id));

        let candidates = fx.retriever.retrieve("interest rate", 5, 0.0).await.unwrap();
        assert!(candidates.is_empty());
    }

    #[tokio::test]
    async fn test_dimension_mismatch() {
        let fx = fixture();
        let wrong = Arc::new(HashEmbedding::new(DIM * 2).unwrap());
        let retriever = Retriever::new(wrong, fx.index.clone(), fx.store.clone());

        assert!(matches!(
            retriever.retrieve("interest rate", 5, 0.3).await,
            Err(RagError::DimensionMismatch { .. })
        ));
    }
}
