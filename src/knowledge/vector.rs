//! Vector Index - 정확한 k-최근접 이웃 검색
//!
//! 청크 벡터를 연속 메모리(slab)에 저장하고, 질의마다 전체를 선형 스캔하여
//! 제곱 유클리드(L2) 거리로 정렬합니다. 코퍼스가 작으므로(<= ~10^5 청크)
//! 근사 검색 없이 정확한 결과를 반환합니다.
//!
//! 근사 인덱스(HNSW 등)는 같은 `VectorIndex` 트레이트 뒤에 교체할 수 있습니다.

use std::cmp::Ordering;
use std::collections::{BinaryHeap, HashMap};
use std::sync::{PoisonError, RwLock};

use crate::error::{RagError, Result};

use super::store::ChunkId;

// ============================================================================
// Types
// ============================================================================

/// 검색 결과 (chunk_id, 제곱 L2 거리)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub chunk_id: ChunkId,
    /// 제곱 L2 거리 (0 이상, 작을수록 유사)
    pub distance: f32,
}

// ============================================================================
// VectorIndex Trait
// ============================================================================

/// 벡터 인덱스 트레이트
///
/// 구현체는 읽기(`search`)를 동시에 허용하고, 쓰기(`add`/`remove`)는 배타적으로
/// 처리해야 합니다. 검색이 절반만 갱신된 벡터 집합을 보면 안 됩니다.
pub trait VectorIndex: Send + Sync {
    /// 벡터 차원
    fn dimension(&self) -> usize;

    /// 벡터 삽입 (같은 ID가 있으면 교체)
    fn add(&self, chunk_id: ChunkId, vector: &[f32]) -> Result<()>;

    /// 여러 벡터를 하나의 쓰기 구간에서 삽입
    ///
    /// 차원이 맞지 않는 벡터가 하나라도 있으면 아무것도 삽입하지 않습니다.
    fn add_batch(&self, entries: &[(ChunkId, Vec<f32>)]) -> Result<()>;

    /// 벡터 삭제 (없으면 무시), 삭제 여부 반환
    fn remove(&self, chunk_id: ChunkId) -> bool;

    /// 여러 벡터 삭제, 삭제된 개수 반환
    fn remove_many(&self, chunk_ids: &[ChunkId]) -> usize;

    /// 거리 오름차순 상위 k개 검색
    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>>;

    /// 저장된 벡터 수
    fn len(&self) -> usize;

    /// 비어있는지 여부
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// ID 존재 여부
    fn contains(&self, chunk_id: ChunkId) -> bool;
}

// ============================================================================
// FlatIndex
// ============================================================================

/// 연속 메모리 slab + 선형 스캔 인덱스
///
/// `vectors[slot * dim .. (slot + 1) * dim]`가 `ids[slot]`의 벡터입니다.
/// 삭제는 swap-remove로 slab을 빈틈없이 유지합니다.
#[derive(Debug)]
pub struct FlatIndex {
    dimension: usize,
    inner: RwLock<Slab>,
}

#[derive(Debug, Default)]
struct Slab {
    ids: Vec<ChunkId>,
    vectors: Vec<f32>,
    slots: HashMap<ChunkId, usize>,
}

impl Slab {
    fn upsert(&mut self, dim: usize, chunk_id: ChunkId, vector: &[f32]) {
        match self.slots.get(&chunk_id) {
            Some(&slot) => {
                self.vectors[slot * dim..(slot + 1) * dim].copy_from_slice(vector);
            }
            None => {
                self.slots.insert(chunk_id, self.ids.len());
                self.ids.push(chunk_id);
                self.vectors.extend_from_slice(vector);
            }
        }
    }

    fn remove(&mut self, dim: usize, chunk_id: ChunkId) -> bool {
        let Some(slot) = self.slots.remove(&chunk_id) else {
            return false;
        };

        let last = self.ids.len() - 1;
        if slot != last {
            let moved = self.ids[last];
            self.ids[slot] = moved;
            self.vectors.copy_within(last * dim..(last + 1) * dim, slot * dim);
            self.slots.insert(moved, slot);
        }
        self.ids.pop();
        self.vectors.truncate(last * dim);
        true
    }
}

/// 최대 힙 원소: 가장 먼 후보가 top
#[derive(Debug, PartialEq)]
struct Candidate(IndexHit);

impl Eq for Candidate {}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_hits(&self.0, &other.0)
    }
}

/// 거리 오름차순, 동률은 chunk_id 오름차순
fn compare_hits(a: &IndexHit, b: &IndexHit) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.chunk_id.cmp(&b.chunk_id))
}

impl FlatIndex {
    /// 차원을 지정하여 생성
    pub fn new(dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(RagError::InvalidConfig(
                "index dimension must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            dimension,
            inner: RwLock::new(Slab::default()),
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<()> {
        if vector.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// 저장된 벡터 복사본 조회
    #[cfg(test)]
    fn vector(&self, chunk_id: ChunkId) -> Option<Vec<f32>> {
        let slab = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        let slot = *slab.slots.get(&chunk_id)?;
        Some(slab.vectors[slot * self.dimension..(slot + 1) * self.dimension].to_vec())
    }
}

impl VectorIndex for FlatIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn add(&self, chunk_id: ChunkId, vector: &[f32]) -> Result<()> {
        self.check_dimension(vector)?;
        let mut slab = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        slab.upsert(self.dimension, chunk_id, vector);
        Ok(())
    }

    fn add_batch(&self, entries: &[(ChunkId, Vec<f32>)]) -> Result<()> {
        for (_, vector) in entries {
            self.check_dimension(vector)?;
        }

        let mut slab = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        for (chunk_id, vector) in entries {
            slab.upsert(self.dimension, *chunk_id, vector);
        }
        Ok(())
    }

    fn remove(&self, chunk_id: ChunkId) -> bool {
        let mut slab = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        slab.remove(self.dimension, chunk_id)
    }

    fn remove_many(&self, chunk_ids: &[ChunkId]) -> usize {
        let mut slab = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        chunk_ids
            .iter()
            .filter(|&&id| slab.remove(self.dimension, id))
            .count()
    }

    fn search(&self, query: &[f32], k: usize) -> Result<Vec<IndexHit>> {
        self.check_dimension(query)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let slab = self.inner.read().unwrap_or_else(PoisonError::into_inner);

        let mut heap: BinaryHeap<Candidate> = BinaryHeap::with_capacity(k + 1);
        for (slot, vector) in slab.vectors.chunks_exact(self.dimension).enumerate() {
            let hit = IndexHit {
                chunk_id: slab.ids[slot],
                distance: squared_l2(query, vector),
            };

            if heap.len() < k {
                heap.push(Candidate(hit));
            } else if let Some(worst) = heap.peek() {
                if compare_hits(&hit, &worst.0) == Ordering::Less {
                    heap.pop();
                    heap.push(Candidate(hit));
                }
            }
        }

        let mut hits: Vec<IndexHit> = heap.into_iter().map(|c| c.0).collect();
        hits.sort_by(compare_hits);
        Ok(hits)
    }

    fn len(&self) -> usize {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .ids
            .len()
    }

    fn contains(&self, chunk_id: ChunkId) -> bool {
        self.inner
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .slots
            .contains_key(&chunk_id)
    }
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 제곱 유클리드 거리
///
/// 길이가 다르면 짧은 쪽 기준으로 계산합니다 (호출 전에 차원을 검증할 것).
pub fn squared_l2(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// 거리 -> 유사도 변환: `1 - distance / 2`, [0, 1] 범위
///
/// 단위 벡터의 제곱 L2 거리는 `2 × (1 - cos)`이므로 결과는 코사인 유사도와
/// 같습니다. 직교(무관) 벡터는 0, 동일 벡터는 1, 음의 코사인은 0으로 잘립니다.
pub fn similarity_from_distance(distance: f32) -> f32 {
    let similarity = 1.0 - distance.max(0.0) / 2.0;
    if similarity.is_finite() {
        similarity.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// L2 정규화 (제로 벡터는 그대로)
pub fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for value in vector.iter_mut() {
            *value /= norm;
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
