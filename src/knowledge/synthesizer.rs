//! Synthesizer - 다중 문서 추출형 답변 합성
//!
//! 후보를 문서별로 묶어 문서마다 가장 가까운 청크 하나만 남기고, 그 청크에서
//! 질의와 관련된 문장을 골라 하나의 답변으로 잇습니다. 답변은 항상 원문
//! 부분 문자열로만 구성됩니다 (생성형 재작성 없음).
//!
//! ## 신뢰도
//! ```text
//! confidence = clamp(top × (0.7 + 0.3 × (1 − 0.5ⁿ)) × (1 − 0.5 × (top − worst)), 0, 1)
//! ```
//! - `top`: 최고 유사도
//! - `n`: 답변에 기여한 문서 수 (많을수록 상승, 체감)
//! - `top − worst`: 문서 간 유사도 격차 (클수록 하락)

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use serde::Serialize;

use super::retriever::QueryCandidate;
use super::store::{ChunkId, DocumentId};
use super::text::{content_terms, split_sentences, tokenize};

/// 문서 수 가중치의 하한
const CORROBORATION_BASE: f32 = 0.7;

/// 유사도 격차 감점 계수
const SPREAD_PENALTY: f32 = 0.5;

// ============================================================================
// Types
// ============================================================================

/// 인용 정보
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Citation {
    pub document_id: DocumentId,
    pub source_name: String,
    pub page_number: u32,
    /// 선택된 청크의 부분 문자열
    pub excerpt: String,
    pub chunk_id: ChunkId,
    pub similarity: f32,
}

/// 인용이 포함된 답변
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    pub text: String,
    /// 기여도 내림차순
    pub citations: Vec<Citation>,
    /// [0, 1]
    pub confidence: f32,
}

impl Answer {
    /// 관련 정보가 없을 때의 답변
    pub fn empty() -> Self {
        Self {
            text: String::new(),
            citations: Vec::new(),
            confidence: 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.citations.is_empty()
    }
}

// ============================================================================
// SentenceScorer Trait
// ============================================================================

/// 문장 관련도 점수 계산 트레이트
pub trait SentenceScorer: Send + Sync {
    /// 문장별 점수 (입력 순서, 0 이상, 높을수록 관련)
    fn score(&self, query: &str, sentences: &[&str]) -> Vec<f32>;

    fn name(&self) -> &'static str;
}

/// 어휘 겹침 점수: 질의 내용어 중 문장에 등장하는 비율
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalScorer;

impl SentenceScorer for LexicalScorer {
    fn score(&self, query: &str, sentences: &[&str]) -> Vec<f32> {
        let terms = content_terms(query);
        if terms.is_empty() {
            return vec![0.0; sentences.len()];
        }

        sentences
            .iter()
            .map(|sentence| {
                let tokens: HashSet<String> = tokenize(sentence).into_iter().collect();
                let matched = terms.iter().filter(|t| tokens.contains(*t)).count();
                matched as f32 / terms.len() as f32
            })
            .collect()
    }

    fn name(&self) -> &'static str {
        "lexical"
    }
}

// ============================================================================
// Synthesizer
// ============================================================================

/// 추출형 답변 합성기
pub struct Synthesizer {
    scorer: Box<dyn SentenceScorer>,
    max_sentences: usize,
}

impl Synthesizer {
    /// `max_sentences`는 문서당 최대 문장 수 (최소 1)
    pub fn new(scorer: Box<dyn SentenceScorer>, max_sentences: usize) -> Self {
        Self {
            scorer,
            max_sentences: max_sentences.max(1),
        }
    }

    pub fn scorer_name(&self) -> &'static str {
        self.scorer.name()
    }

    /// 후보들로 답변 합성
    pub fn synthesize(&self, query: &str, candidates: &[QueryCandidate]) -> Answer {
        // 1. 문서별 최적 청크
        let mut best: HashMap<&DocumentId, &QueryCandidate> = HashMap::new();
        for candidate in candidates {
            best.entry(&candidate.chunk.document_id)
                .and_modify(|current| {
                    if closer(candidate, current) {
                        *current = candidate;
                    }
                })
                .or_insert(candidate);
        }

        if best.is_empty() {
            return Answer::empty();
        }

        // 2. 유사도 내림차순 (동률은 문서 ID)
        let mut retained: Vec<&QueryCandidate> = best.into_values().collect();
        retained.sort_by(|a, b| {
            b.similarity
                .total_cmp(&a.similarity)
                .then_with(|| a.chunk.document_id.cmp(&b.chunk.document_id))
        });

        let mut parts: Vec<&str> = Vec::new();
        let mut seen: HashSet<&str> = HashSet::new();
        let mut citations = Vec::with_capacity(retained.len());

        for candidate in &retained {
            let text = candidate.chunk.text.as_str();

            // 3. 관련 문장 선택
            let Some(selected) = self.select_sentences(query, text) else {
                tracing::debug!("No sentences in chunk {}", candidate.chunk.id);
                continue;
            };

            // 4. 문장 연결 (중복 문장 제외)
            for span in &selected {
                let sentence = &text[span.clone()];
                if seen.insert(sentence) {
                    parts.push(sentence);
                }
            }

            // 5. 인용
            let excerpt_start = selected.first().map_or(0, |s| s.start);
            let excerpt_end = selected.last().map_or(text.len(), |s| s.end);
            citations.push(Citation {
                document_id: candidate.chunk.document_id.clone(),
                source_name: candidate.source_name.clone(),
                page_number: candidate.chunk.page_number,
                excerpt: text[excerpt_start..excerpt_end].to_string(),
                chunk_id: candidate.chunk.id,
                similarity: candidate.similarity,
            });
        }

        // 6. 신뢰도
        let similarities: Vec<f32> = citations.iter().map(|c| c.similarity).collect();

        Answer {
            text: parts.join(" "),
            confidence: confidence(&similarities),
            citations,
        }
    }

    /// 청크 내 선택 문장 범위 (원문 순서)
    ///
    /// 점수 0 초과 문장 중 상위 `max_sentences`개. 없으면 최고점 문장 하나.
    fn select_sentences(&self, query: &str, text: &str) -> Option<Vec<Range<usize>>> {
        let spans = split_sentences(text);
        if spans.is_empty() {
            return None;
        }

        let sentences: Vec<&str> = spans.iter().map(|s| &text[s.clone()]).collect();
        let scores = self.scorer.score(query, &sentences);

        let mut ranked: Vec<usize> = (0..spans.len()).collect();
        ranked.sort_by(|&a, &b| {
            let sa = scores.get(a).copied().unwrap_or(0.0);
            let sb = scores.get(b).copied().unwrap_or(0.0);
            sb.total_cmp(&sa).then_with(|| a.cmp(&b))
        });

        let mut picked: Vec<usize> = ranked
            .iter()
            .copied()
            .filter(|&i| scores.get(i).copied().unwrap_or(0.0) > 0.0)
            .take(self.max_sentences)
            .collect();
        if picked.is_empty() {
            picked.push(ranked[0]);
        }
        picked.sort_unstable();

        Some(picked.into_iter().map(|i| spans[i].clone()).collect())
    }
}

impl Default for Synthesizer {
    fn default() -> Self {
        Self::new(Box::new(LexicalScorer), 2)
    }
}

/// 거리가 더 작으면 true (동률은 chunk_id)
fn closer(a: &QueryCandidate, b: &QueryCandidate) -> bool {
    a.distance
        .total_cmp(&b.distance)
        .then_with(|| a.chunk.id.cmp(&b.chunk.id))
        .is_lt()
}

/// 기여 문서들의 유사도로 신뢰도 계산 (비어 있으면 0)
pub fn confidence(similarities: &[f32]) -> f32 {
    if similarities.is_empty() {
        return 0.0;
    }

    let top = similarities.iter().copied().fold(f32::MIN, f32::max);
    let worst = similarities.iter().copied().fold(f32::MAX, f32::min);
    let n = similarities.len() as i32;

    let corroboration = CORROBORATION_BASE + (1.0 - CORROBORATION_BASE) * (1.0 - 0.5f32.powi(n));
    let agreement = 1.0 - SPREAD_PENALTY * (top - worst);

    let value = top * corroboration * agreement;
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::knowledge::store::Chunk;
    use crate::knowledge::vector::similarity_from_distance;
    use std::sync::Arc;

    fn candidate(doc: &str, chunk_id: u64, page: u32, text: &str, distance: f32) -> QueryCandidate {
        QueryCandidate {
            chunk: Arc::new(Chunk {
                id: ChunkId::new(chunk_id),
                document_id: DocumentId::from(doc),
                page_number: page,
                text: text.to_string(),
                start_offset: 0,
                end_offset: text.len(),
            }),
            source_name: format!("{}.pdf", doc),
            distance,
            similarity: similarity_from_distance(distance),
        }
    }

    #[test]
    fn test_empty_candidates() {
        let answer = Synthesizer::default().synthesize("anything", &[]);
        assert_eq!(answer, Answer::empty());
        assert!(answer.is_empty());
    }

    #[test]
    fn test_selects_relevant_sentence() {
        let candidates = vec![candidate(
            "loan",
            1,
            3,
            "The loan bears interest at a fixed annual rate of 6.75%. Payments are due monthly.",
            0.4,
        )];

        let answer = Synthesizer::default().synthesize("What is the interest rate?", &candidates);

        assert_eq!(
            answer.text,
            "The loan bears interest at a fixed annual rate of 6.75%."
        );
        assert_eq!(answer.citations.len(), 1);
        assert_eq!(answer.citations[0].page_number, 3);
        assert_eq!(answer.citations[0].excerpt, answer.text);
        assert!(answer.confidence > 0.0);
    }

    #[test]
    fn test_best_chunk_per_document() {
        let candidates = vec![
            candidate("a", 1, 1, "Alpha near chunk about payments.", 0.2),
            candidate("a", 2, 2, "Alpha far chunk about payments.", 0.9),
            candidate("b", 3, 1, "Beta chunk about payments.", 0.5),
        ];

        let answer = Synthesizer::default().synthesize("payments", &candidates);

        assert_eq!(answer.citations.len(), 2);
        assert_eq!(answer.citations[0].chunk_id, ChunkId::new(1));
        assert_eq!(answer.citations[1].document_id.as_str(), "b");
        assert!(!answer.text.contains("far chunk"));
    }

    #[test]
    fn test_three_document_fusion_order() {
        // 입력 순서와 무관하게 유사도 내림차순
        let candidates = vec![
            candidate("c", 3, 1, "Gamma says the payment is due on the fifth.", 0.8),
            candidate("a", 1, 1, "Alpha says the payment is due on the first.", 0.1),
            candidate("b", 2, 1, "Beta says the payment is due on the third.", 0.4),
            candidate("a", 4, 2, "Alpha appendix repeats the payment schedule.", 0.6),
        ];

        let answer = Synthesizer::default().synthesize("When is the payment due?", &candidates);

        let docs: Vec<&str> = answer
            .citations
            .iter()
            .map(|c| c.document_id.as_str())
            .collect();
        assert_eq!(docs, vec!["a", "b", "c"]);
        assert!(answer.citations[0].similarity > answer.citations[1].similarity);
        assert!(answer.citations[1].similarity > answer.citations[2].similarity);
        assert_eq!(
            answer.text,
            "Alpha says the payment is due on the first. \
             Beta says the payment is due on the third. \
             Gamma says the payment is due on the fifth."
        );
    }

    #[test]
    fn test_sentence_cap_and_chunk_order() {
        let text = "Rate one is high. Unrelated filler here. Rate two is low. Rate three is mid.";
        let candidates = vec![candidate("doc", 1, 1, text, 0.3)];

        let answer = Synthesizer::new(Box::new(LexicalScorer), 2).synthesize("rate", &candidates);

        // 동점이면 앞 문장 우선, 원문 순서로 복원
        assert_eq!(answer.text, "Rate one is high. Rate two is low.");
        assert_eq!(
            answer.citations[0].excerpt,
            "Rate one is high. Unrelated filler here. Rate two is low."
        );
        assert!(text.contains(&answer.citations[0].excerpt));
    }

    #[test]
    fn test_fallback_to_single_sentence() {
        let candidates = vec![candidate(
            "doc",
            1,
            1,
            "Nothing here matches. Neither does this.",
            0.3,
        )];

        let answer = Synthesizer::default().synthesize("interest rate", &candidates);
        assert_eq!(answer.text, "Nothing here matches.");
        assert_eq!(answer.citations.len(), 1);
    }

    #[test]
    fn test_duplicate_sentences_not_repeated() {
        let candidates = vec![
            candidate("a", 1, 1, "The monthly payment is $2,270.16.", 0.2),
            candidate("b", 2, 1, "The monthly payment is $2,270.16.", 0.3),
        ];

        let answer = Synthesizer::default().synthesize("monthly payment", &candidates);
        assert_eq!(answer.text, "The monthly payment is $2,270.16.");
        assert_eq!(answer.citations.len(), 2);
    }

    #[test]
    fn test_lexical_scorer() {
        let scores = LexicalScorer.score(
            "What is the monthly payment?",
            &["Payments are due monthly.", "The rate is fixed.", "Monthly."],
        );
        assert_eq!(scores, vec![1.0, 0.0, 0.5]);
        assert_eq!(LexicalScorer.name(), "lexical");
    }

    #[test]
    fn test_confidence_bounds_and_monotonicity() {
        assert_eq!(confidence(&[]), 0.0);

        for sims in [&[1.0f32][..], &[1.0, 1.0, 1.0, 1.0], &[0.0001], &[1.0, 0.0]] {
            let c = confidence(sims);
            assert!((0.0..=1.0).contains(&c), "{:?} -> {}", sims, c);
        }

        // 문서가 많을수록 상승
        assert!(confidence(&[0.8, 0.8]) > confidence(&[0.8]));
        assert!(confidence(&[0.8, 0.8, 0.8]) > confidence(&[0.8, 0.8]));
        // 최고 유사도가 높을수록 상승
        assert!(confidence(&[0.9]) > confidence(&[0.5]));
        // 격차가 클수록 하락
        assert!(confidence(&[0.9, 0.85]) > confidence(&[0.9, 0.4]));
    }
}
