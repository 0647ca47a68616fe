//! Two-stage ranker: vector candidate narrowing, then pairwise rerank.
//!
//! The top `initial_top_k` chunks by vector score are sent to a
//! [`PairScorer`] in a single batch. Their combined score is the
//! reranker score. Every other chunk keeps `vector × discount`, so all
//! chunks are still returned, with unreranked ones ranked lower.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::EmbeddingMatrix;
use crate::error::SearchError;
use crate::models::{Chunk, ChunkSet, RankedEntry};

use super::{score_cmp, sort_ranked, vector_scores, Ranker, RankerConfig};

/// Capability for scoring `(query, candidate)` pairs, e.g. a cross-encoder.
#[async_trait]
pub trait PairScorer: Send + Sync {
    /// Returns the model identifier.
    fn model_name(&self) -> &str;

    /// Score every candidate against `query`.
    ///
    /// Must return exactly one score per candidate, in input order.
    /// Failures map to [`SearchError::RerankerUnavailable`], an exceeded
    /// time limit to [`SearchError::Timeout`].
    async fn score_pairs(&self, query: &str, candidates: &[&str]) -> Result<Vec<f64>, SearchError>;
}

pub struct TwoStageRerankRanker {
    initial_top_k: usize,
    discount: f64,
    scorer: Arc<dyn PairScorer>,
    chunks: Option<Arc<[Chunk]>>,
}

impl TwoStageRerankRanker {
    pub fn new(config: &RankerConfig, scorer: Arc<dyn PairScorer>) -> Self {
        Self {
            initial_top_k: config.initial_top_k,
            discount: config.reranker_discount,
            scorer,
            chunks: None,
        }
    }
}

/// Indices of the `k` highest scores, ties broken by index ascending.
pub fn top_k_indices(scores: &[f64], k: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| score_cmp(scores[b], scores[a]).then(a.cmp(&b)));
    order.truncate(k);
    order
}

#[async_trait]
impl Ranker for TwoStageRerankRanker {
    fn name(&self) -> &'static str {
        "cross_encoder"
    }

    fn build(&mut self, chunks: &ChunkSet) {
        self.chunks = Some(chunks.shared());
        debug!(
            chunks = chunks.len(),
            model = self.scorer.model_name(),
            "initialized two-stage reranker"
        );
    }

    fn is_built(&self) -> bool {
        self.chunks.is_some()
    }

    async fn rank(
        &self,
        query: &str,
        query_vec: &[f32],
        embeddings: &EmbeddingMatrix,
    ) -> Result<Vec<RankedEntry>, SearchError> {
        let chunks = self.chunks.as_ref().ok_or(SearchError::NotInitialized {
            component: "TwoStageRerankRanker",
        })?;

        let vector = vector_scores(chunks.len(), query_vec, embeddings)?;
        let candidates = top_k_indices(&vector, self.initial_top_k);

        let rerank_scores = if candidates.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<&str> = candidates
                .iter()
                .map(|&i| chunks[i].content.as_str())
                .collect();
            let scores = self.scorer.score_pairs(query, &texts).await?;
            if scores.len() != candidates.len() {
                return Err(SearchError::RerankerUnavailable {
                    reason: format!(
                        "scorer returned {} scores for {} candidates",
                        scores.len(),
                        candidates.len()
                    ),
                });
            }
            scores
        };

        let mut entries: Vec<RankedEntry> = vector
            .iter()
            .enumerate()
            .map(|(i, &v)| RankedEntry {
                chunk_index: i,
                combined_score: v * self.discount,
                vector_score: v,
                auxiliary_score: 0.0,
            })
            .collect();
        for (&i, &score) in candidates.iter().zip(rerank_scores.iter()) {
            entries[i].combined_score = score;
            entries[i].auxiliary_score = score;
        }
        sort_ranked(&mut entries);

        debug!(
            chunks = entries.len(),
            reranked = candidates.len(),
            "ranked chunks with pairwise rerank"
        );
        Ok(entries)
    }
}
