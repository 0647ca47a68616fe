//! Chunk rankers.
//!
//! A [`Ranker`] is built once over a [`ChunkSet`] and then scores every
//! chunk against a query. Two variants exist:
//!
//! | Config value | Variant | Signal |
//! |--------------|---------|--------|
//! | `bm25`, `lexical_fusion` | [`LexicalFusionRanker`] | `w_vec × dot + w_lex × bm25 / max(bm25)` |
//! | `cross_encoder`, `two_stage` | [`TwoStageRerankRanker`] | pairwise rerank of the vector top-k |
//!
//! # Ordering contract
//!
//! `rank()` returns one [`RankedEntry`] per chunk, sorted by
//! `combined_score` descending with ties broken by chunk index ascending,
//! so identical inputs always produce identical output.

pub mod bm25;
pub mod lexical;
pub mod rerank;

use std::cmp::Ordering;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

use crate::embedding::EmbeddingMatrix;
use crate::error::SearchError;
use crate::models::{ChunkSet, RankedEntry};

pub use bm25::{Bm25Index, Bm25Params};
pub use lexical::LexicalFusionRanker;
pub use rerank::{PairScorer, TwoStageRerankRanker};

/// Scores every chunk of a built [`ChunkSet`] against a query.
#[async_trait]
pub trait Ranker: Send + Sync {
    /// Short identifier used in logs and score explanations.
    fn name(&self) -> &'static str;

    /// Take ownership of the chunk set and build any index over it.
    ///
    /// Building again replaces the previous state.
    fn build(&mut self, chunks: &ChunkSet);

    /// Whether [`build`](Ranker::build) has run.
    fn is_built(&self) -> bool;

    /// Score all chunks. Never mutates the chunk set or the matrix.
    ///
    /// # Errors
    ///
    /// - [`SearchError::NotInitialized`] before `build()`.
    /// - [`SearchError::ShapeMismatch`] if the matrix row count differs
    ///   from the chunk count.
    /// - [`SearchError::DimensionMismatch`] if `query_vec` does not match
    ///   the matrix width.
    async fn rank(
        &self,
        query: &str,
        query_vec: &[f32],
        embeddings: &EmbeddingMatrix,
    ) -> Result<Vec<RankedEntry>, SearchError>;
}

/// Ranker variant selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RankerKind {
    LexicalFusion,
    TwoStageRerank,
}

/// Configuration value → ranker variant.
pub const RANKER_KINDS: &[(&str, RankerKind)] = &[
    ("bm25", RankerKind::LexicalFusion),
    ("lexical_fusion", RankerKind::LexicalFusion),
    ("cross_encoder", RankerKind::TwoStageRerank),
    ("two_stage", RankerKind::TwoStageRerank),
];

impl FromStr for RankerKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RANKER_KINDS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| SearchError::UnknownVariant {
                kind: "ranker",
                value: s.to_string(),
                expected: RANKER_KINDS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Ranking parameters, decoupled from application config.
#[derive(Debug, Clone, PartialEq)]
pub struct RankerConfig {
    /// Weight of the vector score in lexical fusion.
    pub embedding_weight: f64,
    /// Weight of the normalized BM25 score in lexical fusion.
    pub bm25_weight: f64,
    /// Candidates passed to the pairwise reranker.
    pub initial_top_k: usize,
    /// Multiplier applied to vector scores of chunks the reranker skipped.
    pub reranker_discount: f64,
    /// Added to `max(bm25)` before dividing.
    pub epsilon: f64,
    pub bm25: Bm25Params,
}

impl Default for RankerConfig {
    fn default() -> Self {
        Self {
            embedding_weight: 0.6,
            bm25_weight: 0.4,
            initial_top_k: 20,
            reranker_discount: 0.5,
            epsilon: 1e-8,
            bm25: Bm25Params::default(),
        }
    }
}

/// Construct the ranker for `kind`.
///
/// The two-stage variant needs a pairwise scorer; asking for it without
/// one fails with [`SearchError::RerankerUnavailable`] rather than
/// silently degrading to lexical fusion.
pub fn create_ranker(
    kind: RankerKind,
    config: &RankerConfig,
    scorer: Option<Arc<dyn PairScorer>>,
) -> Result<Box<dyn Ranker>, SearchError> {
    match kind {
        RankerKind::LexicalFusion => Ok(Box::new(LexicalFusionRanker::new(config))),
        RankerKind::TwoStageRerank => {
            let scorer = scorer.ok_or_else(|| SearchError::RerankerUnavailable {
                reason: "no pairwise scorer configured".to_string(),
            })?;
            Ok(Box::new(TwoStageRerankRanker::new(config, scorer)))
        }
    }
}

/// Total order on scores in which `-0.0` and `0.0` are equal.
pub fn score_cmp(a: f64, b: f64) -> Ordering {
    (a + 0.0).total_cmp(&(b + 0.0))
}

/// Sort by `combined_score` descending, then chunk index ascending.
pub fn sort_ranked(entries: &mut [RankedEntry]) {
    entries.sort_by(|a, b| {
        score_cmp(b.combined_score, a.combined_score).then(a.chunk_index.cmp(&b.chunk_index))
    });
}

/// Validate the matrix and query vector against the chunk count.
pub(crate) fn vector_scores(
    chunk_count: usize,
    query_vec: &[f32],
    embeddings: &EmbeddingMatrix,
) -> Result<Vec<f64>, SearchError> {
    if embeddings.rows() != chunk_count {
        return Err(SearchError::ShapeMismatch {
            rows: embeddings.rows(),
            chunks: chunk_count,
        });
    }
    embeddings.scores(query_vec)
}
