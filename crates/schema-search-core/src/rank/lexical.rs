//! BM25 + vector fusion ranker.
//!
//! 1. `vector[i] = embeddings[i] · query_vec`
//! 2. `raw[i]` = BM25 score of the lowercased, whitespace-split query.
//! 3. `lexical[i] = raw[i] / (max(raw) + ε)`
//! 4. `combined[i] = w_vec × vector[i] + w_lex × lexical[i]`
//!
//! An empty query (no tokens) gives all-zero lexical scores, so the
//! ranking degenerates to pure vector ordering.

use async_trait::async_trait;
use tracing::debug;

use crate::embedding::EmbeddingMatrix;
use crate::error::SearchError;
use crate::models::{ChunkSet, RankedEntry};

use super::bm25::{tokenize, Bm25Index, Bm25Params};
use super::{sort_ranked, vector_scores, Ranker, RankerConfig};

#[derive(Debug, Clone)]
pub struct LexicalFusionRanker {
    embedding_weight: f64,
    bm25_weight: f64,
    epsilon: f64,
    params: Bm25Params,
    index: Option<Bm25Index>,
}

impl LexicalFusionRanker {
    pub fn new(config: &RankerConfig) -> Self {
        Self {
            embedding_weight: config.embedding_weight,
            bm25_weight: config.bm25_weight,
            epsilon: config.epsilon,
            params: config.bm25,
            index: None,
        }
    }

    /// Max-normalize raw lexical scores. All-zero input stays all zero.
    pub fn normalize(&self, raw: &[f64]) -> Vec<f64> {
        let max = raw.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let max = if max.is_finite() { max } else { 0.0 };
        raw.iter().map(|s| s / (max + self.epsilon)).collect()
    }
}

#[async_trait]
impl Ranker for LexicalFusionRanker {
    fn name(&self) -> &'static str {
        "bm25"
    }

    fn build(&mut self, chunks: &ChunkSet) {
        let corpus: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.content)).collect();
        self.index = Some(Bm25Index::build(&corpus, self.params));
        debug!(chunks = chunks.len(), "built BM25 index");
    }

    fn is_built(&self) -> bool {
        self.index.is_some()
    }

    async fn rank(
        &self,
        query: &str,
        query_vec: &[f32],
        embeddings: &EmbeddingMatrix,
    ) -> Result<Vec<RankedEntry>, SearchError> {
        let index = self.index.as_ref().ok_or(SearchError::NotInitialized {
            component: "LexicalFusionRanker",
        })?;

        let vector = vector_scores(index.len(), query_vec, embeddings)?;
        let tokens = tokenize(query);
        let lexical = self.normalize(&index.scores(&tokens));

        let mut entries: Vec<RankedEntry> = vector
            .iter()
            .zip(lexical.iter())
            .enumerate()
            .map(|(i, (&v, &l))| RankedEntry {
                chunk_index: i,
                combined_score: self.embedding_weight * v + self.bm25_weight * l,
                vector_score: v,
                auxiliary_score: l,
            })
            .collect();
        sort_ranked(&mut entries);

        debug!(
            chunks = entries.len(),
            query_tokens = tokens.len(),
            "ranked chunks with lexical fusion"
        );
        Ok(entries)
    }
}
