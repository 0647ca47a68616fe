//! Search strategies: query text in, ranked tables out.
//!
//! Both variants share one pipeline and one output shape, so callers
//! hold an `Arc<dyn SearchStrategy>` and never branch on the variant:
//!
//! ```text
//! query ─▶ score chunks ─▶ top_tables(limit) ─▶ attach schema + neighbors(hops)
//!          │
//!          ├─ semantic: embed query, Ranker::rank (bm25 fusion | cross-encoder)
//!          └─ fuzzy:    string similarity, no embeddings needed
//! ```

pub mod fuzzy;
pub mod semantic;

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;

use crate::embedding::EmbeddingMatrix;
use crate::error::SearchError;
use crate::graph::RelationshipGraph;
use crate::models::{ChunkSet, RankedEntry, ScoreExplanation, SearchResultItem, TableScore};

pub use fuzzy::FuzzyStrategy;
pub use semantic::SemanticStrategy;

/// Read-only inputs for one schema snapshot, shared by every query.
#[derive(Debug, Clone, Copy)]
pub struct SearchContext<'a> {
    /// Table name → opaque schema payload.
    pub schemas: &'a HashMap<String, serde_json::Value>,
    pub chunks: &'a ChunkSet,
    /// One row per chunk; absent when no embedding provider is configured.
    pub embeddings: Option<&'a EmbeddingMatrix>,
    pub graph: &'a RelationshipGraph,
}

/// Per-query knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchOptions {
    /// Maximum tables to return.
    pub limit: usize,
    /// Relationship hops for `related_tables`.
    pub hops: usize,
    /// Populate [`SearchResultItem::explain`].
    pub explain: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 5,
            hops: 1,
            explain: false,
        }
    }
}

#[async_trait]
pub trait SearchStrategy: Send + Sync {
    /// Short identifier used in logs and score explanations.
    fn name(&self) -> &'static str;

    /// Rank tables for `query`, best first.
    async fn search(
        &self,
        query: &str,
        ctx: &SearchContext<'_>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResultItem>, SearchError>;
}

/// Strategy variant selected by configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    Semantic,
    Fuzzy,
}

/// Configuration value → strategy variant.
pub const STRATEGY_KINDS: &[(&str, StrategyKind)] = &[
    ("semantic", StrategyKind::Semantic),
    ("fuzzy", StrategyKind::Fuzzy),
];

impl FromStr for StrategyKind {
    type Err = SearchError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        STRATEGY_KINDS
            .iter()
            .find(|(name, _)| *name == s)
            .map(|(_, kind)| *kind)
            .ok_or_else(|| SearchError::UnknownVariant {
                kind: "strategy",
                value: s.to_string(),
                expected: STRATEGY_KINDS
                    .iter()
                    .map(|(name, _)| *name)
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Turn aggregated tables into result items, preserving their order.
pub(crate) fn assemble_results(
    tables: Vec<TableScore>,
    ranked: &[RankedEntry],
    ctx: &SearchContext<'_>,
    opts: &SearchOptions,
    strategy: &'static str,
    ranker: &'static str,
) -> Vec<SearchResultItem> {
    let by_chunk: HashMap<usize, &RankedEntry> =
        ranked.iter().map(|e| (e.chunk_index, e)).collect();

    tables
        .into_iter()
        .map(|t| {
            let explain = if opts.explain {
                t.chunk_indices
                    .first()
                    .and_then(|i| by_chunk.get(i))
                    .map(|best| ScoreExplanation {
                        strategy,
                        ranker,
                        vector_score: best.vector_score,
                        auxiliary_score: best.auxiliary_score,
                        chunks_ranked: ranked.len(),
                    })
            } else {
                None
            };

            SearchResultItem {
                schema: ctx
                    .schemas
                    .get(&t.table)
                    .cloned()
                    .unwrap_or(serde_json::Value::Null),
                matched_chunk_ids: t
                    .chunk_indices
                    .iter()
                    .filter_map(|&i| ctx.chunks.get(i).map(|c| c.id))
                    .collect(),
                related_tables: ctx.graph.neighbors(&t.table, opts.hops),
                score: t.score,
                table: t.table,
                explain,
            }
        })
        .collect()
}
