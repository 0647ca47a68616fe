//! String-similarity strategy for deployments without embeddings.
//!
//! Each query token is matched against the chunk's tokens (its content
//! plus the table name and its `_`-separated parts) by normalized
//! Levenshtein similarity; a chunk scores the mean of the best match per
//! query token. Typos and partial names still land close to the right
//! table, e.g. `custmer` → `customers`.

use std::collections::HashSet;

use async_trait::async_trait;
use tracing::debug;

use crate::aggregate::top_tables;
use crate::error::SearchError;
use crate::models::{Chunk, RankedEntry, SearchResultItem};
use crate::rank::sort_ranked;

use super::{assemble_results, SearchContext, SearchOptions, SearchStrategy};

#[derive(Debug, Clone, Copy, Default)]
pub struct FuzzyStrategy;

impl FuzzyStrategy {
    pub fn new() -> Self {
        Self
    }
}

/// Lowercased alphanumeric runs.
fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn chunk_tokens(chunk: &Chunk) -> HashSet<String> {
    let mut tokens: HashSet<String> = words(&chunk.content).collect();
    tokens.extend(words(&chunk.table_name));
    tokens.insert(chunk.table_name.to_lowercase());
    tokens
}

/// Mean best-match similarity of `query` tokens against `tokens`, in `[0, 1]`.
pub fn similarity(query: &[String], tokens: &HashSet<String>) -> f64 {
    if query.is_empty() || tokens.is_empty() {
        return 0.0;
    }
    let total: f64 = query
        .iter()
        .map(|q| {
            tokens
                .iter()
                .map(|t| strsim::normalized_levenshtein(q, t))
                .fold(0.0, f64::max)
        })
        .sum();
    total / query.len() as f64
}

#[async_trait]
impl SearchStrategy for FuzzyStrategy {
    fn name(&self) -> &'static str {
        "fuzzy"
    }

    async fn search(
        &self,
        query: &str,
        ctx: &SearchContext<'_>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResultItem>, SearchError> {
        let query_tokens: Vec<String> = words(query).collect();

        let mut ranked: Vec<RankedEntry> = ctx
            .chunks
            .iter()
            .enumerate()
            .map(|(i, chunk)| {
                let score = similarity(&query_tokens, &chunk_tokens(chunk));
                RankedEntry {
                    chunk_index: i,
                    combined_score: score,
                    vector_score: 0.0,
                    auxiliary_score: score,
                }
            })
            .collect();
        sort_ranked(&mut ranked);

        let tables = top_tables(&ranked, ctx.chunks, opts.limit);
        debug!(
            query_tokens = query_tokens.len(),
            chunks = ranked.len(),
            tables = tables.len(),
            "fuzzy search complete"
        );
        Ok(assemble_results(
            tables,
            &ranked,
            ctx,
            opts,
            self.name(),
            "levenshtein",
        ))
    }
}
