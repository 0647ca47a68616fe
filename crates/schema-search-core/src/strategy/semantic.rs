//! Embedding-backed strategy: query embedding → ranker → tables.
//!
//! The configured ranker is built lazily the first time a chunk set is
//! seen and reused for every later query against the same set (matched
//! by [`ChunkSet::fingerprint`]). A new snapshot with different chunks
//! gets a freshly built ranker; queries already holding the old one
//! finish against it undisturbed.

use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use tracing::debug;

use crate::aggregate::top_tables;
use crate::embedding::QueryEmbedder;
use crate::error::SearchError;
use crate::models::{ChunkSet, SearchResultItem};
use crate::rank::{create_ranker, PairScorer, Ranker, RankerConfig, RankerKind};

use super::{assemble_results, SearchContext, SearchOptions, SearchStrategy};

struct BuiltRanker {
    fingerprint: String,
    ranker: Arc<dyn Ranker>,
}

pub struct SemanticStrategy {
    embedder: Arc<dyn QueryEmbedder>,
    kind: RankerKind,
    config: RankerConfig,
    scorer: Option<Arc<dyn PairScorer>>,
    built: RwLock<Option<BuiltRanker>>,
}

impl SemanticStrategy {
    pub fn new(
        embedder: Arc<dyn QueryEmbedder>,
        kind: RankerKind,
        config: RankerConfig,
        scorer: Option<Arc<dyn PairScorer>>,
    ) -> Self {
        Self {
            embedder,
            kind,
            config,
            scorer,
            built: RwLock::new(None),
        }
    }

    /// The ranker built for `chunks`, building it on first use.
    pub fn ranker_for(&self, chunks: &ChunkSet) -> Result<Arc<dyn Ranker>, SearchError> {
        {
            let guard = self.built.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(b) = guard.as_ref() {
                if b.fingerprint == chunks.fingerprint() {
                    return Ok(Arc::clone(&b.ranker));
                }
            }
        }

        let mut ranker = create_ranker(self.kind, &self.config, self.scorer.clone())?;
        ranker.build(chunks);
        let ranker: Arc<dyn Ranker> = Arc::from(ranker);

        let mut guard = self.built.write().unwrap_or_else(PoisonError::into_inner);
        *guard = Some(BuiltRanker {
            fingerprint: chunks.fingerprint().to_string(),
            ranker: Arc::clone(&ranker),
        });
        Ok(ranker)
    }
}

#[async_trait]
impl SearchStrategy for SemanticStrategy {
    fn name(&self) -> &'static str {
        "semantic"
    }

    async fn search(
        &self,
        query: &str,
        ctx: &SearchContext<'_>,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResultItem>, SearchError> {
        let embeddings = ctx.embeddings.ok_or_else(|| SearchError::EmbeddingsDisabled {
            reason: "no chunk embeddings loaded for this snapshot".to_string(),
        })?;

        let query_vec = self.embedder.embed_query(query).await?;
        let ranker = self.ranker_for(ctx.chunks)?;
        let ranked = ranker.rank(query, &query_vec, embeddings).await?;
        let tables = top_tables(&ranked, ctx.chunks, opts.limit);

        debug!(
            ranker = ranker.name(),
            model = self.embedder.model_name(),
            tables = tables.len(),
            "semantic search complete"
        );
        Ok(assemble_results(
            tables,
            &ranked,
            ctx,
            opts,
            self.name(),
            ranker.name(),
        ))
    }
}
