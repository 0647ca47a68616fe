//! Per-snapshot search state and hot swapping.
//!
//! A [`SearchIndex`] is built once from a schema snapshot and never
//! mutated. [`IndexHandle`] holds the current one behind an `Arc`;
//! reloading builds a replacement off to the side and swaps the pointer,
//! so queries that already took a reference finish on the old snapshot.

use anyhow::Result;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

use schema_search_core::embedding::EmbeddingMatrix;
use schema_search_core::graph::RelationshipGraph;
use schema_search_core::models::ChunkSet;
use schema_search_core::strategy::SearchContext;

use crate::chunk::chunk_snapshot;
use crate::config::Config;
use crate::embedding::{embed_chunks, EmbeddingCache, EmbeddingProvider};
use crate::models::SchemaSnapshot;
use crate::snapshot::load_snapshot;

pub struct SearchIndex {
    pub snapshot: SchemaSnapshot,
    /// Table name → schema as JSON, attached to results verbatim.
    pub schemas: HashMap<String, serde_json::Value>,
    pub chunks: ChunkSet,
    pub embeddings: Option<EmbeddingMatrix>,
    pub graph: RelationshipGraph,
}

impl SearchIndex {
    /// Chunk the snapshot and build the relationship graph. No embeddings.
    pub fn from_snapshot(snapshot: SchemaSnapshot, max_tokens: usize) -> Result<Self> {
        let schemas = snapshot
            .tables
            .iter()
            .map(|(name, table)| -> Result<(String, serde_json::Value)> {
                Ok((name.clone(), serde_json::to_value(table)?))
            })
            .collect::<Result<HashMap<_, _>>>()?;
        let chunks = chunk_snapshot(&snapshot, max_tokens);
        let graph = RelationshipGraph::from_foreign_keys(
            snapshot
                .tables
                .iter()
                .map(|(name, table)| (name.as_str(), table.foreign_keys())),
        );

        Ok(Self {
            snapshot,
            schemas,
            chunks,
            embeddings: None,
            graph,
        })
    }

    /// Attach a chunk embedding matrix produced by `provider`.
    ///
    /// With `embedding.cache_dir` set, a matching cached matrix is reused
    /// unless `reindex` is true.
    pub async fn embed(
        mut self,
        provider: &dyn EmbeddingProvider,
        config: &Config,
        reindex: bool,
    ) -> Result<Self> {
        let matrix = match &config.embedding.cache_dir {
            Some(dir) => {
                EmbeddingCache::new(dir)
                    .load_or_embed(provider, &config.embedding, &self.chunks, reindex)
                    .await?
            }
            None => embed_chunks(provider, &config.embedding, &self.chunks).await?,
        };
        self.embeddings = Some(matrix);
        Ok(self)
    }

    /// Load the configured snapshot from disk and build a full index.
    ///
    /// Chunks are embedded only when a provider is supplied.
    pub async fn load(
        config: &Config,
        provider: Option<&dyn EmbeddingProvider>,
        reindex: bool,
    ) -> Result<Self> {
        let snapshot = load_snapshot(&config.snapshot.path)?;
        let index = Self::from_snapshot(snapshot, config.chunking.max_tokens)?;
        let index = match provider {
            Some(p) => index.embed(p, config, reindex).await?,
            None => index,
        };
        info!(
            tables = index.table_count(),
            chunks = index.chunk_count(),
            edges = index.graph.edge_count(),
            embedded = index.embeddings.is_some(),
            "search index ready"
        );
        Ok(index)
    }

    pub fn context(&self) -> SearchContext<'_> {
        SearchContext {
            schemas: &self.schemas,
            chunks: &self.chunks,
            embeddings: self.embeddings.as_ref(),
            graph: &self.graph,
        }
    }

    pub fn table_count(&self) -> usize {
        self.snapshot.tables.len()
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }
}

/// Shared pointer to the current [`SearchIndex`].
pub struct IndexHandle {
    current: RwLock<Arc<SearchIndex>>,
}

impl IndexHandle {
    pub fn new(index: SearchIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(index)),
        }
    }

    /// The index to run one query against.
    pub fn current(&self) -> Arc<SearchIndex> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    /// Replace the current index; returns the previous one.
    pub fn replace(&self, index: SearchIndex) -> Arc<SearchIndex> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        std::mem::replace(&mut *guard, Arc::new(index))
    }
}
