//! Table search over the current index, plus the `search`, `related`, and
//! `chunks` CLI commands.
//!
//! [`SearchEngine`] owns one strategy and an [`IndexHandle`]. Each query
//! takes the current index and runs on that snapshot from start to finish;
//! [`SearchEngine::reload`] swaps in a freshly built one.

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

use schema_search_core::models::SearchResultItem;
use schema_search_core::rank::{PairScorer, RankerKind};
use schema_search_core::strategy::{
    FuzzyStrategy, SearchOptions, SearchStrategy, SemanticStrategy, StrategyKind,
};
use schema_search_core::SearchError;

use crate::config::Config;
use crate::embedding::{create_provider, EmbeddingProvider, ProviderEmbedder};
use crate::index::{IndexHandle, SearchIndex};
use crate::rerank::create_scorer;

pub struct SearchEngine {
    config: Config,
    strategy: Arc<dyn SearchStrategy>,
    provider: Option<Arc<dyn EmbeddingProvider>>,
    index: IndexHandle,
}

impl SearchEngine {
    /// Build the providers named in `config`, then load and index the snapshot.
    ///
    /// `reindex` ignores any cached chunk embeddings.
    pub async fn open(config: Config, reindex: bool) -> Result<Self> {
        let (provider, scorer) = match config.search.strategy_kind()? {
            StrategyKind::Fuzzy => (None, None),
            StrategyKind::Semantic => (
                Some(create_provider(&config.embedding)?),
                create_scorer(&config.reranker)?,
            ),
        };
        Self::with_capabilities(config, provider, scorer, reindex).await
    }

    /// Like [`SearchEngine::open`] but with caller-supplied capabilities.
    ///
    /// The embedding provider is required for the semantic strategy and
    /// ignored by the fuzzy one; the scorer is required by `cross_encoder`.
    pub async fn with_capabilities(
        config: Config,
        provider: Option<Arc<dyn EmbeddingProvider>>,
        scorer: Option<Arc<dyn PairScorer>>,
        reindex: bool,
    ) -> Result<Self> {
        let kind = config.search.strategy_kind()?;
        let (strategy, provider) = match kind {
            StrategyKind::Fuzzy => (
                Arc::new(FuzzyStrategy::new()) as Arc<dyn SearchStrategy>,
                None,
            ),
            StrategyKind::Semantic => {
                let Some(provider) = provider else {
                    bail!("Semantic search requires embeddings. Set [embedding] provider in config.");
                };
                let ranker = config.search.ranker_kind()?;
                if ranker == RankerKind::TwoStageRerank && scorer.is_none() {
                    bail!(
                        "Ranker '{}' requires a reranker. Set [reranker] provider in config.",
                        config.search.ranker
                    );
                }
                let embedder = Arc::new(ProviderEmbedder::new(
                    Arc::clone(&provider),
                    &config.embedding,
                ));
                let strategy =
                    SemanticStrategy::new(embedder, ranker, config.search.ranker_config(), scorer);
                (Arc::new(strategy) as Arc<dyn SearchStrategy>, Some(provider))
            }
        };

        let index = SearchIndex::load(&config, provider.as_deref(), reindex).await?;
        info!(strategy = strategy.name(), "search engine ready");

        Ok(Self {
            config,
            strategy,
            provider,
            index: IndexHandle::new(index),
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// The index queries currently run against.
    pub fn index(&self) -> Arc<SearchIndex> {
        self.index.current()
    }

    /// Per-query defaults from `[search]`.
    pub fn default_options(&self) -> SearchOptions {
        self.config.search.options()
    }

    pub async fn search(
        &self,
        query: &str,
        opts: &SearchOptions,
    ) -> Result<Vec<SearchResultItem>, SearchError> {
        let index = self.index.current();
        let started = Instant::now();
        let results = self.strategy.search(query, &index.context(), opts).await?;
        debug!(
            strategy = self.strategy.name(),
            results = results.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "search complete"
        );
        Ok(results)
    }

    /// Neighbors of `table`, or `None` when the table is not in the snapshot.
    pub fn related(&self, table: &str, hops: usize) -> Option<BTreeSet<String>> {
        related_in(&self.index.current(), table, hops)
    }

    /// Rebuild the index from the snapshot file and swap it in.
    ///
    /// Cached embeddings are reused when the chunk text is unchanged. On
    /// failure the current index stays in place.
    pub async fn reload(&self) -> Result<Arc<SearchIndex>> {
        let fresh = SearchIndex::load(&self.config, self.provider.as_deref(), false).await?;
        self.index.replace(fresh);
        let current = self.index.current();
        info!(
            tables = current.table_count(),
            chunks = current.chunk_count(),
            "search index reloaded"
        );
        Ok(current)
    }
}

fn related_in(index: &SearchIndex, table: &str, hops: usize) -> Option<BTreeSet<String>> {
    if !index.snapshot.tables.contains_key(table) {
        return None;
    }
    Some(index.graph.neighbors(table, hops))
}

// ============ CLI commands ============

pub async fn run_search(
    config: Config,
    query: &str,
    opts: SearchOptions,
    json: bool,
    reindex: bool,
) -> Result<()> {
    if query.trim().is_empty() {
        println!("No results.");
        return Ok(());
    }

    let engine = SearchEngine::open(config, reindex).await?;
    let results = engine.search(query, &opts).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&results)?);
        return Ok(());
    }

    if results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    for (i, result) in results.iter().enumerate() {
        println!("{}. [{:.4}] {}", i + 1, result.score, result.table);
        if !result.related_tables.is_empty() {
            println!("    related: {}", join(&result.related_tables));
        }
        println!(
            "    chunks: {}",
            result
                .matched_chunk_ids
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        if let Some(ref e) = result.explain {
            println!(
                "    explain: strategy={} ranker={} vector={:.4} aux={:.4} ranked={}",
                e.strategy, e.ranker, e.vector_score, e.auxiliary_score, e.chunks_ranked
            );
        }
        println!();
    }

    Ok(())
}

pub async fn run_related(config: &Config, table: &str, hops: usize) -> Result<()> {
    let index = SearchIndex::load(config, None, false).await?;
    let Some(related) = related_in(&index, table, hops) else {
        bail!("Table not found: {}", table);
    };

    if related.is_empty() {
        println!("No related tables.");
    } else {
        for name in &related {
            println!("{}", name);
        }
    }
    Ok(())
}

pub async fn run_chunks(config: &Config, table: Option<&str>) -> Result<()> {
    let index = SearchIndex::load(config, None, false).await?;
    if let Some(t) = table {
        if !index.snapshot.tables.contains_key(t) {
            bail!("Table not found: {}", t);
        }
    }

    for chunk in index
        .chunks
        .iter()
        .filter(|c| table.map_or(true, |t| c.table_name == t))
    {
        let part = chunk.metadata.get("part").and_then(|v| v.as_u64()).unwrap_or(1);
        let parts = chunk.metadata.get("parts").and_then(|v| v.as_u64()).unwrap_or(1);
        println!(
            "--- chunk {} ({}, part {}/{}) ---",
            chunk.id, chunk.table_name, part, parts
        );
        println!("{}", chunk.content);
        println!();
    }
    Ok(())
}

fn join(names: &BTreeSet<String>) -> String {
    names.iter().map(String::as_str).collect::<Vec<_>>().join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::io::Write;

    const SNAPSHOT: &str = r#"{"tables": {
        "orders": {
            "name": "orders",
            "columns": [{"name": "total", "type": "NUMERIC"}, {"name": "placed_at", "type": "TIMESTAMP"}],
            "foreign_keys": [{"constrained_columns": ["customer_id"], "referred_table": "customers", "referred_columns": ["id"]}]
        },
        "customers": {
            "name": "customers",
            "columns": [{"name": "email", "type": "TEXT"}, {"name": "full_name", "type": "TEXT"}]
        },
        "audit_log": {"name": "audit_log", "columns": [{"name": "event", "type": "TEXT"}]}
    }}"#;

    fn write_snapshot(dir: &tempfile::TempDir) -> std::path::PathBuf {
        let path = dir.path().join("schema.json");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(SNAPSHOT.as_bytes()).unwrap();
        path
    }

    /// Two-dimensional embeddings: [mentions "email", 1.0].
    struct EmailProvider;

    #[async_trait]
    impl EmbeddingProvider for EmailProvider {
        fn model_name(&self) -> &str {
            "email"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| vec![if t.contains("email") { 1.0 } else { 0.0 }, 1.0])
                .collect())
        }
    }

    fn semantic_config(snapshot: std::path::PathBuf) -> Config {
        let mut config = Config::minimal(snapshot);
        config.search.strategy = "semantic".to_string();
        config.embedding.provider = "ollama".to_string();
        config.embedding.model = Some("email".to_string());
        config.embedding.dims = Some(2);
        config
    }

    #[tokio::test]
    async fn test_fuzzy_engine_finds_customers() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = SearchEngine::open(Config::minimal(write_snapshot(&dir)), false)
            .await
            .unwrap();
        assert_eq!(engine.strategy_name(), "fuzzy");

        let results = engine
            .search("customer email", &engine.default_options())
            .await
            .unwrap();
        assert_eq!(results[0].table, "customers");
        assert!(results[0].related_tables.contains("orders"));
    }

    #[tokio::test]
    async fn test_semantic_engine_with_injected_provider() {
        let dir = tempfile::TempDir::new().unwrap();
        let engine = SearchEngine::with_capabilities(
            semantic_config(write_snapshot(&dir)),
            Some(Arc::new(EmailProvider)),
            None,
            false,
        )
        .await
        .unwrap();
        assert!(engine.index().embeddings.is_some());

        let opts = SearchOptions {
            limit: 1,
            hops: 1,
            explain: true,
        };
        let results = engine.search("email", &opts).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].table, "customers");
        let explain = results[0].explain.as_ref().unwrap();
        assert_eq!(explain.strategy, "semantic");
        assert_eq!(explain.chunks_ranked, 3);
    }

    #[tokio::test]
    async fn test_semantic_without_provider_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = semantic_config(write_snapshot(&dir));
        let err = SearchEngine::with_capabilities(config, None, None, false)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("requires embeddings"));
    }

    #[tokio::test]
    async fn test_cross_encoder_without_scorer_rejected() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = semantic_config(write_snapshot(&dir));
        config.search.ranker = "cross_encoder".to_string();
        let provider: Arc<dyn EmbeddingProvider> = Arc::new(EmailProvider);
        let err = SearchEngine::with_capabilities(config, Some(provider), None, false)
            .await
            .err()
            .unwrap();
        assert!(err.to_string().contains("requires a reranker"));
    }

    /// [`EmailProvider`] that counts `embed_batch` calls.
    struct CountingEmailProvider(std::sync::atomic::AtomicUsize);

    #[async_trait]
    impl EmbeddingProvider for CountingEmailProvider {
        fn model_name(&self) -> &str {
            "email"
        }
        fn dims(&self) -> usize {
            2
        }
        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            EmailProvider.embed_batch(texts).await
        }
    }

    #[tokio::test]
    async fn test_cached_embeddings_skip_chunk_embedding() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let dir = tempfile::TempDir::new().unwrap();
        let mut config = semantic_config(write_snapshot(&dir));
        config.embedding.cache_dir = Some(dir.path().join("cache"));
        let provider = Arc::new(CountingEmailProvider(AtomicUsize::new(0)));
        let open = |reindex: bool| {
            let provider: Arc<dyn EmbeddingProvider> = provider.clone();
            SearchEngine::with_capabilities(config.clone(), Some(provider), None, reindex)
        };

        open(false).await.unwrap();
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);

        let engine = open(false).await.unwrap();
        assert_eq!(provider.0.load(Ordering::SeqCst), 1);
        assert_eq!(engine.index().embeddings.as_ref().unwrap().rows(), 3);

        // The query itself still goes through the provider.
        let results = engine.search("email", &engine.default_options()).await.unwrap();
        assert_eq!(results[0].table, "customers");
        assert_eq!(provider.0.load(Ordering::SeqCst), 2);

        open(true).await.unwrap();
        assert_eq!(provider.0.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_related_and_reload() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_snapshot(&dir);
        let engine = SearchEngine::open(Config::minimal(path.clone()), false)
            .await
            .unwrap();

        assert_eq!(
            engine.related("customers", 1).unwrap().into_iter().collect::<Vec<_>>(),
            vec!["orders"]
        );
        assert!(engine.related("audit_log", 2).unwrap().is_empty());
        assert!(engine.related("payments", 1).is_none());

        let before = engine.index();
        std::fs::write(&path, r#"{"tables": {"payments": {"name": "payments"}}}"#).unwrap();
        let after = engine.reload().await.unwrap();

        assert_eq!(before.table_count(), 3);
        assert_eq!(after.table_count(), 1);
        assert!(engine.related("payments", 1).is_some());
    }

    #[tokio::test]
    async fn test_failed_reload_keeps_current_index() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = write_snapshot(&dir);
        let engine = SearchEngine::open(Config::minimal(path.clone()), false)
            .await
            .unwrap();

        std::fs::write(&path, "not json").unwrap();
        assert!(engine.reload().await.is_err());
        assert_eq!(engine.index().table_count(), 3);
    }
}
