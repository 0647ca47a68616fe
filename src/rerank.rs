//! Cross-encoder pairwise scoring for the two-stage ranker.
//!
//! The `local` provider wraps fastembed's `TextRerank`. The model handle
//! starts out unloaded and is acquired on the first scoring call; later
//! calls reuse it, and concurrent first calls load it only once. Each
//! batch runs on the blocking pool.
//!
//! Every scorer handed out by [`create_scorer`] is wrapped in
//! [`TimedScorer`], which bounds each call by `reranker.timeout_secs`.

use anyhow::{bail, Result};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

use schema_search_core::rank::PairScorer;
use schema_search_core::SearchError;

use crate::config::RerankerConfig;

#[cfg(feature = "local-embeddings-fastembed")]
pub use local::LocalReranker;

/// Build the scorer selected by `[reranker]`, or `None` when disabled.
pub fn create_scorer(config: &RerankerConfig) -> Result<Option<Arc<dyn PairScorer>>> {
    match config.provider.as_str() {
        "disabled" => Ok(None),
        #[cfg(feature = "local-embeddings-fastembed")]
        "local" => Ok(Some(Arc::new(TimedScorer::new(
            Arc::new(LocalReranker::new(config)?),
            Duration::from_secs(config.timeout_secs),
        )))),
        #[cfg(not(feature = "local-embeddings-fastembed"))]
        "local" => bail!("Local reranker requires --features local-embeddings-fastembed"),
        other => bail!("Unknown reranker provider: {}", other),
    }
}

/// Bounds every `score_pairs` call of the wrapped scorer.
pub struct TimedScorer {
    inner: Arc<dyn PairScorer>,
    timeout: Duration,
}

impl TimedScorer {
    pub fn new(inner: Arc<dyn PairScorer>, timeout: Duration) -> Self {
        Self { inner, timeout }
    }
}

#[async_trait]
impl PairScorer for TimedScorer {
    fn model_name(&self) -> &str {
        self.inner.model_name()
    }

    async fn score_pairs(&self, query: &str, candidates: &[&str]) -> Result<Vec<f64>, SearchError> {
        tokio::time::timeout(self.timeout, self.inner.score_pairs(query, candidates))
            .await
            .map_err(|_| SearchError::Timeout {
                capability: "reranking",
                after: self.timeout,
            })?
    }
}

#[cfg(feature = "local-embeddings-fastembed")]
mod local {
    use anyhow::{anyhow, bail, Result};
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};
    use tokio::sync::OnceCell;
    use tracing::{debug, info};

    use schema_search_core::rank::PairScorer;
    use schema_search_core::SearchError;

    use crate::config::RerankerConfig;

    const DEFAULT_MODEL: &str = "bge-reranker-base";

    type Model = Arc<Mutex<fastembed::TextRerank>>;

    pub struct LocalReranker {
        model_name: String,
        batch_size: usize,
        model: OnceCell<Model>,
    }

    impl LocalReranker {
        pub fn new(config: &RerankerConfig) -> Result<Self> {
            let model_name = config
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string());
            config_to_rerank_model(&model_name)?;
            Ok(Self {
                model_name,
                batch_size: config.batch_size.max(1),
                model: OnceCell::new(),
            })
        }

        /// Whether the model has been loaded.
        pub fn is_connected(&self) -> bool {
            self.model.initialized()
        }

        async fn acquire(&self) -> Result<Model> {
            let model = self
                .model
                .get_or_try_init(|| async {
                    let which = config_to_rerank_model(&self.model_name)?;
                    let loaded = tokio::task::spawn_blocking(move || {
                        fastembed::TextRerank::try_new(
                            fastembed::RerankInitOptions::new(which)
                                .with_show_download_progress(false),
                        )
                        .map_err(|e| anyhow!("Failed to initialize reranker model: {}", e))
                    })
                    .await??;
                    info!(model = %self.model_name, "loaded cross-encoder reranker");
                    Ok::<_, anyhow::Error>(Arc::new(Mutex::new(loaded)))
                })
                .await?;
            Ok(Arc::clone(model))
        }

        async fn score(&self, query: &str, candidates: &[&str]) -> Result<Vec<f64>> {
            let model = self.acquire().await?;
            let query = query.to_string();
            let documents: Vec<String> = candidates.iter().map(|c| c.to_string()).collect();
            let count = documents.len();
            let batch_size = self.batch_size;

            let results = tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| anyhow!("reranker model lock poisoned"))?;
                model
                    .rerank(query, documents, false, Some(batch_size))
                    .map_err(|e| anyhow!("rerank failed: {}", e))
            })
            .await??;

            // Results come back sorted by score; restore input order.
            let mut scores: Vec<Option<f64>> = vec![None; count];
            for r in results {
                match scores.get_mut(r.index) {
                    Some(slot) => *slot = Some(f64::from(r.score)),
                    None => bail!("reranker returned out-of-range index {}", r.index),
                }
            }
            let filled = scores.iter().filter(|s| s.is_some()).count();
            if filled != count {
                bail!("reranker returned {} scores for {} candidates", filled, count);
            }
            Ok(scores.into_iter().flatten().collect())
        }
    }

    #[async_trait]
    impl PairScorer for LocalReranker {
        fn model_name(&self) -> &str {
            &self.model_name
        }

        async fn score_pairs(
            &self,
            query: &str,
            candidates: &[&str],
        ) -> Result<Vec<f64>, SearchError> {
            debug!(candidates = candidates.len(), "scoring rerank candidates");
            self.score(query, candidates)
                .await
                .map_err(|e| SearchError::RerankerUnavailable {
                    reason: format!("{:#}", e),
                })
        }
    }

    fn config_to_rerank_model(name: &str) -> Result<fastembed::RerankerModel> {
        match name {
            "bge-reranker-base" => Ok(fastembed::RerankerModel::BGERerankerBase),
            "bge-reranker-v2-m3" => Ok(fastembed::RerankerModel::BGERerankerV2M3),
            "jina-reranker-v1-turbo-en" => Ok(fastembed::RerankerModel::JINARerankerV1TurboEn),
            other => bail!(
                "Unknown reranker model: '{}'. Supported models: \
                 bge-reranker-base, bge-reranker-v2-m3, jina-reranker-v1-turbo-en",
                other
            ),
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_gives_no_scorer() {
        assert!(create_scorer(&RerankerConfig::default()).unwrap().is_none());
    }

    #[test]
    fn test_unknown_provider_rejected() {
        let cfg = RerankerConfig {
            provider: "cohere".to_string(),
            ..RerankerConfig::default()
        };
        assert!(create_scorer(&cfg).is_err());
    }

    struct SleepyScorer(Duration);

    #[async_trait]
    impl PairScorer for SleepyScorer {
        fn model_name(&self) -> &str {
            "sleepy"
        }
        async fn score_pairs(&self, _: &str, candidates: &[&str]) -> Result<Vec<f64>, SearchError> {
            tokio::time::sleep(self.0).await;
            Ok(vec![1.0; candidates.len()])
        }
    }

    #[tokio::test]
    async fn test_slow_scorer_times_out() {
        let scorer = TimedScorer::new(
            Arc::new(SleepyScorer(Duration::from_secs(5))),
            Duration::from_secs(1),
        );
        let err = scorer.score_pairs("q", &["a", "b"]).await.unwrap_err();
        assert!(matches!(
            err,
            SearchError::Timeout {
                capability: "reranking",
                ..
            }
        ));
        assert_eq!(err.code(), "timeout");
    }

    #[tokio::test]
    async fn test_fast_scorer_passes_through() {
        let scorer = TimedScorer::new(
            Arc::new(SleepyScorer(Duration::from_millis(1))),
            Duration::from_secs(1),
        );
        assert_eq!(scorer.model_name(), "sleepy");
        assert_eq!(scorer.score_pairs("q", &["a", "b"]).await.unwrap(), vec![1.0, 1.0]);
    }
}
