//! On-disk cache for the chunk embedding matrix.
//!
//! Embedding every chunk is the slowest part of loading a snapshot, so the
//! matrix is written to `<cache_dir>/embeddings.json` together with the key
//! that produced it. The key covers the chunk set fingerprint, the model,
//! the vector width, and normalization. Chunk text already depends on
//! `chunking.max_tokens`, so the fingerprint covers that too. Any mismatch,
//! an unreadable file, or `--reindex` regenerates the matrix.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use schema_search_core::embedding::EmbeddingMatrix;
use schema_search_core::models::ChunkSet;

use super::{embed_chunks, EmbeddingProvider};
use crate::config::EmbeddingConfig;

const CACHE_FILE: &str = "embeddings.json";

/// Everything a cached matrix depends on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheKey {
    pub fingerprint: String,
    pub model: String,
    pub dims: usize,
    pub normalize: bool,
}

impl CacheKey {
    pub fn new(
        chunks: &ChunkSet,
        provider: &dyn EmbeddingProvider,
        config: &EmbeddingConfig,
    ) -> Self {
        Self {
            fingerprint: chunks.fingerprint().to_string(),
            model: provider.model_name().to_string(),
            dims: provider.dims(),
            normalize: config.normalize,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct CacheFile {
    key: CacheKey,
    rows: Vec<Vec<f32>>,
}

pub struct EmbeddingCache {
    path: PathBuf,
}

impl EmbeddingCache {
    pub fn new(dir: &Path) -> Self {
        Self {
            path: dir.join(CACHE_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The cached matrix if it was stored under `key`.
    pub fn load(&self, key: &CacheKey, rows: usize) -> Option<EmbeddingMatrix> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "cannot read embedding cache");
                return None;
            }
        };
        let cached: CacheFile = match serde_json::from_str(&content) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "corrupt embedding cache, regenerating");
                return None;
            }
        };
        if cached.key != *key {
            info!(
                cached_model = %cached.key.model,
                model = %key.model,
                "embedding cache is stale"
            );
            return None;
        }
        if cached.rows.len() != rows {
            warn!(cached = cached.rows.len(), chunks = rows, "embedding cache row count differs");
            return None;
        }
        match EmbeddingMatrix::new(key.dims, cached.rows) {
            Ok(m) => Some(m),
            Err(e) => {
                warn!(error = %e, "embedding cache has malformed rows");
                None
            }
        }
    }

    /// Write `matrix` under `key`, replacing any previous file.
    pub fn store(&self, key: &CacheKey, matrix: &EmbeddingMatrix) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create cache dir: {}", dir.display()))?;
        }
        let file = CacheFile {
            key: key.clone(),
            rows: (0..matrix.rows())
                .filter_map(|i| matrix.row(i).map(<[f32]>::to_vec))
                .collect(),
        };
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, serde_json::to_vec(&file)?)
            .with_context(|| format!("Failed to write {}", tmp.display()))?;
        std::fs::rename(&tmp, &self.path)
            .with_context(|| format!("Failed to replace {}", self.path.display()))?;
        Ok(())
    }

    /// Reuse the cached matrix for `chunks`, or embed and store a new one.
    ///
    /// `force` skips the lookup. A failed write is logged, not returned.
    pub async fn load_or_embed(
        &self,
        provider: &dyn EmbeddingProvider,
        config: &EmbeddingConfig,
        chunks: &ChunkSet,
        force: bool,
    ) -> Result<EmbeddingMatrix> {
        let key = CacheKey::new(chunks, provider, config);
        if !force {
            if let Some(matrix) = self.load(&key, chunks.len()) {
                info!(path = %self.path.display(), chunks = matrix.rows(), "loaded embeddings from cache");
                return Ok(matrix);
            }
        }

        let matrix = embed_chunks(provider, config, chunks).await?;
        match self.store(&key, &matrix) {
            Ok(()) => info!(path = %self.path.display(), "wrote embedding cache"),
            Err(e) => warn!(error = %format!("{:#}", e), "failed to write embedding cache"),
        }
        Ok(matrix)
    }
}
