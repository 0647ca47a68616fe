//! Embedding matrix, query embedding trait, and vector utilities.
//!
//! The engine never produces embeddings itself. It consumes a
//! precomputed [`EmbeddingMatrix`] (one row per chunk) and asks a
//! [`QueryEmbedder`] for the query vector. Concrete embedders (OpenAI,
//! Ollama, fastembed) live in the `schema-search` app crate.

use async_trait::async_trait;

use crate::error::SearchError;

/// Capability for turning query text into a vector.
///
/// The produced vector must have [`dims`](QueryEmbedder::dims) entries,
/// matching the embedding matrix it will be scored against.
#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Returns the model identifier (e.g. `"text-embedding-3-small"`).
    fn model_name(&self) -> &str;
    /// Returns the embedding vector dimensionality (e.g. `1536`).
    fn dims(&self) -> usize;
    /// Embed a single query. Failures map to
    /// [`SearchError::EmbeddingUnavailable`], a missing capability to
    /// [`SearchError::EmbeddingsDisabled`], and an exceeded time limit to
    /// [`SearchError::Timeout`].
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>, SearchError>;
}

/// Dense `rows × dims` matrix of chunk embeddings, stored row-major.
#[derive(Debug, Clone, Default)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    rows: usize,
    dims: usize,
}

impl EmbeddingMatrix {
    /// Build a matrix from per-chunk vectors, each of length `dims`.
    pub fn new(dims: usize, vectors: Vec<Vec<f32>>) -> Result<Self, SearchError> {
        let rows = vectors.len();
        let mut data = Vec::with_capacity(rows * dims);
        for v in vectors {
            if v.len() != dims {
                return Err(SearchError::DimensionMismatch {
                    expected: dims,
                    actual: v.len(),
                });
            }
            data.extend_from_slice(&v);
        }
        Ok(Self { data, rows, dims })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn row(&self, i: usize) -> Option<&[f32]> {
        if i >= self.rows {
            return None;
        }
        Some(&self.data[i * self.dims..(i + 1) * self.dims])
    }

    /// Dot product of every row with `query`.
    ///
    /// Equals cosine similarity when both sides are L2-normalized;
    /// normalization is the embedding producer's job.
    pub fn scores(&self, query: &[f32]) -> Result<Vec<f64>, SearchError> {
        if query.len() != self.dims {
            return Err(SearchError::DimensionMismatch {
                expected: self.dims,
                actual: query.len(),
            });
        }
        if self.dims == 0 {
            return Ok(vec![0.0; self.rows]);
        }
        Ok(self
            .data
            .chunks_exact(self.dims)
            .map(|row| dot(row, query))
            .collect())
    }
}

/// Dot product accumulated in `f64`.
pub fn dot(a: &[f32], b: &[f32]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| f64::from(*x) * f64::from(*y))
        .sum()
}

/// Scale `v` to unit length in place. Zero vectors are left untouched.
pub fn l2_normalize(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm < f32::EPSILON {
        return;
    }
    for x in v.iter_mut() {
        *x /= norm;
    }
}
