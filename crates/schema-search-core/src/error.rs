//! Error taxonomy for the ranking engine.
//!
//! Only contract violations and failures of external capabilities are
//! errors. Empty results, zero lexical matches, and unknown tables in a
//! graph lookup are ordinary outcomes and never surface here.

use std::time::Duration;

/// Errors produced by rankers, strategies, and the embedding matrix.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// `rank()` (or an operation depending on it) ran before `build()`.
    #[error("{component} not initialized: call build() first")]
    NotInitialized { component: &'static str },

    /// Query vector length differs from the embedding matrix width.
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Embedding matrix row count differs from the chunk count.
    #[error("embedding matrix has {rows} rows but there are {chunks} chunks")]
    ShapeMismatch { rows: usize, chunks: usize },

    /// The pairwise scoring capability failed or misbehaved.
    #[error("reranker unavailable: {reason}")]
    RerankerUnavailable { reason: String },

    /// The query embedding capability failed.
    #[error("embedding unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    /// Semantic search was asked for but no embedding capability or chunk
    /// embedding matrix is configured.
    #[error("embeddings disabled: {reason}")]
    EmbeddingsDisabled { reason: String },

    /// An external capability did not answer within its configured limit.
    #[error("{capability} timed out after {after:?}")]
    Timeout {
        capability: &'static str,
        after: Duration,
    },

    /// A configuration value does not name a known variant.
    #[error("unknown {kind}: '{value}' (expected one of: {expected})")]
    UnknownVariant {
        kind: &'static str,
        value: String,
        expected: String,
    },
}

impl SearchError {
    /// Short machine-readable code, used by the HTTP error envelope.
    pub fn code(&self) -> &'static str {
        match self {
            SearchError::NotInitialized { .. } => "not_initialized",
            SearchError::DimensionMismatch { .. } => "dimension_mismatch",
            SearchError::ShapeMismatch { .. } => "shape_mismatch",
            SearchError::RerankerUnavailable { .. } => "reranker_unavailable",
            SearchError::EmbeddingUnavailable { .. } => "embedding_unavailable",
            SearchError::EmbeddingsDisabled { .. } => "embeddings_disabled",
            SearchError::Timeout { .. } => "timeout",
            SearchError::UnknownVariant { .. } => "bad_request",
        }
    }
}
