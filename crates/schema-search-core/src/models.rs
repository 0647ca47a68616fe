//! Data types shared by rankers, the aggregator, and search strategies.
//!
//! A [`Chunk`] is one unit of searchable text tied to exactly one table.
//! Its position in the owning [`ChunkSet`] is its identity for the
//! lifetime of that set: ranked entries, embedding rows, and matched
//! chunk ids all refer back to it by index.

use std::collections::BTreeSet;
use std::ops::Deref;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// One unit of searchable text describing (part of) a table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    /// Index of this chunk within its [`ChunkSet`].
    pub id: usize,
    pub table_name: String,
    pub content: String,
    /// Producer-defined metadata; never inspected by the engine.
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl Chunk {
    pub fn new(id: usize, table_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id,
            table_name: table_name.into(),
            content: content.into(),
            metadata: serde_json::Value::Null,
        }
    }
}

/// An immutable, cheaply clonable sequence of chunks.
///
/// The fingerprint is a SHA-256 digest over every chunk's table name and
/// content, so two sets with the same text in the same order compare
/// equal. Strategies use it to decide whether a ranker must be rebuilt.
#[derive(Debug, Clone)]
pub struct ChunkSet {
    chunks: Arc<[Chunk]>,
    fingerprint: String,
}

impl ChunkSet {
    /// Wrap chunks, renumbering ids to match their positions.
    pub fn new(chunks: Vec<Chunk>) -> Self {
        let chunks: Vec<Chunk> = chunks
            .into_iter()
            .enumerate()
            .map(|(i, mut c)| {
                c.id = i;
                c
            })
            .collect();

        let mut hasher = Sha256::new();
        for c in &chunks {
            hasher.update(c.table_name.as_bytes());
            hasher.update([0u8]);
            hasher.update(c.content.as_bytes());
            hasher.update([0u8]);
        }
        let fingerprint = hex::encode(hasher.finalize());

        Self {
            chunks: chunks.into(),
            fingerprint,
        }
    }

    /// Hex-encoded SHA-256 over the set's contents.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Shared handle to the underlying slice.
    pub fn shared(&self) -> Arc<[Chunk]> {
        Arc::clone(&self.chunks)
    }
}

impl Deref for ChunkSet {
    type Target = [Chunk];

    fn deref(&self) -> &[Chunk] {
        &self.chunks
    }
}

impl Default for ChunkSet {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

/// One scored chunk produced by a ranker.
///
/// `combined_score` is the only ordering key. The other two scores are
/// kept for explanation: `vector_score` is the raw query·chunk dot
/// product and `auxiliary_score` is the ranker's secondary signal
/// (normalized BM25, or the pairwise reranker score).
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RankedEntry {
    pub chunk_index: usize,
    pub combined_score: f64,
    pub vector_score: f64,
    pub auxiliary_score: f64,
}

/// Aggregated relevance of one table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableScore {
    pub table: String,
    /// Maximum `combined_score` among the table's chunks.
    pub score: f64,
    /// Contributing chunk indices in ranked order (best first).
    pub chunk_indices: Vec<usize>,
}

/// A foreign-key edge as supplied by schema introspection.
///
/// Only `referred_table` is used for graph construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    #[serde(default)]
    pub constrained_columns: Vec<String>,
    pub referred_table: String,
    #[serde(default)]
    pub referred_columns: Vec<String>,
}

impl ForeignKey {
    pub fn to(referred_table: impl Into<String>) -> Self {
        Self {
            constrained_columns: Vec::new(),
            referred_table: referred_table.into(),
            referred_columns: Vec::new(),
        }
    }
}

/// A search result: one table with its score, schema, and neighborhood.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResultItem {
    pub table: String,
    pub score: f64,
    /// Opaque schema payload, attached verbatim.
    pub schema: serde_json::Value,
    /// Ids of the chunks that contributed, best first.
    pub matched_chunk_ids: Vec<usize>,
    /// Tables reachable within the requested number of hops.
    pub related_tables: BTreeSet<String>,
    /// Scoring breakdown (populated when explanation is requested).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explain: Option<ScoreExplanation>,
}

/// Scoring breakdown for a search result, taken from the table's best chunk.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreExplanation {
    pub strategy: &'static str,
    pub ranker: &'static str,
    pub vector_score: f64,
    pub auxiliary_score: f64,
    /// Number of chunks that were scored for this query.
    pub chunks_ranked: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_set_renumbers_ids() {
        let set = ChunkSet::new(vec![
            Chunk::new(7, "orders", "a"),
            Chunk::new(3, "customers", "b"),
        ]);
        assert_eq!(set.len(), 2);
        assert_eq!(set[0].id, 0);
        assert_eq!(set[1].id, 1);
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = ChunkSet::new(vec![Chunk::new(0, "orders", "order totals")]);
        let b = ChunkSet::new(vec![Chunk::new(0, "orders", "order totals")]);
        let c = ChunkSet::new(vec![Chunk::new(0, "orders", "order dates")]);
        assert_eq!(a.fingerprint(), b.fingerprint());
        assert_ne!(a.fingerprint(), c.fingerprint());
        assert_eq!(a.fingerprint().len(), 64);
    }

    #[test]
    fn test_fingerprint_separates_table_and_content() {
        let a = ChunkSet::new(vec![Chunk::new(0, "ab", "c")]);
        let b = ChunkSet::new(vec![Chunk::new(0, "a", "bc")]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_result_item_skips_absent_explain() {
        let item = SearchResultItem {
            table: "orders".to_string(),
            score: 0.5,
            schema: serde_json::json!({"name": "orders"}),
            matched_chunk_ids: vec![0, 2],
            related_tables: BTreeSet::from(["customers".to_string()]),
            explain: None,
        };
        let json = serde_json::to_value(&item).unwrap();
        assert!(json.get("explain").is_none());
        assert_eq!(json["matched_chunk_ids"], serde_json::json!([0, 2]));
        assert_eq!(json["related_tables"], serde_json::json!(["customers"]));
    }
}
