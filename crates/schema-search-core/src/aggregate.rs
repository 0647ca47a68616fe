//! Chunk → table score aggregation.
//!
//! A table scores the MAXIMUM `combined_score` of its chunks, so one
//! highly relevant chunk surfaces the table no matter how the rest of
//! its chunks score. Tables are ordered by score descending; equal
//! scores keep the order in which the tables first appear in the ranked
//! sequence.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::models::{Chunk, RankedEntry, TableScore};
use crate::rank::score_cmp;

/// Fold ranked chunks into the `top_k` best tables.
///
/// Returns an empty vector for an empty ranking. Entries pointing past
/// the end of `chunks` are skipped.
pub fn top_tables(ranked: &[RankedEntry], chunks: &[Chunk], top_k: usize) -> Vec<TableScore> {
    let mut tables: Vec<TableScore> = Vec::new();
    let mut slot: HashMap<&str, usize> = HashMap::new();

    for entry in ranked {
        let Some(chunk) = chunks.get(entry.chunk_index) else {
            warn!(
                chunk_index = entry.chunk_index,
                chunks = chunks.len(),
                "ranked entry refers to unknown chunk"
            );
            continue;
        };

        match slot.get(chunk.table_name.as_str()) {
            Some(&i) => {
                let table = &mut tables[i];
                if entry.combined_score > table.score {
                    table.score = entry.combined_score;
                }
                table.chunk_indices.push(entry.chunk_index);
            }
            None => {
                slot.insert(chunk.table_name.as_str(), tables.len());
                tables.push(TableScore {
                    table: chunk.table_name.clone(),
                    score: entry.combined_score,
                    chunk_indices: vec![entry.chunk_index],
                });
            }
        }
    }

    // Stable: ties keep first-appearance order.
    tables.sort_by(|a, b| score_cmp(b.score, a.score));
    tables.truncate(top_k);

    debug!(
        ranked = ranked.len(),
        tables = tables.len(),
        top_k,
        "aggregated chunk scores by table"
    );
    tables
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(idx: usize, score: f64) -> RankedEntry {
        RankedEntry {
            chunk_index: idx,
            combined_score: score,
            vector_score: 0.0,
            auxiliary_score: 0.0,
        }
    }

    fn chunk(id: usize, table: &str) -> Chunk {
        Chunk::new(id, table, "")
    }

    #[test]
    fn test_empty_ranking_gives_empty_result() {
        assert!(top_tables(&[], &[chunk(0, "a")], 5).is_empty());
    }

    #[test]
    fn test_table_score_is_max_of_its_chunks() {
        let chunks = vec![chunk(0, "orders"), chunk(1, "orders"), chunk(2, "users")];
        let ranked = vec![entry(0, 0.95), entry(2, 0.6), entry(1, 0.05)];
        let tables = top_tables(&ranked, &chunks, 10);
        assert_eq!(tables[0].table, "orders");
        assert_eq!(tables[0].score, 0.95);
        assert_eq!(tables[0].chunk_indices, vec![0, 1]);
        assert_eq!(tables[1].table, "users");
    }

    #[test]
    fn test_max_holds_even_for_unsorted_input() {
        let chunks = vec![chunk(0, "orders"), chunk(1, "orders")];
        let ranked = vec![entry(1, 0.1), entry(0, 0.8)];
        let tables = top_tables(&ranked, &chunks, 10);
        assert_eq!(tables[0].score, 0.8);
        assert_eq!(tables[0].chunk_indices, vec![1, 0]);
    }

    #[test]
    fn test_ties_resolved_by_first_appearance() {
        // Five tables scored [0.9, 0.8, 0.8, 0.5, 0.1]; "c" appears before "b".
        let chunks = vec![
            chunk(0, "a"),
            chunk(1, "b"),
            chunk(2, "c"),
            chunk(3, "d"),
            chunk(4, "e"),
        ];
        let ranked = vec![
            entry(0, 0.9),
            entry(2, 0.8),
            entry(1, 0.8),
            entry(3, 0.5),
            entry(4, 0.1),
        ];
        let tables = top_tables(&ranked, &chunks, 2);
        let names: Vec<&str> = tables.iter().map(|t| t.table.as_str()).collect();
        assert_eq!(names, vec!["a", "c"]);
    }

    #[test]
    fn test_truncates_to_top_k() {
        let chunks = vec![chunk(0, "a"), chunk(1, "b"), chunk(2, "c")];
        let ranked = vec![entry(0, 0.3), entry(1, 0.2), entry(2, 0.1)];
        assert_eq!(top_tables(&ranked, &chunks, 2).len(), 2);
        assert!(top_tables(&ranked, &chunks, 0).is_empty());
    }

    #[test]
    fn test_unknown_chunk_index_is_skipped() {
        let chunks = vec![chunk(0, "a")];
        let ranked = vec![entry(5, 0.9), entry(0, 0.3)];
        let tables = top_tables(&ranked, &chunks, 5);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].chunk_indices, vec![0]);
    }
}
