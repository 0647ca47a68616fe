//! Markdown-style chunk generation from table schemas.
//!
//! Each table is rendered as:
//!
//! ```text
//! Table: orders
//! Columns: id, customer_id, total, created_at
//! Related to: customers
//! Indexes: ix_orders_customer
//! ```
//!
//! Column names are listed at most 10 per line. Tables whose text
//! exceeds `max_tokens` (whitespace-separated words) are split on line
//! boundaries; every part repeats the `Table:` header so each chunk is
//! self-describing. A single line longer than the budget is hard-split
//! between words.

use schema_search_core::models::{Chunk, ChunkSet};

use crate::models::{SchemaSnapshot, TableSchema};

const COLUMNS_PER_LINE: usize = 10;

/// Render the body lines (everything after the header) for one table.
fn body_lines(schema: &TableSchema) -> Vec<String> {
    let mut lines = Vec::new();

    let columns: Vec<&str> = schema.column_names().collect();
    for batch in columns.chunks(COLUMNS_PER_LINE) {
        lines.push(format!("Columns: {}", batch.join(", ")));
    }

    let related: Vec<&str> = schema
        .foreign_keys()
        .iter()
        .map(|fk| fk.referred_table.as_str())
        .collect();
    if !related.is_empty() {
        lines.push(format!("Related to: {}", related.join(", ")));
    }

    let indexes: Vec<&str> = schema
        .indices
        .iter()
        .flatten()
        .filter_map(|idx| idx.name.as_deref())
        .collect();
    if !indexes.is_empty() {
        lines.push(format!("Indexes: {}", indexes.join(", ")));
    }

    lines
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// Split a line that alone exceeds `budget` words into word runs.
fn split_long_line(line: &str, budget: usize) -> Vec<String> {
    let words: Vec<&str> = line.split_whitespace().collect();
    words.chunks(budget.max(1)).map(|w| w.join(" ")).collect()
}

/// Render one table into one or more chunk texts.
pub fn chunk_table(table_name: &str, schema: &TableSchema, max_tokens: usize) -> Vec<String> {
    let header = format!("Table: {}", table_name);
    let budget = max_tokens.saturating_sub(token_count(&header)).max(1);

    let mut parts: Vec<String> = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut used = 0usize;

    let flush = |current: &mut Vec<String>, parts: &mut Vec<String>| {
        let mut text = header.clone();
        for line in current.drain(..) {
            text.push('\n');
            text.push_str(&line);
        }
        parts.push(text);
    };

    for line in body_lines(schema) {
        let pieces = if token_count(&line) > budget {
            split_long_line(&line, budget)
        } else {
            vec![line]
        };
        for piece in pieces {
            let n = token_count(&piece);
            if used + n > budget && !current.is_empty() {
                flush(&mut current, &mut parts);
                used = 0;
            }
            used += n;
            current.push(piece);
        }
    }

    if !current.is_empty() || parts.is_empty() {
        flush(&mut current, &mut parts);
    }
    parts
}

/// Chunk every table of a snapshot, in table-name order.
///
/// Chunk ids are global positions; `metadata` records `{part, parts}`
/// (1-based) for tables split across several chunks.
pub fn chunk_snapshot(snapshot: &SchemaSnapshot, max_tokens: usize) -> ChunkSet {
    let mut chunks = Vec::new();
    for (name, schema) in &snapshot.tables {
        let parts = chunk_table(name, schema, max_tokens);
        let total = parts.len();
        for (i, content) in parts.into_iter().enumerate() {
            let mut chunk = Chunk::new(chunks.len(), name.as_str(), content);
            chunk.metadata = serde_json::json!({ "part": i + 1, "parts": total });
            chunks.push(chunk);
        }
    }
    ChunkSet::new(chunks)
}
