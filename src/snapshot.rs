//! Loading schema snapshots from disk.

use anyhow::{bail, Context, Result};
use std::path::Path;
use tracing::info;

use crate::models::SchemaSnapshot;

/// Parse and validate snapshot JSON.
///
/// Every table entry's `name` must equal its key; a mismatch usually
/// means the file was hand-edited and would silently break lookups.
pub fn parse_snapshot(content: &str) -> Result<SchemaSnapshot> {
    let snapshot: SchemaSnapshot =
        serde_json::from_str(content).with_context(|| "Failed to parse schema snapshot")?;

    for (key, table) in &snapshot.tables {
        if key != &table.name {
            bail!(
                "snapshot entry '{}' has mismatched name '{}'",
                key,
                table.name
            );
        }
    }
    Ok(snapshot)
}

pub fn load_snapshot(path: &Path) -> Result<SchemaSnapshot> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema snapshot: {}", path.display()))?;
    let snapshot = parse_snapshot(&content)
        .with_context(|| format!("Invalid schema snapshot: {}", path.display()))?;
    info!(
        path = %path.display(),
        tables = snapshot.tables.len(),
        "loaded schema snapshot"
    );
    Ok(snapshot)
}
