//! Typed table schemas as produced by database introspection.
//!
//! Optional sections are `None` when the extractor skipped them and an
//! empty list when the table genuinely has none.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use schema_search_core::models::ForeignKey;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default = "default_nullable")]
    pub nullable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

fn default_nullable() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexInfo {
    #[serde(default)]
    pub name: Option<String>,
    pub columns: Vec<String>,
    #[serde(default)]
    pub unique: bool,
}

/// A unique or check constraint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableSchema {
    pub name: String,
    #[serde(default)]
    pub columns: Option<Vec<ColumnInfo>>,
    #[serde(default)]
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub foreign_keys: Option<Vec<ForeignKey>>,
    #[serde(default)]
    pub indices: Option<Vec<IndexInfo>>,
    #[serde(default)]
    pub unique_constraints: Option<Vec<ConstraintInfo>>,
    #[serde(default)]
    pub check_constraints: Option<Vec<ConstraintInfo>>,
}

impl TableSchema {
    pub fn foreign_keys(&self) -> &[ForeignKey] {
        self.foreign_keys.as_deref().unwrap_or_default()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().flatten().map(|c| c.name.as_str())
    }
}

/// On-disk snapshot: `{ "tables": { name: TableSchema } }`.
///
/// Tables are kept in name order so chunk generation is deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SchemaSnapshot {
    pub tables: BTreeMap<String, TableSchema>,
}
