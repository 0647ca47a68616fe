//! # schema-search
//!
//! Natural-language search over database schemas. A schema snapshot is
//! turned into per-table text chunks, ranked against the query with a
//! fusion of BM25 and embedding similarity (optionally refined by a
//! cross-encoder), collapsed to tables, and expanded along foreign keys.
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────────┐
//! │ snapshot.json│──▶│ chunk+embed │──▶│   SearchIndex     │
//! └──────────────┘   └─────────────┘   │ chunks/matrix/FKs │
//!                                      └────────┬─────────┘
//!                        ┌──────────────────────┤
//!                        ▼                      ▼
//!                   ┌──────────┐          ┌──────────┐
//!                   │   CLI    │          │   HTTP   │
//!                   └──────────┘          └──────────┘
//! ```
//!
//! The ranking engine itself lives in `schema_search_core`; this crate
//! supplies its collaborators (snapshot loading, chunking, embedding and
//! reranking providers) and the outer surfaces.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing |
//! | [`models`] | Typed table schemas |
//! | [`snapshot`] | Snapshot loading and validation |
//! | [`chunk`] | Schema-to-text chunking |
//! | [`embedding`] | Embedding provider abstraction |
//! | [`rerank`] | Cross-encoder scorer |
//! | [`index`] | Per-snapshot index and hot swap |
//! | [`search`] | Search engine and CLI commands |
//! | [`server`] | HTTP server |
//! | [`logging`] | Tracing subscriber setup |

pub mod chunk;
pub mod config;
pub mod embedding;
pub mod index;
pub mod logging;
pub mod models;
pub mod rerank;
pub mod search;
pub mod server;
pub mod snapshot;
