//! # Schema Search Core
//!
//! Ranking engine for finding database tables by natural-language query:
//! chunk models, hybrid BM25 + vector ranking, pairwise reranking,
//! chunk → table aggregation, and foreign-key graph expansion.
//!
//! This crate does no network or filesystem I/O. Query embedding and
//! pairwise scoring are capabilities supplied by the caller through
//! [`embedding::QueryEmbedder`] and [`rank::PairScorer`].

pub mod aggregate;
pub mod embedding;
pub mod error;
pub mod graph;
pub mod models;
pub mod rank;
pub mod strategy;

pub use error::SearchError;
