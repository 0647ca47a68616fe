//! TOML configuration.
//!
//! ```toml
//! [snapshot]
//! path = "./data/schema.json"
//!
//! [search]
//! strategy = "semantic"   # or "fuzzy"
//! ranker = "bm25"         # or "cross_encoder"
//!
//! [embedding]
//! provider = "ollama"
//! model = "nomic-embed-text"
//! dims = 768
//! ```
//!
//! Every section except `[snapshot]` is optional. Values are validated
//! once in [`load_config`]; later stages assume a valid config.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

use schema_search_core::rank::{Bm25Params, RankerConfig, RankerKind};
use schema_search_core::strategy::{SearchOptions, StrategyKind};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub snapshot: SnapshotConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub reranker: RerankerConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_max_tokens() -> usize {
    256
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    #[serde(default = "default_strategy")]
    pub strategy: String,
    #[serde(default = "default_ranker")]
    pub ranker: String,
    #[serde(default = "default_embedding_weight")]
    pub embedding_weight: f64,
    #[serde(default = "default_bm25_weight")]
    pub bm25_weight: f64,
    #[serde(default = "default_initial_top_k")]
    pub initial_top_k: usize,
    #[serde(default = "default_reranker_discount")]
    pub reranker_discount: f64,
    #[serde(default = "default_epsilon")]
    pub epsilon: f64,
    #[serde(default = "default_bm25_k1")]
    pub bm25_k1: f64,
    #[serde(default = "default_bm25_b")]
    pub bm25_b: f64,
    #[serde(default = "default_limit")]
    pub limit: usize,
    #[serde(default = "default_hops")]
    pub hops: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            ranker: default_ranker(),
            embedding_weight: default_embedding_weight(),
            bm25_weight: default_bm25_weight(),
            initial_top_k: default_initial_top_k(),
            reranker_discount: default_reranker_discount(),
            epsilon: default_epsilon(),
            bm25_k1: default_bm25_k1(),
            bm25_b: default_bm25_b(),
            limit: default_limit(),
            hops: default_hops(),
        }
    }
}

fn default_strategy() -> String {
    "semantic".to_string()
}
fn default_ranker() -> String {
    "bm25".to_string()
}
fn default_embedding_weight() -> f64 {
    0.6
}
fn default_bm25_weight() -> f64 {
    0.4
}
fn default_initial_top_k() -> usize {
    20
}
fn default_reranker_discount() -> f64 {
    0.5
}
fn default_epsilon() -> f64 {
    1e-8
}
fn default_bm25_k1() -> f64 {
    1.5
}
fn default_bm25_b() -> f64 {
    0.75
}
fn default_limit() -> usize {
    5
}
fn default_hops() -> usize {
    1
}

impl SearchConfig {
    pub fn strategy_kind(&self) -> Result<StrategyKind> {
        Ok(self.strategy.parse()?)
    }

    pub fn ranker_kind(&self) -> Result<RankerKind> {
        Ok(self.ranker.parse()?)
    }

    /// Ranking parameters handed to the core.
    pub fn ranker_config(&self) -> RankerConfig {
        RankerConfig {
            embedding_weight: self.embedding_weight,
            bm25_weight: self.bm25_weight,
            initial_top_k: self.initial_top_k,
            reranker_discount: self.reranker_discount,
            epsilon: self.epsilon,
            bm25: Bm25Params {
                k1: self.bm25_k1,
                b: self.bm25_b,
                ..Bm25Params::default()
            },
        }
    }

    /// Default per-query options, overridable per request.
    pub fn options(&self) -> SearchOptions {
        SearchOptions {
            limit: self.limit,
            hops: self.hops,
            explain: false,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct EmbeddingConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub dims: Option<usize>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Base URL for the Ollama provider.
    #[serde(default)]
    pub url: Option<String>,
    /// L2-normalize every produced vector so dot product equals cosine.
    #[serde(default = "default_normalize")]
    pub normalize: bool,
    /// Directory for the chunk embedding cache. Unset disables caching.
    #[serde(default)]
    pub cache_dir: Option<PathBuf>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            dims: None,
            batch_size: 64,
            max_retries: 5,
            timeout_secs: 30,
            url: None,
            normalize: true,
            cache_dir: None,
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_batch_size() -> usize {
    64
}
fn default_max_retries() -> u32 {
    5
}
fn default_timeout_secs() -> u64 {
    30
}
fn default_normalize() -> bool {
    true
}

impl EmbeddingConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RerankerConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_rerank_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            provider: "disabled".to_string(),
            model: None,
            batch_size: default_rerank_batch_size(),
            timeout_secs: 30,
        }
    }
}

fn default_rerank_batch_size() -> usize {
    32
}

impl RerankerConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

fn default_bind() -> String {
    "127.0.0.1:7341".to_string()
}

impl Config {
    /// Defaults that need no embedding or reranking capability.
    ///
    /// Used when no config file exists, so `related`, `chunks`, and fuzzy
    /// search still work against a snapshot given on the command line.
    pub fn minimal(snapshot: PathBuf) -> Self {
        Self {
            snapshot: SnapshotConfig { path: snapshot },
            chunking: ChunkingConfig::default(),
            search: SearchConfig {
                strategy: "fuzzy".to_string(),
                ..SearchConfig::default()
            },
            embedding: EmbeddingConfig::default(),
            reranker: RerankerConfig::default(),
            server: ServerConfig::default(),
        }
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<()> {
        if self.chunking.max_tokens == 0 {
            bail!("chunking.max_tokens must be > 0");
        }

        let search = &self.search;
        if search.limit < 1 {
            bail!("search.limit must be >= 1");
        }
        for (name, value) in [
            ("search.embedding_weight", search.embedding_weight),
            ("search.bm25_weight", search.bm25_weight),
        ] {
            if !value.is_finite() || value < 0.0 {
                bail!("{} must be a finite number >= 0", name);
            }
        }
        for (name, value) in [
            ("search.reranker_discount", search.reranker_discount),
            ("search.bm25_b", search.bm25_b),
        ] {
            if !(0.0..=1.0).contains(&value) {
                bail!("{} must be in [0.0, 1.0]", name);
            }
        }
        if !(search.epsilon > 0.0) {
            bail!("search.epsilon must be > 0");
        }
        if !(search.bm25_k1 >= 0.0) {
            bail!("search.bm25_k1 must be >= 0");
        }

        let strategy = search.strategy_kind()?;
        let ranker = search.ranker_kind()?;

        match self.embedding.provider.as_str() {
            "disabled" | "openai" | "ollama" | "local" => {}
            other => bail!(
                "Unknown embedding provider: '{}'. Must be disabled, openai, ollama, or local.",
                other
            ),
        }
        if self.embedding.is_enabled() {
            if self.embedding.dims.is_none() || self.embedding.dims == Some(0) {
                bail!(
                    "embedding.dims must be > 0 when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.model.is_none() && self.embedding.provider != "local" {
                bail!(
                    "embedding.model must be specified when provider is '{}'",
                    self.embedding.provider
                );
            }
            if self.embedding.batch_size == 0 {
                bail!("embedding.batch_size must be > 0");
            }
        }
        if self.embedding.timeout_secs == 0 {
            bail!("embedding.timeout_secs must be > 0");
        }

        match self.reranker.provider.as_str() {
            "disabled" | "local" => {}
            other => bail!(
                "Unknown reranker provider: '{}'. Must be disabled or local.",
                other
            ),
        }
        if self.reranker.timeout_secs == 0 {
            bail!("reranker.timeout_secs must be > 0");
        }

        if strategy == StrategyKind::Semantic {
            if !self.embedding.is_enabled() {
                bail!("search.strategy = \"semantic\" requires an embedding provider");
            }
            if ranker == RankerKind::TwoStageRerank && !self.reranker.is_enabled() {
                bail!(
                    "search.ranker = \"{}\" requires reranker.provider to be set",
                    search.ranker
                );
            }
        }

        Ok(())
    }
}

/// Parse and validate a config from TOML text.
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    config.validate()?;
    Ok(config)
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SEMANTIC: &str = r#"
[snapshot]
path = "schema.json"

[embedding]
provider = "ollama"
model = "nomic-embed-text"
dims = 768
"#;

    #[test]
    fn test_defaults_fill_in() {
        let cfg = parse_config(SEMANTIC).unwrap();
        assert_eq!(cfg.chunking.max_tokens, 256);
        assert_eq!(cfg.search.limit, 5);
        assert_eq!(cfg.search.hops, 1);
        assert_eq!(cfg.server.bind, "127.0.0.1:7341");
        assert!(cfg.embedding.normalize);
        assert_eq!(cfg.search.strategy_kind().unwrap(), StrategyKind::Semantic);
        assert_eq!(cfg.search.ranker_kind().unwrap(), RankerKind::LexicalFusion);

        let rc = cfg.search.ranker_config();
        assert_eq!(rc.embedding_weight, 0.6);
        assert_eq!(rc.bm25_weight, 0.4);
        assert_eq!(rc.reranker_discount, 0.5);
        assert_eq!(rc.bm25.k1, 1.5);
    }

    #[test]
    fn test_semantic_requires_embeddings() {
        let err = parse_config("[snapshot]\npath = \"s.json\"\n").unwrap_err();
        assert!(err.to_string().contains("requires an embedding provider"));
    }

    #[test]
    fn test_fuzzy_needs_no_embeddings() {
        let cfg = parse_config(
            "[snapshot]\npath = \"s.json\"\n\n[search]\nstrategy = \"fuzzy\"\n",
        )
        .unwrap();
        assert_eq!(cfg.search.strategy_kind().unwrap(), StrategyKind::Fuzzy);
    }

    #[test]
    fn test_cross_encoder_requires_reranker() {
        let toml = format!("{}\n[search]\nranker = \"cross_encoder\"\n", SEMANTIC);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("reranker.provider"));

        let toml = format!("{}\n[reranker]\nprovider = \"local\"\n", toml);
        assert!(parse_config(&toml).is_ok());
    }

    #[test]
    fn test_unknown_values_rejected() {
        let toml = format!("{}\n[search]\nranker = \"colbert\"\n", SEMANTIC);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("colbert"));

        let toml = SEMANTIC.replace("ollama", "cohere");
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_range_checks() {
        let toml = format!("{}\n[search]\nlimit = 0\n", SEMANTIC);
        assert!(parse_config(&toml).is_err());
        let toml = format!("{}\n[search]\nbm25_b = 1.5\n", SEMANTIC);
        assert!(parse_config(&toml).is_err());
        let toml = format!("{}\n[chunking]\nmax_tokens = 0\n", SEMANTIC);
        assert!(parse_config(&toml).is_err());
    }

    #[test]
    fn test_fusion_weights_are_unbounded_above() {
        let toml = format!(
            "{}\n[search]\nembedding_weight = 1.5\nbm25_weight = 2.0\n",
            SEMANTIC
        );
        let cfg = parse_config(&toml).unwrap();
        assert_eq!(cfg.search.ranker_config().embedding_weight, 1.5);

        let toml = format!("{}\n[search]\nbm25_weight = -0.1\n", SEMANTIC);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("search.bm25_weight"));

        let toml = format!("{}\n[search]\nembedding_weight = nan\n", SEMANTIC);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("search.embedding_weight"));
    }

    #[test]
    fn test_zero_timeouts_rejected() {
        let toml = format!("{}timeout_secs = 0\n", SEMANTIC);
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("embedding.timeout_secs"));

        let toml = format!(
            "{}\n[reranker]\nprovider = \"local\"\ntimeout_secs = 0\n",
            SEMANTIC
        );
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("reranker.timeout_secs"));
    }

    #[test]
    fn test_cache_dir_is_optional() {
        let cfg = parse_config(SEMANTIC).unwrap();
        assert!(cfg.embedding.cache_dir.is_none());
        let toml = format!("{}cache_dir = \".cache/embeddings\"\n", SEMANTIC);
        let cfg = parse_config(&toml).unwrap();
        assert_eq!(
            cfg.embedding.cache_dir,
            Some(PathBuf::from(".cache/embeddings"))
        );
    }

    #[test]
    fn test_enabled_provider_requires_dims() {
        let toml = SEMANTIC.replace("dims = 768\n", "");
        let err = parse_config(&toml).unwrap_err();
        assert!(err.to_string().contains("embedding.dims"));
    }

    #[test]
    fn test_minimal_is_valid_and_fuzzy() {
        let cfg = Config::minimal(PathBuf::from("schema.json"));
        cfg.validate().unwrap();
        assert_eq!(cfg.search.strategy, "fuzzy");
    }
}
