//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nesting, e.g. `APP_RETRIEVAL__DEFAULT_K`).
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::retry::RetryPolicy;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        Ok(Self { figment })
    }

    /// Defaults overlaid with one explicit TOML file and `APP_*` variables.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::Config(format!("config file {} does not exist", path.display())));
        }
        let figment = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("APP_").split("__"));
        Ok(Self { figment })
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Config(format!("Failed to get '{key}': {e}")))
    }

    /// Extract and validate the typed settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkerConfig,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub fusion: FusionSettings,
    pub reranker: RerankerSettings,
    pub retrieval: RetrievalSettings,
    pub graph: GraphSettings,
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.fusion.validate()?;
        self.reranker.validate()?;
        self.retrieval.validate()?;
        if self.embedding.dim == 0 {
            return Err(Error::Config("embedding.dim must be greater than zero".to_string()));
        }
        if self.embedding.dim != self.vector.dim {
            return Err(Error::Config(format!(
                "embedding.dim ({}) must match vector.dim ({})",
                self.embedding.dim, self.vector.dim
            )));
        }
        Ok(())
    }
}

/// Parameters of the recursive character splitter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkerConfig {
    pub chunk_size: usize,
    pub overlap: usize,
    /// Tried in order, coarsest first. An empty string means character slicing.
    pub separators: Vec<String>,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            overlap: 50,
            separators: ["\n\n", "\n", "。", ". ", " ", ""].iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl ChunkerConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self { chunk_size, overlap, ..Self::default() }
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".to_string()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Use the deterministic hash embedder instead of loading model weights.
    pub use_fake: bool,
    pub model_dir: String,
    pub max_len: usize,
    pub dim: usize,
    pub prefer_metal: bool,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { use_fake: false, model_dir: "~/models/bge-m3".to_string(), max_len: 256, dim: 1024, prefer_metal: true }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorBackendKind {
    Memory,
    Lance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub backend: VectorBackendKind,
    pub uri: String,
    pub table: String,
    pub dim: usize,
    /// Page multiplier used when metadata conditions are post-filtered.
    pub overfetch: usize,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            backend: VectorBackendKind::Memory,
            uri: "./data/indexes/lancedb".to_string(),
            table: "chunks".to_string(),
            dim: 1024,
            overfetch: 4,
        }
    }
}

/// Adds `boost` to the fused score of candidates whose numeric metadata
/// `field` is at least `threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfidenceBoost {
    #[serde(default = "default_confidence_field")]
    pub field: String,
    pub threshold: f64,
    pub boost: f32,
}

fn default_confidence_field() -> String {
    "confidence".to_string()
}

/// Per-domain weighting of the vector and graph paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FusionWeightProfile {
    pub domain: String,
    pub semantic_weight: f32,
    pub graph_weight: f32,
    #[serde(default)]
    pub graph_enabled: bool,
    #[serde(default)]
    pub confidence_boost: Option<ConfidenceBoost>,
}

impl FusionWeightProfile {
    pub fn new(domain: impl Into<String>, semantic_weight: f32, graph_weight: f32) -> Self {
        Self { domain: domain.into(), semantic_weight, graph_weight, graph_enabled: graph_weight > 0.0, confidence_boost: None }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, w) in [("semantic_weight", self.semantic_weight), ("graph_weight", self.graph_weight)] {
            if !w.is_finite() || w < 0.0 {
                return Err(Error::Config(format!("fusion profile '{}': {name} must be a non-negative number", self.domain)));
            }
        }
        if self.semantic_weight + self.graph_weight <= 0.0 {
            return Err(Error::Config(format!("fusion profile '{}': weights must not both be zero", self.domain)));
        }
        Ok(())
    }

    /// Weights scaled proportionally so they sum to one.
    pub fn normalized_weights(&self) -> (f32, f32) {
        let sum = self.semantic_weight + self.graph_weight;
        if sum <= 0.0 || (sum - 1.0).abs() <= f32::EPSILON {
            return (self.semantic_weight, self.graph_weight);
        }
        (self.semantic_weight / sum, self.graph_weight / sum)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionSettings {
    pub default: FusionWeightProfile,
    pub profiles: Vec<FusionWeightProfile>,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self { default: FusionWeightProfile::new("default", 1.0, 0.0), profiles: Vec::new() }
    }
}

impl FusionSettings {
    pub fn validate(&self) -> Result<()> {
        self.default.validate()?;
        for p in &self.profiles {
            p.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerKind {
    CrossEncoder,
    Keyword,
    Embedding,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScorerSpec {
    pub kind: ScorerKind,
    pub weight: f32,
    #[serde(default)]
    pub model_dir: Option<String>,
    #[serde(default)]
    pub max_len: Option<usize>,
}

/// Reranker ensemble description. One member builds a single-scorer reranker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerSettings {
    pub enabled: bool,
    /// Min-max normalise each scorer's batch before weighting.
    pub normalize: bool,
    pub batch_size: usize,
    pub members: Vec<ScorerSpec>,
}

impl Default for RerankerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            normalize: true,
            batch_size: 16,
            members: vec![ScorerSpec { kind: ScorerKind::Keyword, weight: 1.0, model_dir: None, max_len: None }],
        }
    }
}

impl RerankerSettings {
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("reranker.batch_size must be greater than zero".to_string()));
        }
        if self.enabled && self.members.iter().any(|m| !m.weight.is_finite() || m.weight < 0.0) {
            return Err(Error::Config("reranker member weights must be non-negative numbers".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub default_k: usize,
    pub max_k: usize,
    pub rerank_by_default: bool,
    pub rerank_top_n: usize,
    pub vector_timeout_ms: u64,
    pub graph_timeout_ms: u64,
    pub request_timeout_ms: u64,
    /// Candidates with a fused score below this are dropped before reranking.
    pub min_score: f32,
    /// Token-set Jaccard above which near-duplicate results are dropped.
    pub diversity_threshold: Option<f32>,
    pub rerank_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_k: 5,
            max_k: 100,
            rerank_by_default: false,
            rerank_top_n: 20,
            vector_timeout_ms: 2_000,
            graph_timeout_ms: 1_500,
            request_timeout_ms: 5_000,
            min_score: 0.0,
            diversity_threshold: None,
            rerank_workers: 2,
            retry: RetryPolicy::default(),
        }
    }
}

impl RetrievalSettings {
    pub fn validate(&self) -> Result<()> {
        if self.default_k == 0 || self.max_k == 0 || self.default_k > self.max_k {
            return Err(Error::Config("retrieval.default_k must be in 1..=retrieval.max_k".to_string()));
        }
        if self.rerank_workers == 0 {
            return Err(Error::Config("retrieval.rerank_workers must be greater than zero".to_string()));
        }
        if self.request_timeout_ms == 0 || self.vector_timeout_ms == 0 || self.graph_timeout_ms == 0 {
            return Err(Error::Config("retrieval timeouts must be greater than zero".to_string()));
        }
        if let Some(t) = self.diversity_threshold {
            if !(0.0..=1.0).contains(&t) {
                return Err(Error::Config("retrieval.diversity_threshold must be within [0, 1]".to_string()));
            }
        }
        self.retry.validate()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSettings {
    /// JSON file of facts for the static graph retriever; `None` disables the graph path.
    pub facts_path: Option<String>,
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
