//! Domain types shared by the chunker, index backends and the retrieval pipeline.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

use crate::filter::Filter;

pub type ChunkId = String;
pub type Meta = HashMap<String, Value>;

/// Metadata keys every stored chunk carries.
pub mod meta_keys {
    pub const DOC_ID: &str = "doc_id";
    pub const CHUNK_ID: &str = "chunk_id";
    pub const CHUNK_INDEX: &str = "chunk_index";
    pub const CHUNK_COUNT: &str = "chunk_count";
    pub const DOCUMENT_HASH: &str = "document_hash";
    pub const TIMESTAMP: &str = "timestamp";
}

/// A caller-supplied source document. Immutable once chunked.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub metadata: Meta,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: id.into(), text: text.into(), metadata: Meta::new() }
    }

    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// A chunk of a source document that is independently indexed.
///
/// - `id`: `{doc_id}_chunk_{chunk_index}`, stable across re-ingestion
/// - `chunk_index`/`chunk_count`: position within the parent document
/// - `metadata`: document metadata plus the keys in [`meta_keys`]
/// - `embedding`: set once the chunk has been vectorised
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    pub id: ChunkId,
    pub text: String,
    pub doc_id: String,
    pub chunk_index: usize,
    pub chunk_count: usize,
    pub metadata: Meta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub embedding: Option<Vec<f32>>,
}

impl Chunk {
    pub fn make_id(doc_id: &str, chunk_index: usize) -> ChunkId {
        format!("{doc_id}_chunk_{chunk_index}")
    }
}

/// Indicates which retrieval path produced a result.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Vector,
    Graph,
    Hybrid,
}

/// The minimal surface returned by every vector index backend.
///
/// `score` is the canonical similarity in `[0, 1]`, higher is more similar,
/// whatever metric the backend uses natively.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchHit {
    pub id: ChunkId,
    pub text: String,
    pub metadata: Meta,
    pub score: f32,
    pub source: SourceKind,
}

/// What a vector index is queried with.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    Vector(Vec<f32>),
    Text(String),
}

/// Request sent to a graph retriever.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GraphQuery {
    pub text: String,
    pub domain: Option<String>,
    pub filter: Filter,
    pub limit: usize,
}

/// A graph retriever result. Only `id` is required; `relevance`, when
/// present, replaces the fixed presence score during fusion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphHit {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub metadata: Meta,
    #[serde(default)]
    pub relevance: Option<f32>,
}

impl GraphHit {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into(), text: None, metadata: Meta::new(), relevance: None }
    }
}

/// One entry of the fused and possibly reranked result list.
///
/// `final_score` is written by fusion and overwritten by a reranker, which
/// keeps the pre-rerank value in `original_score`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetrievalCandidate {
    pub id: String,
    pub text: String,
    pub metadata: Meta,
    pub similarity_score: f32,
    pub graph_score: f32,
    pub rerank_score: Option<f32>,
    pub original_score: Option<f32>,
    pub final_score: f32,
    /// Zero-based position in the vector result list, if the candidate came from it.
    pub semantic_rank: Option<usize>,
    pub source: SourceKind,
}

impl RetrievalCandidate {
    pub fn from_hit(hit: &SearchHit, rank: usize) -> Self {
        Self {
            id: hit.id.clone(),
            text: hit.text.clone(),
            metadata: hit.metadata.clone(),
            similarity_score: hit.score,
            graph_score: 0.0,
            rerank_score: None,
            original_score: None,
            final_score: hit.score,
            semantic_rank: Some(rank),
            source: SourceKind::Vector,
        }
    }
}

/// A single retrieval request as seen by the orchestrator.
///
/// `rerank` is tri-state: `None` defers to the configured default.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalQuery {
    pub text: String,
    pub k: usize,
    pub filter: Filter,
    pub domain: Option<String>,
    pub rerank: Option<bool>,
    pub rerank_top_n: Option<usize>,
}

impl RetrievalQuery {
    pub fn new(text: impl Into<String>, k: usize) -> Self {
        Self { text: text.into(), k, filter: Filter::default(), domain: None, rerank: None, rerank_top_n: None }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_domain(mut self, domain: impl Into<String>) -> Self {
        self.domain = Some(domain.into());
        self
    }

    pub fn with_rerank(mut self, rerank: bool) -> Self {
        self.rerank = Some(rerank);
        self
    }

    pub fn with_rerank_top_n(mut self, top_n: usize) -> Self {
        self.rerank_top_n = Some(top_n);
        self
    }
}
