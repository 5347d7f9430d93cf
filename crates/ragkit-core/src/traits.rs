use async_trait::async_trait;

use crate::error::Result;
use crate::filter::Filter;
use crate::types::{Chunk, ChunkId, GraphHit, GraphQuery, QueryInput, RetrievalCandidate, SearchHit};

/// Text to dense vector. Deterministic for identical input and model version.
pub trait EmbeddingProvider: Send + Sync {
    /// Stable identifier for the provider/model (e.g., `bge-m3:d1024`).
    fn model_id(&self) -> &str;
    fn dim(&self) -> usize;
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let mut out = self.embed_batch(&[text.to_string()])?;
        out.pop().ok_or_else(|| crate::Error::Embedding("provider returned no vector".to_string()))
    }
}

/// How a backend honours a [`Filter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    /// Every condition is evaluated before ranking.
    Native,
    /// Some conditions are applied to the returned page, which may then hold fewer than `k` hits.
    PostFilter,
}

/// Backend-agnostic store of chunk vectors.
///
/// Scores returned by [`VectorIndex::query`] are always similarities in
/// `[0, 1]`. Writes are visible to later queries from the same caller.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn backend(&self) -> &'static str;
    fn dim(&self) -> usize;
    fn filter_mode(&self) -> FilterMode;

    /// Store chunks. When `embeddings` is `None` the chunk's own embedding is
    /// used, or the index's embedding provider is asked for one.
    async fn add(&self, chunks: &[Chunk], embeddings: Option<&[Vec<f32>]>) -> Result<Vec<ChunkId>>;
    async fn query(&self, input: QueryInput, k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>>;
    /// Idempotent; returns how many records were actually removed.
    async fn delete(&self, ids: &[ChunkId]) -> Result<usize>;
    async fn get(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>>;
    async fn count(&self) -> Result<usize>;
    async fn ids_matching(&self, filter: &Filter) -> Result<Vec<ChunkId>>;
}

/// Narrow query contract against a knowledge graph.
#[async_trait]
pub trait GraphRetriever: Send + Sync {
    fn name(&self) -> &str;
    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphHit>>;
}

/// Pairwise `(query, passage) -> score`. Output order must equal input order.
pub trait RelevanceScorer: Send + Sync {
    fn name(&self) -> &str;
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>>;
}

/// Re-scores a candidate list against the query.
///
/// Implementations write `rerank_score`, move the previous `final_score`
/// into `original_score`, and return candidates sorted by the new score.
pub trait Reranker: Send + Sync {
    fn name(&self) -> &str;
    fn rerank(
        &self,
        query: &str,
        candidates: Vec<RetrievalCandidate>,
        top_n: Option<usize>,
    ) -> Result<Vec<RetrievalCandidate>>;
}
