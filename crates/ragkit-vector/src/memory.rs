//! Reference backend: exhaustive cosine search over an in-process map.
//!
//! Filters are evaluated natively before ranking. Writes take the map's
//! write lock, so a completed `add`/`delete` is visible to every later query.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use ragkit_core::{
    Chunk, ChunkId, EmbeddingProvider, Filter, FilterMode, QueryInput, Result, SearchHit, SourceKind, VectorIndex,
};
use tokio::sync::RwLock;
use tracing::debug;

use crate::similarity::{cosine, from_cosine};
use crate::{check_dim, embed_query, resolve_embeddings};

pub struct InMemoryVectorIndex {
    dim: usize,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    records: RwLock<HashMap<ChunkId, Chunk>>,
}

impl InMemoryVectorIndex {
    /// An index that only accepts precomputed vectors.
    pub fn new(dim: usize) -> Self {
        Self { dim, embedder: None, records: RwLock::new(HashMap::new()) }
    }

    pub fn with_embedder(embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self { dim: embedder.dim(), embedder: Some(embedder), records: RwLock::new(HashMap::new()) }
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn backend(&self) -> &'static str { "memory" }

    fn dim(&self) -> usize { self.dim }

    fn filter_mode(&self) -> FilterMode { FilterMode::Native }

    async fn add(&self, chunks: &[Chunk], embeddings: Option<&[Vec<f32>]>) -> Result<Vec<ChunkId>> {
        if chunks.is_empty() {
            return Ok(vec![]);
        }
        let vectors = resolve_embeddings(chunks, embeddings, self.embedder.as_ref(), self.dim).await?;
        let mut records = self.records.write().await;
        let ids = chunks
            .iter()
            .zip(vectors)
            .map(|(chunk, vector)| {
                let mut stored = chunk.clone();
                stored.embedding = Some(vector);
                records.insert(stored.id.clone(), stored);
                chunk.id.clone()
            })
            .collect();
        debug!(added = chunks.len(), total = records.len(), "memory index add");
        Ok(ids)
    }

    async fn query(&self, input: QueryInput, k: usize, filter: Option<&Filter>) -> Result<Vec<SearchHit>> {
        let vector = match input {
            QueryInput::Vector(v) => {
                check_dim(self.dim, &v)?;
                v
            }
            QueryInput::Text(text) => embed_query(self.embedder.as_ref(), text, self.dim).await?,
        };
        if k == 0 {
            return Ok(vec![]);
        }

        let records = self.records.read().await;
        let mut hits: Vec<SearchHit> = records
            .values()
            .filter(|c| filter.map_or(true, |f| f.matches(&c.metadata)))
            .filter_map(|c| {
                let stored = c.embedding.as_deref()?;
                Some(SearchHit {
                    id: c.id.clone(),
                    text: c.text.clone(),
                    metadata: c.metadata.clone(),
                    score: from_cosine(cosine(&vector, stored)),
                    source: SourceKind::Vector,
                })
            })
            .collect();
        hits.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(k);
        Ok(hits)
    }

    async fn delete(&self, ids: &[ChunkId]) -> Result<usize> {
        let mut records = self.records.write().await;
        Ok(ids.iter().filter(|id| records.remove(*id).is_some()).count())
    }

    async fn get(&self, ids: &[ChunkId]) -> Result<Vec<Chunk>> {
        let records = self.records.read().await;
        Ok(ids.iter().filter_map(|id| records.get(id).cloned()).collect())
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.records.read().await.len())
    }

    async fn ids_matching(&self, filter: &Filter) -> Result<Vec<ChunkId>> {
        let records = self.records.read().await;
        let mut ids: Vec<ChunkId> = records.values().filter(|c| filter.matches(&c.metadata)).map(|c| c.id.clone()).collect();
        ids.sort();
        Ok(ids)
    }
}
