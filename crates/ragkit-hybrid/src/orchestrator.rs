//! Query and ingestion pipelines.
//!
//! A search runs `plan -> retrieve -> fuse -> rerank -> truncate -> format`.
//! The vector and graph paths run as separate tasks with their own timeouts;
//! only a vector failure fails the request. Every other failure is disclosed
//! in [`SearchMetadata`] and the best available ranking is returned.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use ragkit_core::config::{ChunkerConfig, FusionSettings, RetrievalSettings, Settings};
use ragkit_core::retry::with_backoff;
use ragkit_core::types::meta_keys;
use ragkit_core::{
    Chunker, ChunkId, Document, EmbeddingProvider, Error, ErrorKind, Filter, GraphHit, GraphQuery, GraphRetriever,
    QueryInput, Reranker, Result, RetrievalCandidate, RetrievalQuery, SearchHit, VectorIndex,
};
use ragkit_vector::embed_blocking;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::fusion::FusionEngine;
use crate::graph::StaticGraphRetriever;
use crate::pool::RerankPool;
use crate::postprocess::{apply_min_score, diversify};
use crate::rerank::build_reranker;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Vector,
    Graph,
    Rerank,
}

impl Stage {
    fn as_str(self) -> &'static str {
        match self {
            Self::Vector => "vector",
            Self::Graph => "graph",
            Self::Rerank => "rerank",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageError {
    pub stage: Stage,
    pub kind: ErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchMetadata {
    /// Candidates left after fusion, filtering and reranking, before truncation to `k`.
    pub total_results: usize,
    pub search_time_ms: u64,
    pub reranked: bool,
    pub degraded: bool,
    pub timed_out: bool,
    #[serde(default)]
    pub stage_errors: Vec<StageError>,
}

impl SearchMetadata {
    fn record(&mut self, stage: Stage, err: &Error) {
        if matches!(err, Error::Timeout { .. }) {
            self.timed_out = true;
        }
        self.stage_errors.push(StageError { stage, kind: err.kind(), message: err.to_string() });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalOutcome {
    pub query: String,
    pub domain: Option<String>,
    pub candidates: Vec<RetrievalCandidate>,
    pub metadata: SearchMetadata,
}

pub struct RetrievalOrchestrator {
    chunker: Chunker,
    embedder: Arc<dyn EmbeddingProvider>,
    index: Arc<dyn VectorIndex>,
    graph: Option<Arc<dyn GraphRetriever>>,
    fusion: FusionEngine,
    reranker: Option<Arc<dyn Reranker>>,
    pool: RerankPool,
    settings: RetrievalSettings,
}

#[derive(Default)]
pub struct OrchestratorBuilder {
    chunking: ChunkerConfig,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    index: Option<Arc<dyn VectorIndex>>,
    graph: Option<Arc<dyn GraphRetriever>>,
    fusion: FusionSettings,
    reranker: Option<Arc<dyn Reranker>>,
    retrieval: RetrievalSettings,
}

impl OrchestratorBuilder {
    pub fn chunking(mut self, config: ChunkerConfig) -> Self {
        self.chunking = config;
        self
    }

    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn index(mut self, index: Arc<dyn VectorIndex>) -> Self {
        self.index = Some(index);
        self
    }

    pub fn graph(mut self, graph: Arc<dyn GraphRetriever>) -> Self {
        self.graph = Some(graph);
        self
    }

    pub fn fusion(mut self, fusion: FusionSettings) -> Self {
        self.fusion = fusion;
        self
    }

    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    pub fn retrieval(mut self, retrieval: RetrievalSettings) -> Self {
        self.retrieval = retrieval;
        self
    }

    pub fn build(self) -> Result<RetrievalOrchestrator> {
        let embedder = self.embedder.ok_or_else(|| Error::Config("orchestrator needs an embedding provider".to_string()))?;
        let index = self.index.ok_or_else(|| Error::Config("orchestrator needs a vector index".to_string()))?;
        if embedder.dim() != index.dim() {
            return Err(Error::DimensionMismatch { expected: index.dim(), actual: embedder.dim() });
        }
        self.retrieval.validate()?;
        Ok(RetrievalOrchestrator {
            chunker: Chunker::new(self.chunking)?,
            embedder,
            index,
            graph: self.graph,
            fusion: FusionEngine::new(&self.fusion)?,
            reranker: self.reranker,
            pool: RerankPool::new(self.retrieval.rerank_workers),
            settings: self.retrieval,
        })
    }
}

impl RetrievalOrchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    /// Construct every collaborator named by `settings`.
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let embedder = ragkit_embed::load_embedder(&settings.embedding)?;
        let index = ragkit_vector::build_index(&settings.vector, Arc::clone(&embedder)).await?;
        let mut builder = Self::builder()
            .chunking(settings.chunking.clone())
            .embedder(Arc::clone(&embedder))
            .index(index)
            .fusion(settings.fusion.clone())
            .retrieval(settings.retrieval.clone());
        if let Some(path) = &settings.graph.facts_path {
            builder = builder.graph(Arc::new(StaticGraphRetriever::load(&ragkit_core::config::expand_path(path))?));
        }
        if let Some(reranker) = build_reranker(&settings.reranker, embedder, settings.embedding.prefer_metal)? {
            builder = builder.reranker(reranker);
        }
        builder.build()
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }

    pub async fn count(&self) -> Result<usize> {
        self.index.count().await
    }

    /// Chunk, embed and store one document, replacing any chunks a previous
    /// version of it left behind.
    pub async fn ingest(&self, doc: &Document) -> Result<Vec<ChunkId>> {
        let previous = self.index.ids_matching(&doc_filter(&doc.id)).await?;
        let chunks = self.chunker.chunk_document(doc);

        let ids = if chunks.is_empty() {
            Vec::new()
        } else {
            let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
            let embeddings = embed_blocking(&self.embedder, texts).await?;
            let (index, chunks, embeddings) = (&self.index, chunks.as_slice(), embeddings.as_slice());
            with_backoff(&self.settings.retry, "vector add", move || index.add(chunks, Some(embeddings))).await?
        };

        let current: HashSet<&ChunkId> = ids.iter().collect();
        let stale: Vec<ChunkId> = previous.into_iter().filter(|id| !current.contains(id)).collect();
        if !stale.is_empty() {
            self.index.delete(&stale).await?;
        }
        info!(doc_id = %doc.id, chunks = ids.len(), removed = stale.len(), "ingested document");
        Ok(ids)
    }

    /// Ingest documents in order; returns the number of chunks stored.
    pub async fn ingest_batch(&self, docs: &[Document]) -> Result<usize> {
        let mut total = 0;
        for doc in docs {
            total += self.ingest(doc).await?.len();
        }
        Ok(total)
    }

    /// Remove every chunk of `doc_id`; returns how many were removed.
    pub async fn delete_document(&self, doc_id: &str) -> Result<usize> {
        let ids = self.index.ids_matching(&doc_filter(doc_id)).await?;
        if ids.is_empty() {
            return Ok(0);
        }
        let removed = self.index.delete(&ids).await?;
        info!(doc_id, removed, "deleted document");
        Ok(removed)
    }

    pub async fn search(&self, query: RetrievalQuery) -> Result<RetrievalOutcome> {
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + Duration::from_millis(self.settings.request_timeout_ms);
        self.validate(&query)?;

        // Plan
        let profile = self.fusion.profile_for(query.domain.as_deref()).clone();
        let reranker = if query.rerank.unwrap_or(self.settings.rerank_by_default) { self.reranker.clone() } else { None };
        let top_n = query.rerank_top_n.unwrap_or(self.settings.rerank_top_n).max(1);
        let initial_k = if reranker.is_some() { query.k.max(top_n) } else { query.k };
        let graph = if profile.graph_enabled { self.graph.clone() } else { None };
        debug!(k = query.k, initial_k, domain = ?query.domain, rerank = reranker.is_some(), graph = graph.is_some(), "search plan");

        let mut meta = SearchMetadata::default();

        // Retrieve
        let mut vector_task = self.spawn_vector(&query, initial_k);
        let mut graph_task = graph.map(|g| self.spawn_graph(g, &query, initial_k));

        let hits = match tokio::time::timeout_at(deadline, &mut vector_task).await {
            Ok(joined) => match flatten(joined, Stage::Vector) {
                Ok(hits) => hits,
                Err(e) => {
                    if let Some(task) = &graph_task {
                        task.abort();
                    }
                    warn!(error = %e, "vector path failed");
                    return Err(e);
                }
            },
            Err(_) => {
                vector_task.abort();
                if let Some(task) = &graph_task {
                    task.abort();
                }
                meta.degraded = true;
                meta.record(Stage::Vector, &self.deadline_error(Stage::Vector));
                warn!(timeout_ms = self.settings.request_timeout_ms, "request deadline exceeded on vector path");
                return Ok(self.finish(query, Vec::new(), meta, started));
            }
        };

        let graph_hits: Option<Vec<GraphHit>> = match graph_task.as_mut() {
            None => None,
            Some(task) => match tokio::time::timeout_at(deadline, &mut *task).await {
                Ok(joined) => match flatten(joined, Stage::Graph) {
                    Ok(g) => Some(g),
                    Err(e) => {
                        warn!(error = %e, "graph path failed, continuing with vector results");
                        meta.degraded = true;
                        let partial = match e {
                            Error::Timeout { .. } => e,
                            other => Error::PartialFailure { path: Stage::Graph.as_str().to_string(), message: other.to_string() },
                        };
                        meta.record(Stage::Graph, &partial);
                        None
                    }
                },
                Err(_) => {
                    task.abort();
                    warn!("request deadline exceeded on graph path");
                    meta.degraded = true;
                    meta.record(Stage::Graph, &self.deadline_error(Stage::Graph));
                    None
                }
            },
        };

        // Fuse
        let mut candidates = match &graph_hits {
            Some(g) => self.fusion.merge(&hits, g, &profile),
            None => self.fusion.vector_only(&hits, &profile),
        };
        apply_min_score(&mut candidates, self.settings.min_score);

        // Rerank
        if let Some(reranker) = reranker.filter(|_| !candidates.is_empty()) {
            let fallback = candidates.clone();
            let run = self.pool.run(Arc::clone(&reranker), query.text.clone(), candidates, None);
            candidates = match tokio::time::timeout_at(deadline, run).await {
                Ok(Ok(reranked)) => {
                    meta.reranked = true;
                    reranked
                }
                Ok(Err(e)) => {
                    warn!(reranker = reranker.name(), error = %e, "rerank failed, keeping fused order");
                    meta.record(Stage::Rerank, &e);
                    fallback
                }
                Err(_) => {
                    warn!(reranker = reranker.name(), "request deadline exceeded during rerank, keeping fused order");
                    meta.record(Stage::Rerank, &self.deadline_error(Stage::Rerank));
                    fallback
                }
            };
        }

        if let Some(threshold) = self.settings.diversity_threshold {
            candidates = diversify(candidates, threshold);
        }

        Ok(self.finish(query, candidates, meta, started))
    }

    fn validate(&self, query: &RetrievalQuery) -> Result<()> {
        if query.text.trim().is_empty() {
            return Err(Error::InvalidQuery("query text is empty".to_string()));
        }
        if query.k == 0 || query.k > self.settings.max_k {
            return Err(Error::InvalidQuery(format!("k must be within 1..={}, got {}", self.settings.max_k, query.k)));
        }
        Ok(())
    }

    fn spawn_vector(&self, query: &RetrievalQuery, k: usize) -> JoinHandle<Result<Vec<SearchHit>>> {
        let index = Arc::clone(&self.index);
        let embedder = Arc::clone(&self.embedder);
        let text = query.text.clone();
        let filter = query.filter.clone();
        let retry = self.settings.retry.clone();
        let per_call = Duration::from_millis(self.settings.vector_timeout_ms);
        tokio::spawn(async move {
            let vector = embed_blocking(&embedder, vec![text])
                .await?
                .pop()
                .ok_or_else(|| Error::Embedding("provider returned no vector".to_string()))?;
            let filter = (!filter.is_empty()).then_some(&filter);
            with_backoff(&retry, "vector query", move || {
                let input = QueryInput::Vector(vector.clone());
                let index = Arc::clone(&index);
                async move { timed(Stage::Vector, per_call, index.query(input, k, filter)).await }
            })
            .await
        })
    }

    fn spawn_graph(&self, graph: Arc<dyn GraphRetriever>, query: &RetrievalQuery, limit: usize) -> JoinHandle<Result<Vec<GraphHit>>> {
        let request = GraphQuery { text: query.text.clone(), domain: query.domain.clone(), filter: query.filter.clone(), limit };
        let retry = self.settings.retry.clone();
        let per_call = Duration::from_millis(self.settings.graph_timeout_ms);
        tokio::spawn(async move {
            let request = &request;
            with_backoff(&retry, "graph query", move || {
                let graph = Arc::clone(&graph);
                async move { timed(Stage::Graph, per_call, graph.query(request)).await }
            })
            .await
        })
    }

    fn deadline_error(&self, stage: Stage) -> Error {
        Error::Timeout { stage: stage.as_str().to_string(), elapsed_ms: self.settings.request_timeout_ms }
    }

    fn finish(&self, query: RetrievalQuery, mut candidates: Vec<RetrievalCandidate>, mut meta: SearchMetadata, started: Instant) -> RetrievalOutcome {
        meta.total_results = candidates.len();
        candidates.truncate(query.k);
        meta.search_time_ms = started.elapsed().as_millis() as u64;
        info!(
            k = query.k,
            results = candidates.len(),
            total = meta.total_results,
            elapsed_ms = meta.search_time_ms,
            reranked = meta.reranked,
            degraded = meta.degraded,
            timed_out = meta.timed_out,
            "search complete"
        );
        RetrievalOutcome { query: query.text, domain: query.domain, candidates, metadata: meta }
    }
}

fn doc_filter(doc_id: &str) -> Filter {
    Filter::new().eq(meta_keys::DOC_ID, doc_id)
}

async fn timed<T>(stage: Stage, limit: Duration, fut: impl std::future::Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(r) => r,
        Err(_) => Err(Error::Timeout { stage: stage.as_str().to_string(), elapsed_ms: limit.as_millis() as u64 }),
    }
}

fn flatten<T>(joined: std::result::Result<Result<T>, tokio::task::JoinError>, stage: Stage) -> Result<T> {
    joined.map_err(|e| Error::Operation(format!("{} task failed: {e}", stage.as_str())))?
}
