use std::sync::Arc;

use ragkit_core::{Error, Reranker, Result, RetrievalCandidate};
use tokio::sync::Semaphore;

/// Bounded set of blocking workers for reranking, kept off the async I/O threads.
#[derive(Clone)]
pub struct RerankPool {
    permits: Arc<Semaphore>,
}

impl RerankPool {
    pub fn new(workers: usize) -> Self {
        Self { permits: Arc::new(Semaphore::new(workers.max(1))) }
    }

    pub async fn run(
        &self,
        reranker: Arc<dyn Reranker>,
        query: String,
        candidates: Vec<RetrievalCandidate>,
        top_n: Option<usize>,
    ) -> Result<Vec<RetrievalCandidate>> {
        let permit = Arc::clone(&self.permits)
            .acquire_owned()
            .await
            .map_err(|e| Error::rerank(reranker.name(), e))?;
        let name = reranker.name().to_string();
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            reranker.rerank(&query, candidates, top_n)
        })
        .await
        .map_err(|e| Error::rerank(name, e))?
    }
}
