use std::sync::Arc;

use ragkit_core::config::{VectorBackendKind, VectorSettings};
use ragkit_core::{Chunk, EmbeddingProvider, Error, Result};
use tracing::info;

pub mod lance;
pub mod memory;
pub mod schema;
pub mod similarity;
pub mod table;

pub use lance::LanceVectorIndex;
pub use memory::InMemoryVectorIndex;

/// Open the backend named by `settings.backend`.
pub async fn build_index(
    settings: &VectorSettings,
    embedder: Arc<dyn EmbeddingProvider>,
) -> Result<Arc<dyn ragkit_core::VectorIndex>> {
    if embedder.dim() != settings.dim {
        return Err(Error::DimensionMismatch { expected: settings.dim, actual: embedder.dim() });
    }
    match settings.backend {
        VectorBackendKind::Memory => {
            info!(dim = settings.dim, "vector backend: memory");
            Ok(Arc::new(InMemoryVectorIndex::with_embedder(embedder)))
        }
        VectorBackendKind::Lance => {
            let uri = ragkit_core::config::expand_path(&settings.uri);
            info!(uri = %uri.display(), table = %settings.table, "vector backend: lance");
            let index = LanceVectorIndex::open(&uri.to_string_lossy(), &settings.table, settings.dim, Some(embedder))
                .await?
                .with_overfetch(settings.overfetch);
            Ok(Arc::new(index))
        }
    }
}

/// Vectors to store for `chunks`: the explicit list, else each chunk's own
/// embedding, else freshly computed by `embedder` off the async runtime.
pub(crate) async fn resolve_embeddings(
    chunks: &[Chunk],
    embeddings: Option<&[Vec<f32>]>,
    embedder: Option<&Arc<dyn EmbeddingProvider>>,
    dim: usize,
) -> Result<Vec<Vec<f32>>> {
    let vectors = match embeddings {
        Some(given) => {
            if given.len() != chunks.len() {
                return Err(Error::Operation(format!("{} embeddings for {} chunks", given.len(), chunks.len())));
            }
            given.to_vec()
        }
        None => match chunks.iter().map(|c| c.embedding.clone()).collect::<Option<Vec<_>>>() {
            Some(own) => own,
            None => {
                let embedder = embedder
                    .ok_or_else(|| Error::Config("chunks have no embeddings and no provider is configured".to_string()))?;
                let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
                embed_blocking(embedder, texts).await?
            }
        },
    };
    for v in &vectors {
        check_dim(dim, v)?;
    }
    Ok(vectors)
}

pub(crate) async fn embed_query(embedder: Option<&Arc<dyn EmbeddingProvider>>, text: String, dim: usize) -> Result<Vec<f32>> {
    let embedder =
        embedder.ok_or_else(|| Error::Config("text query needs an embedding provider".to_string()))?;
    let mut out = embed_blocking(embedder, vec![text]).await?;
    let v = out.pop().ok_or_else(|| Error::Embedding("provider returned no vector".to_string()))?;
    check_dim(dim, &v)?;
    Ok(v)
}

/// Run `embed_batch` on the blocking pool so model inference never stalls the runtime.
pub async fn embed_blocking(embedder: &Arc<dyn EmbeddingProvider>, texts: Vec<String>) -> Result<Vec<Vec<f32>>> {
    let embedder = Arc::clone(embedder);
    tokio::task::spawn_blocking(move || embedder.embed_batch(&texts))
        .await
        .map_err(|e| Error::Embedding(format!("embedding task failed: {e}")))?
}

pub(crate) fn check_dim(expected: usize, v: &[f32]) -> Result<()> {
    if v.len() != expected {
        return Err(Error::DimensionMismatch { expected, actual: v.len() });
    }
    Ok(())
}
