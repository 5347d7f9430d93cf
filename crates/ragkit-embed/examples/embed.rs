use std::path::PathBuf;

use ragkit_core::EmbeddingProvider;
use ragkit_embed::BgeEmbedder;

fn main() -> anyhow::Result<()> {
    let dir = std::env::var("APP_MODEL_DIR").map(PathBuf::from)?;
    let embedder = BgeEmbedder::load(&dir, 256, true)?;
    let texts = vec!["hello world".to_string(), "rust embeddings".to_string()];
    let embs = embedder.embed_batch(&texts)?;
    println!("B={} dim={} model={}", embs.len(), embedder.dim(), embedder.model_id());
    Ok(())
}
