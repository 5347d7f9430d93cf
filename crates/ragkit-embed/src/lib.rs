use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use ragkit_core::config::{expand_path, EmbeddingSettings};
use ragkit_core::{EmbeddingProvider, Error, Result};
use tokenizers::Tokenizer;
use tracing::{debug, info};
use twox_hash::XxHash64;

pub mod cross_encoder;
pub mod device;
pub mod pool;
pub mod tokenize;

pub use cross_encoder::CrossEncoderScorer;
pub use device::select_device;
pub use pool::masked_mean_l2;

const EMBED_BATCH: usize = 16;

/// Deterministic bag-of-tokens embedder. No model files; used when
/// `embedding.use_fake` is set and throughout the test suites.
pub struct HashEmbedder {
    dim: usize,
    model_id: String,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim, model_id: format!("hash:d{dim}") }
    }

    fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        let tokens = text
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase);
        for (i, token) in tokens.enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            token.hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h as usize) % self.dim;
            let val = (((h >> 32) as u32) as f32) / (u32::MAX as f32);
            v[idx] += val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}

impl EmbeddingProvider for HashEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|t| self.embed_one(t)).collect())
    }
}

/// BGE-M3 dense embeddings: XLM-RoBERTa hidden states, masked mean pooled
/// and L2-normalised.
pub struct BgeEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
    dim: usize,
    model_id: String,
}

impl BgeEmbedder {
    pub fn load(model_dir: &Path, max_len: usize, prefer_metal: bool) -> Result<Self> {
        let device = select_device(prefer_metal);
        info!(dir = %model_dir.display(), "loading embedding model");
        let tokenizer = load_tokenizer(model_dir)?;
        let (config, dim) = read_model_config(model_dir)?;
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb).map_err(candle_err)?;
        info!(dim, max_len, "embedding model loaded");
        Ok(Self { model, tokenizer, device, max_len, dim, model_id: format!("bge-m3:d{dim}") })
    }

    fn embed_chunk(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let batch = tokenize::tokenize_batch(&self.tokenizer, texts, self.max_len, &self.device)?;
        let hidden = self
            .model
            .forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids, None, None, None)
            .map_err(candle_err)?;
        let pooled = masked_mean_l2(&hidden, &batch.attention_mask)?;
        let rows: Vec<Vec<f32>> = pooled
            .to_device(&Device::Cpu)
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.to_vec2())
            .map_err(candle_err)?;
        if let Some(row) = rows.iter().find(|r| r.len() != self.dim) {
            return Err(Error::DimensionMismatch { expected: self.dim, actual: row.len() });
        }
        Ok(rows)
    }
}

impl EmbeddingProvider for BgeEmbedder {
    fn model_id(&self) -> &str { &self.model_id }

    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let start = Instant::now();
        let mut out = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(EMBED_BATCH) {
            out.extend(self.embed_chunk(chunk)?);
        }
        debug!(texts = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "embedded batch");
        Ok(out)
    }
}

/// Build the configured embedding provider once, at startup.
pub fn load_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingProvider>> {
    if settings.use_fake {
        info!(dim = settings.dim, "using hash embedder");
        return Ok(Arc::new(HashEmbedder::new(settings.dim)));
    }
    let model_dir = expand_path(&settings.model_dir);
    if !model_dir.is_dir() {
        return Err(Error::Config(format!("embedding model directory {} does not exist", model_dir.display())));
    }
    let embedder = BgeEmbedder::load(&model_dir, settings.max_len, settings.prefer_metal)?;
    if embedder.dim() != settings.dim {
        return Err(Error::DimensionMismatch { expected: settings.dim, actual: embedder.dim() });
    }
    Ok(Arc::new(embedder))
}

pub(crate) fn candle_err(e: candle_core::Error) -> Error {
    Error::Embedding(e.to_string())
}

pub(crate) fn load_tokenizer(model_dir: &Path) -> Result<Tokenizer> {
    let path = model_dir.join("tokenizer.json");
    Tokenizer::from_file(&path)
        .map_err(|e| Error::Embedding(format!("failed to load tokenizer from {}: {e}", path.display())))
}

/// Parse `config.json`; also returns `hidden_size`.
pub(crate) fn read_model_config(model_dir: &Path) -> Result<(XLMRobertaConfig, usize)> {
    let path = model_dir.join("config.json");
    let raw = std::fs::read_to_string(&path)
        .map_err(|e| Error::Embedding(format!("failed to read {}: {e}", path.display())))?;
    let config: XLMRobertaConfig = serde_json::from_str(&raw).map_err(|e| Error::Embedding(e.to_string()))?;
    let hidden_size = serde_json::from_str::<serde_json::Value>(&raw)
        .ok()
        .and_then(|v| v.get("hidden_size").and_then(serde_json::Value::as_u64))
        .ok_or_else(|| Error::Embedding(format!("{} has no hidden_size", path.display())))?;
    Ok((config, hidden_size as usize))
}

/// Weights from `pytorch_model.bin`, or `model.safetensors` when no pickle is present.
pub(crate) fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let pickle = model_dir.join("pytorch_model.bin");
    let tensors: HashMap<String, Tensor> = if pickle.exists() {
        candle_core::pickle::read_all(&pickle).map_err(candle_err)?.into_iter().collect()
    } else {
        let st = model_dir.join("model.safetensors");
        if !st.exists() {
            return Err(Error::Embedding(format!("no model weights in {}", model_dir.display())));
        }
        candle_core::safetensors::load(&st, device).map_err(candle_err)?
    };
    Ok(VarBuilder::from_tensors(tensors, DType::F32, device))
}
