//! Pairwise relevance from an XLM-RoBERTa sequence classifier (e.g. `bge-reranker-*`).

use std::path::Path;

use candle_core::{DType, Device};
use candle_transformers::models::xlm_roberta::XLMRobertaForSequenceClassification;
use ragkit_core::{Error, RelevanceScorer, Result};
use tokenizers::{Tokenizer, TruncationParams, TruncationStrategy};
use tracing::info;

use crate::{candle_err, load_tokenizer, load_weights, read_model_config, select_device, tokenize};

pub struct CrossEncoderScorer {
    model: XLMRobertaForSequenceClassification,
    tokenizer: Tokenizer,
    device: Device,
    max_len: usize,
}

impl CrossEncoderScorer {
    pub fn load(model_dir: &Path, max_len: usize, prefer_metal: bool) -> Result<Self> {
        let device = select_device(prefer_metal);
        info!(dir = %model_dir.display(), "loading cross-encoder");
        let mut tokenizer = load_tokenizer(model_dir)?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_len,
                strategy: TruncationStrategy::OnlySecond,
                ..TruncationParams::default()
            }))
            .map_err(|e| Error::Embedding(format!("tokenizer truncation: {e}")))?;
        let (config, _) = read_model_config(model_dir)?;
        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaForSequenceClassification::new(1, &config, vb).map_err(candle_err)?;
        Ok(Self { model, tokenizer, device, max_len })
    }
}

impl RelevanceScorer for CrossEncoderScorer {
    fn name(&self) -> &str { "cross_encoder" }

    /// Sigmoid of the relevance logit, one score per passage in input order.
    fn score_batch(&self, query: &str, passages: &[&str]) -> Result<Vec<f32>> {
        if passages.is_empty() {
            return Ok(vec![]);
        }
        let batch = tokenize::tokenize_pairs(&self.tokenizer, query, passages, self.max_len, &self.device)?;
        let logits = self
            .model
            .forward(&batch.input_ids, &batch.attention_mask, &batch.token_type_ids)
            .map_err(candle_err)?;
        let logits: Vec<f32> = logits
            .to_device(&Device::Cpu)
            .and_then(|t| t.to_dtype(DType::F32))
            .and_then(|t| t.flatten_all())
            .and_then(|t| t.to_vec1())
            .map_err(candle_err)?;
        if logits.len() != passages.len() {
            return Err(Error::rerank(self.name(), format!("{} logits for {} passages", logits.len(), passages.len())));
        }
        Ok(logits.into_iter().map(|x| 1.0 / (1.0 + (-x).exp())).collect())
    }
}
