use candle_core::{DType, Device, Tensor};
use ragkit_core::{Error, Result};
use tokenizers::{EncodeInput, Encoding, Tokenizer};

use crate::candle_err;

/// XLM-RoBERTa `<pad>` token id.
const PAD_ID: u32 = 1;

/// Model inputs for one batch, right-padded to the longest sequence.
pub struct TokenBatch {
    pub input_ids: Tensor,
    pub attention_mask: Tensor,
    pub token_type_ids: Tensor,
}

pub fn tokenize_batch(tokenizer: &Tokenizer, texts: &[String], max_len: usize, device: &Device) -> Result<TokenBatch> {
    encode(tokenizer, texts.iter().map(|t| EncodeInput::from(t.as_str())).collect(), max_len, device)
}

/// Encode `(query, passage)` pairs for a cross-encoder.
pub fn tokenize_pairs(
    tokenizer: &Tokenizer,
    query: &str,
    passages: &[&str],
    max_len: usize,
    device: &Device,
) -> Result<TokenBatch> {
    encode(tokenizer, passages.iter().map(|p| EncodeInput::from((query, *p))).collect(), max_len, device)
}

fn encode(tokenizer: &Tokenizer, inputs: Vec<EncodeInput<'_>>, max_len: usize, device: &Device) -> Result<TokenBatch> {
    let encodings = tokenizer
        .encode_batch(inputs, true)
        .map_err(|e| Error::Embedding(format!("tokenization failed: {e}")))?;
    pack(&encodings, max_len, device)
}

fn pack(encodings: &[Encoding], max_len: usize, device: &Device) -> Result<TokenBatch> {
    let batch = encodings.len();
    let width = encodings.iter().map(|e| e.get_ids().len().min(max_len)).max().unwrap_or(0).max(1);

    let mut ids = Vec::with_capacity(batch * width);
    let mut mask = Vec::with_capacity(batch * width);
    for enc in encodings {
        let n = enc.get_ids().len().min(width);
        ids.extend_from_slice(&enc.get_ids()[..n]);
        mask.extend_from_slice(&enc.get_attention_mask()[..n]);
        ids.extend(std::iter::repeat(PAD_ID).take(width - n));
        mask.extend(std::iter::repeat(0).take(width - n));
    }

    let input_ids = Tensor::from_vec(ids, (batch, width), device).map_err(candle_err)?;
    let attention_mask = Tensor::from_vec(mask, (batch, width), device).map_err(candle_err)?;
    let token_type_ids = Tensor::zeros((batch, width), DType::I64, device).map_err(candle_err)?;
    Ok(TokenBatch { input_ids, attention_mask, token_type_ids })
}
