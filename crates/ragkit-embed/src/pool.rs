use candle_core::{DType, Tensor};
use ragkit_core::{Error, Result};

use crate::candle_err;

/// Mean over unmasked tokens followed by L2 normalisation.
///
/// `hidden` is `[B, T, H]`, `attention_mask` is `[B, T]`; the result is `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _tokens, hidden_dim) = hidden
        .dims3()
        .map_err(|e| Error::Embedding(format!("hidden state must be [B,T,H]: {e}")))?;

    let mask = attention_mask.to_device(hidden.device()).and_then(|m| m.to_dtype(hidden.dtype())).map_err(candle_err)?;
    let mask_3d = mask.unsqueeze(2).map_err(candle_err)?;
    let mask_broadcast = mask_3d.broadcast_as(hidden.shape()).map_err(candle_err)?;
    let sum = (hidden * &mask_broadcast).and_then(|m| m.sum(1)).map_err(candle_err)?;
    let lengths = mask
        .sum(1)
        .and_then(|l| l.unsqueeze(1))
        .and_then(|l| l.to_dtype(sum.dtype()))
        .map_err(candle_err)?;
    let mean = sum.broadcast_div(&lengths).map_err(candle_err)?;

    let eps_val = match hidden.dtype() { DType::F16 => 1e-6f32, _ => 1e-12f32 };
    let eps = Tensor::new(&[eps_val], hidden.device())
        .and_then(|t| t.to_dtype(hidden.dtype()))
        .and_then(|t| t.unsqueeze(0))
        .map_err(candle_err)?;
    let norm = mean
        .sqr()
        .and_then(|t| t.sum_keepdim(1))
        .and_then(|t| t.sqrt())
        .and_then(|t| t.broadcast_add(&eps))
        .map_err(candle_err)?;
    let out = mean.broadcast_div(&norm).map_err(candle_err)?;

    if out.dims() != [batch, hidden_dim].as_slice() {
        return Err(Error::Embedding(format!("pooled shape {:?}, expected [{batch}, {hidden_dim}]", out.dims())));
    }
    Ok(out)
}
