use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};

/// Sentence vectors from token states: average the `[B, T, H]` hidden states
/// over positions where `attention_mask` (`[B, T]`) is set, then scale each of
/// the `B` rows to unit length.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, tokens, width) = match *hidden.dims() {
        [b, t, h] => (b, t, h),
        ref other => anyhow::bail!("hidden states must be [B, T, H], got {:?}", other),
    };
    ensure!(
        attention_mask.dims() == [batch, tokens].as_slice(),
        "attention mask {:?} does not match hidden states [{batch}, {tokens}, {width}]",
        attention_mask.dims()
    );

    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let summed = hidden.broadcast_mul(&mask.unsqueeze(2)?)?.sum(1)?;
    let counts = mask.sum_keepdim(1)?.maximum(1.0)?;
    let mean = summed.broadcast_div(&counts)?;

    let floor = if hidden.dtype() == DType::F16 { 1e-6 } else { 1e-12 };
    let norms = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + floor)?;
    Ok(mean.broadcast_div(&norms)?)
}
