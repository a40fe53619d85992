use anyhow::{anyhow, Result};
use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;

/// Token ids and attention mask for a batch, both `[B, T]` with `T` the longest
/// encoding in the batch capped at `max_len`. Shorter rows are padded with
/// `pad_id` and masked out.
pub fn encode_padded(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> Result<(Tensor, Tensor)> {
    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("Tokenization failed: {}", e))?;
    let width = encodings
        .iter()
        .map(|e| e.get_ids().len())
        .max()
        .unwrap_or(0)
        .clamp(1, max_len.max(1));

    let mut ids = Vec::with_capacity(encodings.len() * width);
    let mut mask = Vec::with_capacity(encodings.len() * width);
    for enc in &encodings {
        let row_ids = enc.get_ids();
        let row_mask = enc.get_attention_mask();
        for col in 0..width {
            match (row_ids.get(col), row_mask.get(col)) {
                (Some(&id), Some(&m)) => {
                    ids.push(id);
                    mask.push(m);
                }
                _ => {
                    ids.push(pad_id);
                    mask.push(0);
                }
            }
        }
    }
    let input_ids = Tensor::from_vec(ids, (encodings.len(), width), device)?;
    let attention_mask = Tensor::from_vec(mask, (encodings.len(), width), device)?;
    Ok((input_ids, attention_mask))
}
