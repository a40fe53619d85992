use anyhow::{anyhow, Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docrag_core::error::{Error, Result as CoreResult};
use docrag_core::traits::Embedder;
use docrag_core::types::EmbeddingVector;

use crate::pool::masked_mean_l2;
use crate::tokenize::encode_padded;

const MAX_SEQ_LEN: usize = 256;
/// Texts per forward pass.
const BATCH_SIZE: usize = 16;

fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("embedding device: Metal (MPS)");
            return dev;
        }
    }
    info!("embedding device: CPU");
    Device::Cpu
}

/// Sentence encoder: RoBERTa-family transformer + masked mean pooling + L2 norm.
pub struct CandleEmbedder {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    model_id: String,
    dim: usize,
    pad_id: u32,
}

impl CandleEmbedder {
    /// Load `tokenizer.json`, `config.json` and either `model.safetensors` or
    /// `pytorch_model.bin` from `model_dir`.
    pub fn load(model_dir: &Path, model_id: &str) -> Result<Self> {
        let device = select_device();
        info!(model = model_id, dir = %model_dir.display(), "loading embedding model");

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("Failed to load tokenizer from {}: {}", tokenizer_path.display(), e))?;
        let pad_id = tokenizer
            .token_to_id("<pad>")
            .or_else(|| tokenizer.token_to_id("[PAD]"))
            .unwrap_or(0);

        let config_path = model_dir.join("config.json");
        let raw_config = std::fs::read_to_string(&config_path)
            .with_context(|| format!("Failed to read {}", config_path.display()))?;
        let config: XLMRobertaConfig = serde_json::from_str(&raw_config)?;
        let dim = serde_json::from_str::<serde_json::Value>(&raw_config)?
            .get("hidden_size")
            .and_then(serde_json::Value::as_u64)
            .ok_or_else(|| anyhow!("config.json has no hidden_size"))? as usize;

        let vb = load_weights(model_dir, &device)?;
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(model = model_id, dim, "embedding model loaded");
        Ok(Self { model, tokenizer, device, model_id: model_id.to_string(), dim, pad_id })
    }

    /// One unit-length vector per text, in order. Texts longer than
    /// `MAX_SEQ_LEN` tokens are truncated.
    pub fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut out = Vec::with_capacity(texts.len());
        for (n, batch) in texts.chunks(BATCH_SIZE).enumerate() {
            let (input_ids, attention_mask) =
                encode_padded(&self.tokenizer, batch, MAX_SEQ_LEN, self.pad_id, &self.device)?;
            let token_type_ids = input_ids.zeros_like()?;
            let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
            let pooled = masked_mean_l2(&hidden, &attention_mask)?.to_device(&Device::Cpu)?;
            let rows = pooled.to_dtype(DType::F32)?.to_vec2::<f32>()?;
            if let Some(row) = rows.iter().find(|r| r.len() != self.dim) {
                return Err(anyhow!("model produced {} values, expected {}", row.len(), self.dim));
            }
            debug!(batch = n, texts = batch.len(), "embedded batch");
            out.extend(rows);
        }
        Ok(out)
    }
}

fn load_weights(model_dir: &Path, device: &Device) -> Result<VarBuilder<'static>> {
    let safetensors = model_dir.join("model.safetensors");
    if safetensors.exists() {
        debug!(path = %safetensors.display(), "loading safetensors weights");
        // SAFETY: the file is opened read-only and not modified while mapped.
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(&[safetensors], DType::F32, device)? };
        return Ok(vb);
    }
    let weights_path = model_dir.join("pytorch_model.bin");
    debug!(path = %weights_path.display(), "loading pytorch weights");
    let weights = candle_core::pickle::read_all(&weights_path)
        .with_context(|| format!("Failed to read weights from {}", weights_path.display()))?;
    let weights_map: HashMap<String, Tensor> = weights.into_iter().collect();
    Ok(VarBuilder::from_tensors(weights_map, DType::F32, device))
}

impl Embedder for CandleEmbedder {
    fn model_id(&self) -> &str { &self.model_id }
    fn dim(&self) -> usize { self.dim }

    fn embed_batch(&self, texts: &[String]) -> CoreResult<Vec<EmbeddingVector>> {
        self.embed_texts(texts).map_err(|e| Error::Embedding(format!("{e:#}")))
    }
}

/// Locate the weights for `identifier`: an existing directory is used as is,
/// otherwise `models_dir/<last path segment>` (so `jhgan/ko-sroberta-multitask`
/// resolves to `models/ko-sroberta-multitask`).
pub fn resolve_model_dir(identifier: &str, models_dir: &Path) -> Result<PathBuf> {
    let direct = PathBuf::from(identifier);
    if direct.is_dir() {
        return Ok(direct);
    }
    let name = identifier.rsplit('/').next().unwrap_or(identifier);
    let candidate = models_dir.join(name);
    if candidate.is_dir() {
        return Ok(candidate);
    }
    Err(anyhow!(
        "Could not locate model '{}' (tried {} and {})",
        identifier,
        direct.display(),
        candidate.display()
    ))
}
