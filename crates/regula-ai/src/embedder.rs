//! Local ONNX Runtime embeddings for sentence-transformers models.
//!
//! The model directory must contain `model.onnx` and `tokenizer.json`.
//! Inference is blocking, so calls run on the tokio blocking pool behind a
//! mutex around the session.

use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use ort::session::Session;
use ort::value::Tensor;
use tokenizers::Tokenizer;
use tracing::info;

use crate::{EmbeddingProvider, ProviderError};

/// Tokenizer max length; longer requirement texts are truncated.
const MAX_TOKENS: usize = 256;

struct Model {
    session: Session,
    tokenizer: Tokenizer,
    dim: usize,
}

/// Embedding provider backed by a local sentence-transformers model.
pub struct OnnxEmbedder {
    model: Arc<Mutex<Model>>,
    dim: usize,
}

impl OnnxEmbedder {
    /// Load a model from a directory containing `model.onnx` and `tokenizer.json`.
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        anyhow::ensure!(model_path.exists(), "model.onnx not found in {model_dir:?}");
        anyhow::ensure!(
            tokenizer_path.exists(),
            "tokenizer.json not found in {model_dir:?}"
        );

        let session = Session::builder()?.commit_from_file(&model_path)?;
        let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);

        let mut tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow::anyhow!("load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length: MAX_TOKENS,
                ..Default::default()
            }))
            .map_err(|e| anyhow::anyhow!("set truncation: {e}"))?;

        info!(dim, model = %model_path.display(), "loaded embedding model");
        Ok(Self {
            model: Arc::new(Mutex::new(Model {
                session,
                tokenizer,
                dim,
            })),
            dim,
        })
    }
}

impl Model {
    fn embed(&mut self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| ProviderError::Inference(format!("tokenize: {e}")))?;
        let seq_len = encoding.get_ids().len();
        let to_i64 = |v: &[u32]| v.iter().map(|&x| x as i64).collect::<Vec<_>>();
        let input_ids = to_i64(encoding.get_ids());
        let attention_mask = to_i64(encoding.get_attention_mask());
        let token_type_ids = to_i64(encoding.get_type_ids());

        let shape = [1i64, seq_len as i64];
        let inference = |e: ort::Error| ProviderError::Inference(e.to_string());
        let ids_tensor =
            Tensor::from_array((shape, input_ids.into_boxed_slice())).map_err(inference)?;
        let mask_tensor = Tensor::from_array((shape, attention_mask.clone().into_boxed_slice()))
            .map_err(inference)?;
        let type_tensor =
            Tensor::from_array((shape, token_type_ids.into_boxed_slice())).map_err(inference)?;

        let outputs = self
            .session
            .run(ort::inputs![
                "input_ids" => ids_tensor,
                "attention_mask" => mask_tensor,
                "token_type_ids" => type_tensor,
            ])
            .map_err(inference)?;

        // Token embeddings: [1, seq_len, dim].
        let (output_shape, output_data) = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(inference)?;
        let dims: &[i64] = output_shape;
        if dims.len() != 3 || dims[2] as usize != self.dim {
            return Err(ProviderError::Malformed(format!(
                "unexpected output shape: {dims:?}, expected [1, {seq_len}, {}]",
                self.dim
            )));
        }
        let mut pooled = mean_pool(output_data, &attention_mask, dims[1] as usize, self.dim);
        normalize(&mut pooled);
        Ok(pooled)
    }
}

#[async_trait]
impl EmbeddingProvider for OnnxEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, ProviderError> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || {
            let mut model = model
                .lock()
                .map_err(|_| ProviderError::Unavailable("embedding model lock poisoned".into()))?;
            model.embed(&text)
        })
        .await
        .map_err(|e| ProviderError::Unavailable(format!("embedding task failed: {e}")))?
    }
}

/// Attention-masked mean over token embeddings laid out as `[seq_len, dim]`.
fn mean_pool(tokens: &[f32], mask: &[i64], seq_len: usize, dim: usize) -> Vec<f32> {
    let mut pooled = vec![0.0f32; dim];
    let mut count = 0.0f32;
    for j in 0..seq_len.min(mask.len()) {
        let m = mask[j] as f32;
        if m > 0.0 {
            let offset = j * dim;
            for (d, p) in pooled.iter_mut().enumerate() {
                *p += tokens[offset + d] * m;
            }
            count += m;
        }
    }
    if count > 0.0 {
        for p in &mut pooled {
            *p /= count;
        }
    }
    pooled
}

/// L2-normalize a vector in place.
fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
    match output_type {
        ort::value::ValueType::Tensor { shape, .. } => shape
            .last()
            .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
        _ => None,
    }
}
