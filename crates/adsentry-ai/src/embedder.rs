//! Local ONNX Runtime embeddings for offline indexing without API access.
//!
//! Any mean-pooled sentence-transformers export works. A multilingual model
//! such as paraphrase-multilingual-MiniLM-L12-v2 or multilingual-e5-small
//! handles Traditional Chinese copy. E5 models are asymmetric and get their
//! `query: ` / `passage: ` prefixes automatically.
//!
//! The model directory must contain `model.onnx` and `tokenizer.json`.

use std::borrow::Cow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, anyhow, ensure};
use async_trait::async_trait;
use ort::session::Session;
use ort::value::{Tensor, ValueType};
use tokenizers::{Encoding, PaddingParams, Tokenizer, TruncationParams};
use tracing::info;

use crate::{AiError, Embed, EmbedPurpose};

/// Token budget per text. Longer case explanations are truncated.
pub const DEFAULT_MAX_TOKENS: usize = 256;

const FALLBACK_DIM: usize = 384;

/// Sentence embeddings from a local ONNX model, L2-normalised for cosine
/// search.
///
/// [`OnnxEmbedder::embed_batch`] blocks the calling thread. The [`Embed`]
/// impl runs inference on the blocking pool so a caller's timeout can fire.
pub struct OnnxEmbedder {
    inner: Arc<Mutex<Inner>>,
    dim: usize,
    model_id: String,
    e5_prefixes: bool,
}

struct Inner {
    session: Session,
    tokenizer: Tokenizer,
}

struct ModelFiles {
    model: PathBuf,
    tokenizer: PathBuf,
}

impl ModelFiles {
    fn locate(dir: &Path) -> anyhow::Result<Self> {
        let files = Self {
            model: dir.join("model.onnx"),
            tokenizer: dir.join("tokenizer.json"),
        };
        ensure!(files.model.exists(), "model.onnx not found in {}", dir.display());
        ensure!(files.tokenizer.exists(), "tokenizer.json not found in {}", dir.display());
        Ok(files)
    }
}

impl OnnxEmbedder {
    pub fn load(model_dir: &Path) -> anyhow::Result<Self> {
        Self::load_with(model_dir, DEFAULT_MAX_TOKENS)
    }

    /// Load a model, truncating inputs to `max_tokens`.
    pub fn load_with(model_dir: &Path, max_tokens: usize) -> anyhow::Result<Self> {
        let files = ModelFiles::locate(model_dir)?;
        let session = Session::builder()?
            .commit_from_file(&files.model)
            .with_context(|| format!("failed to load {}", files.model.display()))?;
        let dim = output_dim(session.outputs()[0].dtype()).unwrap_or(FALLBACK_DIM);

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer)
            .map_err(|e| anyhow!("failed to load tokenizer: {e}"))?;
        tokenizer
            .with_truncation(Some(TruncationParams {
                max_length: max_tokens,
                ..Default::default()
            }))
            .map_err(|e| anyhow!("failed to configure truncation: {e}"))?;
        tokenizer.with_padding(Some(PaddingParams::default()));

        let model_id = model_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "onnx".to_string());
        let e5_prefixes = model_id.to_ascii_lowercase().contains("e5");

        info!(model = %model_id, dim, max_tokens, e5_prefixes, "loaded ONNX embedding model");
        Ok(Self {
            inner: Arc::new(Mutex::new(Inner { session, tokenizer })),
            dim,
            model_id,
            e5_prefixes,
        })
    }

    fn prepare<'a>(&self, text: &'a str, purpose: EmbedPurpose) -> Cow<'a, str> {
        if !self.e5_prefixes {
            return Cow::Borrowed(text);
        }
        match purpose {
            EmbedPurpose::Query => Cow::Owned(format!("query: {text}")),
            EmbedPurpose::Document => Cow::Owned(format!("passage: {text}")),
        }
    }

    /// Embed several texts in one forward pass.
    pub fn embed_batch(&self, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
        run_model(&self.inner, self.dim, texts)
    }
}

fn run_model(inner: &Mutex<Inner>, dim: usize, texts: &[&str]) -> anyhow::Result<Vec<Vec<f32>>> {
    if texts.is_empty() {
        return Ok(Vec::new());
    }
    let mut guard = inner
        .lock()
        .map_err(|_| anyhow!("embedder lock poisoned"))?;
    let Inner { session, tokenizer } = &mut *guard;

    let encodings = tokenizer
        .encode_batch(texts.to_vec(), true)
        .map_err(|e| anyhow!("failed to tokenize: {e}"))?;
    let batch = TokenBatch::new(&encodings);
    let shape = [batch.rows as i64, batch.cols as i64];

    let ids = Tensor::from_array((shape, batch.ids.into_boxed_slice()))?;
    let mask = Tensor::from_array((shape, batch.mask.clone().into_boxed_slice()))?;
    let types = Tensor::from_array((shape, batch.types.into_boxed_slice()))?;
    let outputs = session.run(ort::inputs![
        "input_ids" => ids,
        "attention_mask" => mask,
        "token_type_ids" => types,
    ])?;

    let (out_shape, hidden) = outputs[0].try_extract_tensor::<f32>()?;
    ensure!(
        out_shape.len() == 3
            && out_shape[0] as usize == batch.rows
            && out_shape[2] as usize == dim,
        "unexpected output shape {out_shape:?} for {} texts of dim {dim}",
        batch.rows
    );

    let mut vectors = mean_pool(hidden, &batch.mask, batch.cols, out_shape[1] as usize, dim);
    vectors.iter_mut().for_each(|v| l2_normalise(v));
    Ok(vectors)
}

#[async_trait]
impl Embed for OnnxEmbedder {
    async fn embed(&self, text: &str, purpose: EmbedPurpose) -> Result<Vec<f32>, AiError> {
        let input = self.prepare(text, purpose).into_owned();
        let inner = Arc::clone(&self.inner);
        let dim = self.dim;
        tokio::task::spawn_blocking(move || run_model(&inner, dim, &[input.as_str()]))
            .await
            .map_err(|e| AiError::Inference(format!("embedding task failed: {e}")))?
            .map_err(|e| AiError::Inference(format!("{e:#}")))?
            .pop()
            .ok_or_else(|| AiError::Inference("model returned no embedding".into()))
    }

    fn dim(&self) -> usize {
        self.dim
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ── Tensor plumbing ──

/// Row-major `[rows, cols]` model inputs, right-padded with zeros.
struct TokenBatch {
    rows: usize,
    cols: usize,
    ids: Vec<i64>,
    mask: Vec<i64>,
    types: Vec<i64>,
}

impl TokenBatch {
    fn new(encodings: &[Encoding]) -> Self {
        let rows = encodings.len();
        let cols = encodings.iter().map(|e| e.len()).max().unwrap_or(0);
        let flatten = |field: fn(&Encoding) -> &[u32]| {
            let mut out = vec![0i64; rows * cols];
            for (row, enc) in encodings.iter().enumerate() {
                for (col, &v) in field(enc).iter().enumerate() {
                    out[row * cols + col] = i64::from(v);
                }
            }
            out
        };
        Self {
            rows,
            cols,
            ids: flatten(Encoding::get_ids),
            mask: flatten(Encoding::get_attention_mask),
            types: flatten(Encoding::get_type_ids),
        }
    }
}

/// Average each row's token vectors over its attention mask.
///
/// `hidden` is `[rows, hidden_cols, dim]`; `mask` is `[rows, mask_cols]`.
/// Rows with no attended token come back as zero vectors.
fn mean_pool(
    hidden: &[f32],
    mask: &[i64],
    mask_cols: usize,
    hidden_cols: usize,
    dim: usize,
) -> Vec<Vec<f32>> {
    let rows = if mask_cols == 0 { 0 } else { mask.len() / mask_cols };
    (0..rows)
        .map(|row| {
            let mut sum = vec![0.0f32; dim];
            let mut weight = 0.0f32;
            for col in 0..hidden_cols.min(mask_cols) {
                let m = mask[row * mask_cols + col] as f32;
                if m <= 0.0 {
                    continue;
                }
                let start = (row * hidden_cols + col) * dim;
                for (acc, h) in sum.iter_mut().zip(&hidden[start..start + dim]) {
                    *acc += h * m;
                }
                weight += m;
            }
            if weight > 0.0 {
                sum.iter_mut().for_each(|x| *x /= weight);
            }
            sum
        })
        .collect()
}

fn l2_normalise(v: &mut [f32]) {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
}

/// Embedding width from the first output's static shape, when known.
fn output_dim(output: &ValueType) -> Option<usize> {
    match output {
        ValueType::Tensor { shape, .. } => shape.last().copied().filter(|&d| d > 0).map(|d| d as usize),
        _ => None,
    }
}
