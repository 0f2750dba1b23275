//! MiniGPT decoder model.
//!
//! A decoder-only transformer over word-level tokens: token + position embedding,
//! causally masked decoder block(s), and a linear language-model head.

use candle_core::{D, DType, Device, IndexOp, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

use super::attention::causal_attention_mask;
use super::config::ModelConfig;
use super::embedding::TokenAndPositionEmbedding;
use super::layers::TransformerBlock;
use crate::error::{GptError, Result};

/// MiniGPT - a small decoder-only transformer for next-token prediction.
pub struct MiniGpt {
    /// Token + position embedding
    embedding: TokenAndPositionEmbedding,
    /// Decoder blocks (one by default)
    blocks: Vec<TransformerBlock>,
    /// Language model head, n_embd -> vocab_size
    lm_head: Linear,
    /// Model configuration
    config: ModelConfig,
    /// Device for tensor operations
    device: Device,
}

impl MiniGpt {
    /// Create a new model, loading or initialising weights through `vb`.
    ///
    /// # Errors
    /// Returns [`GptError::InvalidConfig`] for inconsistent hyperparameters, or an
    /// error if weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: ModelConfig, vb: VarBuilder) -> Result<Self> {
        config.validate()?;

        let device = vb.device().clone();

        let embedding = TokenAndPositionEmbedding::new(&config, vb.pp("embedding"))?;

        let mut blocks = Vec::with_capacity(config.n_layer);
        for i in 0..config.n_layer {
            blocks.push(TransformerBlock::new(&config, vb.pp(format!("blocks.{i}")))?);
        }

        let lm_head = candle_nn::linear(config.n_embd, config.vocab_size, vb.pp("lm_head"))?;

        tracing::info!(
            "MiniGpt: vocab={}, maxlen={}, n_embd={}, n_head={}, ff_dim={}, n_layer={}",
            config.vocab_size,
            config.maxlen,
            config.n_embd,
            config.n_head,
            config.ff_dim,
            config.n_layer,
        );

        Ok(Self {
            embedding,
            blocks,
            lm_head,
            config,
            device,
        })
    }

    /// Forward pass through the model.
    ///
    /// # Arguments
    /// * `input_ids` - Token IDs of shape (batch, seq_len), seq_len <= maxlen
    /// * `train` - Enables dropout
    ///
    /// # Returns
    /// Logits of shape (batch, seq_len, vocab_size)
    ///
    /// # Errors
    /// Returns an error for over-long windows, out-of-range ids, or tensor failures.
    pub fn forward_t(&self, input_ids: &Tensor, train: bool) -> Result<Tensor> {
        let (b, t) = input_ids.dims2()?;

        if t > self.config.maxlen {
            return Err(GptError::WindowTooLong {
                len: t,
                max: self.config.maxlen,
            });
        }

        let mut x = self.embedding.forward(input_ids)?;

        let mask = causal_attention_mask(b, t, t, &self.device)?;

        for (i, block) in self.blocks.iter().enumerate() {
            x = block.forward(&x, &mask, train)?;
            tracing::trace!("block {}/{} done", i + 1, self.blocks.len());
        }

        Ok(self.lm_head.forward(&x)?)
    }

    /// Inference forward pass (dropout disabled).
    ///
    /// # Errors
    /// See [`MiniGpt::forward_t`].
    pub fn forward(&self, input_ids: &Tensor) -> Result<Tensor> {
        self.forward_t(input_ids, false)
    }

    /// Logits row at `sample_index` for a single window.
    ///
    /// # Arguments
    /// * `window` - Token IDs of one window, length <= maxlen
    /// * `sample_index` - Position whose next-token distribution is wanted
    ///
    /// # Returns
    /// Logits of shape (vocab_size,)
    ///
    /// # Errors
    /// Returns an error if `sample_index` is outside the window or the forward pass fails.
    pub fn logits_at(&self, window: &[u32], sample_index: usize) -> Result<Tensor> {
        if sample_index >= window.len() {
            return Err(GptError::SampleIndex {
                index: sample_index,
                len: window.len(),
            });
        }
        let input = Tensor::new(window, &self.device)?.unsqueeze(0)?;
        let logits = self.forward(&input)?;
        Ok(logits.i((0, sample_index))?)
    }

    /// Mean next-token cross-entropy over a batch of token sequences.
    ///
    /// `tokens` has shape (batch, seq_len + 1); positions `0..seq_len` are the
    /// inputs and positions `1..=seq_len` the targets.
    ///
    /// # Errors
    /// Returns an error if the batch is too short or tensor operations fail.
    pub fn next_token_loss(&self, tokens: &Tensor, train: bool) -> Result<Tensor> {
        let (inputs, targets) = split_inputs_targets(tokens)?;
        let logits = self.forward_t(&inputs, train)?;
        let (b, t, v) = logits.dims3()?;
        let logits = logits.reshape((b * t, v))?;
        let targets = targets.reshape(b * t)?;
        Ok(candle_nn::loss::cross_entropy(&logits, &targets)?)
    }

    /// Get the model configuration.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get the device.
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    /// The token + position embedding layer.
    #[must_use]
    pub fn embedding(&self) -> &TokenAndPositionEmbedding {
        &self.embedding
    }
}

/// Split (batch, n + 1) token ids into shifted inputs and targets, each (batch, n).
///
/// # Errors
/// Returns [`GptError::EmptyInput`] when sequences have fewer than two tokens.
pub fn split_inputs_targets(tokens: &Tensor) -> Result<(Tensor, Tensor)> {
    let (_, n) = tokens.dims2()?;
    if n < 2 {
        return Err(GptError::EmptyInput);
    }
    let tokens = tokens.to_dtype(DType::U32)?;
    let inputs = tokens.narrow(D::Minus1, 0, n - 1)?.contiguous()?;
    let targets = tokens.narrow(D::Minus1, 1, n - 1)?.contiguous()?;
    Ok((inputs, targets))
}

/// Load a model from a safetensors file.
///
/// # Errors
/// Returns an error if file loading or model construction fails.
pub fn load_model(path: &std::path::Path, config: ModelConfig, device: &Device) -> Result<MiniGpt> {
    let data = std::fs::read(path)?;
    let vb = VarBuilder::from_buffered_safetensors(data, DType::F32, device)?;
    MiniGpt::new(config, vb)
}

/// Load a model from in-memory safetensors bytes.
///
/// # Errors
/// Returns an error if the buffer cannot be parsed as safetensors or model construction fails.
pub fn load_model_from_bytes(data: &[u8], config: ModelConfig, device: &Device) -> Result<MiniGpt> {
    let vb = VarBuilder::from_buffered_safetensors(data.to_vec(), DType::F32, device)?;
    MiniGpt::new(config, vb)
}
