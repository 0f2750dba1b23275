//! Feed-forward network and the decoder block.

use candle_core::Tensor;
use candle_nn::{Dropout, LayerNorm, Linear, Module, VarBuilder};

use super::attention::CausalSelfAttention;
use super::config::ModelConfig;
use crate::error::Result;

/// Position-wise feed-forward network with ReLU activation.
///
/// dense_1 (n_embd -> ff_dim) -> ReLU -> dense_2 (ff_dim -> n_embd)
pub struct FeedForward {
    dense_1: Linear,
    dense_2: Linear,
}

impl FeedForward {
    /// Create a new feed-forward layer.
    ///
    /// # Errors
    /// Returns an error if weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let dense_1 = candle_nn::linear(config.n_embd, config.ff_dim, vb.pp("dense_1"))?;
        let dense_2 = candle_nn::linear(config.ff_dim, config.n_embd, vb.pp("dense_2"))?;
        Ok(Self { dense_1, dense_2 })
    }

    /// Forward pass, (batch, seq_len, n_embd) -> (batch, seq_len, n_embd).
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let h = self.dense_1.forward(x)?.relu()?;
        Ok(self.dense_2.forward(&h)?)
    }
}

/// Decoder block with post-norm residuals.
///
/// Structure: Attention -> Dropout -> Residual -> LayerNorm -> FFN -> Dropout -> Residual -> LayerNorm
pub struct TransformerBlock {
    attn: CausalSelfAttention,
    dropout_1: Dropout,
    ln_1: LayerNorm,
    ffn: FeedForward,
    dropout_2: Dropout,
    ln_2: LayerNorm,
}

impl TransformerBlock {
    /// Create a new decoder block.
    ///
    /// # Errors
    /// Returns an error if the attention shape is invalid or weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let attn = CausalSelfAttention::new(config, vb.pp("attn"))?;
        let ln_1 = candle_nn::layer_norm(config.n_embd, config.layer_norm_eps, vb.pp("ln_1"))?;
        let ffn = FeedForward::new(config, vb.pp("ffn"))?;
        let ln_2 = candle_nn::layer_norm(config.n_embd, config.layer_norm_eps, vb.pp("ln_2"))?;

        Ok(Self {
            attn,
            dropout_1: Dropout::new(config.dropout),
            ln_1,
            ffn,
            dropout_2: Dropout::new(config.dropout),
            ln_2,
        })
    }

    /// Forward pass through the block.
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape (batch, seq_len, n_embd)
    /// * `mask` - Boolean causal mask of shape (batch, seq_len, seq_len)
    /// * `train` - Enables dropout; identity otherwise
    ///
    /// # Returns
    /// Output tensor with the same shape as `x`
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    pub fn forward(&self, x: &Tensor, mask: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.attn.forward(x, mask)?;
        let h = self.dropout_1.forward(&h, train)?;
        let out_1 = self.ln_1.forward(&(x + h)?)?;

        let h = self.ffn.forward(&out_1)?;
        let h = self.dropout_2.forward(&h, train)?;
        Ok(self.ln_2.forward(&(out_1 + h)?)?)
    }
}
