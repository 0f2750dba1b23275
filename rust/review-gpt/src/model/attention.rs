//! Causal self-attention implementation.
//!
//! Multi-head scaled dot-product attention with separate query/key/value projections
//! and a boolean causal mask.

use candle_core::{D, DType, Device, Tensor};
use candle_nn::{Linear, Module, VarBuilder};

use super::config::ModelConfig;
use crate::error::{GptError, Result};

/// Multi-head causal self-attention.
pub struct CausalSelfAttention {
    q_proj: Linear,
    k_proj: Linear,
    v_proj: Linear,
    /// Output projection (n_embd -> n_embd)
    out_proj: Linear,
    /// Number of attention heads
    n_head: usize,
    /// Embedding dimension
    n_embd: usize,
    /// Dimension per head
    head_dim: usize,
}

impl CausalSelfAttention {
    /// Create a new causal self-attention layer.
    ///
    /// # Arguments
    /// * `config` - Model configuration
    /// * `vb` - Variable builder for loading or initialising weights
    ///
    /// # Errors
    /// Returns an error if the head count does not divide the embedding dimension
    /// or weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let n_embd = config.n_embd;
        if config.n_head == 0 || !n_embd.is_multiple_of(config.n_head) {
            return Err(GptError::InvalidConfig(format!(
                "n_embd {n_embd} must be divisible by n_head {}",
                config.n_head
            )));
        }

        let q_proj = candle_nn::linear(n_embd, n_embd, vb.pp("q_proj"))?;
        let k_proj = candle_nn::linear(n_embd, n_embd, vb.pp("k_proj"))?;
        let v_proj = candle_nn::linear(n_embd, n_embd, vb.pp("v_proj"))?;
        let out_proj = candle_nn::linear(n_embd, n_embd, vb.pp("out_proj"))?;

        Ok(Self {
            q_proj,
            k_proj,
            v_proj,
            out_proj,
            n_head: config.n_head,
            n_embd,
            head_dim: config.head_dim(),
        })
    }

    fn split_heads(&self, x: &Tensor, b: usize, t: usize) -> Result<Tensor> {
        // (B, T, C) -> (B, n_head, T, head_dim)
        Ok(x
            .reshape((b, t, self.n_head, self.head_dim))?
            .transpose(1, 2)?
            .contiguous()?)
    }

    /// Forward pass for causal self-attention.
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape (batch, seq_len, n_embd)
    /// * `mask` - Boolean mask of shape (batch, seq_len, seq_len), 1 = may attend
    ///
    /// # Returns
    /// Output tensor of shape (batch, seq_len, n_embd)
    ///
    /// # Errors
    /// Returns an error if tensor operations fail.
    #[allow(clippy::many_single_char_names)]
    pub fn forward(&self, x: &Tensor, mask: &Tensor) -> Result<Tensor> {
        let (b, t, _c) = x.dims3()?;

        let q = self.split_heads(&self.q_proj.forward(x)?, b, t)?;
        let k = self.split_heads(&self.k_proj.forward(x)?, b, t)?;
        let v = self.split_heads(&self.v_proj.forward(x)?, b, t)?;

        // Scaled dot-product attention: softmax(QK^T / sqrt(d_k)) * V
        #[allow(clippy::cast_precision_loss)]
        let scale = 1.0 / (self.head_dim as f64).sqrt();
        let k_t = k.transpose(D::Minus2, D::Minus1)?.contiguous()?;
        let att = (q.matmul(&k_t)? * scale)?;

        // Masked scores become -inf so softmax assigns them exactly zero weight.
        let allowed = mask.unsqueeze(1)?.broadcast_as(att.shape())?;
        let neg_inf = Tensor::new(f32::NEG_INFINITY, att.device())?.broadcast_as(att.shape())?;
        let att = allowed.where_cond(&att, &neg_inf)?;

        let att = candle_nn::ops::softmax_last_dim(&att)?;

        // (B, n_head, T, T) @ (B, n_head, T, head_dim)
        let y = att.matmul(&v)?;

        // (B, n_head, T, head_dim) -> (B, T, C)
        let y = y
            .transpose(1, 2)?
            .contiguous()?
            .reshape((b, t, self.n_embd))?;

        Ok(self.out_proj.forward(&y)?)
    }
}

/// Row-major causal mask values for `n_dest` queries over `n_src` keys.
///
/// Entry `(i, j)` is 1 iff `i >= j - n_src + n_dest`; with equal counts that is
/// the inclusive lower triangle. When `n_dest > n_src` the leading rows are all
/// zero; [`causal_attention_mask`] rejects that shape.
#[must_use]
pub fn causal_mask_values(n_dest: usize, n_src: usize) -> Vec<u8> {
    let mut values = Vec::with_capacity(n_dest * n_src);
    for i in 0..n_dest {
        for j in 0..n_src {
            values.push(u8::from(i + n_src >= j + n_dest));
        }
    }
    values
}

/// Create a boolean causal attention mask of shape (batch, n_dest, n_src).
///
/// The (n_dest, n_src) matrix is built once and broadcast across the batch.
///
/// # Errors
/// Returns [`GptError::MaskShape`] if `n_dest > n_src`, or an error if tensor
/// creation fails.
pub fn causal_attention_mask(
    batch: usize,
    n_dest: usize,
    n_src: usize,
    device: &Device,
) -> Result<Tensor> {
    if n_dest > n_src {
        return Err(GptError::MaskShape { n_dest, n_src });
    }
    let mask = Tensor::from_vec(causal_mask_values(n_dest, n_src), (n_dest, n_src), device)?;
    debug_assert_eq!(mask.dtype(), DType::U8);
    Ok(mask.unsqueeze(0)?.broadcast_as((batch, n_dest, n_src))?)
}
