//! Token and position embeddings.
//!
//! Each token's learned vector is summed with a learned vector for its absolute
//! offset inside the current window.

use candle_core::{DType, Tensor};
use candle_nn::{Embedding, Module, VarBuilder};

use super::config::ModelConfig;
use crate::error::{GptError, Result};

/// Token embedding plus learned absolute position embedding.
pub struct TokenAndPositionEmbedding {
    /// Token table (vocab_size, n_embd)
    token_emb: Embedding,
    /// Position table (maxlen, n_embd)
    pos_emb: Embedding,
    vocab_size: usize,
    maxlen: usize,
}

impl TokenAndPositionEmbedding {
    /// Create the embedding layer.
    ///
    /// # Errors
    /// Returns an error if weight loading fails.
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(config: &ModelConfig, vb: VarBuilder) -> Result<Self> {
        let token_emb = candle_nn::embedding(config.vocab_size, config.n_embd, vb.pp("token_emb"))?;
        let pos_emb = candle_nn::embedding(config.maxlen, config.n_embd, vb.pp("pos_emb"))?;
        Ok(Self {
            token_emb,
            pos_emb,
            vocab_size: config.vocab_size,
            maxlen: config.maxlen,
        })
    }

    /// Forward pass.
    ///
    /// # Arguments
    /// * `token_ids` - Token IDs of shape (batch, seq_len), dtype u32
    ///
    /// # Returns
    /// Embeddings of shape (batch, seq_len, n_embd)
    ///
    /// # Errors
    /// Fails before any lookup if the window is empty, longer than `maxlen`, or
    /// holds an id outside the vocabulary.
    pub fn forward(&self, token_ids: &Tensor) -> Result<Tensor> {
        let (_, t) = token_ids.dims2()?;
        if t == 0 {
            return Err(GptError::EmptyInput);
        }
        if t > self.maxlen {
            return Err(GptError::WindowTooLong {
                len: t,
                max: self.maxlen,
            });
        }
        self.check_ids(token_ids)?;

        let tok = self.token_emb.forward(token_ids)?;

        // Positions always restart at 0 for the window being processed.
        #[allow(clippy::cast_possible_truncation)]
        let positions = Tensor::arange(0u32, t as u32, token_ids.device())?;
        let pos = self.pos_emb.forward(&positions)?;

        Ok(tok.broadcast_add(&pos)?)
    }

    fn check_ids(&self, token_ids: &Tensor) -> Result<()> {
        let ids = token_ids.to_dtype(DType::U32)?.flatten_all()?;
        let max = ids.max(0)?.to_scalar::<u32>()?;
        if max as usize >= self.vocab_size {
            return Err(GptError::TokenOutOfRange {
                token: max,
                vocab_size: self.vocab_size,
            });
        }
        Ok(())
    }

    /// The token table, one row per vocabulary entry.
    #[must_use]
    pub fn token_table(&self) -> &Tensor {
        self.token_emb.embeddings()
    }

    /// The position table, one row per window offset.
    #[must_use]
    pub fn position_table(&self) -> &Tensor {
        self.pos_emb.embeddings()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;
    use candle_nn::VarMap;

    fn layer(config: &ModelConfig) -> TokenAndPositionEmbedding {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
        TokenAndPositionEmbedding::new(config, vb).unwrap()
    }

    #[test]
    fn test_output_is_token_plus_position_row() {
        let config = ModelConfig::tiny();
        let emb = layer(&config);
        let ids = [5u32, 12, 9, 0];
        let input = Tensor::new(&[ids], &Device::Cpu).unwrap();

        let out: Vec<Vec<f32>> = emb.forward(&input).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        let tokens: Vec<Vec<f32>> = emb.token_table().to_vec2().unwrap();
        let positions: Vec<Vec<f32>> = emb.position_table().to_vec2().unwrap();

        for (p, &id) in ids.iter().enumerate() {
            let expected: Vec<f32> = tokens[id as usize]
                .iter()
                .zip(&positions[p])
                .map(|(a, b)| a + b)
                .collect();
            assert_eq!(out[p], expected, "position {p}");
        }
    }

    #[test]
    fn test_positions_restart_for_each_window() {
        let config = ModelConfig::tiny();
        let emb = layer(&config);
        let a = Tensor::new(&[[7u32, 8, 9]], &Device::Cpu).unwrap();
        let b = Tensor::new(&[[9u32]], &Device::Cpu).unwrap();

        let a: Vec<Vec<f32>> = emb.forward(&a).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        let b: Vec<Vec<f32>> = emb.forward(&b).unwrap().squeeze(0).unwrap().to_vec2().unwrap();
        // Token 9 at offset 0 in the shifted window, not offset 2.
        assert_ne!(a[2], b[0]);
        let positions: Vec<Vec<f32>> = emb.position_table().to_vec2().unwrap();
        let tokens: Vec<Vec<f32>> = emb.token_table().to_vec2().unwrap();
        let expected: Vec<f32> = tokens[9].iter().zip(&positions[0]).map(|(x, y)| x + y).collect();
        assert_eq!(b[0], expected);
    }

    #[test]
    fn test_out_of_range_token_fails_fast() {
        let config = ModelConfig::tiny();
        let emb = layer(&config);
        #[allow(clippy::cast_possible_truncation)]
        let bad = config.vocab_size as u32;
        let input = Tensor::new(&[[1u32, bad]], &Device::Cpu).unwrap();
        match emb.forward(&input) {
            Err(GptError::TokenOutOfRange { token, vocab_size }) => {
                assert_eq!(token, bad);
                assert_eq!(vocab_size, config.vocab_size);
            }
            Err(other) => panic!("unexpected error: {other}"),
            Ok(_) => panic!("out-of-range id must not be clamped"),
        }
    }

    #[test]
    fn test_window_longer_than_maxlen_rejected() {
        let config = ModelConfig::tiny();
        let emb = layer(&config);
        let input = Tensor::zeros((1, config.maxlen + 1), DType::U32, &Device::Cpu).unwrap();
        assert!(matches!(
            emb.forward(&input),
            Err(GptError::WindowTooLong { .. })
        ));
    }
}
