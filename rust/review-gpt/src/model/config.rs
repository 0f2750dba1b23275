use serde::{Deserialize, Serialize};

use crate::error::{GptError, Result};

/// Model hyperparameters.
///
/// Every layer is built from this struct, so shape errors surface at construction
/// time rather than in the middle of a forward pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Maximum window length (positions in the position table)
    pub maxlen: usize,
    /// Vocabulary size, including the padding (0) and unknown (1) entries
    pub vocab_size: usize,
    /// Number of stacked decoder blocks
    #[serde(default = "default_n_layer")]
    pub n_layer: usize,
    /// Number of attention heads
    pub n_head: usize,
    /// Embedding dimension
    pub n_embd: usize,
    /// Hidden width of the position-wise feed-forward network
    pub ff_dim: usize,
    /// Dropout applied to the attention and feed-forward outputs during training
    #[serde(default = "default_dropout")]
    pub dropout: f32,
    /// Layer norm epsilon
    #[serde(default = "default_layer_norm_eps")]
    pub layer_norm_eps: f64,
}

fn default_n_layer() -> usize {
    1
}

fn default_dropout() -> f32 {
    0.1
}

fn default_layer_norm_eps() -> f64 {
    1e-6
}

impl ModelConfig {
    /// Dimension per attention head.
    #[must_use]
    pub fn head_dim(&self) -> usize {
        self.n_embd / self.n_head
    }

    /// Validate that configuration is consistent.
    ///
    /// # Errors
    /// Returns [`GptError::InvalidConfig`] naming the first rule that failed.
    pub fn validate(&self) -> Result<()> {
        let fail = |msg: &str| Err(GptError::InvalidConfig(msg.to_string()));

        if self.n_head == 0 {
            return fail("n_head must be positive");
        }
        if !self.n_embd.is_multiple_of(self.n_head) {
            return fail("n_embd must be divisible by n_head");
        }
        if self.n_embd == 0 {
            return fail("n_embd must be positive");
        }
        // Ids 0 and 1 are reserved for padding and unknown words.
        if self.vocab_size < 2 {
            return fail("vocab_size must be at least 2");
        }
        if self.maxlen == 0 {
            return fail("maxlen must be positive");
        }
        if self.ff_dim == 0 {
            return fail("ff_dim must be positive");
        }
        if self.n_layer == 0 {
            return fail("n_layer must be positive");
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return fail("dropout must be in [0, 1)");
        }
        if self.layer_norm_eps.is_nan() || self.layer_norm_eps <= 0.0 {
            return fail("layer_norm_eps must be positive");
        }
        Ok(())
    }

    /// The review-corpus configuration: 20k vocabulary, 80-token windows.
    #[must_use]
    pub fn reviews() -> Self {
        Self {
            maxlen: 80,
            vocab_size: 20_000,
            n_layer: 1,
            n_head: 2,
            n_embd: 256,
            ff_dim: 256,
            dropout: 0.1,
            layer_norm_eps: 1e-6,
        }
    }

    /// Tiny config for tests and quick experiments.
    #[must_use]
    pub fn tiny() -> Self {
        Self {
            maxlen: 16,
            vocab_size: 64,
            n_layer: 1,
            n_head: 2,
            n_embd: 16,
            ff_dim: 32,
            dropout: 0.1,
            layer_norm_eps: 1e-6,
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::reviews()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        assert!(ModelConfig::reviews().validate().is_ok());
        assert!(ModelConfig::tiny().validate().is_ok());
        assert_eq!(ModelConfig::default().head_dim(), 128);
    }

    #[test]
    fn rejects_indivisible_heads() {
        let bad = ModelConfig {
            n_embd: 100,
            n_head: 3,
            ..ModelConfig::tiny()
        };
        let err = bad.validate().unwrap_err();
        assert!(err.to_string().contains("divisible"), "{err}");
    }

    #[test]
    fn rejects_out_of_range_fields() {
        let cases = [
            ModelConfig { n_head: 0, ..ModelConfig::tiny() },
            ModelConfig { vocab_size: 1, ..ModelConfig::tiny() },
            ModelConfig { maxlen: 0, ..ModelConfig::tiny() },
            ModelConfig { ff_dim: 0, ..ModelConfig::tiny() },
            ModelConfig { n_layer: 0, ..ModelConfig::tiny() },
            ModelConfig { dropout: 1.0, ..ModelConfig::tiny() },
            ModelConfig { dropout: -0.1, ..ModelConfig::tiny() },
            ModelConfig { layer_norm_eps: 0.0, ..ModelConfig::tiny() },
        ];
        for cfg in cases {
            assert!(
                matches!(cfg.validate(), Err(GptError::InvalidConfig(_))),
                "should reject {cfg:?}"
            );
        }
    }

    #[test]
    fn json_fills_optional_fields() {
        let cfg: ModelConfig = serde_json::from_str(
            r#"{"maxlen": 80, "vocab_size": 20000, "n_head": 2, "n_embd": 256, "ff_dim": 256}"#,
        )
        .unwrap();
        assert_eq!(cfg, ModelConfig::reviews());
    }
}
