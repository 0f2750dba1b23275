//! Error types for model construction, forward passes and sampling.

/// Errors produced by the model and sampler.
#[derive(Debug, thiserror::Error)]
pub enum GptError {
    /// Hyperparameters are inconsistent (e.g. `n_embd` not divisible by `n_head`).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("window length {len} exceeds maxlen {max}")]
    WindowTooLong { len: usize, max: usize },

    #[error("input window is empty")]
    EmptyInput,

    /// More destination rows than source columns leaves early rows with nothing to attend to.
    #[error("causal mask needs n_dest <= n_src, got n_dest={n_dest} n_src={n_src}")]
    MaskShape { n_dest: usize, n_src: usize },

    #[error("sample index {index} outside window of length {len}")]
    SampleIndex { index: usize, len: usize },

    #[error("token id {token} out of range for vocab_size {vocab_size}")]
    TokenOutOfRange { token: u32, vocab_size: usize },

    #[error("top_k must be in 1..={vocab_size}, got {k}")]
    InvalidTopK { k: usize, vocab_size: usize },

    #[error("prompt must contain at least one token")]
    EmptyPrompt,

    /// A vocabulary file whose line numbers cannot be used as ids.
    #[error("vocabulary line {line}: {reason}")]
    VocabFormat { line: usize, reason: String },

    /// An operation was called in a sampler state that does not allow it.
    #[error("sampler: {0}")]
    SamplerState(&'static str),

    #[error(transparent)]
    Candle(#[from] candle_core::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GptError>;
