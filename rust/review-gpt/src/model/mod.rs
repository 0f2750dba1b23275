pub mod attention;
pub mod config;
pub mod embedding;
pub mod layers;
pub mod transformer;

// Re-exports for convenience
pub use attention::{CausalSelfAttention, causal_attention_mask, causal_mask_values};
pub use config::ModelConfig;
pub use embedding::TokenAndPositionEmbedding;
pub use layers::{FeedForward, TransformerBlock};
pub use transformer::{MiniGpt, load_model, load_model_from_bytes, split_inputs_targets};
