pub mod generate;
pub mod sampling;

pub use generate::{GenerationConfig, SampledToken, Sampler, SamplerState, build_window, generate};
pub use sampling::sample_top_k;
