//! Autoregressive generation loop.
//!
//! Each step runs the model on a fixed-length window, reads the logits row of the
//! last real token, and appends one top-k sample.

use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::error::{GptError, Result};
use crate::inference::sampling::{sample_from_candidates, top_k_candidates};
use crate::model::MiniGpt;
use crate::tokenizer::vocab::PAD_ID;

/// Generation settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationConfig {
    /// Number of tokens to generate after the prompt
    pub max_new_tokens: usize,
    /// Number of highest-scoring candidates kept at each step
    pub top_k: usize,
    pub temperature: f32,
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: 40,
            top_k: 10,
            temperature: 1.0,
            seed: None,
        }
    }
}

impl GenerationConfig {
    /// Check the sampling settings against a vocabulary size.
    ///
    /// # Errors
    /// Returns [`GptError::InvalidTopK`] unless `1 <= top_k <= vocab_size`, and
    /// [`GptError::InvalidConfig`] for a non-positive temperature.
    pub fn validate(&self, vocab_size: usize) -> Result<()> {
        if self.top_k == 0 || self.top_k > vocab_size {
            return Err(GptError::InvalidTopK {
                k: self.top_k,
                vocab_size,
            });
        }
        if !(self.temperature.is_finite() && self.temperature > 0.0) {
            return Err(GptError::InvalidConfig(format!(
                "temperature must be positive, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Lifecycle of a [`Sampler`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplerState {
    AwaitingPrompt,
    Generating,
    Done,
}

/// One generated token and how it was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SampledToken {
    pub id: u32,
    /// Window row the distribution was read from
    pub sample_index: usize,
    /// The top-k ids the draw was restricted to, best first
    pub candidates: Vec<u32>,
}

/// Model input window for the current sequence.
///
/// Sequences up to `maxlen` are right-padded with [`PAD_ID`] and sampled at their
/// last real token (`len - 1`). Longer sequences keep their last `maxlen` tokens
/// and are sampled at `maxlen - 1`.
///
/// # Errors
/// Returns [`GptError::EmptyPrompt`] for an empty sequence.
pub fn build_window(tokens: &[u32], maxlen: usize) -> Result<(Vec<u32>, usize)> {
    if tokens.is_empty() {
        return Err(GptError::EmptyPrompt);
    }
    if tokens.len() > maxlen {
        let window = tokens[tokens.len() - maxlen..].to_vec();
        return Ok((window, maxlen - 1));
    }
    let mut window = Vec::with_capacity(maxlen);
    window.extend_from_slice(tokens);
    window.resize(maxlen, PAD_ID);
    Ok((window, tokens.len() - 1))
}

/// Autoregressive top-k sampler over a borrowed model.
///
/// The random source is injected so callers control seeding.
pub struct Sampler<'m, R: Rng> {
    model: &'m MiniGpt,
    cfg: GenerationConfig,
    rng: R,
    state: SamplerState,
    tokens: Vec<u32>,
    generated: usize,
}

impl<'m, R: Rng> Sampler<'m, R> {
    /// Create a sampler; sampling settings are validated before any work happens.
    ///
    /// # Errors
    /// See [`GenerationConfig::validate`].
    pub fn new(model: &'m MiniGpt, cfg: GenerationConfig, rng: R) -> Result<Self> {
        cfg.validate(model.config().vocab_size)?;
        Ok(Self {
            model,
            cfg,
            rng,
            state: SamplerState::AwaitingPrompt,
            tokens: Vec::new(),
            generated: 0,
        })
    }

    #[must_use]
    pub fn state(&self) -> SamplerState {
        self.state
    }

    /// Prompt plus everything generated so far.
    #[must_use]
    pub fn tokens(&self) -> &[u32] {
        &self.tokens
    }

    /// Copy the prompt into the working sequence and begin generating.
    ///
    /// A zero token budget moves straight to [`SamplerState::Done`].
    ///
    /// # Errors
    /// Fails on an empty prompt, a prompt id outside the vocabulary, or if the
    /// sampler was already started.
    pub fn start(&mut self, prompt: &[u32]) -> Result<()> {
        if self.state != SamplerState::AwaitingPrompt {
            return Err(GptError::SamplerState("prompt already supplied"));
        }
        if prompt.is_empty() {
            return Err(GptError::EmptyPrompt);
        }
        let vocab_size = self.model.config().vocab_size;
        if let Some(&token) = prompt.iter().find(|&&t| t as usize >= vocab_size) {
            return Err(GptError::TokenOutOfRange { token, vocab_size });
        }

        self.tokens = prompt.to_vec();
        self.generated = 0;
        self.state = if self.cfg.max_new_tokens == 0 {
            SamplerState::Done
        } else {
            SamplerState::Generating
        };
        Ok(())
    }

    /// Generate one token.
    ///
    /// Returns `None` once the budget is spent.
    ///
    /// # Errors
    /// Fails if called before [`Sampler::start`] or if the forward pass fails.
    pub fn step(&mut self) -> Result<Option<SampledToken>> {
        match self.state {
            SamplerState::AwaitingPrompt => {
                return Err(GptError::SamplerState("step called before start"));
            }
            SamplerState::Done => return Ok(None),
            SamplerState::Generating => {}
        }

        let (window, sample_index) = build_window(&self.tokens, self.model.config().maxlen)?;
        let logits = self
            .model
            .logits_at(&window, sample_index)?
            .to_vec1::<f32>()?;

        let candidates = top_k_candidates(&logits, self.cfg.top_k);
        let id = sample_from_candidates(&logits, &candidates, self.cfg.temperature, &mut self.rng);

        self.tokens.push(id);
        self.generated += 1;
        tracing::debug!(
            "step {}/{}: sample_index={} token={}",
            self.generated,
            self.cfg.max_new_tokens,
            sample_index,
            id
        );

        if self.generated >= self.cfg.max_new_tokens {
            self.state = SamplerState::Done;
        }

        Ok(Some(SampledToken {
            id,
            sample_index,
            candidates,
        }))
    }

    /// Run a full generation from `prompt`.
    ///
    /// Returns the full token stream (prompt + generated).
    ///
    /// # Errors
    /// See [`Sampler::start`] and [`Sampler::step`].
    pub fn generate(mut self, prompt: &[u32]) -> Result<Vec<u32>> {
        self.start(prompt)?;
        while self.step()?.is_some() {}
        Ok(self.tokens)
    }
}

/// Generate with a `StdRng` seeded from `cfg.seed` (or OS entropy when unset).
///
/// Returns the full token stream (prompt + generated).
///
/// # Errors
/// Returns an error for invalid sampling settings, a bad prompt, or model failures.
pub fn generate(model: &MiniGpt, prompt_tokens: &[u32], cfg: &GenerationConfig) -> Result<Vec<u32>> {
    let rng = match cfg.seed {
        Some(seed) => rand::rngs::StdRng::seed_from_u64(seed),
        None => rand::rngs::StdRng::from_entropy(),
    };
    Sampler::new(model, cfg.clone(), rng)?.generate(prompt_tokens)
}
