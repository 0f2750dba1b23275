//! Epoch-boundary hooks.
//!
//! A training loop calls [`run_epoch_end`] after each epoch. Hooks observe the model
//! through a shared reference and cannot change its weights.

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::error::{GptError, Result};
use crate::inference::generate::{GenerationConfig, Sampler};
use crate::model::MiniGpt;
use crate::tokenizer::vocab::Vocabulary;

/// Code run synchronously at the end of every training epoch.
pub trait EpochHook {
    /// Called once per finished epoch, `epoch` counting from 0.
    ///
    /// # Errors
    /// An error aborts the remaining hooks for this epoch.
    fn on_epoch_end(&mut self, epoch: usize, model: &MiniGpt) -> Result<()>;
}

/// Invoke every hook in order for a finished epoch.
///
/// # Errors
/// Returns the first hook error.
pub fn run_epoch_end(hooks: &mut [Box<dyn EpochHook>], epoch: usize, model: &MiniGpt) -> Result<()> {
    for hook in hooks.iter_mut() {
        hook.on_epoch_end(epoch, model)?;
    }
    Ok(())
}

/// Samples a continuation of a fixed prompt every `every` epochs and logs it.
pub struct TextGenerator {
    prompt: Vec<u32>,
    vocab: Vocabulary,
    cfg: GenerationConfig,
    every: usize,
    rng: StdRng,
    samples: Vec<(usize, String)>,
}

impl TextGenerator {
    /// Create a generator hook for a tokenised prompt.
    ///
    /// `cfg.seed` seeds the hook's random source once, so successive epochs draw
    /// different samples while a whole run stays reproducible.
    #[must_use]
    pub fn new(prompt: Vec<u32>, vocab: Vocabulary, cfg: GenerationConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            prompt,
            vocab,
            cfg,
            every: 1,
            rng,
            samples: Vec::new(),
        }
    }

    /// Only sample on epochs where `(epoch + 1) % every == 0`.
    ///
    /// # Errors
    /// Returns [`GptError::InvalidConfig`] when `every` is 0.
    pub fn every(mut self, every: usize) -> Result<Self> {
        if every == 0 {
            return Err(GptError::InvalidConfig(
                "TextGenerator interval must be at least 1 epoch".to_string(),
            ));
        }
        self.every = every;
        Ok(self)
    }

    /// Decoded samples so far, tagged with their epoch.
    #[must_use]
    pub fn samples(&self) -> &[(usize, String)] {
        &self.samples
    }
}

impl EpochHook for TextGenerator {
    fn on_epoch_end(&mut self, epoch: usize, model: &MiniGpt) -> Result<()> {
        if !(epoch + 1).is_multiple_of(self.every) {
            return Ok(());
        }
        let tokens = Sampler::new(model, self.cfg.clone(), &mut self.rng)?.generate(&self.prompt)?;
        let text = self.vocab.decode(&tokens);
        tracing::info!("epoch {}: generated text:\n{}", epoch + 1, text);
        self.samples.push((epoch, text));
        Ok(())
    }
}
