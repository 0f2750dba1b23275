//! Checkpoint directories: `config.json` + `model.safetensors`.

use std::path::Path;

use anyhow::{Context, Result};
use candle_core::Device;
use candle_nn::VarMap;
use safetensors::SafeTensors;

use crate::model::{MiniGpt, ModelConfig, load_model_from_bytes};

pub const CONFIG_FILE: &str = "config.json";
pub const WEIGHTS_FILE: &str = "model.safetensors";

/// Every tensor a [`MiniGpt`] with this config loads, with its shape.
#[must_use]
pub fn expected_tensors(config: &ModelConfig) -> Vec<(String, Vec<usize>)> {
    let d = config.n_embd;
    let mut out = vec![
        ("embedding.token_emb.weight".to_string(), vec![config.vocab_size, d]),
        ("embedding.pos_emb.weight".to_string(), vec![config.maxlen, d]),
    ];

    let linear = |out: &mut Vec<(String, Vec<usize>)>, name: String, fan_in: usize, fan_out: usize| {
        out.push((format!("{name}.weight"), vec![fan_out, fan_in]));
        out.push((format!("{name}.bias"), vec![fan_out]));
    };

    for i in 0..config.n_layer {
        let block = format!("blocks.{i}");
        for proj in ["q_proj", "k_proj", "v_proj", "out_proj"] {
            linear(&mut out, format!("{block}.attn.{proj}"), d, d);
        }
        linear(&mut out, format!("{block}.ffn.dense_1"), d, config.ff_dim);
        linear(&mut out, format!("{block}.ffn.dense_2"), config.ff_dim, d);
        for ln in ["ln_1", "ln_2"] {
            out.push((format!("{block}.{ln}.weight"), vec![d]));
            out.push((format!("{block}.{ln}.bias"), vec![d]));
        }
    }

    linear(&mut out, "lm_head".to_string(), d, config.vocab_size);
    out
}

/// Check that a safetensors buffer holds every tensor the config needs, with the right shapes.
///
/// # Errors
/// Returns an error naming the first missing or mis-shaped tensor.
pub fn validate_checkpoint(data: &[u8], config: &ModelConfig) -> Result<()> {
    let st = SafeTensors::deserialize(data).context("parse safetensors header")?;
    for (name, shape) in expected_tensors(config) {
        let view = st.tensor(&name).with_context(|| {
            format!(
                "checkpoint is missing tensor {name:?} (has {} tensors); was it saved for a different config?",
                st.names().len()
            )
        })?;
        if view.shape() != shape.as_slice() {
            anyhow::bail!(
                "tensor {name:?} has shape {:?}, config expects {shape:?}",
                view.shape()
            );
        }
    }
    Ok(())
}

/// Load a model from a weights file on disk, reading `config.json` from the same
/// directory when available.
///
/// # Errors
/// Returns an error if the weights or config cannot be loaded or do not match.
pub fn load_external_model(model_path: &Path, device: &Device) -> Result<MiniGpt> {
    let config = load_config_for_model(model_path)?;
    let data = std::fs::read(model_path)
        .with_context(|| format!("read weights {}", model_path.display()))?;
    validate_checkpoint(&data, &config)
        .with_context(|| format!("validate {}", model_path.display()))?;
    let model = load_model_from_bytes(&data, config, device).context("load float safetensors")?;
    tracing::info!("loaded weights from {}", model_path.display());
    Ok(model)
}

/// Load a checkpoint directory written by [`save_checkpoint`].
///
/// # Errors
/// Returns an error if the directory lacks weights or they do not match the config.
pub fn load_model_dir(dir: &Path, device: &Device) -> Result<MiniGpt> {
    load_external_model(&dir.join(WEIGHTS_FILE), device)
}

fn load_config_for_model(model_path: &Path) -> Result<ModelConfig> {
    let Some(parent) = model_path.parent() else {
        return Ok(ModelConfig::default());
    };

    let config_path = parent.join(CONFIG_FILE);
    if !config_path.exists() {
        tracing::warn!(
            "no {} next to {}, using default config",
            CONFIG_FILE,
            model_path.display()
        );
        return Ok(ModelConfig::default());
    }

    let raw = std::fs::read_to_string(&config_path)
        .with_context(|| format!("read config {}", config_path.display()))?;
    let cfg: ModelConfig =
        serde_json::from_str(&raw).with_context(|| format!("parse {}", config_path.display()))?;
    cfg.validate().context("invalid ModelConfig")?;
    Ok(cfg)
}

/// Write `config.json` and the variables of `varmap` as `model.safetensors` into `dir`.
///
/// # Errors
/// Returns an error if the directory or either file cannot be written.
pub fn save_checkpoint(varmap: &VarMap, config: &ModelConfig, dir: &Path) -> Result<()> {
    config.validate().context("refusing to save invalid ModelConfig")?;
    std::fs::create_dir_all(dir).with_context(|| format!("create {}", dir.display()))?;

    let config_path = dir.join(CONFIG_FILE);
    std::fs::write(&config_path, serde_json::to_string_pretty(config)?)
        .with_context(|| format!("write {}", config_path.display()))?;

    let weights_path = dir.join(WEIGHTS_FILE);
    varmap
        .save(&weights_path)
        .with_context(|| format!("write {}", weights_path.display()))?;
    Ok(())
}
