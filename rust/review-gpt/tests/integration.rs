use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use review_gpt::model::{MiniGpt, ModelConfig};
use review_gpt::weights::loader::{CONFIG_FILE, WEIGHTS_FILE};
use review_gpt::weights::{load_model_dir, save_checkpoint, validate_checkpoint};

fn temp_dir(tag: &str) -> PathBuf {
    let uniq = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("timestamp")
        .as_nanos();
    std::env::temp_dir().join(format!("review_gpt_{tag}_{uniq}"))
}

fn random_model(config: &ModelConfig) -> (VarMap, MiniGpt) {
    let varmap = VarMap::new();
    let vb = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = MiniGpt::new(config.clone(), vb).expect("model");
    (varmap, model)
}

#[test]
fn crate_boots() {
    let _vocab = review_gpt::tokenizer::Vocabulary::default();
    let cfg = ModelConfig::default();
    cfg.validate().expect("default config is valid");
}

#[test]
fn checkpoint_round_trip_gives_identical_logits() -> anyhow::Result<()> {
    let config = ModelConfig {
        n_layer: 2,
        ..ModelConfig::tiny()
    };
    let (varmap, model) = random_model(&config);
    let dir = temp_dir("roundtrip");
    save_checkpoint(&varmap, &config, &dir)?;

    let bytes = std::fs::read(dir.join(WEIGHTS_FILE))?;
    validate_checkpoint(&bytes, &config)?;

    let loaded = load_model_dir(&dir, &Device::Cpu)?;
    assert_eq!(loaded.config(), &config);

    let input = Tensor::new(&[[2u32, 7, 11, 3, 0, 0]], &Device::Cpu)?;
    let a: Vec<Vec<f32>> = model.forward(&input)?.squeeze(0)?.to_vec2()?;
    let b: Vec<Vec<f32>> = loaded.forward(&input)?.squeeze(0)?.to_vec2()?;
    assert_eq!(a, b);

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn checkpoint_for_a_different_config_is_rejected() -> anyhow::Result<()> {
    let config = ModelConfig::tiny();
    let (varmap, _model) = random_model(&config);
    let dir = temp_dir("mismatch");
    save_checkpoint(&varmap, &config, &dir)?;

    let other = ModelConfig {
        vocab_size: config.vocab_size * 2,
        ..config
    };
    std::fs::write(dir.join(CONFIG_FILE), serde_json::to_string(&other)?)?;

    let err = load_model_dir(&dir, &Device::Cpu)
        .err()
        .expect("shape mismatch should error");
    assert!(
        err.chain()
            .any(|e| e.to_string().contains("embedding.token_emb.weight")),
        "unexpected error chain: {err:?}"
    );

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn missing_tensor_is_named_in_the_error() -> anyhow::Result<()> {
    use safetensors::Dtype;
    use safetensors::serialize;
    use safetensors::tensor::TensorView;

    let config = ModelConfig::tiny();
    let values = vec![0.0_f32; config.vocab_size * config.n_embd];
    let raw: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();

    let mut tensors: BTreeMap<String, TensorView<'_>> = BTreeMap::new();
    let view = TensorView::new(Dtype::F32, vec![config.vocab_size, config.n_embd], &raw)
        .expect("token table view");
    tensors.insert("embedding.token_emb.weight".to_string(), view);
    let bytes = serialize(tensors.iter(), None).expect("serialize");

    let dir = temp_dir("missing");
    std::fs::create_dir_all(&dir)?;
    std::fs::write(dir.join(CONFIG_FILE), serde_json::to_string(&config)?)?;
    std::fs::write(dir.join(WEIGHTS_FILE), bytes)?;

    let err = load_model_dir(&dir, &Device::Cpu)
        .err()
        .expect("incomplete checkpoint should error");
    assert!(
        err.chain()
            .any(|e| e.to_string().contains("embedding.pos_emb.weight")),
        "unexpected error chain: {err:?}"
    );

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}

#[test]
fn invalid_config_json_is_reported() -> anyhow::Result<()> {
    let config = ModelConfig::tiny();
    let (varmap, _model) = random_model(&config);
    let dir = temp_dir("badcfg");
    save_checkpoint(&varmap, &config, &dir)?;

    std::fs::write(
        dir.join(CONFIG_FILE),
        r#"{"maxlen":16,"vocab_size":64,"n_head":4,"n_embd":30,"ff_dim":32}"#,
    )?;

    let err = load_model_dir(&dir, &Device::Cpu)
        .err()
        .expect("invalid config should error");
    assert!(
        err.chain().any(|e| e.to_string().contains("divisible")),
        "unexpected error chain: {err:?}"
    );

    std::fs::remove_dir_all(&dir).ok();
    Ok(())
}
