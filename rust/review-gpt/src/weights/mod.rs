pub mod loader;

pub use loader::{
    load_external_model, load_model_dir, save_checkpoint, validate_checkpoint,
};
