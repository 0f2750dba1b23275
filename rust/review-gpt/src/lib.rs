#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::module_name_repetitions)]

pub mod callbacks;
pub mod error;
pub mod inference;
pub mod model;
pub mod tokenizer;
pub mod weights;

pub use error::{GptError, Result};
