pub mod vocab;

pub use vocab::{PAD_ID, UNK_ID, UNK_TOKEN, Vocabulary};
