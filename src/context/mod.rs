//! Context window management.

pub mod tokenizer;
pub mod window;

pub use tokenizer::{TiktokenTokenizer, Tokenizer};
pub use window::{ContextItem, ContextSelection, ContextWindow, select_within_budget};
