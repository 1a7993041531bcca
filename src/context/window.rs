//! Token-budgeted context selection.
//!
//! Documents are taken whole, in order, while the running token total stays
//! within the budget. The first document that would overflow ends the
//! selection; if nothing has been selected yet it is truncated to fill the
//! budget exactly and becomes the only selected document.

use std::sync::Arc;

use tracing::debug;

use super::tokenizer::Tokenizer;
use crate::core::{Document, SearchResult};

/// Anything carrying document content that can be budgeted.
pub trait ContextItem: Clone {
    /// Text counted against the budget.
    fn content(&self) -> &str;

    /// A copy with its content replaced.
    #[must_use]
    fn with_content(&self, content: String) -> Self;
}

impl ContextItem for Document {
    fn content(&self) -> &str {
        &self.content
    }

    fn with_content(&self, content: String) -> Self {
        Self {
            content,
            ..self.clone()
        }
    }
}

impl ContextItem for SearchResult {
    fn content(&self) -> &str {
        &self.document.content
    }

    fn with_content(&self, content: String) -> Self {
        Self {
            document: self.document.with_content(content),
            ..self.clone()
        }
    }
}

/// Outcome of a selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ContextSelection<T> {
    /// Selected items, a prefix of the input (possibly with the first truncated).
    pub items: Vec<T>,
    /// Tokens used by the selected content.
    pub total_tokens: usize,
    /// Whether the single selected item was truncated.
    pub truncated: bool,
}

impl<T> ContextSelection<T> {
    fn empty() -> Self {
        Self {
            items: Vec::new(),
            total_tokens: 0,
            truncated: false,
        }
    }
}

/// Decodes the first `limit` tokens. A multi-byte character split at the
/// cut decodes to U+FFFD so the prefix keeps exactly `limit` tokens.
fn decode_prefix(tokenizer: &dyn Tokenizer, tokens: &[u32], limit: usize) -> (String, usize) {
    let end = limit.min(tokens.len());
    (tokenizer.decode_lossy(&tokens[..end]), end)
}

/// Selects a prefix of `items` whose content fits in `budget` tokens.
///
/// A zero budget selects nothing.
#[must_use]
pub fn select_within_budget<T: ContextItem>(
    items: &[T],
    budget: usize,
    tokenizer: &dyn Tokenizer,
) -> ContextSelection<T> {
    let mut selection = ContextSelection::empty();
    if budget == 0 {
        return selection;
    }

    for item in items {
        let tokens = tokenizer.encode(item.content());
        if selection.total_tokens + tokens.len() <= budget {
            selection.total_tokens += tokens.len();
            selection.items.push(item.clone());
            continue;
        }

        if selection.items.is_empty() {
            let (text, used) = decode_prefix(tokenizer, &tokens, budget);
            debug!(
                original_tokens = tokens.len(),
                budget, used, "truncating first document to fit context budget"
            );
            selection.items.push(item.with_content(text));
            selection.total_tokens = used;
            selection.truncated = true;
        }
        break;
    }

    selection
}

/// A tokenizer bound to a budget.
#[derive(Clone)]
pub struct ContextWindow {
    tokenizer: Arc<dyn Tokenizer>,
    max_tokens: usize,
}

impl std::fmt::Debug for ContextWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextWindow")
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl ContextWindow {
    /// Creates a window of `max_tokens`.
    #[must_use]
    pub fn new(tokenizer: Arc<dyn Tokenizer>, max_tokens: usize) -> Self {
        Self {
            tokenizer,
            max_tokens,
        }
    }

    /// The token budget.
    #[must_use]
    pub const fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    /// Counts tokens in `text`.
    #[must_use]
    pub fn count_tokens(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    /// Selects the items that fit this window.
    #[must_use]
    pub fn select<T: ContextItem>(&self, items: &[T]) -> ContextSelection<T> {
        select_within_budget(items, self.max_tokens, self.tokenizer.as_ref())
    }
}
