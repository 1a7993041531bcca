//! Search backends and retrieval.
//!
//! A [`SearchBackend`] returns raw, schema-specific records. The
//! [`Retriever`] embeds queries when a mode needs a vector, calls the
//! backend and runs every record through the [`normalize`] layer.

pub mod azure;
pub mod config;
pub mod memory;
pub mod normalize;
pub mod retriever;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub use azure::{AzureSearchBackend, IndexSchema};
pub use config::{FieldNames, SearchConfig};
pub use memory::InMemoryBackend;
pub use normalize::FieldAliases;
pub use retriever::{Retrieve, Retriever};

use crate::core::SearchType;
use crate::error::SearchError;

/// Total-count annotation on raw records.
pub const TOTAL_COUNT_KEY: &str = "@odata.count";

/// Retrieval mode understood by search backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    /// Lexical full-text search.
    Keyword,
    /// Pure vector similarity.
    Vector,
    /// Lexical and vector combined.
    Hybrid,
    /// Lexical with semantic reranking.
    Semantic,
}

impl SearchMode {
    /// Every mode, in comparison order.
    pub const ALL: [Self; 4] = [Self::Keyword, Self::Vector, Self::Hybrid, Self::Semantic];

    /// Returns the mode name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Semantic => "semantic",
        }
    }

    /// Returns `true` if the mode requires a query vector.
    #[must_use]
    pub const fn needs_vector(&self) -> bool {
        matches!(self, Self::Vector | Self::Hybrid)
    }

    /// The search-type tag for results produced in this mode.
    #[must_use]
    pub const fn search_type(&self) -> SearchType {
        match self {
            Self::Keyword => SearchType::Keyword,
            Self::Vector => SearchType::Vector,
            Self::Hybrid => SearchType::Hybrid,
            Self::Semantic => SearchType::Semantic,
        }
    }
}

impl std::fmt::Display for SearchMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One search call.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    /// Query text. Required for every mode except vector.
    pub text: Option<String>,
    /// Query embedding. Required for vector and hybrid.
    pub vector: Option<Vec<f32>>,
    /// Retrieval mode.
    pub mode: SearchMode,
    /// Maximum number of records to return.
    pub top: usize,
}

impl SearchRequest {
    /// A text-only request.
    #[must_use]
    pub fn text(text: impl Into<String>, mode: SearchMode, top: usize) -> Self {
        Self {
            text: Some(text.into()),
            vector: None,
            mode,
            top,
        }
    }

    /// Attaches a query vector.
    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    /// Returns the vector or the error for a vector-bearing mode without one.
    pub(crate) fn require_vector(&self) -> Result<&[f32], SearchError> {
        self.vector
            .as_deref()
            .ok_or_else(|| SearchError::MissingVector {
                mode: self.mode.to_string(),
            })
    }
}

/// Raw records returned by a backend, in rank order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchPage {
    /// Schema-specific records.
    pub records: Vec<Map<String, Value>>,
    /// Total matches, when the backend reports one.
    pub total_count: Option<u64>,
}

/// A search index.
#[async_trait]
pub trait SearchBackend: Send + Sync {
    /// Backend name (e.g. `"azure"`, `"memory"`).
    fn name(&self) -> &'static str;

    /// Runs one search.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::MissingVector`] when a vector-bearing mode
    /// arrives without a vector, and transport errors from the backend.
    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError>;

    /// Uploads records, returning the number accepted.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the backend rejects the batch.
    async fn upload(&self, records: Vec<Map<String, Value>>) -> Result<usize, SearchError>;
}

#[async_trait]
impl<B: SearchBackend + ?Sized> SearchBackend for Arc<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        (**self).search(request).await
    }

    async fn upload(&self, records: Vec<Map<String, Value>>) -> Result<usize, SearchError> {
        (**self).upload(records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_properties() {
        assert!(SearchMode::Vector.needs_vector());
        assert!(SearchMode::Hybrid.needs_vector());
        assert!(!SearchMode::Semantic.needs_vector());
        assert_eq!(SearchMode::Semantic.search_type(), SearchType::Semantic);
        assert_eq!(SearchMode::ALL.len(), 4);
    }

    #[test]
    fn test_require_vector() {
        let req = SearchRequest::text("q", SearchMode::Hybrid, 3);
        assert!(matches!(
            req.require_vector(),
            Err(SearchError::MissingVector { .. })
        ));
        let req = req.with_vector(vec![0.1]);
        assert_eq!(req.require_vector().map(<[f32]>::len).unwrap_or(0), 1);
    }
}
