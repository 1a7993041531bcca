//! Canonical document and search-result shapes.
//!
//! Every search backend is normalised into these types before anything
//! downstream (context management, generation, routing) sees the data.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A retrieved document in canonical form.
///
/// `content` is always present; a backend record with no content field
/// yields an empty string rather than an absent value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Identity, unique within an index.
    pub id: String,
    /// Optional title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Text content.
    #[serde(default)]
    pub content: String,
    /// Optional category label.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Embedding vector, when the index stores one.
    #[serde(
        default,
        rename = "contentVector",
        alias = "content_vector",
        skip_serializing_if = "Option::is_none"
    )]
    pub content_vector: Option<Vec<f32>>,
    /// Remaining index fields not mapped onto the canonical shape.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl Document {
    /// Creates a document with only identity and content set.
    #[must_use]
    pub fn new(id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            content: content.into(),
            category: None,
            content_vector: None,
            metadata: Map::new(),
        }
    }

    /// Sets the title.
    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Sets the category.
    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    /// Sets the embedding vector.
    #[must_use]
    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.content_vector = Some(vector);
        self
    }
}

/// One document with its backend relevance annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    /// The retrieved document.
    pub document: Document,
    /// Backend relevance score. Scales differ per search mode.
    #[serde(default)]
    pub score: f64,
    /// Semantic reranker score, only present for semantic-ranked modes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reranker_score: Option<f64>,
    /// Raw backend annotations (`@search.*` fields).
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub metadata: Map<String, Value>,
}

impl SearchResult {
    /// Wraps a document with a score and no annotations.
    #[must_use]
    pub fn new(document: Document, score: f64) -> Self {
        Self {
            document,
            score,
            reranker_score: None,
            metadata: Map::new(),
        }
    }

    /// Document identity.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.document.id
    }

    /// Document content.
    #[must_use]
    pub fn content(&self) -> &str {
        &self.document.content
    }

    /// Document title, if any.
    #[must_use]
    pub fn title(&self) -> Option<&str> {
        self.document.title.as_deref()
    }
}

/// Tag describing how a set of results was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Lexical full-text search.
    Keyword,
    /// Pure vector similarity.
    Vector,
    /// Lexical plus vector.
    Hybrid,
    /// Lexical with backend semantic reranking.
    Semantic,
    /// Multi-step and/or context-managed pipeline.
    Advanced,
    /// Caller-supplied text, no index access.
    CustomText,
}

impl SearchType {
    /// Returns the wire name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Vector => "vector",
            Self::Hybrid => "hybrid",
            Self::Semantic => "semantic",
            Self::Advanced => "advanced",
            Self::CustomText => "custom_text",
        }
    }

    /// Parses a wire name (case-insensitive).
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "keyword" | "bm25" => Some(Self::Keyword),
            "vector" => Some(Self::Vector),
            "hybrid" => Some(Self::Hybrid),
            "semantic" => Some(Self::Semantic),
            "advanced" => Some(Self::Advanced),
            "custom_text" | "custom-text" => Some(Self::CustomText),
            _ => None,
        }
    }
}

impl std::fmt::Display for SearchType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An ordered page of results for one query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    /// Results in backend rank order.
    pub results: Vec<SearchResult>,
    /// Query text as issued.
    pub query: String,
    /// How the results were produced.
    pub search_type: SearchType,
    /// Total matches reported by the backend, independent of page size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
}

impl SearchResponse {
    /// Creates an empty response.
    #[must_use]
    pub fn empty(query: impl Into<String>, search_type: SearchType) -> Self {
        Self {
            results: Vec::new(),
            query: query.into(),
            search_type,
            total_count: None,
        }
    }

    /// Number of results in this page.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// Returns `true` when the page has no results.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    /// Cloned documents in rank order.
    #[must_use]
    pub fn documents(&self) -> Vec<Document> {
        self.results.iter().map(|r| r.document.clone()).collect()
    }

    /// The first `k` documents.
    #[must_use]
    pub fn top_k(&self, k: usize) -> Vec<Document> {
        self.results
            .iter()
            .take(k)
            .map(|r| r.document.clone())
            .collect()
    }

    /// Scores in rank order.
    #[must_use]
    pub fn scores(&self) -> Vec<f64> {
        self.results.iter().map(|r| r.score).collect()
    }
}
