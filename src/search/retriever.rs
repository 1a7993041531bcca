//! Normalized retrieval over a search backend.
//!
//! The [`Retriever`] is the only path from the pipelines to a backend: it
//! embeds the query for vector-bearing modes, issues the search and turns
//! the raw page into a [`SearchResponse`] through the alias table.

use async_trait::async_trait;
use tracing::{debug, warn};

use super::normalize::{FieldAliases, document_to_record, to_search_results};
use super::{SearchBackend, SearchMode, SearchRequest};
use crate::core::{Document, SearchResponse, SearchResult};
use crate::embedding::Embedder;
use crate::error::{EmbeddingError, SearchError};

/// Retrieval capability: `text, count → ranked results`.
///
/// Consumed by the multi-step controller and the agent's RAG branch.
#[async_trait]
pub trait Retrieve: Send + Sync {
    /// Returns up to `count` results for `query`, best first.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the backend cannot be queried.
    async fn retrieve(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError>;
}

/// A degraded search: the requested mode failed and keyword ran instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fallback {
    /// Mode that was requested.
    pub from: SearchMode,
    /// Why it failed.
    pub reason: String,
}

/// Result of [`Retriever::search_with_fallback`].
#[derive(Debug, Clone)]
pub struct FallbackSearch {
    /// Results actually returned.
    pub response: SearchResponse,
    /// Set when the requested mode was replaced by keyword search.
    pub fallback: Option<Fallback>,
}

/// Outcome of [`Retriever::add_text`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddTextOutcome {
    /// Id of the uploaded document.
    pub id: String,
    /// Whether the stored document carries an embedding.
    pub with_vector: bool,
}

/// Search backend plus query embedding and result normalization.
pub struct Retriever {
    backend: Box<dyn SearchBackend>,
    embedder: Option<Box<dyn Embedder>>,
    aliases: FieldAliases,
}

impl std::fmt::Debug for Retriever {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retriever")
            .field("backend", &self.backend.name())
            .field("embedder", &self.embedder.is_some())
            .finish_non_exhaustive()
    }
}

impl Retriever {
    /// Creates a retriever without an embedder.
    #[must_use]
    pub fn new(backend: Box<dyn SearchBackend>, aliases: FieldAliases) -> Self {
        Self {
            backend,
            embedder: None,
            aliases,
        }
    }

    /// Attaches an embedder for vector and hybrid modes.
    #[must_use]
    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Name of the underlying backend.
    #[must_use]
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        match &self.embedder {
            Some(embedder) => embedder.embed(text).await,
            None => Err(EmbeddingError::Unavailable),
        }
    }

    /// Searches in `mode`, embedding the query when the mode needs a vector.
    ///
    /// Hybrid always carries a vector; when none can be produced the call
    /// fails instead of silently switching to a text-only ranking.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Embedding`] when a vector is needed but cannot
    /// be produced, and backend errors otherwise.
    pub async fn search(
        &self,
        query: &str,
        mode: SearchMode,
        top: usize,
    ) -> Result<SearchResponse, SearchError> {
        let mut request = SearchRequest::text(query, mode, top);
        if mode.needs_vector() {
            request.vector = Some(self.embed(query).await?);
        }

        let page = self.backend.search(&request).await?;
        debug!(
            backend = self.backend.name(),
            mode = %mode,
            results = page.records.len(),
            "search complete"
        );

        Ok(SearchResponse {
            results: to_search_results(&page.records, &self.aliases),
            query: query.to_string(),
            search_type: mode.search_type(),
            total_count: page.total_count,
        })
    }

    /// Searches in `mode`, falling back to keyword search if it fails.
    ///
    /// # Errors
    ///
    /// Returns the keyword error when keyword search itself fails.
    pub async fn search_with_fallback(
        &self,
        query: &str,
        mode: SearchMode,
        top: usize,
    ) -> Result<FallbackSearch, SearchError> {
        match self.search(query, mode, top).await {
            Ok(response) => Ok(FallbackSearch {
                response,
                fallback: None,
            }),
            Err(e) if mode != SearchMode::Keyword => {
                warn!(mode = %mode, error = %e, "search failed, falling back to keyword");
                let response = self.search(query, SearchMode::Keyword, top).await?;
                Ok(FallbackSearch {
                    response,
                    fallback: Some(Fallback {
                        from: mode,
                        reason: e.to_string(),
                    }),
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Uploads documents as canonical records.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the backend rejects the batch.
    pub async fn upload(&self, documents: &[Document]) -> Result<usize, SearchError> {
        let records = documents.iter().map(document_to_record).collect();
        self.backend.upload(records).await
    }

    /// Uploads a single text document, embedding it when possible.
    ///
    /// A failed vectorised upload is retried once without the vector field.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the plain upload also fails.
    pub async fn add_text(
        &self,
        id: &str,
        title: Option<&str>,
        text: &str,
    ) -> Result<AddTextOutcome, SearchError> {
        let mut document = Document::new(id, text);
        document.title = title.map(str::to_string);

        match self.embed(text).await {
            Ok(vector) => {
                let vectorised = document.clone().with_vector(vector);
                match self.upload(std::slice::from_ref(&vectorised)).await {
                    Ok(_) => {
                        return Ok(AddTextOutcome {
                            id: id.to_string(),
                            with_vector: true,
                        });
                    }
                    Err(e) => warn!(error = %e, "upload with vector failed, retrying without"),
                }
            }
            Err(e) => debug!(error = %e, "no embedding for uploaded text"),
        }

        self.upload(std::slice::from_ref(&document)).await?;
        Ok(AddTextOutcome {
            id: id.to_string(),
            with_vector: false,
        })
    }
}

#[async_trait]
impl Retrieve for Retriever {
    async fn retrieve(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        Ok(self
            .search(query, SearchMode::Keyword, count)
            .await?
            .results)
    }
}
