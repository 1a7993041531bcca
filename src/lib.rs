//! # rag-labs
//!
//! Retrieval-augmented generation over Azure AI Search (or an in-memory
//! corpus), with a tool-routing agent that answers factual questions from
//! a SQLite database.
//!
//! ## Components
//!
//! - [`search`]: backends, result normalization and keyword fallback
//! - [`context`]: token counting and budgeted context selection
//! - [`pipeline`]: basic, custom-text and advanced RAG, multi-step retrieval
//! - [`agent`]: generation, prompt catalog and the [`ToolRouter`]
//! - [`sql`]: read-only guarded access to the structured store
//!
//! ## Example
//!
//! ```no_run
//! use rag_labs::search::{FieldAliases, InMemoryBackend, Retriever, SearchMode};
//!
//! # async fn demo() -> rag_labs::Result<()> {
//! let aliases = FieldAliases::default();
//! let backend = InMemoryBackend::from_json_file("corpus.json".as_ref(), aliases.clone())?;
//! let retriever = Retriever::new(Box::new(backend), aliases);
//! let response = retriever.search("vector search", SearchMode::Keyword, 3).await?;
//! for result in &response.results {
//!     println!("{} {:.3}", result.id(), result.score);
//! }
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod cli;
pub mod context;
pub mod core;
pub mod embedding;
pub mod error;
pub mod pipeline;
pub mod search;
pub mod sql;

#[cfg(test)]
mod test_support;

pub use agent::{AgentConfig, PromptCatalog, ToolRouter};
pub use core::{Document, RetrievalMetadata, SearchResponse, SearchResult, SearchType};
pub use error::{Error, Result};
pub use pipeline::{RagPipeline, RagRequest, RagResponse};
pub use search::{Retriever, SearchMode};
pub use sql::SqlStore;
