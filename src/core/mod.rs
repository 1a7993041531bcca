//! Core data types shared by search, context management and the agent.

pub mod document;
pub mod metadata;

pub use document::{Document, SearchResponse, SearchResult, SearchType};
pub use metadata::RetrievalMetadata;
