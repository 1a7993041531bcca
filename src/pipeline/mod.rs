//! Retrieval pipelines built on the retriever and the generator.

pub mod multi_step;
pub mod rag;

pub use multi_step::{MultiStepOutcome, MultiStepRetriever, parse_subqueries};
pub use rag::{ModeComparison, RagPipeline, RagRequest, RagResponse, compare_modes};
