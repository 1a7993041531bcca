//! Generation and tool routing.
//!
//! Wraps a pluggable chat provider behind [`Generate`] and builds the
//! agent on top of it: a [`ToolRouter`] asks the model whether a query is
//! conceptual (retrieval) or factual (SQL), then runs the chosen tool.
//!
//! # Architecture
//!
//! ```text
//! User query → ToolRouter
//!   ├── decide: tool-selection prompt → JSON decision
//!   │   └── keyword heuristic when the response is unusable
//!   ├── SQL:  generate SELECT → SqlStore → phrase rows as an answer
//!   └── RAG:  Retrieve → context prompt → answer
//! ```

pub mod client;
pub mod config;
pub mod decision;
pub mod generator;
pub mod message;
pub mod prompt;
pub mod provider;
pub mod providers;
pub mod result;
pub mod router;
pub mod tool;

pub use client::create_provider;
pub use config::{AgentConfig, resolve_db_path};
pub use decision::{DecisionSource, ToolDecision, heuristic_decision, parse_decision};
pub use generator::{Generate, Generation, GenerationRequest, Generator};
pub use message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
pub use prompt::PromptCatalog;
pub use provider::LlmProvider;
pub use result::{ExecutionResult, RoutedAnswer};
pub use router::ToolRouter;
pub use tool::{ToolDescriptor, ToolKind};
