//! Error types for rag-labs.
//!
//! Each backend concern has its own error enum. The retrieval pipelines
//! and the agent router convert these into result envelopes at their
//! branch boundaries, so only configuration and CLI plumbing ever surface
//! them to a caller as hard failures.

use std::path::PathBuf;

/// Result alias used by the CLI and configuration layers.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Generation provider error.
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Search backend error.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Embedding provider error.
    #[error(transparent)]
    Embedding(#[from] EmbeddingError),

    /// Structured store error.
    #[error(transparent)]
    Sql(#[from] SqlError),

    /// Prompt catalog error.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// Context management error.
    #[error(transparent)]
    Context(#[from] ContextError),

    /// RAG pipeline error.
    #[error(transparent)]
    Rag(#[from] RagError),

    /// CLI command error.
    #[error(transparent)]
    Command(#[from] CommandError),
}

/// Errors raised by the generation provider layer.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No API key was configured for the provider.
    #[error("API key missing: set OPENAI_API_KEY, AZURE_OPENAI_API_KEY or RAG_API_KEY")]
    ApiKeyMissing,

    /// The configured provider name is not known.
    #[error("unsupported provider: {name}")]
    UnsupportedProvider {
        /// Provider name as configured.
        name: String,
    },

    /// The provider rejected or failed the request.
    #[error("API request failed: {message}")]
    ApiRequest {
        /// Provider error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The model response could not be parsed into the expected shape.
    #[error("failed to parse model response: {message}")]
    ResponseParse {
        /// What went wrong.
        message: String,
        /// The raw response text.
        content: String,
    },

    /// A pipeline step could not be completed.
    #[error("orchestration error: {message}")]
    Orchestration {
        /// What went wrong.
        message: String,
    },
}

/// Errors raised by search backends and the retriever.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    /// Transport or HTTP-level failure.
    #[error("search request failed: {message}")]
    Request {
        /// Backend error message.
        message: String,
        /// HTTP status, when known.
        status: Option<u16>,
    },

    /// The backend answered with a body that could not be decoded.
    #[error("invalid search response: {message}")]
    Decode {
        /// What went wrong.
        message: String,
    },

    /// The backend does not support the requested mode.
    #[error("search mode '{mode}' is not supported by this backend")]
    UnsupportedMode {
        /// Mode that was requested.
        mode: String,
    },

    /// A vector-bearing mode was requested without a query vector.
    #[error("search mode '{mode}' requires a query vector")]
    MissingVector {
        /// Mode that was requested.
        mode: String,
    },

    /// The query embedding could not be produced.
    #[error("query embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    /// Search backend configuration is incomplete.
    #[error("search backend not configured: {message}")]
    NotConfigured {
        /// What is missing.
        message: String,
    },
}

/// Errors raised by embedding providers.
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    /// No embedding provider is available.
    #[error("no embedding provider configured")]
    Unavailable,

    /// The provider failed the request.
    #[error("embedding request failed: {message}")]
    Request {
        /// Provider error message.
        message: String,
    },

    /// The provider returned fewer vectors than inputs.
    #[error("expected {expected} embeddings, got {actual}")]
    CountMismatch {
        /// Number of inputs.
        expected: usize,
        /// Number of vectors returned.
        actual: usize,
    },
}

/// Errors raised by the structured store.
#[derive(Debug, thiserror::Error)]
pub enum SqlError {
    /// The statement is not a read-only SELECT.
    #[error("Only SELECT queries are allowed for security reasons (got: {statement})")]
    Rejected {
        /// Offending statement, truncated for display.
        statement: String,
    },

    /// The database file does not exist.
    #[error("database not provisioned: {path}")]
    NotProvisioned {
        /// Expected database path.
        path: PathBuf,
    },

    /// `SQLite` reported an error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while provisioning.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors raised while reading or writing the prompt catalog.
#[derive(Debug, thiserror::Error)]
pub enum PromptError {
    /// Filesystem error.
    #[error("prompt catalog I/O error at {path}: {source}")]
    Io {
        /// Catalog path.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The catalog could not be serialized or parsed.
    #[error("prompt catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors raised while preparing context management.
#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    /// The tokenizer encoding could not be loaded.
    #[error("tokenizer unavailable: {message}")]
    Tokenizer {
        /// What went wrong.
        message: String,
    },
}

/// Errors raised by the RAG pipelines.
#[derive(Debug, thiserror::Error)]
pub enum RagError {
    /// The request failed validation.
    #[error("invalid RAG request: {message}")]
    InvalidRequest {
        /// Which constraint was violated.
        message: String,
    },

    /// Retrieval failed, including the keyword fallback.
    #[error(transparent)]
    Search(#[from] SearchError),

    /// Answer generation failed.
    #[error(transparent)]
    Generation(#[from] AgentError),

    /// Context management could not be prepared.
    #[error(transparent)]
    Context(#[from] ContextError),
}

/// Errors raised by CLI commands.
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    /// The command could not run to completion.
    #[error("{0}")]
    ExecutionFailed(String),

    /// An argument was invalid.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Output could not be rendered.
    #[error("output formatting failed: {0}")]
    OutputFormat(String),
}
