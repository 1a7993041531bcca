//! Uniform result envelope for routed queries.

use serde::Serialize;

use super::decision::ToolDecision;
use super::tool::ToolKind;

/// Metadata of the SQL branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SqlMetadata {
    /// Statement that was (or would have been) executed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sql_query: Option<String>,
    /// Rows returned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_count: Option<usize>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Metadata of the retrieval branch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RagMetadata {
    /// Scores of the retrieved documents, best first.
    pub scores: Vec<f64>,
    /// Documents used as context.
    pub num_documents: usize,
    /// Retrieval mode.
    pub search_type: String,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Tool-specific metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ExecutionMetadata {
    /// From the SQL branch.
    Sql(SqlMetadata),
    /// From the retrieval branch.
    Rag(RagMetadata),
}

/// Outcome of one tool execution. Failures are data, never errors.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    /// Whether the tool produced an answer.
    pub success: bool,
    /// Answer, or an explanation of what went wrong.
    pub answer: String,
    /// Tool that ran.
    pub tool_used: ToolKind,
    /// Tool-specific details.
    pub metadata: ExecutionMetadata,
}

impl ExecutionResult {
    /// A successful SQL result.
    #[must_use]
    pub fn sql(answer: impl Into<String>, metadata: SqlMetadata) -> Self {
        Self {
            success: true,
            answer: answer.into(),
            tool_used: ToolKind::Sql,
            metadata: ExecutionMetadata::Sql(metadata),
        }
    }

    /// A failed SQL result.
    #[must_use]
    pub fn sql_failure(answer: impl Into<String>, metadata: SqlMetadata) -> Self {
        Self {
            success: false,
            ..Self::sql(answer, metadata)
        }
    }

    /// A successful retrieval result.
    #[must_use]
    pub fn rag(answer: impl Into<String>, metadata: RagMetadata) -> Self {
        Self {
            success: true,
            answer: answer.into(),
            tool_used: ToolKind::Rag,
            metadata: ExecutionMetadata::Rag(metadata),
        }
    }

    /// A failed retrieval result.
    #[must_use]
    pub fn rag_failure(answer: impl Into<String>, metadata: RagMetadata) -> Self {
        Self {
            success: false,
            ..Self::rag(answer, metadata)
        }
    }

    /// SQL metadata, if this came from the SQL branch.
    #[must_use]
    pub const fn sql_metadata(&self) -> Option<&SqlMetadata> {
        match &self.metadata {
            ExecutionMetadata::Sql(m) => Some(m),
            ExecutionMetadata::Rag(_) => None,
        }
    }

    /// Retrieval metadata, if this came from the retrieval branch.
    #[must_use]
    pub const fn rag_metadata(&self) -> Option<&RagMetadata> {
        match &self.metadata {
            ExecutionMetadata::Rag(m) => Some(m),
            ExecutionMetadata::Sql(_) => None,
        }
    }
}

/// A routed query: the decision and what executing it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoutedAnswer {
    /// Tool choice.
    pub decision: ToolDecision,
    /// Execution envelope.
    pub result: ExecutionResult,
}
