//! Tools the router chooses between.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Retrieval tool description shown in the tool selection prompt.
pub const RAG_TOOL_DESCRIPTION: &str = "RAG Tool - Retrieve and generate answers from knowledge base.

Use this tool when:
- User asks conceptual questions (\"What is machine learning?\")
- User wants explanations or understanding
- User asks \"explain\", \"how does\", \"tell me about\"
- User needs information from documents/knowledge base
- Query is fuzzy or requires semantic understanding";

/// When the retrieval tool applies.
pub const RAG_USE_WHEN: &str = "User asks conceptual questions, needs explanations, wants to \
understand topics, or asks 'what is', 'explain', 'how does', 'tell me about'";

/// When the SQL tool applies.
pub const SQL_USE_WHEN: &str =
    "User asks for specific facts, numbers, statistics, lists, or structured data queries";

/// A routable tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Retrieval plus context-grounded generation.
    Rag,
    /// SQL generation and guarded execution.
    Sql,
}

impl ToolKind {
    /// Wire name (`"rag"` / `"sql"`).
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rag => "rag",
            Self::Sql => "sql",
        }
    }

    /// Parses a wire name, ignoring case and surrounding whitespace.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rag" => Some(Self::Rag),
            "sql" => Some(Self::Sql),
            _ => None,
        }
    }

    /// Human-readable name.
    #[must_use]
    pub const fn display_name(self) -> &'static str {
        match self {
            Self::Rag => "RAG (Retrieval-Augmented Generation)",
            Self::Sql => "SQL Database",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the decision prompt says about a tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolDescriptor {
    /// Tool identity.
    pub kind: ToolKind,
    /// Long description.
    pub description: String,
    /// Trigger summary.
    pub use_when: &'static str,
}

impl ToolDescriptor {
    /// The retrieval tool.
    #[must_use]
    pub fn rag() -> Self {
        Self {
            kind: ToolKind::Rag,
            description: RAG_TOOL_DESCRIPTION.to_string(),
            use_when: RAG_USE_WHEN,
        }
    }

    /// The SQL tool with the store's description.
    #[must_use]
    pub fn sql(description: impl Into<String>) -> Self {
        Self {
            kind: ToolKind::Sql,
            description: description.into(),
            use_when: SQL_USE_WHEN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_tool_kind() {
        assert_eq!(ToolKind::parse("rag"), Some(ToolKind::Rag));
        assert_eq!(ToolKind::parse(" SQL "), Some(ToolKind::Sql));
        assert_eq!(ToolKind::parse("web"), None);
    }

    #[test]
    fn test_serde_lowercase() {
        assert_eq!(
            serde_json::to_string(&ToolKind::Sql).unwrap_or_default(),
            "\"sql\""
        );
    }

    #[test]
    fn test_descriptors() {
        assert_eq!(ToolDescriptor::rag().kind, ToolKind::Rag);
        let sql = ToolDescriptor::sql("db tables");
        assert_eq!(sql.description, "db tables");
        assert_eq!(sql.use_when, SQL_USE_WHEN);
    }
}
