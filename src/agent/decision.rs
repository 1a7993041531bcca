//! Tool decisions: strict parse of the model's JSON, keyword fallback.
//!
//! A decision always resolves. The model's answer is parsed into a typed
//! [`ToolDecision`]; anything short of a valid `{"tool", "reasoning"}`
//! object yields a [`DecisionParseError`] and the caller switches to
//! [`heuristic_decision`].

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::tool::ToolKind;

/// Phrases that suggest a structured-data question.
pub const SQL_CUES: [&str; 10] = [
    "how many",
    "count",
    "list all",
    "find",
    "total",
    "average",
    "sum",
    "what is the",
    "which",
    "who has",
];

/// Phrases that suggest a conceptual question. Any of these vetoes SQL.
pub const RAG_CUES: [&str; 8] = [
    "what is",
    "explain",
    "how does",
    "tell me about",
    "describe",
    "understand",
    "why",
    "concept",
];

/// First brace-delimited span; nested objects are not supported.
static JSON_OBJECT: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"\{[^}]+\}").ok());

/// Where a decision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DecisionSource {
    /// Parsed from the model's response.
    Model,
    /// Keyword heuristic.
    Heuristic,
}

/// Which tool answers the query, and why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDecision {
    /// Chosen tool.
    pub tool: ToolKind,
    /// Free-text justification.
    pub reasoning: String,
    /// How the decision was reached.
    pub source: DecisionSource,
}

/// Why a model response could not be used as a decision.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecisionParseError {
    /// No `{...}` span in the response.
    #[error("no JSON object in response")]
    NoObject,

    /// The span is not valid JSON.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// A required key is absent or not a string.
    #[error("missing or non-string field: {0}")]
    MissingField(&'static str),

    /// `tool` names neither tool.
    #[error("unknown tool: {0}")]
    UnknownTool(String),
}

#[derive(Deserialize)]
struct RawDecision {
    tool: Option<serde_json::Value>,
    reasoning: Option<serde_json::Value>,
}

/// Parses the first JSON object in `response` into a decision.
///
/// # Errors
///
/// Returns [`DecisionParseError`] when no usable object is present.
pub fn parse_decision(response: &str) -> Result<ToolDecision, DecisionParseError> {
    let span = JSON_OBJECT
        .as_ref()
        .and_then(|re| re.find(response))
        .ok_or(DecisionParseError::NoObject)?;

    let raw: RawDecision = serde_json::from_str(span.as_str())
        .map_err(|e| DecisionParseError::InvalidJson(e.to_string()))?;

    let tool = raw
        .tool
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .ok_or(DecisionParseError::MissingField("tool"))?;
    let reasoning = raw
        .reasoning
        .as_ref()
        .and_then(serde_json::Value::as_str)
        .ok_or(DecisionParseError::MissingField("reasoning"))?;

    let tool =
        ToolKind::parse(tool).ok_or_else(|| DecisionParseError::UnknownTool(tool.to_string()))?;

    Ok(ToolDecision {
        tool,
        reasoning: reasoning.to_string(),
        source: DecisionSource::Model,
    })
}

/// Keyword classification used when the model's decision is unusable.
///
/// SQL only when a quantitative cue is present and no conceptual cue is.
#[must_use]
pub fn heuristic_decision(query: &str) -> ToolDecision {
    let lowered = query.to_lowercase();
    let sql_cue = SQL_CUES.iter().any(|cue| lowered.contains(cue));
    let rag_cue = RAG_CUES.iter().any(|cue| lowered.contains(cue));

    if sql_cue && !rag_cue {
        ToolDecision {
            tool: ToolKind::Sql,
            reasoning: "Query appears to request specific facts or structured data".to_string(),
            source: DecisionSource::Heuristic,
        }
    } else {
        ToolDecision {
            tool: ToolKind::Rag,
            reasoning: "Query appears to be conceptual or requires explanation".to_string(),
            source: DecisionSource::Heuristic,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("How many employees are in Engineering?", ToolKind::Sql ; "quantitative")]
    #[test_case("What is machine learning?", ToolKind::Rag ; "conceptual")]
    #[test_case("Explain how many layers a transformer has", ToolKind::Rag ; "both cues")]
    #[test_case("List all products in Electronics", ToolKind::Sql ; "list all")]
    #[test_case("Which employee has the highest salary", ToolKind::Sql ; "which")]
    #[test_case("What is the total sales amount?", ToolKind::Rag ; "what is the contains what is")]
    #[test_case("Tell me a story", ToolKind::Rag ; "no cues")]
    #[test_case("", ToolKind::Rag ; "empty")]
    fn test_heuristic(query: &str, expected: ToolKind) {
        let decision = heuristic_decision(query);
        assert_eq!(decision.tool, expected);
        assert_eq!(decision.source, DecisionSource::Heuristic);
    }

    #[test]
    fn test_parse_with_surrounding_text() {
        let response = "Sure! {\"tool\": \"sql\", \"reasoning\": \"counts rows\"} Hope that helps.";
        let decision = parse_decision(response).unwrap_or_else(|_| unreachable!());
        assert_eq!(decision.tool, ToolKind::Sql);
        assert_eq!(decision.reasoning, "counts rows");
        assert_eq!(decision.source, DecisionSource::Model);
    }

    #[test]
    fn test_parse_multiline_and_case() {
        let response = "{\n  \"tool\": \"RAG\",\n  \"reasoning\": \"conceptual\"\n}";
        let decision = parse_decision(response).unwrap_or_else(|_| unreachable!());
        assert_eq!(decision.tool, ToolKind::Rag);
    }

    #[test_case("no json here", DecisionParseError::NoObject ; "no braces")]
    #[test_case("{not json}", DecisionParseError::InvalidJson(String::new()) ; "malformed")]
    #[test_case("{\"reasoning\": \"r\"}", DecisionParseError::MissingField("tool") ; "missing tool")]
    #[test_case("{\"tool\": \"sql\"}", DecisionParseError::MissingField("reasoning") ; "missing reasoning")]
    #[test_case("{\"tool\": \"web\", \"reasoning\": \"r\"}", DecisionParseError::UnknownTool("web".into()) ; "unknown tool")]
    fn test_parse_failures(response: &str, expected: DecisionParseError) {
        let err = parse_decision(response).err();
        assert_eq!(
            std::mem::discriminant(&err.unwrap_or(DecisionParseError::NoObject)),
            std::mem::discriminant(&expected)
        );
    }

    #[test]
    fn test_parse_failure_is_error() {
        assert!(parse_decision("{\"reasoning\": \"r\"}").is_err());
    }
}
