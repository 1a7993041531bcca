//! Per-query routing between retrieval and SQL.
//!
//! ```text
//! idle → deciding → executing(rag | sql) → done
//! ```
//!
//! Deciding asks the model for a JSON decision and falls back to the
//! keyword heuristic. Executing never fails outward: every backend error
//! ends up in the returned [`ExecutionResult`].

use std::fmt;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::decision::{ToolDecision, heuristic_decision, parse_decision};
use super::generator::{Generate, GenerationRequest, context_request};
use super::prompt::{PromptCatalog, paths, templates};
use super::result::{ExecutionResult, RagMetadata, RoutedAnswer, SqlMetadata};
use super::tool::{ToolDescriptor, ToolKind};
use crate::core::{Document, SearchType};
use crate::search::Retrieve;
use crate::sql::SqlStore;

/// Default documents retrieved by the retrieval branch.
pub const DEFAULT_TOP_K: usize = 3;

const DECISION_TEMPERATURE: f32 = 0.3;
const DECISION_MAX_TOKENS: u32 = 200;
const SQL_GENERATION_TEMPERATURE: f32 = 0.1;
const SQL_GENERATION_MAX_TOKENS: u32 = 300;
const SQL_ANSWER_TEMPERATURE: f32 = 0.5;
const SQL_ANSWER_MAX_TOKENS: u32 = 300;

/// Answer when a SELECT returns no rows.
pub const NO_ROWS_ANSWER: &str = "No results found for the query.";
/// Answer when retrieval returns nothing.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No relevant documents found. Please ensure your search index is populated.";

/// Router state within one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Not started.
    Idle,
    /// Choosing a tool.
    Deciding,
    /// Running the chosen tool.
    Executing(ToolKind),
    /// Finished.
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => f.write_str("idle"),
            Self::Deciding => f.write_str("deciding"),
            Self::Executing(tool) => write!(f, "executing({tool})"),
            Self::Done => f.write_str("done"),
        }
    }
}

/// Removes a surrounding markdown code fence and stray backticks.
#[must_use]
pub fn strip_code_fence(text: &str) -> String {
    let trimmed = text.trim();
    let mut out = trimmed.to_string();
    if trimmed.starts_with("```") {
        let lines: Vec<&str> = trimmed.lines().collect();
        if lines.len() > 2 {
            out = lines[1..lines.len() - 1].join("\n");
        }
    }
    out.trim_end_matches('`').trim().to_string()
}

/// Routes each query to retrieval or SQL and executes it.
pub struct ToolRouter {
    generator: Arc<dyn Generate>,
    retriever: Arc<dyn Retrieve>,
    store: SqlStore,
    prompts: Arc<PromptCatalog>,
    top_k: usize,
}

impl fmt::Debug for ToolRouter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRouter")
            .field("store", &self.store)
            .field("top_k", &self.top_k)
            .finish_non_exhaustive()
    }
}

impl ToolRouter {
    /// Creates a router.
    #[must_use]
    pub fn new(
        generator: Arc<dyn Generate>,
        retriever: Arc<dyn Retrieve>,
        store: SqlStore,
        prompts: Arc<PromptCatalog>,
    ) -> Self {
        Self {
            generator,
            retriever,
            store,
            prompts,
            top_k: DEFAULT_TOP_K,
        }
    }

    /// Sets the retrieval branch's top-k.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    fn enter(phase: Phase) {
        debug!(phase = %phase, "router phase");
    }

    /// Decides on a tool and executes it.
    pub async fn route(&self, query: &str) -> RoutedAnswer {
        Self::enter(Phase::Idle);
        Self::enter(Phase::Deciding);
        let decision = self.decide(query).await;
        info!(
            tool = %decision.tool,
            source = ?decision.source,
            reasoning = %decision.reasoning,
            "tool selected"
        );

        Self::enter(Phase::Executing(decision.tool));
        let result = match decision.tool {
            ToolKind::Sql => self.execute_sql(query).await,
            ToolKind::Rag => self.execute_rag(query).await,
        };
        Self::enter(Phase::Done);

        RoutedAnswer { decision, result }
    }

    /// Chooses a tool: model first, keyword heuristic on any failure.
    pub async fn decide(&self, query: &str) -> ToolDecision {
        let rag = ToolDescriptor::rag();
        let sql = ToolDescriptor::sql(self.store.describe_tool());
        let prompt = self.prompts.render(
            paths::AGENT_TOOL_SELECTION,
            templates::AGENT_TOOL_SELECTION,
            &[
                ("query", query),
                ("rag_description", &rag.description),
                ("sql_description", &sql.description),
                ("rag_use_when", rag.use_when),
                ("sql_use_when", sql.use_when),
            ],
        );
        let request = GenerationRequest::new(prompt)
            .with_system(
                self.prompts
                    .prompt(paths::SYSTEM_AGENT, templates::SYSTEM_AGENT),
            )
            .with_temperature(DECISION_TEMPERATURE)
            .with_max_tokens(DECISION_MAX_TOKENS);

        match self.generator.generate(&request).await {
            Ok(generation) => match parse_decision(&generation.text) {
                Ok(decision) => decision,
                Err(e) => {
                    warn!(error = %e, "unusable tool decision, using keyword heuristic");
                    heuristic_decision(query)
                }
            },
            Err(e) => {
                warn!(error = %e, "tool decision call failed, using keyword heuristic");
                heuristic_decision(query)
            }
        }
    }

    /// Answers `query` from the structured store.
    pub async fn execute_sql(&self, query: &str) -> ExecutionResult {
        let schema = match self.store.schema() {
            Ok(schema) => schema.to_string(),
            Err(e) => {
                return ExecutionResult::sql_failure(
                    format!("SQL query failed: {e}"),
                    SqlMetadata {
                        error: Some(e.to_string()),
                        ..SqlMetadata::default()
                    },
                );
            }
        };

        let prompt = self.prompts.render(
            paths::AGENT_SQL_GENERATION,
            templates::AGENT_SQL_GENERATION,
            &[("user_query", query), ("schema", &schema)],
        );
        let request = GenerationRequest::new(prompt)
            .with_system(
                self.prompts
                    .prompt(paths::SYSTEM_SQL_GENERATOR, templates::SYSTEM_SQL_GENERATOR),
            )
            .with_temperature(SQL_GENERATION_TEMPERATURE)
            .with_max_tokens(SQL_GENERATION_MAX_TOKENS);

        let statement = match self.generator.generate(&request).await {
            Ok(generation) => strip_code_fence(&generation.text),
            Err(e) => {
                return ExecutionResult::sql_failure(
                    format!("SQL generation failed: {e}"),
                    SqlMetadata {
                        error: Some(e.to_string()),
                        ..SqlMetadata::default()
                    },
                );
            }
        };
        debug!(sql = %statement, "generated SQL");

        let output = match self.store.execute(&statement) {
            Ok(output) => output,
            Err(e) => {
                warn!(sql = %statement, error = %e, "SQL execution failed");
                return ExecutionResult::sql_failure(
                    format!("SQL query failed: {e}"),
                    SqlMetadata {
                        sql_query: Some(statement),
                        row_count: None,
                        error: Some(e.to_string()),
                    },
                );
            }
        };

        let row_count = output.row_count();
        let metadata = SqlMetadata {
            sql_query: Some(statement),
            row_count: Some(row_count),
            error: None,
        };
        if row_count == 0 {
            return ExecutionResult::sql(NO_ROWS_ANSWER, metadata);
        }

        let results = serde_json::to_string_pretty(&output.rows).unwrap_or_else(|_| "[]".into());
        let prompt = self.prompts.render(
            paths::AGENT_SQL_ANSWER,
            templates::AGENT_SQL_ANSWER,
            &[("user_query", query), ("results", &results)],
        );
        let request = GenerationRequest::new(prompt)
            .with_system(
                self.prompts
                    .prompt(paths::SYSTEM_SQL_ANSWER, templates::SYSTEM_SQL_ANSWER),
            )
            .with_temperature(SQL_ANSWER_TEMPERATURE)
            .with_max_tokens(SQL_ANSWER_MAX_TOKENS);

        match self.generator.generate(&request).await {
            Ok(generation) => ExecutionResult::sql(generation.text, metadata),
            Err(e) => ExecutionResult::sql_failure(
                format!("Failed to phrase {row_count} SQL result row(s): {e}"),
                SqlMetadata {
                    error: Some(e.to_string()),
                    ..metadata
                },
            ),
        }
    }

    /// Answers `query` with single-step retrieval and generation.
    pub async fn execute_rag(&self, query: &str) -> ExecutionResult {
        let mut metadata = RagMetadata {
            search_type: SearchType::Keyword.to_string(),
            ..RagMetadata::default()
        };

        let results = match self.retriever.retrieve(query, self.top_k).await {
            Ok(results) => results,
            Err(e) => {
                warn!(error = %e, "retrieval failed");
                metadata.error = Some(e.to_string());
                return ExecutionResult::rag_failure(format!("Retrieval failed: {e}"), metadata);
            }
        };
        if results.is_empty() {
            return ExecutionResult::rag_failure(NO_DOCUMENTS_ANSWER, metadata);
        }

        metadata.scores = results.iter().map(|r| r.score).collect();
        metadata.num_documents = results.len();
        let documents: Vec<Document> = results.into_iter().map(|r| r.document).collect();

        let request = context_request(&self.prompts, query, &documents, None);
        match self.generator.generate(&request).await {
            Ok(generation) => ExecutionResult::rag(generation.text, metadata),
            Err(e) => {
                metadata.error = Some(e.to_string());
                ExecutionResult::rag_failure(format!("Answer generation failed: {e}"), metadata)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::decision::DecisionSource;
    use crate::core::SearchResult;
    use crate::test_support::{ScriptedGenerator, ScriptedRetriever};

    struct Fixture {
        _dir: tempfile::TempDir,
        store: SqlStore,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = SqlStore::new(dir.path().join("agent.db"));
        store
            .provision_sample(false)
            .unwrap_or_else(|_| unreachable!());
        Fixture { _dir: dir, store }
    }

    fn router(
        generator: &Arc<ScriptedGenerator>,
        retriever: ScriptedRetriever,
        store: SqlStore,
    ) -> ToolRouter {
        ToolRouter::new(
            Arc::clone(generator) as Arc<dyn Generate>,
            Arc::new(retriever),
            store,
            Arc::new(PromptCatalog::empty()),
        )
    }

    #[test]
    fn test_strip_code_fence() {
        assert_eq!(strip_code_fence("```sql\nSELECT 1\n```"), "SELECT 1");
        assert_eq!(strip_code_fence("  SELECT 1  "), "SELECT 1");
        assert_eq!(strip_code_fence("```SELECT 1```"), "```SELECT 1");
        assert_eq!(strip_code_fence("SELECT 1`"), "SELECT 1");
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(Phase::Executing(ToolKind::Sql).to_string(), "executing(sql)");
        assert_eq!(Phase::Done.to_string(), "done");
    }

    #[tokio::test]
    async fn test_sql_end_to_end() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::new([
            "{\"tool\": \"sql\", \"reasoning\": \"counting employees\"}",
            "```sql\nSELECT * FROM employees WHERE department = 'Engineering'\n```",
            "There are 3 employees in Engineering.",
        ]));
        let router = router(&generator, ScriptedRetriever::default(), fx.store.clone());

        let routed = router.route("How many employees are in Engineering?").await;
        assert_eq!(routed.decision.tool, ToolKind::Sql);
        assert_eq!(routed.decision.source, DecisionSource::Model);
        assert!(routed.result.success);
        assert_eq!(routed.result.answer, "There are 3 employees in Engineering.");

        let meta = routed.result.sql_metadata().cloned().unwrap_or_default();
        assert_eq!(meta.row_count, Some(3));
        assert_eq!(
            meta.sql_query.as_deref(),
            Some("SELECT * FROM employees WHERE department = 'Engineering'")
        );

        let calls = generator.calls();
        assert_eq!(calls.len(), 3);
        assert!((calls[0].temperature - DECISION_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(calls[1].max_tokens, SQL_GENERATION_MAX_TOKENS);
        assert!(calls[1].prompt.contains("Table: employees"));
        assert!(calls[2].prompt.contains("Alice Johnson"));
    }

    #[tokio::test]
    async fn test_decision_failure_uses_heuristic() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::new([
            "I think SQL is best.",
            "SELECT name FROM employees WHERE department = 'Engineering'",
            "Three.",
        ]));
        let router = router(&generator, ScriptedRetriever::default(), fx.store.clone());

        let routed = router.route("How many employees are in Engineering?").await;
        assert_eq!(routed.decision.tool, ToolKind::Sql);
        assert_eq!(routed.decision.source, DecisionSource::Heuristic);
        assert!(routed.result.success);
    }

    #[tokio::test]
    async fn test_decision_call_error_uses_heuristic() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::from_results(vec![Err(
            "backend down".to_string(),
        )]));
        let router = router(&generator, ScriptedRetriever::default(), fx.store.clone());

        let decision = router.decide("What is machine learning?").await;
        assert_eq!(decision.tool, ToolKind::Rag);
        assert_eq!(decision.source, DecisionSource::Heuristic);
    }

    #[tokio::test]
    async fn test_rejected_statement_is_failure_envelope() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::new(["DROP TABLE employees"]));
        let router = router(&generator, ScriptedRetriever::default(), fx.store.clone());

        let result = router.execute_sql("remove everyone").await;
        assert!(!result.success);
        assert!(result.answer.starts_with("SQL query failed:"));
        let meta = result.sql_metadata().cloned().unwrap_or_default();
        assert_eq!(meta.sql_query.as_deref(), Some("DROP TABLE employees"));
        assert!(meta.error.is_some());

        let intact = fx
            .store
            .execute("SELECT * FROM employees")
            .unwrap_or_default();
        assert_eq!(intact.row_count(), 6);
    }

    #[tokio::test]
    async fn test_empty_rows_skip_second_generation() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::new([
            "SELECT * FROM employees WHERE department = 'Legal'",
        ]));
        let router = router(&generator, ScriptedRetriever::default(), fx.store.clone());

        let result = router.execute_sql("Who works in Legal?").await;
        assert!(result.success);
        assert_eq!(result.answer, NO_ROWS_ANSWER);
        assert_eq!(generator.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_store_is_failure_envelope() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let router = router(
            &generator,
            ScriptedRetriever::default(),
            SqlStore::new(dir.path().join("absent.db")),
        );

        let result = router.execute_sql("How many employees?").await;
        assert!(!result.success);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_fresh_path_answers_after_provisioning() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let store = SqlStore::open_or_provision(dir.path().join("data").join("agent.db"))
            .unwrap_or_else(|_| unreachable!());
        let generator = Arc::new(ScriptedGenerator::new([
            "not json",
            "SELECT COUNT(*) AS n FROM employees WHERE department = 'Engineering'",
            "There are 3 employees in Engineering.",
        ]));
        let router = router(&generator, ScriptedRetriever::default(), store);

        let routed = router.route("How many employees are in Engineering?").await;
        assert_eq!(routed.decision.tool, ToolKind::Sql);
        assert!(routed.result.success);
        let meta = routed.result.sql_metadata().cloned().unwrap_or_default();
        assert_eq!(meta.row_count, Some(1));
    }

    #[tokio::test]
    async fn test_rag_branch() {
        let fx = fixture();
        let retriever = ScriptedRetriever::default().with(
            "What is machine learning?",
            vec![
                SearchResult::new(Document::new("ml", "Machine learning learns from data."), 2.5),
                SearchResult::new(Document::new("ai", "AI is broad."), 1.0),
            ],
        );
        let generator = Arc::new(ScriptedGenerator::new([
            "{\"tool\": \"rag\", \"reasoning\": \"conceptual\"}",
            "ML learns patterns from data.",
        ]));
        let router = router(&generator, retriever, fx.store.clone());

        let routed = router.route("What is machine learning?").await;
        assert_eq!(routed.decision.tool, ToolKind::Rag);
        assert!(routed.result.success);
        let meta = routed.result.rag_metadata().cloned().unwrap_or_default();
        assert_eq!(meta.num_documents, 2);
        assert_eq!(meta.scores, vec![2.5, 1.0]);
        assert!(generator.calls()[1].prompt.contains("Document 2:\nAI is broad."));
    }

    #[tokio::test]
    async fn test_rag_branch_no_documents() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let router = router(&generator, ScriptedRetriever::default(), fx.store.clone());

        let result = router.execute_rag("anything").await;
        assert!(!result.success);
        assert_eq!(result.answer, NO_DOCUMENTS_ANSWER);
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rag_branch_retrieval_error() {
        let fx = fixture();
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let retriever = ScriptedRetriever::default().failing("broken");
        let router = router(&generator, retriever, fx.store.clone());

        let result = router.execute_rag("broken").await;
        assert!(!result.success);
        assert!(result.rag_metadata().and_then(|m| m.error.clone()).is_some());
    }
}
