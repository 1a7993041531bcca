//! Retrieval-augmented generation pipelines.
//!
//! One [`RagPipeline`] serves every variant:
//!
//! - **basic** (`keyword`, `vector`, `hybrid`, `semantic`): retrieve in the
//!   requested mode, falling back to keyword search, then generate.
//! - **custom text**: answer from caller-supplied text, no index access.
//! - **advanced**: multi-step retrieval and/or token-budgeted context,
//!   answered with the `system.rag_advanced` prompt.
//!
//! An empty retrieval is an answer, not an error: the response explains
//! that nothing was found and no generation call is made.

use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info};

use super::multi_step::{DEFAULT_FAN_OUT, MultiStepRetriever};
use crate::agent::generator::{Generate, Generation, context_request};
use crate::agent::prompt::{PromptCatalog, paths, templates};
use crate::context::{TiktokenTokenizer, Tokenizer, select_within_budget};
use crate::core::{Document, RetrievalMetadata, SearchResult, SearchType};
use crate::error::RagError;
use crate::search::retriever::AddTextOutcome;
use crate::search::{Retrieve, Retriever, SearchMode};

/// Default documents retrieved.
pub const DEFAULT_TOP_K: usize = 3;
/// Largest accepted top-k.
pub const MAX_TOP_K: usize = 50;
/// Largest accepted completion ceiling.
pub const MAX_ANSWER_TOKENS: u32 = 4000;
/// Default context budget in tokens.
pub const DEFAULT_CONTEXT_BUDGET: usize = 2000;
/// Id of the document built from custom text.
pub const CUSTOM_TEXT_ID: &str = "custom-text";
/// Title of the document built from custom text.
pub const CUSTOM_TEXT_TITLE: &str = "Custom Text";
/// Answer when retrieval finds nothing.
pub const NO_DOCUMENTS_ANSWER: &str =
    "No relevant documents were found for this query, so no answer was generated.";

/// A RAG question and its settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RagRequest {
    /// The question.
    pub query: String,
    /// Documents retrieved per step (1..=50).
    pub top_k: usize,
    /// Retrieval mode for the basic pipeline.
    pub mode: SearchMode,
    /// Answer temperature (0.0..=2.0).
    pub temperature: f32,
    /// Answer completion ceiling (1..=4000).
    pub max_tokens: u32,
    /// Overrides the pipeline's system prompt.
    pub system_prompt: Option<String>,
    /// Follow generated sub-queries.
    pub use_multi_step: bool,
    /// Trim the context to `context_budget` tokens.
    pub use_context_management: bool,
    /// Token budget for context management.
    pub context_budget: usize,
    /// Answer from this text instead of the index.
    pub custom_text: Option<String>,
}

impl RagRequest {
    /// A keyword request with default settings.
    #[must_use]
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            top_k: DEFAULT_TOP_K,
            mode: SearchMode::Keyword,
            temperature: crate::agent::generator::DEFAULT_TEMPERATURE,
            max_tokens: crate::agent::generator::DEFAULT_MAX_TOKENS,
            system_prompt: None,
            use_multi_step: false,
            use_context_management: false,
            context_budget: DEFAULT_CONTEXT_BUDGET,
            custom_text: None,
        }
    }

    /// Sets the top-k.
    #[must_use]
    pub const fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    /// Sets the retrieval mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    /// Sets the answer temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the answer completion ceiling.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Overrides the system prompt.
    #[must_use]
    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(prompt.into());
        self
    }

    /// Enables multi-step retrieval.
    #[must_use]
    pub const fn with_multi_step(mut self, enabled: bool) -> Self {
        self.use_multi_step = enabled;
        self
    }

    /// Enables context management with `budget` tokens.
    #[must_use]
    pub const fn with_context_budget(mut self, budget: usize) -> Self {
        self.use_context_management = true;
        self.context_budget = budget;
        self
    }

    /// Answers from `text` instead of the index.
    #[must_use]
    pub fn with_custom_text(mut self, text: impl Into<String>) -> Self {
        self.custom_text = Some(text.into());
        self
    }

    /// Whether the advanced pipeline handles this request.
    #[must_use]
    pub const fn is_advanced(&self) -> bool {
        self.use_multi_step || self.use_context_management
    }

    /// Checks field ranges.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidRequest`] naming the first violation.
    pub fn validate(&self) -> Result<(), RagError> {
        let invalid = |message: String| Err(RagError::InvalidRequest { message });
        if self.query.trim().is_empty() {
            return invalid("query must not be empty".to_string());
        }
        if !(1..=MAX_TOP_K).contains(&self.top_k) {
            return invalid(format!("top_k must be between 1 and {MAX_TOP_K}, got {}", self.top_k));
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return invalid(format!(
                "temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            ));
        }
        if !(1..=MAX_ANSWER_TOKENS).contains(&self.max_tokens) {
            return invalid(format!(
                "max_tokens must be between 1 and {MAX_ANSWER_TOKENS}, got {}",
                self.max_tokens
            ));
        }
        if self.use_context_management && self.context_budget == 0 {
            return invalid("context budget must be positive".to_string());
        }
        if self
            .custom_text
            .as_deref()
            .is_some_and(|t| t.trim().is_empty())
        {
            return invalid("custom text must not be empty".to_string());
        }
        Ok(())
    }
}

/// A generated answer with its context and retrieval facts.
#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    /// Generated answer, or an explanation when nothing was retrieved.
    pub answer: String,
    /// The question.
    pub query: String,
    /// Documents passed to the generator.
    pub retrieved_documents: Vec<Document>,
    /// The same documents with their scores.
    pub search_results: Vec<SearchResult>,
    /// Retrieval facts.
    pub metadata: RetrievalMetadata,
}

impl RagResponse {
    /// Human-readable metadata lines.
    #[must_use]
    pub fn metadata_summary(&self) -> String {
        self.metadata.summary()
    }

    /// Whether an answer was generated from retrieved context.
    #[must_use]
    pub fn has_context(&self) -> bool {
        !self.retrieved_documents.is_empty()
    }
}

/// One mode's outcome in a comparison.
#[derive(Debug, Clone, Serialize)]
pub struct ModeComparison {
    /// Mode that ran.
    pub mode: SearchMode,
    /// Results, best first; empty on failure.
    pub results: Vec<SearchResult>,
    /// Total matches reported by the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<u64>,
    /// Failure description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Runs `query` in every mode, one after another. Failures are reported
/// per mode.
pub async fn compare_modes(retriever: &Retriever, query: &str, top: usize) -> Vec<ModeComparison> {
    let mut comparisons = Vec::with_capacity(SearchMode::ALL.len());
    for mode in SearchMode::ALL {
        let comparison = match retriever.search(query, mode, top).await {
            Ok(response) => ModeComparison {
                mode,
                results: response.results,
                total_count: response.total_count,
                error: None,
            },
            Err(e) => ModeComparison {
                mode,
                results: Vec::new(),
                total_count: None,
                error: Some(e.to_string()),
            },
        };
        comparisons.push(comparison);
    }
    comparisons
}

/// The RAG pipelines over one retriever and one generator.
pub struct RagPipeline {
    retriever: Arc<Retriever>,
    generator: Arc<dyn Generate>,
    prompts: Arc<PromptCatalog>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    fan_out: usize,
}

impl std::fmt::Debug for RagPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagPipeline")
            .field("retriever", &self.retriever)
            .field("fan_out", &self.fan_out)
            .finish_non_exhaustive()
    }
}

impl RagPipeline {
    /// Creates a pipeline; the tokenizer is loaded on first use.
    #[must_use]
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn Generate>,
        prompts: Arc<PromptCatalog>,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompts,
            tokenizer: None,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Uses `tokenizer` for context management.
    #[must_use]
    pub fn with_tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Sets the multi-step fan-out.
    #[must_use]
    pub const fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    fn tokenizer(&self) -> Result<Arc<dyn Tokenizer>, RagError> {
        match &self.tokenizer {
            Some(tokenizer) => Ok(Arc::clone(tokenizer)),
            None => Ok(Arc::new(TiktokenTokenizer::cl100k()?)),
        }
    }

    /// Answers `request` with the pipeline its flags select.
    ///
    /// # Errors
    ///
    /// Returns [`RagError`] for invalid requests, failed retrieval (after
    /// any keyword fallback) or failed generation.
    pub async fn answer(&self, request: &RagRequest) -> Result<RagResponse, RagError> {
        request.validate()?;
        if let Some(text) = &request.custom_text {
            return self.answer_custom_text(request, text).await;
        }
        if request.is_advanced() {
            return self.answer_advanced(request).await;
        }
        self.answer_basic(request).await
    }

    async fn answer_basic(&self, request: &RagRequest) -> Result<RagResponse, RagError> {
        let started = Instant::now();
        let outcome = self
            .retriever
            .search_with_fallback(&request.query, request.mode, request.top_k)
            .await?;
        let retrieval_time = started.elapsed();

        let mut metadata =
            RetrievalMetadata::from_results(&outcome.response.results, outcome.response.search_type);
        metadata.retrieval_time = Some(retrieval_time);
        metadata.insert_info("top_k", request.top_k);
        metadata.insert_info("temperature", f64::from(request.temperature));
        if let Some(total) = outcome.response.total_count {
            metadata.insert_info("total_count", total);
        }
        if let Some(fallback) = &outcome.fallback {
            metadata.insert_info("fallback_from", fallback.from.as_str());
            metadata.insert_info("fallback_reason", fallback.reason.clone());
        }

        self.generate(request, outcome.response.results, metadata, None)
            .await
    }

    async fn answer_custom_text(
        &self,
        request: &RagRequest,
        text: &str,
    ) -> Result<RagResponse, RagError> {
        let document = Document::new(CUSTOM_TEXT_ID, text).with_title(CUSTOM_TEXT_TITLE);
        let results = vec![SearchResult::new(document, 1.0)];
        let mut metadata = RetrievalMetadata::from_results(&results, SearchType::CustomText);
        metadata.insert_info("text_length", text.chars().count());

        self.generate(request, results, metadata, None).await
    }

    async fn answer_advanced(&self, request: &RagRequest) -> Result<RagResponse, RagError> {
        let started = Instant::now();
        let mut info: Vec<(&str, Value)> = Vec::new();

        let mut results = if request.use_multi_step {
            let outcome = MultiStepRetriever::new(
                self.retriever.as_ref(),
                self.generator.as_ref(),
                &self.prompts,
            )
            .with_fan_out(self.fan_out)
            .retrieve(&request.query, request.top_k)
            .await?;
            info.push(("multi_step", Value::Bool(true)));
            info.push(("subqueries", Value::from(outcome.subqueries)));
            info.push(("initial_count", Value::from(outcome.initial_count)));
            outcome.results
        } else {
            self.retriever.retrieve(&request.query, request.top_k).await?
        };
        let retrieval_time = started.elapsed();

        let mut context_tokens = None;
        if request.use_context_management && !results.is_empty() {
            let tokenizer = self.tokenizer()?;
            let before = results.len();
            let selection = select_within_budget(&results, request.context_budget, tokenizer.as_ref());
            debug!(
                before,
                after = selection.items.len(),
                tokens = selection.total_tokens,
                "context managed"
            );
            results = selection.items;
            context_tokens = Some(selection.total_tokens);
            info.push(("context_management", Value::Bool(true)));
            info.push(("context_budget", Value::from(request.context_budget)));
            info.push(("context_truncated", Value::Bool(selection.truncated)));
        }

        let mut metadata = RetrievalMetadata::from_results(&results, SearchType::Advanced);
        metadata.retrieval_time = Some(retrieval_time);
        metadata.context_tokens = context_tokens;
        metadata.insert_info("top_k", request.top_k);
        for (key, value) in info {
            metadata.insert_info(key, value);
        }

        let system = self
            .prompts
            .prompt(paths::SYSTEM_RAG_ADVANCED, templates::SYSTEM_RAG_ADVANCED);
        self.generate(request, results, metadata, Some(system)).await
    }

    async fn generate(
        &self,
        request: &RagRequest,
        results: Vec<SearchResult>,
        mut metadata: RetrievalMetadata,
        pipeline_system: Option<String>,
    ) -> Result<RagResponse, RagError> {
        if results.is_empty() {
            info!(query = %request.query, "no documents retrieved, skipping generation");
            return Ok(RagResponse {
                answer: NO_DOCUMENTS_ANSWER.to_string(),
                query: request.query.clone(),
                retrieved_documents: Vec::new(),
                search_results: results,
                metadata,
            });
        }

        let documents: Vec<Document> = results.iter().map(|r| r.document.clone()).collect();
        let system = request.system_prompt.clone().or(pipeline_system);
        let generation_request = context_request(
            &self.prompts,
            &request.query,
            &documents,
            system.as_deref(),
        )
        .with_temperature(request.temperature)
        .with_max_tokens(request.max_tokens);

        let started = Instant::now();
        let Generation { text, usage } = self.generator.generate(&generation_request).await?;
        metadata.generation_time = Some(started.elapsed());
        metadata.total_tokens = usage.map(|u| u.total_tokens);

        Ok(RagResponse {
            answer: text,
            query: request.query.clone(),
            retrieved_documents: documents,
            search_results: results,
            metadata,
        })
    }

    /// Runs `query` in every mode, one after another.
    pub async fn compare(&self, query: &str, top: usize) -> Vec<ModeComparison> {
        compare_modes(&self.retriever, query, top).await
    }

    /// Uploads `text` as a document, with an embedding when possible.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Search`] if the upload fails even without a vector.
    pub async fn add_text(
        &self,
        id: &str,
        title: Option<&str>,
        text: &str,
    ) -> Result<AddTextOutcome, RagError> {
        Ok(self.retriever.add_text(id, title, text).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{FieldAliases, InMemoryBackend};
    use crate::test_support::{FailingBackend, ScriptedGenerator, WordTokenizer, sample_records};

    fn pipeline(generator: &Arc<ScriptedGenerator>) -> RagPipeline {
        let retriever = Retriever::new(
            Box::new(InMemoryBackend::with_records(
                FieldAliases::default(),
                sample_records(),
            )),
            FieldAliases::default(),
        );
        RagPipeline::new(
            Arc::new(retriever),
            Arc::clone(generator) as Arc<dyn Generate>,
            Arc::new(PromptCatalog::empty()),
        )
        .with_tokenizer(Arc::new(WordTokenizer))
    }

    #[test]
    fn test_validate_ranges() {
        assert!(RagRequest::new("q").validate().is_ok());
        assert!(RagRequest::new("q").with_top_k(0).validate().is_err());
        assert!(RagRequest::new("q").with_top_k(51).validate().is_err());
        assert!(RagRequest::new("q").with_top_k(50).validate().is_ok());
        assert!(RagRequest::new("q").with_temperature(2.5).validate().is_err());
        assert!(RagRequest::new("q").with_max_tokens(0).validate().is_err());
        assert!(RagRequest::new(" ").validate().is_err());
        assert!(RagRequest::new("q").with_context_budget(0).validate().is_err());
        assert!(RagRequest::new("q").with_custom_text("").validate().is_err());
    }

    #[tokio::test]
    async fn test_basic_keyword() {
        let generator = Arc::new(ScriptedGenerator::new(["ML learns from data."]));
        let request = RagRequest::new("machine learning").with_temperature(0.2);

        let response = pipeline(&generator)
            .answer(&request)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.answer, "ML learns from data.");
        assert_eq!(response.metadata.search_type, SearchType::Keyword);
        assert_eq!(response.retrieved_documents[0].id, "ml-intro");
        assert_eq!(response.metadata.num_documents, response.search_results.len());
        assert!(response.metadata.retrieval_time.is_some());
        assert!(response.metadata.generation_time.is_some());

        let calls = generator.calls();
        assert!((calls[0].temperature - 0.2).abs() < f32::EPSILON);
        assert_eq!(calls[0].system_prompt.as_deref(), Some(templates::SYSTEM_RAG));
        assert!(calls[0].prompt.contains("Document 1:\nMachine learning"));
    }

    #[tokio::test]
    async fn test_vector_without_embedder_falls_back() {
        let generator = Arc::new(ScriptedGenerator::new(["answer"]));
        let request = RagRequest::new("machine learning").with_mode(SearchMode::Vector);

        let response = pipeline(&generator)
            .answer(&request)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.metadata.search_type, SearchType::Keyword);
        assert_eq!(
            response.metadata.additional_info.get("fallback_from"),
            Some(&Value::from("vector"))
        );
    }

    #[tokio::test]
    async fn test_empty_retrieval_skips_generation() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let response = pipeline(&generator)
            .answer(&RagRequest::new("gardening"))
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.answer, NO_DOCUMENTS_ANSWER);
        assert!(!response.has_context());
        assert!(generator.calls().is_empty());
    }

    #[tokio::test]
    async fn test_custom_text_never_touches_index() {
        let generator = Arc::new(ScriptedGenerator::new(["from custom text"]));
        let pipeline = RagPipeline::new(
            Arc::new(Retriever::new(Box::new(FailingBackend), FieldAliases::default())),
            Arc::clone(&generator) as Arc<dyn Generate>,
            Arc::new(PromptCatalog::empty()),
        );
        let request = RagRequest::new("what does it say?").with_custom_text("The sky is blue.");

        let response = pipeline
            .answer(&request)
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(response.metadata.search_type, SearchType::CustomText);
        assert_eq!(response.retrieved_documents[0].id, CUSTOM_TEXT_ID);
        assert_eq!(
            response.retrieved_documents[0].title.as_deref(),
            Some(CUSTOM_TEXT_TITLE)
        );
        assert!(generator.calls()[0].prompt.contains("The sky is blue."));
    }

    #[tokio::test]
    async fn test_advanced_context_management() {
        let generator = Arc::new(ScriptedGenerator::new(["concise"]));
        let request = RagRequest::new("machine learning").with_context_budget(5);

        let response = pipeline(&generator)
            .answer(&request)
            .await
            .unwrap_or_else(|_| unreachable!());

        assert_eq!(response.metadata.search_type, SearchType::Advanced);
        assert_eq!(response.metadata.context_tokens, Some(5));
        assert_eq!(response.retrieved_documents.len(), 1);
        assert_eq!(
            response.metadata.additional_info.get("context_truncated"),
            Some(&Value::Bool(true))
        );
        assert_eq!(
            generator.calls()[0].system_prompt.as_deref(),
            Some(templates::SYSTEM_RAG_ADVANCED)
        );
    }

    #[tokio::test]
    async fn test_advanced_multi_step() {
        let generator = Arc::new(ScriptedGenerator::new([
            "1. retrieval augmented generation\n2. vector search ranking",
            "combined answer",
        ]));
        let request = RagRequest::new("machine learning")
            .with_multi_step(true)
            .with_system_prompt("be brief");

        let response = pipeline(&generator)
            .answer(&request)
            .await
            .unwrap_or_else(|_| unreachable!());

        let ids: Vec<&str> = response
            .retrieved_documents
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids[0], "ml-intro");
        assert!(ids.contains(&"rag-overview"));
        assert!(ids.contains(&"vector-search"));
        assert_eq!(
            response.metadata.additional_info.get("multi_step"),
            Some(&Value::Bool(true))
        );
        assert_eq!(response.answer, "combined answer");
        assert_eq!(generator.calls()[1].system_prompt.as_deref(), Some("be brief"));
    }

    #[tokio::test]
    async fn test_compare_reports_each_mode() {
        let generator = Arc::new(ScriptedGenerator::new(Vec::<String>::new()));
        let comparisons = pipeline(&generator).compare("machine learning", 3).await;

        let modes: Vec<SearchMode> = comparisons.iter().map(|c| c.mode).collect();
        assert_eq!(modes, SearchMode::ALL.to_vec());
        assert!(comparisons[0].error.is_none());
        assert!(!comparisons[0].results.is_empty());
        assert!(comparisons[1].error.is_some());
        assert!(comparisons[2].error.is_some());
        assert!(comparisons[3].error.is_none());
    }

    #[tokio::test]
    async fn test_add_text_then_answer() {
        let generator = Arc::new(ScriptedGenerator::new(["compost answer"]));
        let pipeline = pipeline(&generator);
        let outcome = pipeline
            .add_text("notes-1", Some("Notes"), "Gardening starts with compost.")
            .await
            .unwrap_or_else(|_| unreachable!());
        assert!(!outcome.with_vector);

        let response = pipeline
            .answer(&RagRequest::new("gardening"))
            .await
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(response.retrieved_documents[0].id, "notes-1");
    }
}
