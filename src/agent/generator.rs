//! Text generation capability.
//!
//! [`Generate`] is the seam the router and the pipelines call through:
//! one prompt in, one completion out, no streaming. [`Generator`] adapts
//! an [`LlmProvider`] and a model name to it.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::message::{ChatRequest, TokenUsage, system_message, user_message};
use super::prompt::{PromptCatalog, paths, templates};
use super::provider::LlmProvider;
use crate::core::Document;
use crate::error::AgentError;

/// Default sampling temperature.
pub const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default completion ceiling.
pub const DEFAULT_MAX_TOKENS: u32 = 500;

/// One generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// User prompt.
    pub prompt: String,
    /// System prompt; `system.default` when `None`.
    pub system_prompt: Option<String>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Completion ceiling.
    pub max_tokens: u32,
}

impl GenerationRequest {
    /// A request with default sampling settings.
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            temperature: DEFAULT_TEMPERATURE,
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// Sets the system prompt.
    #[must_use]
    pub fn with_system(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sets the completion ceiling.
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Generated text plus provider usage, when reported.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Generation {
    /// Completion text.
    pub text: String,
    /// Token usage.
    pub usage: Option<TokenUsage>,
}

impl Generation {
    /// A generation without usage figures.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            usage: None,
        }
    }
}

/// Generation capability: `prompt → text`.
#[async_trait]
pub trait Generate: Send + Sync {
    /// Produces a single completion.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError`] when the backend call fails.
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, AgentError>;
}

/// [`Generate`] over an [`LlmProvider`].
pub struct Generator {
    provider: Box<dyn LlmProvider>,
    model: String,
    prompts: Arc<PromptCatalog>,
}

impl std::fmt::Debug for Generator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generator")
            .field("provider", &self.provider.name())
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Generator {
    /// Creates a generator for `model` (the deployment name on Azure).
    #[must_use]
    pub fn new(
        provider: Box<dyn LlmProvider>,
        model: impl Into<String>,
        prompts: Arc<PromptCatalog>,
    ) -> Self {
        Self {
            provider,
            model: model.into(),
            prompts,
        }
    }
}

#[async_trait]
impl Generate for Generator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, AgentError> {
        let system = request.system_prompt.clone().unwrap_or_else(|| {
            self.prompts
                .prompt(paths::SYSTEM_DEFAULT, templates::SYSTEM_DEFAULT)
        });

        let chat = ChatRequest {
            model: self.model.clone(),
            messages: vec![system_message(&system), user_message(&request.prompt)],
            temperature: Some(request.temperature),
            max_tokens: Some(request.max_tokens),
            json_mode: false,
        };

        let response = self.provider.chat(&chat).await?;
        debug!(
            provider = self.provider.name(),
            total_tokens = response.usage.total_tokens,
            finish_reason = response.finish_reason.as_deref().unwrap_or("unknown"),
            "generation complete"
        );

        Ok(Generation {
            text: response.content,
            usage: Some(response.usage),
        })
    }
}

/// Formats documents as numbered context blocks.
#[must_use]
pub fn build_context_text(documents: &[Document]) -> String {
    documents
        .iter()
        .enumerate()
        .map(|(i, doc)| format!("Document {}:\n{}", i + 1, doc.content))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Builds the context-grounded request for `query`.
///
/// Uses `system.rag` unless `system_prompt` overrides it.
#[must_use]
pub fn context_request(
    prompts: &PromptCatalog,
    query: &str,
    documents: &[Document],
    system_prompt: Option<&str>,
) -> GenerationRequest {
    let context_text = build_context_text(documents);
    let prompt = prompts.render(
        paths::USER_RAG,
        templates::USER_RAG,
        &[("context_text", &context_text), ("query", query)],
    );
    let system = system_prompt.map_or_else(
        || prompts.prompt(paths::SYSTEM_RAG, templates::SYSTEM_RAG),
        str::to_string,
    );
    GenerationRequest::new(prompt).with_system(system)
}

/// Answers `query` from `documents` with default sampling settings.
///
/// # Errors
///
/// Returns [`AgentError`] when generation fails.
pub async fn answer_with_context(
    generator: &dyn Generate,
    prompts: &PromptCatalog,
    query: &str,
    documents: &[Document],
    system_prompt: Option<&str>,
) -> Result<Generation, AgentError> {
    generator
        .generate(&context_request(prompts, query, documents, system_prompt))
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::message::{ChatResponse, Role};
    use crate::test_support::ScriptedGenerator;
    use std::sync::Mutex;

    struct EchoProvider {
        seen: Arc<Mutex<Vec<ChatRequest>>>,
    }

    #[async_trait]
    impl LlmProvider for EchoProvider {
        fn name(&self) -> &'static str {
            "echo"
        }

        async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
            if let Ok(mut seen) = self.seen.lock() {
                seen.push(request.clone());
            }
            Ok(ChatResponse {
                content: "echoed".to_string(),
                usage: TokenUsage {
                    prompt_tokens: 3,
                    completion_tokens: 1,
                    total_tokens: 4,
                },
                finish_reason: Some("stop".to_string()),
            })
        }
    }

    #[test]
    fn test_build_context_text() {
        let docs = vec![Document::new("a", "alpha"), Document::new("b", "beta")];
        assert_eq!(
            build_context_text(&docs),
            "Document 1:\nalpha\n\nDocument 2:\nbeta"
        );
    }

    #[test]
    fn test_context_request_defaults_to_rag_system_prompt() {
        let request = context_request(
            &PromptCatalog::empty(),
            "what?",
            &[Document::new("a", "alpha")],
            None,
        );
        assert_eq!(request.system_prompt.as_deref(), Some(templates::SYSTEM_RAG));
        assert!(request.prompt.contains("Document 1:\nalpha"));
        assert!(request.prompt.contains("Question: what?"));
        assert!((request.temperature - DEFAULT_TEMPERATURE).abs() < f32::EPSILON);
        assert_eq!(request.max_tokens, DEFAULT_MAX_TOKENS);
    }

    #[tokio::test]
    async fn test_generator_uses_default_system_prompt() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let provider = Box::new(EchoProvider {
            seen: Arc::clone(&seen),
        });
        let generator = Generator::new(provider, "gpt-test", Arc::new(PromptCatalog::empty()));

        let out = generator
            .generate(&GenerationRequest::new("hi").with_max_tokens(10))
            .await
            .unwrap_or_default();
        assert_eq!(out.text, "echoed");
        assert_eq!(out.usage.map(|u| u.total_tokens), Some(4));

        let requests = seen.lock().map(|r| r.clone()).unwrap_or_default();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].model, "gpt-test");
        assert_eq!(requests[0].max_tokens, Some(10));
        assert_eq!(requests[0].messages[0].role, Role::System);
        assert_eq!(requests[0].messages[0].content, templates::SYSTEM_DEFAULT);
    }

    #[tokio::test]
    async fn test_answer_with_context_override() {
        let generator = ScriptedGenerator::new(["grounded answer"]);
        let out = answer_with_context(
            &generator,
            &PromptCatalog::empty(),
            "q",
            &[Document::new("a", "alpha")],
            Some("custom system"),
        )
        .await
        .unwrap_or_default();
        assert_eq!(out.text, "grounded answer");
        let calls = generator.calls();
        assert_eq!(calls[0].system_prompt.as_deref(), Some("custom system"));
    }
}
