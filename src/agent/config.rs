//! Agent configuration with builder pattern and environment variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::AgentError;

/// Default chat model or Azure deployment.
const DEFAULT_CHAT_MODEL: &str = "gpt-4";
/// Default embedding model or Azure deployment.
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";
/// Default Azure `OpenAI` API version.
const DEFAULT_API_VERSION: &str = "2024-02-15-preview";
/// Default structured store location.
const DEFAULT_DB_PATH: &str = "data/agent_database.db";
/// Default documents retrieved by the agent's RAG branch.
const DEFAULT_AGENT_TOP_K: usize = 3;
/// Default context token budget.
const DEFAULT_CONTEXT_BUDGET: usize = 2000;
/// Default number of sub-queries in multi-step retrieval.
const DEFAULT_FAN_OUT: usize = 2;
/// Default sampling temperature for answers.
const DEFAULT_TEMPERATURE: f32 = 0.7;
/// Default answer max tokens.
const DEFAULT_MAX_TOKENS: u32 = 500;
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Configuration for generation, embedding and the pipelines built on them.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// Provider name (`"openai"` or `"azure"`).
    pub provider: String,
    /// API key for the provider.
    pub api_key: String,
    /// Base URL override, or the Azure `OpenAI` endpoint.
    pub base_url: Option<String>,
    /// Chat model, or chat deployment name on Azure.
    pub chat_model: String,
    /// Embedding model, or embedding deployment name on Azure.
    pub embedding_model: String,
    /// Azure `OpenAI` API version.
    pub api_version: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Prompt catalog file.
    pub prompts_file: Option<PathBuf>,
    /// Structured store location.
    pub db_path: PathBuf,
    /// Documents retrieved by the agent's RAG branch.
    pub agent_top_k: usize,
    /// Token budget for context management.
    pub context_budget: usize,
    /// Sub-queries issued by multi-step retrieval.
    pub fan_out: usize,
    /// Default answer temperature.
    pub temperature: f32,
    /// Default answer max tokens.
    pub max_tokens: u32,
}

impl AgentConfig {
    /// Creates a new builder for `AgentConfig`.
    #[must_use]
    pub fn builder() -> AgentConfigBuilder {
        AgentConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key is found.
    pub fn from_env() -> Result<Self, AgentError> {
        Self::builder().from_env().build()
    }

    /// Returns `true` when configured for Azure `OpenAI`.
    #[must_use]
    pub fn is_azure(&self) -> bool {
        self.provider == "azure"
    }
}

/// Resolves the structured store location without requiring credentials.
///
/// Order: `explicit` → `RAG_DB_PATH` → `data/agent_database.db`.
#[must_use]
pub fn resolve_db_path(explicit: Option<&std::path::Path>) -> PathBuf {
    explicit
        .map(PathBuf::from)
        .or_else(|| std::env::var("RAG_DB_PATH").ok().map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH))
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Builder for [`AgentConfig`].
#[derive(Debug, Clone, Default)]
pub struct AgentConfigBuilder {
    provider: Option<String>,
    api_key: Option<String>,
    base_url: Option<String>,
    chat_model: Option<String>,
    embedding_model: Option<String>,
    api_version: Option<String>,
    timeout: Option<Duration>,
    prompts_file: Option<PathBuf>,
    db_path: Option<PathBuf>,
    agent_top_k: Option<usize>,
    context_budget: Option<usize>,
    fan_out: Option<usize>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

impl AgentConfigBuilder {
    /// Populates unset fields from environment variables.
    ///
    /// Azure `OpenAI` is selected when `AZURE_OPENAI_ENDPOINT` and
    /// `AZURE_OPENAI_API_KEY` are both set and no provider was given.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        let azure_available = std::env::var("AZURE_OPENAI_ENDPOINT").is_ok()
            && std::env::var("AZURE_OPENAI_API_KEY").is_ok();

        if self.provider.is_none() {
            self.provider = std::env::var("RAG_PROVIDER")
                .ok()
                .or_else(|| azure_available.then(|| "azure".to_string()));
        }
        let azure = self.provider.as_deref() == Some("azure");

        if self.api_key.is_none() {
            let primary = if azure {
                "AZURE_OPENAI_API_KEY"
            } else {
                "OPENAI_API_KEY"
            };
            self.api_key = std::env::var(primary)
                .or_else(|_| std::env::var("RAG_API_KEY"))
                .ok();
        }
        if self.base_url.is_none() {
            self.base_url = if azure {
                std::env::var("AZURE_OPENAI_ENDPOINT").ok()
            } else {
                std::env::var("OPENAI_BASE_URL").ok()
            };
        }
        if self.chat_model.is_none() {
            let deployment = if azure {
                std::env::var("AZURE_OPENAI_DEPLOYMENT_NAME").ok()
            } else {
                None
            };
            self.chat_model = deployment
                .or_else(|| std::env::var("OPENAI_DEPLOYMENT_NAME").ok())
                .or_else(|| std::env::var("RAG_CHAT_MODEL").ok());
        }
        if self.embedding_model.is_none() {
            self.embedding_model = std::env::var("AZURE_OPENAI_EMBEDDING_DEPLOYMENT")
                .or_else(|_| std::env::var("RAG_EMBEDDING_MODEL"))
                .ok();
        }
        if self.api_version.is_none() {
            self.api_version = std::env::var("OPENAI_API_VERSION").ok();
        }
        if self.prompts_file.is_none() {
            self.prompts_file = std::env::var("RAG_PROMPTS_FILE").ok().map(PathBuf::from);
        }
        if self.db_path.is_none() {
            self.db_path = std::env::var("RAG_DB_PATH").ok().map(PathBuf::from);
        }
        if self.agent_top_k.is_none() {
            self.agent_top_k = env_parse("RAG_AGENT_TOP_K");
        }
        if self.context_budget.is_none() {
            self.context_budget = env_parse("RAG_CONTEXT_BUDGET");
        }
        if self.fan_out.is_none() {
            self.fan_out = env_parse("RAG_FAN_OUT");
        }
        self
    }

    /// Sets the provider name.
    #[must_use]
    pub fn provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the base URL or Azure endpoint.
    #[must_use]
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = Some(url.into());
        self
    }

    /// Sets the chat model.
    #[must_use]
    pub fn chat_model(mut self, model: impl Into<String>) -> Self {
        self.chat_model = Some(model.into());
        self
    }

    /// Sets the embedding model.
    #[must_use]
    pub fn embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = Some(model.into());
        self
    }

    /// Sets the Azure API version.
    #[must_use]
    pub fn api_version(mut self, version: impl Into<String>) -> Self {
        self.api_version = Some(version.into());
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }

    /// Sets the prompt catalog file.
    #[must_use]
    pub fn prompts_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.prompts_file = Some(path.into());
        self
    }

    /// Sets the structured store location.
    #[must_use]
    pub fn db_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.db_path = Some(path.into());
        self
    }

    /// Sets the agent RAG top-k.
    #[must_use]
    pub const fn agent_top_k(mut self, n: usize) -> Self {
        self.agent_top_k = Some(n);
        self
    }

    /// Sets the context token budget.
    #[must_use]
    pub const fn context_budget(mut self, n: usize) -> Self {
        self.context_budget = Some(n);
        self
    }

    /// Sets the multi-step fan-out.
    #[must_use]
    pub const fn fan_out(mut self, n: usize) -> Self {
        self.fan_out = Some(n);
        self
    }

    /// Sets the default answer temperature.
    #[must_use]
    pub const fn temperature(mut self, t: f32) -> Self {
        self.temperature = Some(t);
        self
    }

    /// Sets the default answer max tokens.
    #[must_use]
    pub const fn max_tokens(mut self, n: u32) -> Self {
        self.max_tokens = Some(n);
        self
    }

    /// Builds the [`AgentConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::ApiKeyMissing`] if no API key was set.
    pub fn build(self) -> Result<AgentConfig, AgentError> {
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or(AgentError::ApiKeyMissing)?;

        Ok(AgentConfig {
            provider: self.provider.unwrap_or_else(|| "openai".to_string()),
            api_key,
            base_url: self.base_url,
            chat_model: self
                .chat_model
                .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            embedding_model: self
                .embedding_model
                .unwrap_or_else(|| DEFAULT_EMBEDDING_MODEL.to_string()),
            api_version: self
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            prompts_file: self.prompts_file,
            db_path: self
                .db_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DB_PATH)),
            agent_top_k: self.agent_top_k.unwrap_or(DEFAULT_AGENT_TOP_K),
            context_budget: self.context_budget.unwrap_or(DEFAULT_CONTEXT_BUDGET),
            fan_out: self.fan_out.unwrap_or(DEFAULT_FAN_OUT),
            temperature: self.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            max_tokens: self.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = AgentConfig::builder()
            .api_key("test-key")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.provider, "openai");
        assert_eq!(config.api_key, "test-key");
        assert_eq!(config.chat_model, DEFAULT_CHAT_MODEL);
        assert_eq!(config.embedding_model, DEFAULT_EMBEDDING_MODEL);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.db_path, PathBuf::from(DEFAULT_DB_PATH));
        assert_eq!(config.agent_top_k, 3);
        assert_eq!(config.context_budget, 2000);
        assert_eq!(config.fan_out, 2);
        assert_eq!(config.max_tokens, 500);
        assert!(!config.is_azure());
    }

    #[test]
    fn test_builder_missing_api_key() {
        let result = AgentConfig::builder().build();
        assert!(matches!(result, Err(AgentError::ApiKeyMissing)));
    }

    #[test]
    fn test_builder_empty_api_key() {
        let result = AgentConfig::builder().api_key("").build();
        assert!(result.is_err());
    }

    #[test]
    fn test_builder_custom_values() {
        let config = AgentConfig::builder()
            .api_key("key")
            .provider("azure")
            .base_url("https://example.openai.azure.com")
            .chat_model("gpt-4o")
            .context_budget(800)
            .fan_out(3)
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(config.is_azure());
        assert_eq!(config.chat_model, "gpt-4o");
        assert_eq!(config.context_budget, 800);
        assert_eq!(config.fan_out, 3);
        assert_eq!(config.timeout, Duration::from_secs(5));
    }
}
