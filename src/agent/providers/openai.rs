//! `OpenAI` provider implementation using the `async-openai` crate.
//!
//! One implementation serves both `OpenAI` and Azure `OpenAI`: the client is
//! generic over the SDK's [`Config`], so only construction differs.

use async_openai::Client;
use async_openai::config::{AzureConfig, Config, OpenAIConfig};
use async_openai::types::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, CreateChatCompletionRequest, ResponseFormat,
};
use async_trait::async_trait;

use crate::agent::config::AgentConfig;
use crate::agent::message::{ChatMessage, ChatRequest, ChatResponse, Role, TokenUsage};
use crate::agent::provider::LlmProvider;
use crate::error::AgentError;

/// `OpenAI`-compatible LLM provider.
///
/// Wraps the `async-openai` client for chat completions.
pub struct OpenAiProvider<C: Config = OpenAIConfig> {
    client: Client<C>,
    name: &'static str,
}

impl OpenAiProvider<OpenAIConfig> {
    /// Creates an `OpenAI` provider from agent configuration.
    #[must_use]
    pub fn new(config: &AgentConfig) -> Self {
        let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);

        if let Some(ref base_url) = config.base_url {
            openai_config = openai_config.with_api_base(base_url);
        }

        Self {
            client: Client::with_config(openai_config),
            name: "openai",
        }
    }
}

impl OpenAiProvider<AzureConfig> {
    /// Creates an Azure `OpenAI` provider bound to `deployment`.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] if no endpoint is configured.
    pub fn azure(config: &AgentConfig, deployment: &str) -> Result<Self, AgentError> {
        Ok(Self {
            client: Client::with_config(azure_config(config, deployment)?),
            name: "azure",
        })
    }
}

/// Builds the SDK configuration for an Azure deployment.
pub(crate) fn azure_config(config: &AgentConfig, deployment: &str) -> Result<AzureConfig, AgentError> {
    let endpoint = config
        .base_url
        .as_deref()
        .ok_or_else(|| AgentError::Orchestration {
            message: "Azure OpenAI requires AZURE_OPENAI_ENDPOINT".to_string(),
        })?;
    let endpoint = if endpoint.starts_with("http") {
        endpoint.to_string()
    } else {
        format!("https://{endpoint}")
    };

    Ok(AzureConfig::new()
        .with_api_base(endpoint)
        .with_api_key(&config.api_key)
        .with_deployment_id(deployment)
        .with_api_version(&config.api_version))
}

impl<C: Config> OpenAiProvider<C> {
    /// Converts our message type to the `OpenAI` SDK type.
    fn convert_message(msg: &ChatMessage) -> ChatCompletionRequestMessage {
        match msg.role {
            Role::System => {
                ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
                    content: ChatCompletionRequestSystemMessageContent::Text(msg.content.clone()),
                    name: None,
                })
            }
            Role::User => ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                name: None,
            }),
            Role::Assistant => {
                #[allow(deprecated)]
                ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                    content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                        msg.content.clone(),
                    )),
                    name: None,
                    tool_calls: None,
                    refusal: None,
                    audio: None,
                    function_call: None,
                })
            }
        }
    }

    /// Builds an `OpenAI` chat completion request from our generic request.
    ///
    /// Uses `max_tokens` rather than `max_completion_tokens`; older Azure API
    /// versions reject the latter.
    #[allow(deprecated)]
    fn build_request(request: &ChatRequest) -> CreateChatCompletionRequest {
        let messages: Vec<_> = request.messages.iter().map(Self::convert_message).collect();

        let response_format = if request.json_mode {
            Some(ResponseFormat::JsonObject)
        } else {
            None
        };

        CreateChatCompletionRequest {
            model: request.model.clone(),
            messages,
            temperature: request.temperature,
            max_tokens: request.max_tokens,
            response_format,
            ..Default::default()
        }
    }
}

impl<C: Config> std::fmt::Debug for OpenAiProvider<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("name", &self.name)
            .field("client", &"<async-openai::Client>")
            .finish()
    }
}

#[async_trait]
impl<C: Config + Send + Sync> LlmProvider for OpenAiProvider<C> {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, AgentError> {
        let openai_request = Self::build_request(request);

        let response = self
            .client
            .chat()
            .create(openai_request)
            .await
            .map_err(|e| AgentError::ApiRequest {
                message: e.to_string(),
                status: None,
            })?;

        let choice = response.choices.first();

        let content = choice
            .and_then(|c| c.message.content.as_ref())
            .cloned()
            .unwrap_or_default();

        let finish_reason = choice.and_then(|c| {
            c.finish_reason
                .as_ref()
                .map(|fr| format!("{fr:?}").to_lowercase())
        });

        let usage = response
            .usage
            .map_or_else(TokenUsage::default, |u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            });

        Ok(ChatResponse {
            content,
            usage,
            finish_reason,
        })
    }
}
