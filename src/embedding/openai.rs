//! Embeddings through `async-openai`, for `OpenAI` or Azure `OpenAI`.

use async_openai::Client;
use async_openai::config::{Config, OpenAIConfig};
use async_openai::types::CreateEmbeddingRequestArgs;
use async_trait::async_trait;
use tracing::debug;

use super::Embedder;
use crate::agent::config::AgentConfig;
use crate::agent::providers::openai::azure_config;
use crate::error::EmbeddingError;

/// Embedding client.
pub struct OpenAiEmbedder<C: Config = OpenAIConfig> {
    client: Client<C>,
    model: String,
}

impl<C: Config> std::fmt::Debug for OpenAiEmbedder<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiEmbedder")
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

/// Creates the embedder matching the configured provider.
///
/// # Errors
///
/// Returns [`EmbeddingError::Unavailable`] for Azure without an endpoint
/// or an unknown provider.
pub fn create_embedder(config: &AgentConfig) -> Result<Box<dyn Embedder>, EmbeddingError> {
    match config.provider.as_str() {
        "openai" => {
            let mut openai_config = OpenAIConfig::new().with_api_key(&config.api_key);
            if let Some(ref base_url) = config.base_url {
                openai_config = openai_config.with_api_base(base_url);
            }
            Ok(Box::new(OpenAiEmbedder {
                client: Client::with_config(openai_config),
                model: config.embedding_model.clone(),
            }))
        }
        "azure" => {
            let azure = azure_config(config, &config.embedding_model)
                .map_err(|_| EmbeddingError::Unavailable)?;
            Ok(Box::new(OpenAiEmbedder {
                client: Client::with_config(azure),
                model: config.embedding_model.clone(),
            }))
        }
        _ => Err(EmbeddingError::Unavailable),
    }
}

#[async_trait]
impl<C: Config + Send + Sync> Embedder for OpenAiEmbedder<C> {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(texts.to_vec())
            .build()
            .map_err(|e| EmbeddingError::Request {
                message: e.to_string(),
            })?;

        debug!(model = %self.model, inputs = texts.len(), "embedding request");
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| EmbeddingError::Request {
                message: e.to_string(),
            })?;

        let mut data = response.data;
        data.sort_by_key(|e| e.index);
        if data.len() != texts.len() {
            return Err(EmbeddingError::CountMismatch {
                expected: texts.len(),
                actual: data.len(),
            });
        }
        Ok(data.into_iter().map(|e| e.embedding).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_embedder_providers() {
        let openai = AgentConfig::builder()
            .api_key("k")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(create_embedder(&openai).is_ok());

        let azure_without_endpoint = AgentConfig::builder()
            .api_key("k")
            .provider("azure")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            create_embedder(&azure_without_endpoint),
            Err(EmbeddingError::Unavailable)
        ));
    }
}
