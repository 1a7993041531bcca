//! Search backend configuration with builder pattern and environment
//! variable support.
//!
//! Configuration is resolved in order: explicit values → environment variables → defaults.

use std::time::Duration;

use super::normalize::FieldAliases;
use crate::error::SearchError;

/// Default index name.
const DEFAULT_INDEX_NAME: &str = "rag-labs-index";
/// REST API version with vector queries and semantic ranking.
const DEFAULT_API_VERSION: &str = "2023-11-01";
/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Field names used by a deployment's index schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldNames {
    /// Identity field.
    pub id: String,
    /// Content field.
    pub content: String,
    /// Title field.
    pub title: String,
    /// Vector field.
    pub vector: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            id: "chunk_id".to_string(),
            content: "chunk".to_string(),
            title: "title".to_string(),
            vector: "text_vector".to_string(),
        }
    }
}

impl FieldNames {
    /// Alias table ranking these names ahead of the built-in aliases.
    #[must_use]
    pub fn aliases(&self) -> FieldAliases {
        FieldAliases::with_deployment_fields(&self.id, &self.content, &self.title, &self.vector)
    }
}

/// Configuration for the Azure AI Search backend.
#[derive(Debug, Clone)]
pub struct SearchConfig {
    /// Service endpoint, always with a scheme.
    pub endpoint: String,
    /// Admin or query key.
    pub api_key: String,
    /// Index name.
    pub index_name: String,
    /// REST API version.
    pub api_version: String,
    /// Request timeout.
    pub timeout: Duration,
    /// Index field names.
    pub fields: FieldNames,
}

impl SearchConfig {
    /// Creates a new builder for `SearchConfig`.
    #[must_use]
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Creates configuration from environment variables with defaults.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::NotConfigured`] if the endpoint or key is missing.
    pub fn from_env() -> Result<Self, SearchError> {
        Self::builder().from_env().build()
    }
}

/// Prefixes `https://` when the endpoint has no scheme.
fn normalize_endpoint(endpoint: &str) -> String {
    let trimmed = endpoint.trim().trim_end_matches('/');
    if trimmed.starts_with("http") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    }
}

/// Builder for [`SearchConfig`].
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    endpoint: Option<String>,
    api_key: Option<String>,
    index_name: Option<String>,
    api_version: Option<String>,
    timeout: Option<Duration>,
    fields: Option<FieldNames>,
}

impl SearchConfigBuilder {
    /// Populates unset fields from environment variables.
    #[must_use]
    pub fn from_env(mut self) -> Self {
        if self.endpoint.is_none() {
            self.endpoint = std::env::var("AZURE_SEARCH_ENDPOINT").ok();
        }
        if self.api_key.is_none() {
            self.api_key = std::env::var("AZURE_SEARCH_KEY").ok();
        }
        if self.index_name.is_none() {
            self.index_name = std::env::var("AZURE_SEARCH_INDEX_NAME").ok();
        }
        if self.api_version.is_none() {
            self.api_version = std::env::var("AZURE_SEARCH_API_VERSION").ok();
        }
        self
    }

    /// Sets the service endpoint.
    #[must_use]
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Sets the API key.
    #[must_use]
    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Sets the index name.
    #[must_use]
    pub fn index_name(mut self, name: impl Into<String>) -> Self {
        self.index_name = Some(name.into());
        self
    }

    /// Sets the REST API version.
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

    /// Sets the index field names.
    #[must_use]
    pub fn fields(mut self, fields: FieldNames) -> Self {
        self.fields = Some(fields);
        self
    }

    /// Builds the [`SearchConfig`].
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::NotConfigured`] if the endpoint or key is missing.
    pub fn build(self) -> Result<SearchConfig, SearchError> {
        let endpoint = self
            .endpoint
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| SearchError::NotConfigured {
                message: "AZURE_SEARCH_ENDPOINT is required".to_string(),
            })?;
        let api_key = self
            .api_key
            .filter(|k| !k.is_empty())
            .ok_or_else(|| SearchError::NotConfigured {
                message: "AZURE_SEARCH_KEY is required".to_string(),
            })?;

        Ok(SearchConfig {
            endpoint: normalize_endpoint(&endpoint),
            api_key,
            index_name: self
                .index_name
                .unwrap_or_else(|| DEFAULT_INDEX_NAME.to_string()),
            api_version: self
                .api_version
                .unwrap_or_else(|| DEFAULT_API_VERSION.to_string()),
            timeout: self
                .timeout
                .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
            fields: self.fields.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = SearchConfig::builder()
            .endpoint("my-service.search.windows.net")
            .api_key("k")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.endpoint, "https://my-service.search.windows.net");
        assert_eq!(config.index_name, DEFAULT_INDEX_NAME);
        assert_eq!(config.api_version, DEFAULT_API_VERSION);
        assert_eq!(config.fields.content, "chunk");
    }

    #[test]
    fn test_endpoint_with_scheme_kept() {
        let config = SearchConfig::builder()
            .endpoint("http://localhost:8080/")
            .api_key("k")
            .build()
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(config.endpoint, "http://localhost:8080");
    }

    #[test]
    fn test_missing_endpoint() {
        let result = SearchConfig::builder().api_key("k").build();
        assert!(matches!(result, Err(SearchError::NotConfigured { .. })));
    }

    #[test]
    fn test_missing_key() {
        let result = SearchConfig::builder().endpoint("x").build();
        assert!(matches!(result, Err(SearchError::NotConfigured { .. })));
    }
}
