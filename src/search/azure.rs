//! Azure AI Search REST backend.
//!
//! Talks to the `docs/search` and `docs/index` endpoints with `reqwest`,
//! and reads the index definition for inspection. Request bodies and
//! response pages are built and decoded by free functions so they can be
//! tested without a live service.

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::debug;

use super::config::{FieldNames, SearchConfig};
use super::normalize::{CONTENT_KEY, ID_KEY, TITLE_KEY, VECTOR_KEY};
use super::{SearchBackend, SearchMode, SearchPage, SearchRequest, TOTAL_COUNT_KEY};
use crate::error::SearchError;

/// Semantic configuration name expected on the index.
const SEMANTIC_CONFIGURATION: &str = "default";

/// Azure AI Search backend.
pub struct AzureSearchBackend {
    client: reqwest::Client,
    config: SearchConfig,
}

impl AzureSearchBackend {
    /// Creates a backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Request`] if the HTTP client cannot be built.
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| SearchError::Request {
                message: e.to_string(),
                status: None,
            })?;
        Ok(Self { client, config })
    }

    fn url(&self, operation: &str) -> String {
        format!(
            "{}/indexes/{}/docs/{operation}?api-version={}",
            self.config.endpoint, self.config.index_name, self.config.api_version
        )
    }

    fn index_url(&self) -> String {
        format!(
            "{}/indexes/{}?api-version={}",
            self.config.endpoint, self.config.index_name, self.config.api_version
        )
    }

    async fn post(&self, operation: &str, body: &Value) -> Result<Value, SearchError> {
        self.send(self.client.post(self.url(operation)).json(body)).await
    }

    async fn send(&self, request: reqwest::RequestBuilder) -> Result<Value, SearchError> {
        let response = request
            .header("api-key", &self.config.api_key)
            .send()
            .await
            .map_err(|e| SearchError::Request {
                message: e.to_string(),
                status: e.status().map(|s| s.as_u16()),
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(SearchError::Request {
                message: if message.is_empty() {
                    status.to_string()
                } else {
                    message
                },
                status: Some(status.as_u16()),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| SearchError::Decode {
                message: e.to_string(),
            })
    }

    /// Reads the index definition: fields, their types, and vector setup.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] if the request fails or the definition
    /// cannot be decoded.
    pub async fn index_schema(&self) -> Result<IndexSchema, SearchError> {
        debug!(index = %self.config.index_name, "reading index definition");
        let body = self.send(self.client.get(self.index_url())).await?;
        parse_index_schema(body)
    }
}

impl std::fmt::Debug for AzureSearchBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzureSearchBackend")
            .field("endpoint", &self.config.endpoint)
            .field("index_name", &self.config.index_name)
            .finish_non_exhaustive()
    }
}

fn vector_query(vector: &[f32], top: usize, field: &str) -> Value {
    json!({
        "kind": "vector",
        "vector": vector,
        "k": top,
        "fields": field,
    })
}

/// Builds the `docs/search` request body for one request.
///
/// # Errors
///
/// Returns [`SearchError::MissingVector`] for vector and hybrid requests
/// without a vector.
pub fn build_search_body(request: &SearchRequest, fields: &FieldNames) -> Result<Value, SearchError> {
    let text = request.text.clone().unwrap_or_else(|| "*".to_string());
    let body = match request.mode {
        SearchMode::Keyword => json!({
            "search": text,
            "top": request.top,
            "count": true,
        }),
        SearchMode::Semantic => json!({
            "search": text,
            "top": request.top,
            "count": true,
            "queryType": "semantic",
            "semanticConfiguration": SEMANTIC_CONFIGURATION,
            "captions": "extractive",
            "answers": "extractive",
        }),
        SearchMode::Vector => json!({
            "top": request.top,
            "vectorQueries": [vector_query(request.require_vector()?, request.top, &fields.vector)],
        }),
        SearchMode::Hybrid => json!({
            "search": text,
            "top": request.top,
            "count": true,
            "vectorQueries": [vector_query(request.require_vector()?, request.top, &fields.vector)],
        }),
    };
    Ok(body)
}

/// Decodes a `docs/search` response into a page.
///
/// # Errors
///
/// Returns [`SearchError::Decode`] if the body has no `value` array.
pub fn parse_search_response(body: Value) -> Result<SearchPage, SearchError> {
    let Value::Object(mut root) = body else {
        return Err(SearchError::Decode {
            message: "response is not a JSON object".to_string(),
        });
    };
    let total_count = root.get(TOTAL_COUNT_KEY).and_then(Value::as_u64);
    let Some(Value::Array(values)) = root.remove("value") else {
        return Err(SearchError::Decode {
            message: "response has no 'value' array".to_string(),
        });
    };

    let records = values
        .into_iter()
        .filter_map(|v| match v {
            Value::Object(map) => Some(map),
            _ => None,
        })
        .collect();

    Ok(SearchPage {
        records,
        total_count,
    })
}

/// Renames canonical keys to the deployment's field names for upload.
#[must_use]
pub fn to_deployment_record(record: Map<String, Value>, fields: &FieldNames) -> Map<String, Value> {
    record
        .into_iter()
        .map(|(k, v)| {
            let key = match k.as_str() {
                ID_KEY => fields.id.clone(),
                CONTENT_KEY => fields.content.clone(),
                TITLE_KEY => fields.title.clone(),
                VECTOR_KEY => fields.vector.clone(),
                _ => k,
            };
            (key, v)
        })
        .collect()
}

/// One field of a search index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexField {
    /// Field name.
    pub name: String,
    /// EDM type, e.g. `Edm.String` or `Collection(Edm.Single)`.
    #[serde(rename = "type")]
    pub field_type: String,
    /// Whether full-text search covers the field.
    #[serde(default)]
    pub searchable: bool,
    /// Vector dimensions, for vector fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dimensions: Option<u32>,
    /// Vector search profile, for vector fields.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_search_profile: Option<String>,
}

/// A vector search profile and the algorithm it uses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VectorProfile {
    /// Profile name.
    pub name: String,
    /// Algorithm configuration name.
    #[serde(default)]
    pub algorithm: String,
}

/// Index definition as reported by the service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IndexSchema {
    /// Index name.
    pub name: String,
    /// Fields in definition order.
    pub fields: Vec<IndexField>,
    /// Vector search profiles.
    pub vector_profiles: Vec<VectorProfile>,
}

impl fmt::Display for IndexSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Index: {}", self.name)?;
        writeln!(f)?;
        writeln!(f, "Fields:")?;
        for field in &self.fields {
            writeln!(f, "  {} ({})", field.name, field.field_type)?;
            if let Some(dimensions) = field.dimensions {
                writeln!(f, "    vector dimensions: {dimensions}")?;
            }
            if let Some(profile) = &field.vector_search_profile {
                writeln!(f, "    vector profile: {profile}")?;
            }
            if field.searchable {
                writeln!(f, "    searchable")?;
            }
        }
        if !self.vector_profiles.is_empty() {
            writeln!(f)?;
            writeln!(f, "Vector profiles:")?;
            for profile in &self.vector_profiles {
                writeln!(f, "  {} (algorithm: {})", profile.name, profile.algorithm)?;
            }
        }
        Ok(())
    }
}

/// Decodes an `indexes/{name}` response.
///
/// # Errors
///
/// Returns [`SearchError::Decode`] if the name or fields are missing or malformed.
pub fn parse_index_schema(body: Value) -> Result<IndexSchema, SearchError> {
    let decode = |e: serde_json::Error| SearchError::Decode {
        message: e.to_string(),
    };
    let name = body
        .get("name")
        .and_then(Value::as_str)
        .ok_or_else(|| SearchError::Decode {
            message: "index definition has no 'name'".to_string(),
        })?
        .to_string();
    let fields = body
        .get("fields")
        .cloned()
        .ok_or_else(|| SearchError::Decode {
            message: "index definition has no 'fields' array".to_string(),
        })?;
    let fields: Vec<IndexField> = serde_json::from_value(fields).map_err(decode)?;
    let vector_profiles = match body.pointer("/vectorSearch/profiles") {
        Some(profiles) if !profiles.is_null() => {
            serde_json::from_value(profiles.clone()).map_err(decode)?
        }
        _ => Vec::new(),
    };
    Ok(IndexSchema {
        name,
        fields,
        vector_profiles,
    })
}

/// Counts successful entries in a `docs/index` response.
fn count_indexed(body: &Value) -> Result<usize, SearchError> {
    let results = body
        .get("value")
        .and_then(Value::as_array)
        .ok_or_else(|| SearchError::Decode {
            message: "index response has no 'value' array".to_string(),
        })?;

    let failed: Vec<&str> = results
        .iter()
        .filter(|r| !r.get("status").and_then(Value::as_bool).unwrap_or(false))
        .filter_map(|r| r.get("errorMessage").and_then(Value::as_str))
        .collect();
    if let Some(first) = failed.first() {
        return Err(SearchError::Request {
            message: (*first).to_string(),
            status: None,
        });
    }
    Ok(results.len())
}

#[async_trait]
impl SearchBackend for AzureSearchBackend {
    fn name(&self) -> &'static str {
        "azure"
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        let body = build_search_body(request, &self.config.fields)?;
        debug!(mode = %request.mode, top = request.top, "azure search");
        let response = self.post("search", &body).await?;
        parse_search_response(response)
    }

    async fn upload(&self, records: Vec<Map<String, Value>>) -> Result<usize, SearchError> {
        let value: Vec<Value> = records
            .into_iter()
            .map(|r| {
                let mut doc = to_deployment_record(r, &self.config.fields);
                doc.insert("@search.action".to_string(), json!("upload"));
                Value::Object(doc)
            })
            .collect();
        let response = self.post("index", &json!({ "value": value })).await?;
        count_indexed(&response)
    }
}
