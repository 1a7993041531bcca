//! Scripted test doubles shared by unit tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::agent::generator::{Generate, Generation, GenerationRequest};
use crate::context::Tokenizer;
use crate::core::SearchResult;
use crate::embedding::Embedder;
use crate::error::{AgentError, EmbeddingError, SearchError};
use crate::search::{Retrieve, SearchBackend, SearchPage, SearchRequest};

/// Backend whose every call fails.
pub struct FailingBackend;

#[async_trait]
impl SearchBackend for FailingBackend {
    fn name(&self) -> &'static str {
        "failing"
    }

    async fn search(&self, _request: &SearchRequest) -> Result<SearchPage, SearchError> {
        Err(SearchError::Request {
            message: "backend unavailable".to_string(),
            status: Some(503),
        })
    }

    async fn upload(&self, _records: Vec<Map<String, Value>>) -> Result<usize, SearchError> {
        Err(SearchError::Request {
            message: "backend unavailable".to_string(),
            status: Some(503),
        })
    }
}

/// Embedder returning the same vector for every text.
pub struct FixedEmbedder {
    vector: Vec<f32>,
}

impl FixedEmbedder {
    pub fn new(vector: Vec<f32>) -> Self {
        Self { vector }
    }
}

#[async_trait]
impl Embedder for FixedEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|_| self.vector.clone()).collect())
    }
}

/// Records in the default deployment schema (`chunk_id`, `chunk`, ...).
pub fn sample_records() -> Vec<Map<String, Value>> {
    [
        json!({
            "chunk_id": "ml-intro",
            "title": "Machine Learning",
            "chunk": "Machine learning is a field of artificial intelligence where models learn patterns from data.",
            "text_vector": [1.0, 0.0, 0.0]
        }),
        json!({
            "chunk_id": "rag-overview",
            "title": "Retrieval-Augmented Generation",
            "chunk": "Retrieval-augmented generation grounds language model answers in retrieved documents.",
            "text_vector": [0.0, 1.0, 0.0]
        }),
        json!({
            "chunk_id": "vector-search",
            "title": "Vector Search",
            "chunk": "Vector search ranks documents by embedding similarity, complementing keyword search in Azure AI Search.",
            "text_vector": [0.0, 0.7, 0.7]
        }),
    ]
    .into_iter()
    .filter_map(|v| match v {
        Value::Object(map) => Some(map),
        _ => None,
    })
    .collect()
}

/// Whitespace tokenizer: one token per word of up to six lowercase letters.
pub struct WordTokenizer;

impl Tokenizer for WordTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.split_whitespace()
            .map(|word| {
                word.bytes()
                    .filter(u8::is_ascii_lowercase)
                    .take(6)
                    .fold(0u32, |acc, b| acc * 27 + u32::from(b - b'a' + 1))
            })
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Option<String> {
        let words: Vec<String> = tokens
            .iter()
            .map(|&token| {
                let mut letters = Vec::new();
                let mut rest = token;
                while rest > 0 {
                    let digit = u8::try_from(rest % 27).unwrap_or(0);
                    letters.push(char::from(b'a' + digit.saturating_sub(1)));
                    rest /= 27;
                }
                letters.iter().rev().collect()
            })
            .collect();
        Some(words.join(" "))
    }
}

/// Generator replaying queued responses and recording each request.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<String, String>>>,
    calls: Mutex<Vec<GenerationRequest>>,
}

impl ScriptedGenerator {
    pub fn new<I, S>(responses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_results(responses.into_iter().map(|s| Ok(s.into())).collect())
    }

    /// `Err` entries become provider failures.
    pub fn from_results(script: Vec<Result<String, String>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<GenerationRequest> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Generate for ScriptedGenerator {
    async fn generate(&self, request: &GenerationRequest) -> Result<Generation, AgentError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(request.clone());
        }
        let next = self.script.lock().ok().and_then(|mut s| s.pop_front());
        match next {
            Some(Ok(text)) => Ok(Generation::text(text)),
            Some(Err(message)) => Err(AgentError::ApiRequest {
                message,
                status: Some(500),
            }),
            None => Err(AgentError::Orchestration {
                message: "script exhausted".to_string(),
            }),
        }
    }
}

/// Retriever answering from a fixed query table.
#[derive(Default)]
pub struct ScriptedRetriever {
    answers: HashMap<String, Vec<SearchResult>>,
    failing: HashSet<String>,
    queries: Mutex<Vec<String>>,
}

impl ScriptedRetriever {
    pub fn with(mut self, query: &str, results: Vec<SearchResult>) -> Self {
        self.answers.insert(query.to_string(), results);
        self
    }

    pub fn failing(mut self, query: &str) -> Self {
        self.failing.insert(query.to_string());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().map(|q| q.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Retrieve for ScriptedRetriever {
    async fn retrieve(&self, query: &str, count: usize) -> Result<Vec<SearchResult>, SearchError> {
        if let Ok(mut queries) = self.queries.lock() {
            queries.push(query.to_string());
        }
        if self.failing.contains(query) {
            return Err(SearchError::Request {
                message: format!("scripted failure for {query:?}"),
                status: None,
            });
        }
        Ok(self
            .answers
            .get(query)
            .map(|r| r.iter().take(count).cloned().collect())
            .unwrap_or_default())
    }
}
