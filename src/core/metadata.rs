//! Retrieval metadata attached to every RAG answer.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::document::{SearchResult, SearchType};

/// Facts about how an answer's context was retrieved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalMetadata {
    /// Number of documents passed to the generator.
    pub num_documents: usize,
    /// How the documents were retrieved.
    pub search_type: SearchType,
    /// Backend scores of the passed documents, in order.
    #[serde(default)]
    pub scores: Vec<f64>,
    /// Time spent retrieving.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub retrieval_time: Option<Duration>,
    /// Time spent generating.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_opt_duration",
        deserialize_with = "deserialize_opt_duration"
    )]
    pub generation_time: Option<Duration>,
    /// Total tokens reported by the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<u32>,
    /// Tokens in the selected context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_tokens: Option<usize>,
    /// Pipeline-specific flags, e.g. `multi_step`, `context_management`.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub additional_info: Map<String, Value>,
}

#[allow(clippy::ref_option)]
fn serialize_opt_duration<S>(d: &Option<Duration>, s: S) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    match d {
        Some(d) => s.serialize_f64(d.as_secs_f64()),
        None => s.serialize_none(),
    }
}

fn deserialize_opt_duration<'de, D>(d: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let secs = Option::<f64>::deserialize(d)?;
    Ok(secs
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64))
}

impl RetrievalMetadata {
    /// Creates empty metadata for the given search type.
    #[must_use]
    pub fn new(search_type: SearchType) -> Self {
        Self {
            num_documents: 0,
            search_type,
            scores: Vec::new(),
            retrieval_time: None,
            generation_time: None,
            total_tokens: None,
            context_tokens: None,
            additional_info: Map::new(),
        }
    }

    /// Builds metadata from a result list: document count and scores.
    #[must_use]
    pub fn from_results(results: &[SearchResult], search_type: SearchType) -> Self {
        Self {
            num_documents: results.len(),
            scores: results.iter().map(|r| r.score).collect(),
            ..Self::new(search_type)
        }
    }

    /// Records an additional-info entry.
    pub fn insert_info(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.additional_info.insert(key.into(), value.into());
    }

    /// Mean of the recorded scores.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn average_score(&self) -> Option<f64> {
        if self.scores.is_empty() {
            None
        } else {
            Some(self.scores.iter().sum::<f64>() / self.scores.len() as f64)
        }
    }

    /// Lowest and highest recorded score.
    #[must_use]
    pub fn score_range(&self) -> Option<(f64, f64)> {
        let min = self.scores.iter().copied().reduce(f64::min)?;
        let max = self.scores.iter().copied().reduce(f64::max)?;
        Some((min, max))
    }

    /// Human-readable multi-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        let mut out = format!(
            "Documents Retrieved: {}\nSearch Type: {}",
            self.num_documents, self.search_type
        );
        if let Some(avg) = self.average_score() {
            let _ = write!(out, "\nAverage Relevance Score: {avg:.4}");
        }
        if let Some((min, max)) = self.score_range() {
            let _ = write!(out, "\nScore Range: {min:.4} - {max:.4}");
        }
        if let Some(t) = self.retrieval_time {
            let _ = write!(out, "\nRetrieval Time: {:.2}s", t.as_secs_f64());
        }
        if let Some(t) = self.generation_time {
            let _ = write!(out, "\nGeneration Time: {:.2}s", t.as_secs_f64());
        }
        if let Some(tokens) = self.context_tokens {
            let _ = write!(out, "\nContext Tokens: {tokens}");
        }
        if let Some(tokens) = self.total_tokens {
            let _ = write!(out, "\nTotal Tokens: {tokens}");
        }
        out
    }
}
