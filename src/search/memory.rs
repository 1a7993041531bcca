//! In-memory search backend.
//!
//! Holds a corpus of records loaded from a JSON array and scores them
//! locally: term-frequency/IDF for keyword, cosine for vector,
//! reciprocal-rank fusion for hybrid and a query-coverage reranker for
//! semantic. Used for offline runs and tests.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::normalize::{
    CONTENT_KEY, FieldAliases, RERANKER_KEYS, SCORE_KEY, TITLE_KEY, VECTOR_KEY, normalize_record,
};
use super::{SearchBackend, SearchMode, SearchPage, SearchRequest};
use crate::error::SearchError;

/// Reciprocal-rank fusion constant.
const RRF_K: f64 = 60.0;
/// Keyword candidates considered by the semantic reranker.
const RERANK_CANDIDATES: usize = 50;
/// Upper bound of the reranker scale.
const RERANKER_MAX: f64 = 4.0;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "about", "do", "does", "for", "how", "in", "is", "me", "of", "on",
    "or", "the", "to", "what",
];

/// Lowercased query/document terms.
fn terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .collect()
}

fn cosine(a: &[f32], b: &[f32]) -> Option<f64> {
    if a.len() != b.len() || a.is_empty() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
    for (x, y) in a.iter().zip(b) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

#[allow(clippy::cast_possible_truncation)]
fn record_vector(record: &Map<String, Value>) -> Option<Vec<f32>> {
    record.get(VECTOR_KEY).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_f64)
            .map(|f| f as f32)
            .collect()
    })
}

/// A searchable record with its precomputed term counts.
#[derive(Debug, Clone)]
struct Entry {
    record: Map<String, Value>,
    term_counts: HashMap<String, usize>,
}

impl Entry {
    fn new(record: Map<String, Value>) -> Self {
        let mut text = String::new();
        for key in [TITLE_KEY, CONTENT_KEY] {
            if let Some(Value::String(s)) = record.get(key) {
                text.push_str(s);
                text.push(' ');
            }
        }
        let mut term_counts = HashMap::new();
        for term in terms(&text) {
            *term_counts.entry(term).or_insert(0) += 1;
        }
        Self {
            record,
            term_counts,
        }
    }
}

/// Corpus-backed search backend.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    aliases: FieldAliases,
    entries: RwLock<Vec<Entry>>,
}

impl InMemoryBackend {
    /// Creates an empty backend resolving fields with `aliases`.
    #[must_use]
    pub fn new(aliases: FieldAliases) -> Self {
        Self {
            aliases,
            entries: RwLock::new(Vec::new()),
        }
    }

    /// Creates a backend holding `records`.
    #[must_use]
    pub fn with_records(aliases: FieldAliases, records: Vec<Map<String, Value>>) -> Self {
        let backend = Self::new(aliases);
        backend.insert(records);
        backend
    }

    /// Loads a backend from a JSON file holding an array of records.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Decode`] if the file is unreadable or not an
    /// array of objects.
    pub fn from_json_file(path: &Path, aliases: FieldAliases) -> Result<Self, SearchError> {
        let text = std::fs::read_to_string(path).map_err(|e| SearchError::Decode {
            message: format!("{}: {e}", path.display()),
        })?;
        let records: Vec<Map<String, Value>> =
            serde_json::from_str(&text).map_err(|e| SearchError::Decode {
                message: format!("{}: {e}", path.display()),
            })?;
        Ok(Self::with_records(aliases, records))
    }

    /// Number of records held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if the corpus is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored records in canonical form.
    #[must_use]
    pub fn records(&self) -> Vec<Map<String, Value>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|e| e.record.clone())
            .collect()
    }

    /// Writes the corpus back as a JSON array.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::Decode`] if the file cannot be written.
    pub fn save_json_file(&self, path: &Path) -> Result<(), SearchError> {
        let text = serde_json::to_string_pretty(&self.records()).map_err(|e| {
            SearchError::Decode {
                message: e.to_string(),
            }
        })?;
        std::fs::write(path, text).map_err(|e| SearchError::Decode {
            message: format!("{}: {e}", path.display()),
        })
    }

    /// Normalizes and stores records, replacing any with the same id.
    fn insert(&self, records: Vec<Map<String, Value>>) -> usize {
        let mut entries = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let count = records.len();
        for raw in records {
            let entry = Entry::new(normalize_record(&raw, &self.aliases));
            let id = entry.record.get("id").cloned();
            if let Some(existing) = entries.iter_mut().find(|e| e.record.get("id") == id.as_ref()) {
                *existing = entry;
            } else {
                entries.push(entry);
            }
        }
        count
    }

    /// Keyword ranking over all entries: `(index, score)`, best first.
    #[allow(clippy::cast_precision_loss)]
    fn keyword_rank(entries: &[Entry], query: &str) -> Vec<(usize, f64)> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        let n = entries.len() as f64;
        let idf: HashMap<&str, f64> = query_terms
            .iter()
            .map(|t| {
                let df = entries
                    .iter()
                    .filter(|e| e.term_counts.contains_key(t))
                    .count() as f64;
                (t.as_str(), (1.0 + n / (1.0 + df)).ln())
            })
            .collect();

        let mut ranked: Vec<(usize, f64)> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                let score: f64 = idf
                    .iter()
                    .filter_map(|(t, w)| e.term_counts.get(*t).map(|c| *c as f64 * w))
                    .sum();
                (score > 0.0).then_some((i, score))
            })
            .collect();
        sort_desc(&mut ranked);
        ranked
    }

    fn vector_rank(entries: &[Entry], vector: &[f32]) -> Vec<(usize, f64)> {
        let mut ranked: Vec<(usize, f64)> = entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| {
                record_vector(&e.record)
                    .and_then(|v| cosine(&v, vector))
                    .map(|s| (i, s))
            })
            .collect();
        sort_desc(&mut ranked);
        ranked
    }

    #[allow(clippy::cast_precision_loss)]
    fn fuse(lists: &[Vec<(usize, f64)>]) -> Vec<(usize, f64)> {
        let mut fused: HashMap<usize, f64> = HashMap::new();
        for list in lists {
            for (rank, (i, _)) in list.iter().enumerate() {
                *fused.entry(*i).or_insert(0.0) += 1.0 / (RRF_K + rank as f64 + 1.0);
            }
        }
        let mut ranked: Vec<(usize, f64)> = fused.into_iter().collect();
        ranked.sort_by_key(|(i, _)| *i);
        sort_desc(&mut ranked);
        ranked
    }

    /// Reranks keyword candidates by the share of query terms they cover.
    #[allow(clippy::cast_precision_loss)]
    fn rerank(entries: &[Entry], query: &str, candidates: Vec<(usize, f64)>) -> Vec<(usize, f64, f64)> {
        let query_terms: HashSet<String> = terms(query).into_iter().collect();
        let total = query_terms.len().max(1) as f64;
        let mut reranked: Vec<(usize, f64, f64)> = candidates
            .into_iter()
            .take(RERANK_CANDIDATES)
            .map(|(i, score)| {
                let covered = query_terms
                    .iter()
                    .filter(|t| entries[i].term_counts.contains_key(*t))
                    .count() as f64;
                (i, score, RERANKER_MAX * covered / total)
            })
            .collect();
        reranked.sort_by(|a, b| b.2.total_cmp(&a.2).then(b.1.total_cmp(&a.1)));
        reranked
    }
}

fn sort_desc(ranked: &mut [(usize, f64)]) {
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
}

fn annotated(record: &Map<String, Value>, score: f64, reranker: Option<f64>) -> Map<String, Value> {
    let mut out = record.clone();
    out.insert(SCORE_KEY.to_string(), Value::from(score));
    if let Some(r) = reranker {
        out.insert(RERANKER_KEYS[0].to_string(), Value::from(r));
    }
    out
}

#[async_trait]
impl SearchBackend for InMemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn search(&self, request: &SearchRequest) -> Result<SearchPage, SearchError> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let text = request.text.as_deref().unwrap_or_default();

        let (records, total): (Vec<Map<String, Value>>, usize) = match request.mode {
            SearchMode::Keyword => {
                let ranked = Self::keyword_rank(&entries, text);
                let total = ranked.len();
                let records = ranked
                    .into_iter()
                    .take(request.top)
                    .map(|(i, s)| annotated(&entries[i].record, s, None))
                    .collect();
                (records, total)
            }
            SearchMode::Vector => {
                let ranked = Self::vector_rank(&entries, request.require_vector()?);
                let total = ranked.len();
                let records = ranked
                    .into_iter()
                    .take(request.top)
                    .map(|(i, s)| annotated(&entries[i].record, s, None))
                    .collect();
                (records, total)
            }
            SearchMode::Hybrid => {
                let vector = request.require_vector()?;
                let ranked = Self::fuse(&[
                    Self::keyword_rank(&entries, text),
                    Self::vector_rank(&entries, vector),
                ]);
                let total = ranked.len();
                let records = ranked
                    .into_iter()
                    .take(request.top)
                    .map(|(i, s)| annotated(&entries[i].record, s, None))
                    .collect();
                (records, total)
            }
            SearchMode::Semantic => {
                let candidates = Self::keyword_rank(&entries, text);
                let total = candidates.len();
                let records = Self::rerank(&entries, text, candidates)
                    .into_iter()
                    .take(request.top)
                    .map(|(i, s, r)| annotated(&entries[i].record, s, Some(r)))
                    .collect();
                (records, total)
            }
        };

        Ok(SearchPage {
            records,
            total_count: Some(total as u64),
        })
    }

    async fn upload(&self, records: Vec<Map<String, Value>>) -> Result<usize, SearchError> {
        Ok(self.insert(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn corpus() -> InMemoryBackend {
        let records = vec![
            json!({"chunk_id": "ml", "title": "Machine Learning", "chunk": "Machine learning is a field of artificial intelligence that learns from data.", "text_vector": [1.0, 0.0, 0.0]}),
            json!({"chunk_id": "rag", "title": "RAG", "chunk": "Retrieval augmented generation combines search with a language model.", "text_vector": [0.0, 1.0, 0.0]}),
            json!({"chunk_id": "vec", "title": "Vector Search", "chunk": "Vector search finds similar embeddings. Machine learning produces embeddings.", "text_vector": [0.7, 0.7, 0.0]}),
        ];
        let records = records
            .into_iter()
            .filter_map(|v| match v {
                Value::Object(m) => Some(m),
                _ => None,
            })
            .collect();
        InMemoryBackend::with_records(FieldAliases::default(), records)
    }

    fn ids(page: &SearchPage) -> Vec<String> {
        page.records
            .iter()
            .filter_map(|r| r.get("id").and_then(Value::as_str).map(str::to_string))
            .collect()
    }

    #[tokio::test]
    async fn test_keyword_search() {
        let backend = corpus();
        let page = backend
            .search(&SearchRequest::text("machine learning", SearchMode::Keyword, 5))
            .await
            .unwrap_or_default();
        let found = ids(&page);
        assert_eq!(found.len(), 2);
        assert!(found.contains(&"ml".to_string()));
        assert!(!found.contains(&"rag".to_string()));
        assert_eq!(page.total_count, Some(2));
        assert!(page.records[0].contains_key(SCORE_KEY));
    }

    #[tokio::test]
    async fn test_keyword_top_limits_results() {
        let backend = corpus();
        let page = backend
            .search(&SearchRequest::text("machine learning", SearchMode::Keyword, 1))
            .await
            .unwrap_or_default();
        assert_eq!(page.records.len(), 1);
        assert_eq!(page.total_count, Some(2));
    }

    #[tokio::test]
    async fn test_vector_search_orders_by_cosine() {
        let backend = corpus();
        let request = SearchRequest {
            text: None,
            vector: Some(vec![0.0, 1.0, 0.0]),
            mode: SearchMode::Vector,
            top: 2,
        };
        let page = backend.search(&request).await.unwrap_or_default();
        assert_eq!(ids(&page), vec!["rag".to_string(), "vec".to_string()]);
    }

    #[tokio::test]
    async fn test_hybrid_requires_vector() {
        let backend = corpus();
        let result = backend
            .search(&SearchRequest::text("rag", SearchMode::Hybrid, 3))
            .await;
        assert!(matches!(result, Err(SearchError::MissingVector { .. })));
    }

    #[tokio::test]
    async fn test_hybrid_fuses_both_rankings() {
        let backend = corpus();
        let request =
            SearchRequest::text("machine learning", SearchMode::Hybrid, 3).with_vector(vec![0.6, 0.8, 0.0]);
        let page = backend.search(&request).await.unwrap_or_default();
        // "vec" is second by keyword but first by vector.
        assert_eq!(ids(&page).first().map(String::as_str), Some("vec"));
    }

    #[tokio::test]
    async fn test_semantic_sets_reranker_score() {
        let backend = corpus();
        let page = backend
            .search(&SearchRequest::text("machine learning data", SearchMode::Semantic, 3))
            .await
            .unwrap_or_default();
        assert_eq!(ids(&page).first().map(String::as_str), Some("ml"));
        let top = page.records[0]
            .get(RERANKER_KEYS[0])
            .and_then(Value::as_f64)
            .unwrap_or_default();
        assert!((top - RERANKER_MAX).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_upload_replaces_same_id() {
        let backend = corpus();
        let mut record = Map::new();
        record.insert("id".to_string(), json!("ml"));
        record.insert("content".to_string(), json!("Replaced text about gardening."));
        let count = backend.upload(vec![record]).await.unwrap_or(0);
        assert_eq!(count, 1);
        assert_eq!(backend.len(), 3);

        let page = backend
            .search(&SearchRequest::text("gardening", SearchMode::Keyword, 3))
            .await
            .unwrap_or_default();
        assert_eq!(ids(&page), vec!["ml".to_string()]);
    }

    #[tokio::test]
    async fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap_or_else(|_| unreachable!());
        let path = dir.path().join("corpus.json");
        corpus().save_json_file(&path).unwrap_or_else(|_| unreachable!());

        let reloaded = InMemoryBackend::from_json_file(&path, FieldAliases::default())
            .unwrap_or_default();
        assert_eq!(reloaded.len(), 3);
        let page = reloaded
            .search(&SearchRequest::text("retrieval", SearchMode::Keyword, 3))
            .await
            .unwrap_or_default();
        assert_eq!(ids(&page), vec!["rag".to_string()]);
    }

    #[test]
    fn test_terms_drop_stopwords() {
        assert_eq!(terms("What is Machine-Learning?"), vec!["machine", "learning"]);
    }

    #[test]
    fn test_cosine_mismatch() {
        assert!(cosine(&[1.0], &[1.0, 0.0]).is_none());
        assert!(cosine(&[0.0, 0.0], &[1.0, 0.0]).is_none());
    }
}
