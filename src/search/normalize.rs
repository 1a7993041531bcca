//! Result normalization.
//!
//! Search indexes disagree on field names: one deployment stores content in
//! `chunk`, another in `content`, vectors live under `text_vector` or
//! `contentVector`. Every raw record passes through [`normalize_record`]
//! before it is turned into a [`SearchResult`], so nothing downstream has to
//! know which schema produced it.
//!
//! Resolution per field: canonical name first, then the aliases in table
//! order. Nulls count as absent. `id` and `content` default to `""`; the
//! optional fields are omitted.

use serde_json::{Map, Value};

use crate::core::{Document, SearchResult};

/// Canonical identity key.
pub const ID_KEY: &str = "id";
/// Canonical content key.
pub const CONTENT_KEY: &str = "content";
/// Canonical title key.
pub const TITLE_KEY: &str = "title";
/// Canonical category key.
pub const CATEGORY_KEY: &str = "category";
/// Canonical vector key.
pub const VECTOR_KEY: &str = "contentVector";

/// Backend relevance score annotation.
pub const SCORE_KEY: &str = "@search.score";
/// Reranker score annotation keys, SDK spelling first.
pub const RERANKER_KEYS: [&str; 2] = ["@search.reranker_score", "@search.rerankerScore"];
/// Prefix of backend annotations.
const ANNOTATION_PREFIX: &str = "@search.";

/// Ordered alias lists for each canonical field.
///
/// The first entry of each list is the canonical name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldAliases {
    id: Vec<String>,
    content: Vec<String>,
    title: Vec<String>,
    category: Vec<String>,
    vector: Vec<String>,
}

impl Default for FieldAliases {
    fn default() -> Self {
        Self {
            id: to_owned(&[ID_KEY, "chunk_id"]),
            content: to_owned(&[CONTENT_KEY, "chunk", "text"]),
            title: to_owned(&[TITLE_KEY]),
            category: to_owned(&[CATEGORY_KEY]),
            vector: to_owned(&[VECTOR_KEY, "content_vector", "text_vector"]),
        }
    }
}

fn to_owned(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| (*s).to_string()).collect()
}

/// Inserts `name` right after the canonical entry unless already listed.
fn promote(list: &mut Vec<String>, name: &str) {
    if name.is_empty() || list.iter().any(|n| n == name) {
        return;
    }
    list.insert(1.min(list.len()), name.to_string());
}

impl FieldAliases {
    /// Alias table with a deployment's own field names ranked ahead of the
    /// built-in aliases.
    #[must_use]
    pub fn with_deployment_fields(id: &str, content: &str, title: &str, vector: &str) -> Self {
        let mut aliases = Self::default();
        promote(&mut aliases.id, id);
        promote(&mut aliases.content, content);
        promote(&mut aliases.title, title);
        promote(&mut aliases.vector, vector);
        aliases
    }

    /// Returns `true` if `key` is any name this table resolves.
    fn is_alias(&self, key: &str) -> bool {
        [
            &self.id,
            &self.content,
            &self.title,
            &self.category,
            &self.vector,
        ]
        .iter()
        .any(|list| list.iter().any(|n| n == key))
    }
}

/// Finds the first non-null value among `names`.
fn resolve<'a>(record: &'a Map<String, Value>, names: &[String]) -> Option<&'a Value> {
    names
        .iter()
        .filter_map(|n| record.get(n))
        .find(|v| !v.is_null())
}

/// Renders a scalar field as text.
fn as_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Finds the first alias holding a numeric array.
fn resolve_vector<'a>(record: &'a Map<String, Value>, names: &[String]) -> Option<&'a Value> {
    names.iter().filter_map(|n| record.get(n)).find(|v| {
        v.as_array()
            .is_some_and(|items| items.iter().all(Value::is_number))
    })
}

/// Normalizes one raw record into canonical key form.
///
/// The output always has string `id` and `content` keys; `title`,
/// `category` and `contentVector` appear only when some alias resolved.
/// Keys outside the alias table (including `@search.*` annotations) are
/// carried over untouched. Normalizing the output again yields the same
/// record.
#[must_use]
pub fn normalize_record(record: &Map<String, Value>, aliases: &FieldAliases) -> Map<String, Value> {
    let mut out: Map<String, Value> = record
        .iter()
        .filter(|(k, _)| !aliases.is_alias(k))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();

    let id = resolve(record, &aliases.id).map(as_text).unwrap_or_default();
    let content = resolve(record, &aliases.content)
        .map(as_text)
        .unwrap_or_default();
    out.insert(ID_KEY.to_string(), Value::String(id));
    out.insert(CONTENT_KEY.to_string(), Value::String(content));

    if let Some(title) = resolve(record, &aliases.title) {
        out.insert(TITLE_KEY.to_string(), Value::String(as_text(title)));
    }
    if let Some(category) = resolve(record, &aliases.category) {
        out.insert(CATEGORY_KEY.to_string(), Value::String(as_text(category)));
    }
    if let Some(vector) = resolve_vector(record, &aliases.vector) {
        out.insert(VECTOR_KEY.to_string(), vector.clone());
    }

    out
}

#[allow(clippy::cast_possible_truncation)]
fn vector_of(value: &Value) -> Option<Vec<f32>> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(Value::as_f64).map(|f| f as f32).collect())
}

/// Builds a [`SearchResult`] from one raw backend record.
///
/// `@search.*` annotations become result metadata; the score defaults to
/// `0.0` and the reranker score is set only when the backend sent one.
#[must_use]
pub fn to_search_result(record: &Map<String, Value>, aliases: &FieldAliases) -> SearchResult {
    let mut canonical = normalize_record(record, aliases);

    let score = canonical
        .get(SCORE_KEY)
        .and_then(Value::as_f64)
        .unwrap_or(0.0);
    let reranker_score = RERANKER_KEYS
        .iter()
        .find_map(|k| canonical.get(*k).and_then(Value::as_f64));

    let annotations: Map<String, Value> = canonical
        .iter()
        .filter(|(k, _)| k.starts_with(ANNOTATION_PREFIX))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    canonical.retain(|k, _| !k.starts_with(ANNOTATION_PREFIX));

    let text = |map: &mut Map<String, Value>, key: &str| match map.remove(key) {
        Some(Value::String(s)) => Some(s),
        _ => None,
    };
    let id = text(&mut canonical, ID_KEY).unwrap_or_default();
    let content = text(&mut canonical, CONTENT_KEY).unwrap_or_default();
    let title = text(&mut canonical, TITLE_KEY);
    let category = text(&mut canonical, CATEGORY_KEY);
    let content_vector = canonical.remove(VECTOR_KEY).as_ref().and_then(vector_of);

    SearchResult {
        document: Document {
            id,
            title,
            content,
            category,
            content_vector,
            metadata: canonical,
        },
        score,
        reranker_score,
        metadata: annotations,
    }
}

/// Normalizes a page of raw records, preserving backend order.
#[must_use]
pub fn to_search_results(records: &[Map<String, Value>], aliases: &FieldAliases) -> Vec<SearchResult> {
    records
        .iter()
        .map(|r| to_search_result(r, aliases))
        .collect()
}

/// Serializes a document back into a record for upload.
#[must_use]
pub fn document_to_record(document: &Document) -> Map<String, Value> {
    let mut record = document.metadata.clone();
    record.insert(ID_KEY.to_string(), Value::String(document.id.clone()));
    record.insert(
        CONTENT_KEY.to_string(),
        Value::String(document.content.clone()),
    );
    if let Some(title) = &document.title {
        record.insert(TITLE_KEY.to_string(), Value::String(title.clone()));
    }
    if let Some(category) = &document.category {
        record.insert(CATEGORY_KEY.to_string(), Value::String(category.clone()));
    }
    if let Some(vector) = &document.content_vector {
        record.insert(
            VECTOR_KEY.to_string(),
            Value::Array(vector.iter().map(|f| Value::from(f64::from(*f))).collect()),
        );
    }
    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn record(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_content_alias_fallback() {
        let aliases = FieldAliases::default();
        let raw = record(json!({"chunk_id": "c1", "chunk": "alias content", "title": "T"}));
        let out = normalize_record(&raw, &aliases);
        assert_eq!(out["id"], json!("c1"));
        assert_eq!(out["content"], json!("alias content"));
        assert_eq!(out["title"], json!("T"));
        assert!(out.get("chunk").is_none());
        assert!(out.get("chunk_id").is_none());
    }

    #[test]
    fn test_canonical_name_wins() {
        let aliases = FieldAliases::default();
        let raw = record(json!({"id": "x", "content": "canonical", "chunk": "alias"}));
        let out = normalize_record(&raw, &aliases);
        assert_eq!(out["content"], json!("canonical"));
    }

    #[test]
    fn test_null_falls_through_to_alias() {
        let aliases = FieldAliases::default();
        let raw = record(json!({"id": "x", "content": null, "text": "fallback"}));
        let out = normalize_record(&raw, &aliases);
        assert_eq!(out["content"], json!("fallback"));
    }

    #[test]
    fn test_all_aliases_missing() {
        let aliases = FieldAliases::default();
        let out = normalize_record(&record(json!({"other": 1})), &aliases);
        assert_eq!(out["content"], json!(""));
        assert_eq!(out["id"], json!(""));
        assert!(out.get("title").is_none());
        assert!(out.get(VECTOR_KEY).is_none());
        assert_eq!(out["other"], json!(1));
    }

    #[test]
    fn test_numeric_id_stringified() {
        let aliases = FieldAliases::default();
        let out = normalize_record(&record(json!({"id": 42, "content": "x"})), &aliases);
        assert_eq!(out["id"], json!("42"));
    }

    #[test]
    fn test_vector_aliases() {
        let aliases = FieldAliases::default();
        let out = normalize_record(
            &record(json!({"id": "a", "text_vector": [0.1, 0.2]})),
            &aliases,
        );
        assert_eq!(out[VECTOR_KEY], json!([0.1, 0.2]));
        assert!(out.get("text_vector").is_none());

        let invalid = normalize_record(
            &record(json!({"id": "a", "contentVector": "not a vector"})),
            &aliases,
        );
        assert!(invalid.get(VECTOR_KEY).is_none());
    }

    #[test]
    fn test_deployment_fields_ranked_first() {
        let aliases = FieldAliases::with_deployment_fields("doc_key", "body", "heading", "emb");
        let raw = record(json!({
            "doc_key": "k",
            "chunk_id": "ignored",
            "body": "deployment body",
            "chunk": "ignored",
            "heading": "H",
            "emb": [1.0]
        }));
        let out = normalize_record(&raw, &aliases);
        assert_eq!(out["id"], json!("k"));
        assert_eq!(out["content"], json!("deployment body"));
        assert_eq!(out["title"], json!("H"));
        assert_eq!(out[VECTOR_KEY], json!([1.0]));
    }

    #[test]
    fn test_to_search_result_scores() {
        let aliases = FieldAliases::default();
        let raw = record(json!({
            "chunk_id": "c1",
            "chunk": "text",
            "category": "ml",
            "source": "lab",
            "@search.score": 2.5,
            "@search.rerankerScore": 3.1,
            "@search.captions": []
        }));
        let result = to_search_result(&raw, &aliases);
        assert_eq!(result.id(), "c1");
        assert!((result.score - 2.5).abs() < f64::EPSILON);
        assert_eq!(result.reranker_score, Some(3.1));
        assert!(result.metadata.contains_key("@search.captions"));
        assert_eq!(result.document.category.as_deref(), Some("ml"));
        assert_eq!(result.document.metadata["source"], json!("lab"));
        assert!(!result.document.metadata.contains_key("@search.score"));
    }

    #[test]
    fn test_to_search_result_defaults() {
        let result = to_search_result(&Map::new(), &FieldAliases::default());
        assert!(result.score.abs() < f64::EPSILON);
        assert!(result.reranker_score.is_none());
        assert_eq!(result.content(), "");
    }

    #[test]
    fn test_document_record_round_trip() {
        let aliases = FieldAliases::default();
        let doc = Document::new("d1", "body")
            .with_title("Title")
            .with_vector(vec![0.5, 0.25]);
        let result = to_search_result(&document_to_record(&doc), &aliases);
        assert_eq!(result.document, doc);
    }

    fn arb_value() -> impl Strategy<Value = Value> {
        prop_oneof![
            Just(Value::Null),
            "[a-z ]{0,12}".prop_map(Value::String),
            any::<i32>().prop_map(Value::from),
            any::<bool>().prop_map(Value::Bool),
            prop::collection::vec(-1.0f64..1.0, 0..4)
                .prop_map(|v| Value::Array(v.into_iter().map(Value::from).collect())),
        ]
    }

    fn arb_record() -> impl Strategy<Value = Map<String, Value>> {
        let keys = prop::sample::select(vec![
            "id",
            "chunk_id",
            "content",
            "chunk",
            "text",
            "title",
            "category",
            "contentVector",
            "content_vector",
            "text_vector",
            "source",
            "@search.score",
        ]);
        prop::collection::vec((keys, arb_value()), 0..8)
            .prop_map(|pairs| pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
    }

    proptest! {
        #[test]
        fn prop_normalize_idempotent(raw in arb_record()) {
            let aliases = FieldAliases::default();
            let once = normalize_record(&raw, &aliases);
            let twice = normalize_record(&once, &aliases);
            prop_assert_eq!(once, twice);
        }

        #[test]
        fn prop_content_always_string(raw in arb_record()) {
            let out = normalize_record(&raw, &FieldAliases::default());
            prop_assert!(out.get("content").is_some_and(Value::is_string));
            prop_assert!(out.get("id").is_some_and(Value::is_string));
        }
    }
}
