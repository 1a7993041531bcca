//! Prompt catalog and built-in templates.
//!
//! Prompts live in a JSON file of nested objects and are addressed by
//! dotted path (`"system.rag"`, `"agent.tool_selection"`). Every call site
//! passes its own fallback text, so a missing file, a malformed file or a
//! missing entry never stops a pipeline.
//!
//! Templates use `{name}` placeholders; `{{` and `}}` produce literal braces.

use std::path::{Path, PathBuf};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::PromptError;

/// Default catalog location under the user's home.
const DEFAULT_PROMPTS_FILE: &str = ".config/rag-labs/prompts.json";

/// Environment variable naming the catalog file.
pub const PROMPTS_FILE_ENV: &str = "RAG_PROMPTS_FILE";

/// Dotted paths of every template the crate reads.
pub mod paths {
    /// Generic system prompt.
    pub const SYSTEM_DEFAULT: &str = "system.default";
    /// System prompt for context-grounded answers.
    pub const SYSTEM_RAG: &str = "system.rag";
    /// System prompt for the advanced pipeline.
    pub const SYSTEM_RAG_ADVANCED: &str = "system.rag_advanced";
    /// System prompt for tool selection.
    pub const SYSTEM_AGENT: &str = "system.agent";
    /// System prompt for SQL generation.
    pub const SYSTEM_SQL_GENERATOR: &str = "system.sql_generator";
    /// System prompt for phrasing SQL results.
    pub const SYSTEM_SQL_ANSWER: &str = "system.sql_answer";
    /// User prompt wrapping retrieved context.
    pub const USER_RAG: &str = "user.rag";
    /// Tool selection prompt.
    pub const AGENT_TOOL_SELECTION: &str = "agent.tool_selection";
    /// SQL generation prompt.
    pub const AGENT_SQL_GENERATION: &str = "agent.sql_generation";
    /// SQL answer prompt.
    pub const AGENT_SQL_ANSWER: &str = "agent.sql_answer";
    /// Sub-query generation prompt.
    pub const MULTI_STEP_SUBQUERIES: &str = "multi_step.subqueries";
}

/// Built-in template texts, used as call-site fallbacks and by
/// [`PromptCatalog::write_defaults`].
pub mod templates {
    /// `system.default`
    pub const SYSTEM_DEFAULT: &str = "You are a helpful assistant.";

    /// `system.rag`
    pub const SYSTEM_RAG: &str = "You are a helpful assistant that answers questions based on \
the provided context. If the context doesn't contain enough information to answer the \
question, say so.";

    /// `system.rag_advanced`
    pub const SYSTEM_RAG_ADVANCED: &str = "You are an expert assistant that answers questions based on provided context.
- Use only information from the provided context
- If the context doesn't contain enough information, say so
- Cite specific documents when making claims
- Be concise but thorough";

    /// `system.agent`
    pub const SYSTEM_AGENT: &str = "You are an intelligent AI agent that reasons about which tool \
to use for user queries. Respond only with valid JSON.";

    /// `system.sql_generator`
    pub const SYSTEM_SQL_GENERATOR: &str =
        "You are a SQL query generator. Return only valid SQL SELECT statements.";

    /// `system.sql_answer`
    pub const SYSTEM_SQL_ANSWER: &str =
        "You are a helpful assistant that explains SQL query results in natural language.";

    /// `user.rag`: `{context_text}`, `{query}`.
    pub const USER_RAG: &str = "Based on the following context, please answer the question.

Context:
{context_text}

Question: {query}

Answer:";

    /// `agent.tool_selection`: `{query}`, `{rag_description}`,
    /// `{sql_description}`, `{rag_use_when}`, `{sql_use_when}`.
    pub const AGENT_TOOL_SELECTION: &str = "You are an AI agent that needs to decide which tool to use for a user query.

Available Tools:
1. RAG (Retrieval-Augmented Generation): For conceptual questions, explanations, understanding topics
   Use when: {rag_use_when}
{rag_description}

2. SQL Database: For specific facts, numbers, statistics, structured data queries
   Use when: {sql_use_when}
{sql_description}

User Query: {query}

Analyze the query and determine which tool is most appropriate.
Respond in JSON format:
{{
    \"tool\": \"rag\" or \"sql\",
    \"reasoning\": \"Brief explanation of why this tool was chosen\"
}}";

    /// `agent.sql_generation`: `{schema}`, `{user_query}`.
    pub const AGENT_SQL_GENERATION: &str = "Convert the user query into a SQL SELECT query.

Database Schema:
{schema}

User Query: {user_query}

Generate a valid SQL SELECT query. Return ONLY the SQL query, nothing else.";

    /// `agent.sql_answer`: `{user_query}`, `{results}`.
    pub const AGENT_SQL_ANSWER: &str = "Based on the SQL query results, provide a natural language answer to the user's question.

User Query: {user_query}

SQL Results:
{results}

Provide a clear, concise answer based on these results.";

    /// `multi_step.subqueries`: `{query}`.
    pub const MULTI_STEP_SUBQUERIES: &str = "Based on the initial query and retrieved documents, generate 2-3 more specific sub-queries that would help find additional relevant information.

Initial query: {query}

Generate sub-queries as a numbered list:";

    /// Every built-in template keyed by dotted path.
    pub const ALL: [(&str, &str); 11] = [
        (super::paths::SYSTEM_DEFAULT, SYSTEM_DEFAULT),
        (super::paths::SYSTEM_RAG, SYSTEM_RAG),
        (super::paths::SYSTEM_RAG_ADVANCED, SYSTEM_RAG_ADVANCED),
        (super::paths::SYSTEM_AGENT, SYSTEM_AGENT),
        (super::paths::SYSTEM_SQL_GENERATOR, SYSTEM_SQL_GENERATOR),
        (super::paths::SYSTEM_SQL_ANSWER, SYSTEM_SQL_ANSWER),
        (super::paths::USER_RAG, USER_RAG),
        (super::paths::AGENT_TOOL_SELECTION, AGENT_TOOL_SELECTION),
        (super::paths::AGENT_SQL_GENERATION, AGENT_SQL_GENERATION),
        (super::paths::AGENT_SQL_ANSWER, AGENT_SQL_ANSWER),
        (super::paths::MULTI_STEP_SUBQUERIES, MULTI_STEP_SUBQUERIES),
    ];
}

/// Substitutes `{name}` placeholders in one pass.
///
/// `{{`/`}}` become literal braces; unknown placeholders are left as written.
#[must_use]
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(pos) = rest.find(['{', '}']) {
        out.push_str(&rest[..pos]);
        let tail = &rest[pos..];

        if tail.starts_with("{{") || tail.starts_with("}}") {
            out.push_str(&tail[..1]);
            rest = &tail[2..];
            continue;
        }

        if tail.starts_with('{')
            && let Some(end) = tail.find('}')
        {
            let name = &tail[1..end];
            if let Some((_, value)) = vars.iter().find(|(k, _)| *k == name) {
                out.push_str(value);
                rest = &tail[end + 1..];
                continue;
            }
        }

        out.push_str(&tail[..1]);
        rest = &tail[1..];
    }

    out.push_str(rest);
    out
}

/// Lookup of prompt templates by dotted path.
#[derive(Debug, Clone, Default)]
pub struct PromptCatalog {
    root: Map<String, Value>,
    source: Option<PathBuf>,
}

impl PromptCatalog {
    /// A catalog with no entries; every lookup uses its fallback.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Builds a catalog from an in-memory JSON value.
    ///
    /// Non-object values produce an empty catalog.
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(root) => Self { root, source: None },
            _ => Self::empty(),
        }
    }

    /// Resolves the catalog file location.
    ///
    /// Resolution order:
    /// 1. Explicit `path` argument (from `--prompts`)
    /// 2. `RAG_PROMPTS_FILE` environment variable
    /// 3. `~/.config/rag-labs/prompts.json`
    #[must_use]
    pub fn resolve_path(path: Option<&Path>) -> Option<PathBuf> {
        path.map(PathBuf::from)
            .or_else(|| std::env::var(PROMPTS_FILE_ENV).ok().map(PathBuf::from))
            .or_else(Self::default_path)
    }

    /// Loads the catalog, degrading to an empty one on any failure.
    #[must_use]
    pub fn load(path: Option<&Path>) -> Self {
        let Some(resolved) = Self::resolve_path(path) else {
            return Self::empty();
        };
        match Self::read(&resolved) {
            Ok(catalog) => catalog,
            Err(PromptError::Io { .. }) => {
                debug!(path = %resolved.display(), "no prompt catalog, using built-in prompts");
                Self::empty()
            }
            Err(e) => {
                warn!(path = %resolved.display(), error = %e, "ignoring unreadable prompt catalog");
                Self::empty()
            }
        }
    }

    /// Reads and parses a catalog file.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] if the file cannot be read or is not JSON.
    pub fn read(path: &Path) -> Result<Self, PromptError> {
        let text = std::fs::read_to_string(path).map_err(|source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let value: Value = serde_json::from_str(&text)?;
        let mut catalog = Self::from_value(value);
        catalog.source = Some(path.to_path_buf());
        Ok(catalog)
    }

    /// File this catalog was read from, if any.
    #[must_use]
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Looks up a string entry by dotted path, trimmed.
    #[must_use]
    pub fn lookup(&self, path: &str) -> Option<&str> {
        let mut keys = path.split('.');
        let mut value = self.root.get(keys.next()?)?;
        for key in keys {
            value = value.as_object()?.get(key)?;
        }
        value.as_str().map(str::trim)
    }

    /// Returns the entry at `path`, or `fallback`.
    #[must_use]
    pub fn prompt(&self, path: &str, fallback: &str) -> String {
        self.lookup(path).unwrap_or(fallback).to_string()
    }

    /// Renders the template at `path` (or `fallback`) with `vars`.
    #[must_use]
    pub fn render(&self, path: &str, fallback: &str, vars: &[(&str, &str)]) -> String {
        render_template(self.lookup(path).unwrap_or(fallback), vars)
    }

    /// Lists every string entry as a dotted path, sorted.
    #[must_use]
    pub fn paths(&self) -> Vec<String> {
        fn walk(map: &Map<String, Value>, prefix: &str, out: &mut Vec<String>) {
            for (key, value) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match value {
                    Value::Object(inner) => walk(inner, &path, out),
                    Value::String(_) => out.push(path),
                    _ => {}
                }
            }
        }

        let mut out = Vec::new();
        walk(&self.root, "", &mut out);
        out.sort();
        out
    }

    /// The built-in templates as a nested JSON object.
    #[must_use]
    pub fn defaults_json() -> Value {
        let mut root = Map::new();
        for (path, text) in templates::ALL {
            let (group, name) = path.split_once('.').unwrap_or(("", path));
            if let Value::Object(section) = root
                .entry(group.to_string())
                .or_insert_with(|| Value::Object(Map::new()))
            {
                section.insert(name.to_string(), Value::String(text.to_string()));
            }
        }
        Value::Object(root)
    }

    /// Writes the built-in templates to `path`.
    ///
    /// Creates parent directories. An existing file is **not** overwritten.
    /// Returns whether the file was written.
    ///
    /// # Errors
    ///
    /// Returns [`PromptError`] if the directory or file cannot be written.
    pub fn write_defaults(path: &Path) -> Result<bool, PromptError> {
        if path.exists() {
            return Ok(false);
        }
        let io_err = |source| PromptError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let text = serde_json::to_string_pretty(&Self::defaults_json())?;
        std::fs::write(path, text).map_err(io_err)?;
        Ok(true)
    }

    /// Returns the default catalog path under the user's home.
    ///
    /// Returns `None` if the home directory cannot be determined.
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|h| h.join(DEFAULT_PROMPTS_FILE))
    }
}
