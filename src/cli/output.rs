//! Output formatting for CLI commands.
//!
//! Every formatter renders either human-readable text or pretty JSON.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]

use std::fmt::Write;

use serde::Serialize;
use serde_json::{Value, json};

use crate::agent::result::{ExecutionMetadata, RoutedAnswer};
use crate::core::{SearchResponse, SearchResult};
use crate::pipeline::{ModeComparison, RagResponse};
use crate::search::IndexSchema;
use crate::search::retriever::Fallback;
use crate::sql::{QueryOutput, Schema};

/// Characters of content shown per search result.
const PREVIEW_LEN: usize = 150;

const RULE: &str = "============================================================";

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name; anything unrecognized is text.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Serializes `value` as pretty JSON.
#[must_use]
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> String {
    serde_json::to_string_pretty(value)
        .unwrap_or_else(|e| json!({ "error": e.to_string() }).to_string())
}

fn preview(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() > PREVIEW_LEN {
        let cut: String = flat.chars().take(PREVIEW_LEN).collect();
        format!("{cut}...")
    } else {
        flat
    }
}

fn write_result_line(out: &mut String, rank: usize, result: &SearchResult) {
    let title = result.title().unwrap_or("(untitled)");
    let _ = write!(out, "{:>2}. {} [{}] score {:.4}", rank, title, result.id(), result.score);
    if let Some(reranker) = result.reranker_score {
        let _ = write!(out, ", reranker {:.4}", reranker);
    }
    out.push('\n');
    let _ = writeln!(out, "    {}", preview(result.content()));
}

/// Formats a search response, noting a keyword fallback.
#[must_use]
pub fn format_search(
    response: &SearchResponse,
    fallback: Option<&Fallback>,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => {
            let mut value = serde_json::to_value(response).unwrap_or(Value::Null);
            if let (Some(fallback), Value::Object(map)) = (fallback, &mut value) {
                map.insert(
                    "fallback".to_string(),
                    json!({ "from": fallback.from, "reason": fallback.reason }),
                );
            }
            to_json(&value)
        }
        OutputFormat::Text => {
            let mut out = String::new();
            if let Some(fallback) = fallback {
                let _ = writeln!(
                    out,
                    "Note: {} search failed ({}); showing keyword results.",
                    fallback.from, fallback.reason
                );
            }
            let _ = write!(
                out,
                "Query: \"{}\" ({}, {} result(s)",
                response.query,
                response.search_type,
                response.results.len()
            );
            if let Some(total) = response.total_count {
                let _ = write!(out, " of {}", total);
            }
            out.push_str(")\n");
            if response.results.is_empty() {
                out.push_str("No results found.\n");
            }
            for (i, result) in response.results.iter().enumerate() {
                write_result_line(&mut out, i + 1, result);
            }
            out
        }
    }
}

/// Formats a side-by-side mode comparison.
#[must_use]
pub fn format_comparison(query: &str, comparisons: &[ModeComparison], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({ "query": query, "modes": comparisons })),
        OutputFormat::Text => {
            let mut out = format!("Query: \"{}\"\n", query);
            for comparison in comparisons {
                out.push('\n');
                let _ = writeln!(out, "{}", RULE);
                let _ = write!(out, "{}", comparison.mode.as_str().to_uppercase());
                if let Some(total) = comparison.total_count {
                    let _ = write!(out, " ({} total)", total);
                }
                out.push('\n');
                let _ = writeln!(out, "{}", RULE);
                if let Some(error) = &comparison.error {
                    let _ = writeln!(out, "Error: {}", error);
                } else if comparison.results.is_empty() {
                    out.push_str("No results found.\n");
                }
                for (i, result) in comparison.results.iter().enumerate() {
                    write_result_line(&mut out, i + 1, result);
                }
            }
            out
        }
    }
}

/// Formats a generated answer with its sources and metadata.
#[must_use]
pub fn format_rag(response: &RagResponse, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(response),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "Answer:\n{}\n", response.answer.trim());
            if response.has_context() {
                out.push_str("Sources:\n");
                for (i, result) in response.search_results.iter().enumerate() {
                    let title = result.title().unwrap_or("(untitled)");
                    let _ = writeln!(
                        out,
                        "{:>2}. {} [{}] score {:.4}",
                        i + 1,
                        title,
                        result.id(),
                        result.score
                    );
                }
                out.push('\n');
            }
            let info = &response.metadata.additional_info;
            if let Some(from) = info.get("fallback_from").and_then(Value::as_str) {
                let reason = info
                    .get("fallback_reason")
                    .and_then(Value::as_str)
                    .unwrap_or_default();
                let _ = writeln!(out, "Note: {} search failed ({}); used keyword.\n", from, reason);
            }
            if let Some(subqueries) = info.get("subqueries").and_then(Value::as_array) {
                out.push_str("Sub-queries:\n");
                for subquery in subqueries.iter().filter_map(Value::as_str) {
                    let _ = writeln!(out, "  - {}", subquery);
                }
                out.push('\n');
            }
            out.push_str("Metadata:\n");
            for line in response.metadata_summary().lines() {
                let _ = writeln!(out, "  {}", line);
            }
            out
        }
    }
}

/// Formats a routed agent answer.
#[must_use]
pub fn format_routed(query: &str, routed: &RoutedAnswer, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({
            "query": query,
            "decision": routed.decision,
            "result": routed.result,
        })),
        OutputFormat::Text => {
            let mut out = String::new();
            let _ = writeln!(out, "{}\nAGENT REASONING\n{}", RULE, RULE);
            let _ = writeln!(out, "Query: {}", query);
            let _ = writeln!(
                out,
                "Selected Tool: {} ({:?})",
                routed.decision.tool.display_name(),
                routed.decision.source
            );
            let _ = writeln!(out, "Reasoning: {}\n", routed.decision.reasoning);

            let _ = writeln!(out, "{}\nANSWER\n{}", RULE, RULE);
            let _ = writeln!(out, "{}\n", routed.result.answer.trim());

            out.push_str("Metadata:\n");
            let _ = writeln!(out, "  Success: {}", routed.result.success);
            match &routed.result.metadata {
                ExecutionMetadata::Sql(meta) => {
                    if let Some(sql) = &meta.sql_query {
                        let _ = writeln!(out, "  SQL Query: {}", sql);
                    }
                    if let Some(rows) = meta.row_count {
                        let _ = writeln!(out, "  Rows Returned: {}", rows);
                    }
                    if let Some(error) = &meta.error {
                        let _ = writeln!(out, "  Error: {}", error);
                    }
                }
                ExecutionMetadata::Rag(meta) => {
                    let _ = writeln!(out, "  Documents Retrieved: {}", meta.num_documents);
                    let _ = writeln!(out, "  Search Type: {}", meta.search_type);
                    if !meta.scores.is_empty() {
                        let scores: Vec<String> =
                            meta.scores.iter().map(|s| format!("{:.4}", s)).collect();
                        let _ = writeln!(out, "  Scores: {}", scores.join(", "));
                    }
                    if let Some(error) = &meta.error {
                        let _ = writeln!(out, "  Error: {}", error);
                    }
                }
            }
            out
        }
    }
}

fn cell(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Formats query rows as an aligned table.
#[must_use]
pub fn format_query_output(output: &QueryOutput, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(&json!({
            "columns": output.columns,
            "rows": output.rows,
            "row_count": output.row_count(),
        })),
        OutputFormat::Text => {
            let cells: Vec<Vec<String>> = output
                .rows
                .iter()
                .map(|row| {
                    output
                        .columns
                        .iter()
                        .map(|c| row.get(c).map(cell).unwrap_or_default())
                        .collect()
                })
                .collect();
            let widths: Vec<usize> = output
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| {
                    cells
                        .iter()
                        .map(|row| row[i].chars().count())
                        .chain(std::iter::once(c.chars().count()))
                        .max()
                        .unwrap_or_default()
                })
                .collect();

            let render = |values: &[String]| -> String {
                values
                    .iter()
                    .zip(&widths)
                    .map(|(v, w)| format!("{:<width$}", v, width = *w))
                    .collect::<Vec<_>>()
                    .join(" | ")
                    .trim_end()
                    .to_string()
            };

            let mut out = String::new();
            let _ = writeln!(out, "{}", render(&output.columns));
            let _ = writeln!(
                out,
                "{}",
                widths
                    .iter()
                    .map(|w| "-".repeat(*w))
                    .collect::<Vec<_>>()
                    .join("-+-")
            );
            for row in &cells {
                let _ = writeln!(out, "{}", render(row));
            }
            let _ = writeln!(out, "({} row(s))", output.row_count());
            out
        }
    }
}

/// Formats the database schema.
#[must_use]
pub fn format_schema(schema: &Schema, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(schema),
        OutputFormat::Text if schema.tables.is_empty() => "No tables found.\n".to_string(),
        OutputFormat::Text => schema.to_string(),
    }
}

/// Formats a search index definition.
#[must_use]
pub fn format_index_schema(schema: &IndexSchema, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => to_json(schema),
        OutputFormat::Text => schema.to_string(),
    }
}
