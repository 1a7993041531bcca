//! Multi-step retrieval: retrieve, ask for sub-queries, retrieve again.
//!
//! Steps run strictly in order; each sub-query's results are merged into
//! the running set before the next sub-query is issued. Documents are
//! deduplicated by id, first appearance wins.

use std::collections::HashSet;

use tracing::{debug, warn};

use crate::agent::generator::{Generate, GenerationRequest};
use crate::agent::prompt::{PromptCatalog, paths, templates};
use crate::core::SearchResult;
use crate::error::SearchError;
use crate::search::Retrieve;

/// Default number of sub-queries followed.
pub const DEFAULT_FAN_OUT: usize = 2;

/// Completion ceiling for the sub-query prompt.
const SUBQUERY_MAX_TOKENS: u32 = 200;

/// Extracts numbered-list entries from a generated sub-query list.
///
/// A line qualifies when one of its first three characters is a digit;
/// a leading `"N. "` marker is stripped. At most `limit` entries are kept.
#[must_use]
pub fn parse_subqueries(text: &str, limit: usize) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .filter(|line| line.chars().take(3).any(|c| c.is_ascii_digit()))
        .map(|line| {
            line.split_once(". ")
                .map_or(line, |(_, rest)| rest)
                .trim()
                .to_string()
        })
        .filter(|candidate| !candidate.is_empty())
        .take(limit)
        .collect()
}

/// Outcome of a multi-step run.
#[derive(Debug, Clone, Default)]
pub struct MultiStepOutcome {
    /// Merged, deduplicated results: initial first, then per sub-query.
    pub results: Vec<SearchResult>,
    /// Sub-queries that were followed.
    pub subqueries: Vec<String>,
    /// Results contributed by the initial retrieval.
    pub initial_count: usize,
}

/// Multi-step retrieval controller.
pub struct MultiStepRetriever<'a> {
    retriever: &'a dyn Retrieve,
    generator: &'a dyn Generate,
    prompts: &'a PromptCatalog,
    fan_out: usize,
}

impl std::fmt::Debug for MultiStepRetriever<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiStepRetriever")
            .field("fan_out", &self.fan_out)
            .finish_non_exhaustive()
    }
}

impl<'a> MultiStepRetriever<'a> {
    /// Creates a controller with the default fan-out.
    #[must_use]
    pub fn new(
        retriever: &'a dyn Retrieve,
        generator: &'a dyn Generate,
        prompts: &'a PromptCatalog,
    ) -> Self {
        Self {
            retriever,
            generator,
            prompts,
            fan_out: DEFAULT_FAN_OUT,
        }
    }

    /// Sets the maximum number of sub-queries.
    #[must_use]
    pub const fn with_fan_out(mut self, fan_out: usize) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Runs the protocol for `query`, `count` results per retrieval.
    ///
    /// At most `count × (1 + fan_out)` results are returned. A failed
    /// sub-query generation returns the initial results; a failed
    /// sub-query retrieval is skipped.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError`] only when the initial retrieval fails.
    pub async fn retrieve(&self, query: &str, count: usize) -> Result<MultiStepOutcome, SearchError> {
        let initial = self.retriever.retrieve(query, count).await?;

        let mut seen = HashSet::new();
        let mut results: Vec<SearchResult> = initial
            .into_iter()
            .take(count)
            .filter(|r| seen.insert(r.id().to_string()))
            .collect();
        let initial_count = results.len();
        debug!(initial_count, "initial retrieval complete");

        let prompt = self.prompts.render(
            paths::MULTI_STEP_SUBQUERIES,
            templates::MULTI_STEP_SUBQUERIES,
            &[("query", query)],
        );
        let request = GenerationRequest::new(prompt).with_max_tokens(SUBQUERY_MAX_TOKENS);
        let subqueries = match self.generator.generate(&request).await {
            Ok(generation) => parse_subqueries(&generation.text, self.fan_out),
            Err(e) => {
                warn!(error = %e, "sub-query generation failed, keeping initial results");
                Vec::new()
            }
        };

        for subquery in &subqueries {
            match self.retriever.retrieve(subquery, count).await {
                Ok(found) => {
                    let before = results.len();
                    results.extend(
                        found
                            .into_iter()
                            .take(count)
                            .filter(|r| seen.insert(r.id().to_string())),
                    );
                    debug!(subquery = %subquery, added = results.len() - before, "sub-query merged");
                }
                Err(e) => warn!(subquery = %subquery, error = %e, "sub-query retrieval failed"),
            }
        }

        Ok(MultiStepOutcome {
            results,
            subqueries,
            initial_count,
        })
    }
}
