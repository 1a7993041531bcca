//! CLI command implementations.
//!
//! Contains the business logic for each CLI command.

// Allow certain patterns that improve readability in CLI output formatting
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::format_push_string)]
#![allow(clippy::too_many_lines)]

use std::fmt::Write as FmtWrite;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use tracing::{debug, warn};

use crate::agent::{AgentConfig, Generate, Generator, PromptCatalog, ToolRouter, create_provider};
use crate::cli::output::{
    OutputFormat, format_comparison, format_index_schema, format_query_output, format_rag,
    format_routed, format_schema, format_search, to_json,
};
use crate::cli::parser::{Cli, Commands};
use crate::embedding::create_embedder;
use crate::error::{CommandError, Result};
use crate::pipeline::rag::MAX_TOP_K;
use crate::pipeline::{RagPipeline, RagRequest, compare_modes};
use crate::search::{
    AzureSearchBackend, FieldAliases, InMemoryBackend, Retrieve, Retriever, SearchConfig,
    SearchMode,
};
use crate::sql::SqlStore;

// ==================== Parameter Structs ====================

/// Parameters for the rag command.
#[derive(Debug, Clone)]
pub struct RagParams<'a> {
    /// The question.
    pub query: &'a str,
    /// Retrieval mode.
    pub mode: SearchMode,
    /// Documents to retrieve.
    pub top_k: usize,
    /// Follow generated sub-queries.
    pub multi_step: bool,
    /// Fit the context into a token budget.
    pub manage_context: bool,
    /// Explicit token budget.
    pub context_budget: Option<usize>,
    /// Answer from this text instead of the index.
    pub custom_text: Option<&'a str>,
    /// Sampling temperature.
    pub temperature: f32,
    /// Maximum answer tokens.
    pub max_tokens: u32,
    /// System prompt override.
    pub system_prompt: Option<&'a str>,
}

impl RagParams<'_> {
    /// Builds the pipeline request; `default_budget` applies when context
    /// management is on without an explicit budget.
    fn to_request(&self, default_budget: usize) -> RagRequest {
        let mut request = RagRequest::new(self.query)
            .with_mode(self.mode)
            .with_top_k(self.top_k)
            .with_temperature(self.temperature)
            .with_max_tokens(self.max_tokens)
            .with_multi_step(self.multi_step);
        if let Some(budget) = self.context_budget {
            request = request.with_context_budget(budget);
        } else if self.manage_context {
            request = request.with_context_budget(default_budget);
        }
        if let Some(text) = self.custom_text {
            request = request.with_custom_text(text);
        }
        if let Some(prompt) = self.system_prompt {
            request = request.with_system_prompt(prompt);
        }
        request
    }
}

/// Executes the CLI command.
///
/// # Arguments
///
/// * `cli` - Parsed CLI arguments.
///
/// # Returns
///
/// Result with output string on success.
///
/// # Errors
///
/// Returns an error if the command fails to execute.
pub fn execute(cli: &Cli) -> Result<String> {
    let format = OutputFormat::parse(&cli.format);
    let db_path = cli.get_db_path();

    match &cli.command {
        Commands::Ask { query, top_k } => cmd_ask(cli, query, *top_k, format),
        Commands::Rag {
            query,
            mode,
            top_k,
            multi_step,
            manage_context,
            context_budget,
            custom_text,
            temperature,
            max_tokens,
            system_prompt,
        } => {
            let params = RagParams {
                query,
                mode: *mode,
                top_k: *top_k,
                multi_step: *multi_step,
                manage_context: *manage_context,
                context_budget: *context_budget,
                custom_text: custom_text.as_deref(),
                temperature: *temperature,
                max_tokens: *max_tokens,
                system_prompt: system_prompt.as_deref(),
            };
            cmd_rag(cli, &params, format)
        }
        Commands::Search { query, mode, top_k } => cmd_search(cli, query, *mode, *top_k, format),
        Commands::Compare { query, top_k } => cmd_compare(cli, query, *top_k, format),
        Commands::IndexInfo => cmd_index_info(format),
        Commands::Sql { statement } => cmd_sql(&db_path, statement, format),
        Commands::Schema => cmd_schema(&db_path, format),
        Commands::InitDb { force } => cmd_init_db(&db_path, *force, format),
        Commands::InitPrompts { path } => cmd_init_prompts(path.as_deref(), format),
        Commands::AddText { text, id, title } => {
            cmd_add_text(cli, text, id.as_deref(), title.as_deref(), format)
        }
    }
}

// ==================== Shared Setup ====================

/// The search index selected by `--corpus` or the environment.
struct Index {
    retriever: Retriever,
    /// Corpus file and its backend, when searching in memory.
    corpus: Option<(PathBuf, Arc<InMemoryBackend>)>,
}

impl Index {
    /// Opens the in-memory corpus if given, otherwise Azure AI Search.
    ///
    /// The embedder is attached when generation credentials are present;
    /// without it, vector-bearing modes fail (and fall back where the
    /// caller allows).
    fn open(cli: &Cli, agent: Option<&AgentConfig>) -> Result<Self> {
        let mut index = if let Some(path) = &cli.corpus {
            let aliases = FieldAliases::default();
            let backend = Arc::new(InMemoryBackend::from_json_file(path, aliases.clone())?);
            debug!(path = %path.display(), records = backend.len(), "loaded corpus");
            Self {
                retriever: Retriever::new(Box::new(Arc::clone(&backend)), aliases),
                corpus: Some((path.clone(), backend)),
            }
        } else {
            let config = SearchConfig::from_env()?;
            let aliases = config.fields.aliases();
            Self {
                retriever: Retriever::new(Box::new(AzureSearchBackend::new(config)?), aliases),
                corpus: None,
            }
        };

        if let Some(config) = agent {
            match create_embedder(config) {
                Ok(embedder) => index.retriever = index.retriever.with_embedder(embedder),
                Err(e) => warn!(error = %e, "embedder unavailable, vector modes disabled"),
            }
        }
        Ok(index)
    }

    /// An empty in-memory index.
    fn empty() -> Self {
        let aliases = FieldAliases::default();
        Self {
            retriever: Retriever::new(Box::new(InMemoryBackend::new(aliases.clone())), aliases),
            corpus: None,
        }
    }
}

fn runtime() -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().map_err(|e| {
        CommandError::ExecutionFailed(format!("Failed to create async runtime: {e}")).into()
    })
}

fn load_prompts(cli: &Cli, config: &AgentConfig) -> Arc<PromptCatalog> {
    let explicit = cli
        .prompts
        .as_deref()
        .or(config.prompts_file.as_deref());
    Arc::new(PromptCatalog::load(explicit))
}

fn open_generator(config: &AgentConfig, prompts: &Arc<PromptCatalog>) -> Result<Arc<dyn Generate>> {
    let provider = create_provider(config)?;
    Ok(Arc::new(Generator::new(
        provider,
        config.chat_model.clone(),
        Arc::clone(prompts),
    )))
}

fn check_top_k(top_k: usize) -> Result<()> {
    if (1..=MAX_TOP_K).contains(&top_k) {
        Ok(())
    } else {
        Err(CommandError::InvalidArgument(format!(
            "top-k must be between 1 and {MAX_TOP_K}, got {top_k}"
        ))
        .into())
    }
}

// ==================== Generation Commands ====================

fn cmd_ask(cli: &Cli, query: &str, top_k: Option<usize>, format: OutputFormat) -> Result<String> {
    let config = AgentConfig::from_env()?;
    let top_k = top_k.unwrap_or(config.agent_top_k);
    check_top_k(top_k)?;

    let prompts = load_prompts(cli, &config);
    let generator = open_generator(&config, &prompts)?;
    let index = Index::open(cli, Some(&config))?;
    let retriever: Arc<dyn Retrieve> = Arc::new(index.retriever);
    let store = SqlStore::open_or_provision(cli.get_db_path())?;
    let router = ToolRouter::new(generator, retriever, store, prompts).with_top_k(top_k);

    let rt = runtime()?;
    let routed = rt.block_on(router.route(query));
    Ok(format_routed(query, &routed, format))
}

fn cmd_rag(cli: &Cli, params: &RagParams<'_>, format: OutputFormat) -> Result<String> {
    let config = AgentConfig::from_env()?;
    let request = params.to_request(config.context_budget);
    request.validate()?;

    let prompts = load_prompts(cli, &config);
    let generator = open_generator(&config, &prompts)?;
    let index = if request.custom_text.is_some() && cli.corpus.is_none() {
        Index::empty()
    } else {
        Index::open(cli, Some(&config))?
    };
    let pipeline = RagPipeline::new(Arc::new(index.retriever), generator, prompts)
        .with_fan_out(config.fan_out);

    let rt = runtime()?;
    let response = rt.block_on(pipeline.answer(&request))?;
    Ok(format_rag(&response, format))
}

// ==================== Index Commands ====================

fn cmd_search(
    cli: &Cli,
    query: &str,
    mode: SearchMode,
    top_k: usize,
    format: OutputFormat,
) -> Result<String> {
    check_top_k(top_k)?;
    let agent = AgentConfig::from_env().ok();
    let index = Index::open(cli, agent.as_ref())?;

    let rt = runtime()?;
    let found = rt.block_on(index.retriever.search_with_fallback(query, mode, top_k))?;
    Ok(format_search(&found.response, found.fallback.as_ref(), format))
}

fn cmd_compare(cli: &Cli, query: &str, top_k: usize, format: OutputFormat) -> Result<String> {
    check_top_k(top_k)?;
    let agent = AgentConfig::from_env().ok();
    let index = Index::open(cli, agent.as_ref())?;

    let rt = runtime()?;
    let comparisons = rt.block_on(compare_modes(&index.retriever, query, top_k));
    Ok(format_comparison(query, &comparisons, format))
}

fn cmd_index_info(format: OutputFormat) -> Result<String> {
    let backend = AzureSearchBackend::new(SearchConfig::from_env()?)?;
    let rt = runtime()?;
    let schema = rt.block_on(backend.index_schema())?;
    Ok(format_index_schema(&schema, format))
}

fn generated_id() -> String {
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or_default();
    format!("doc-{millis}")
}

fn cmd_add_text(
    cli: &Cli,
    text: &str,
    id: Option<&str>,
    title: Option<&str>,
    format: OutputFormat,
) -> Result<String> {
    if text.trim().is_empty() {
        return Err(CommandError::InvalidArgument("text must not be empty".to_string()).into());
    }
    let id = id.map_or_else(generated_id, str::to_string);
    let agent = AgentConfig::from_env().ok();
    let index = Index::open(cli, agent.as_ref())?;

    let rt = runtime()?;
    let outcome = rt.block_on(index.retriever.add_text(&id, title, text))?;
    if let Some((path, backend)) = &index.corpus {
        backend.save_json_file(path)?;
    }

    match format {
        OutputFormat::Json => Ok(to_json(&json!({
            "id": outcome.id,
            "with_vector": outcome.with_vector,
            "backend": index.retriever.backend_name(),
        }))),
        OutputFormat::Text => {
            let mut out = format!("Added document '{}'", outcome.id);
            if !outcome.with_vector {
                out.push_str(" (without embedding)");
            }
            out.push('\n');
            Ok(out)
        }
    }
}

// ==================== Database Commands ====================

fn cmd_sql(db_path: &Path, statement: &str, format: OutputFormat) -> Result<String> {
    let output = SqlStore::new(db_path).execute(statement)?;
    Ok(format_query_output(&output, format))
}

fn cmd_schema(db_path: &Path, format: OutputFormat) -> Result<String> {
    let schema = SqlStore::new(db_path).schema()?;
    Ok(format_schema(&schema, format))
}

fn cmd_init_db(db_path: &Path, force: bool, format: OutputFormat) -> Result<String> {
    let store = SqlStore::new(db_path);
    let created = store.provision_sample(force)?;

    match format {
        OutputFormat::Json => Ok(to_json(&json!({
            "path": db_path.display().to_string(),
            "created": created,
        }))),
        OutputFormat::Text => {
            let mut out = String::new();
            if created {
                let _ = writeln!(out, "Created sample database at {}", db_path.display());
                let _ = writeln!(out, "Tables: employees, products, sales");
            } else {
                let _ = writeln!(
                    out,
                    "Database already exists at {} (use --force to recreate)",
                    db_path.display()
                );
            }
            Ok(out)
        }
    }
}

fn cmd_init_prompts(path: Option<&Path>, format: OutputFormat) -> Result<String> {
    let path = path
        .map(Path::to_path_buf)
        .or_else(PromptCatalog::default_path)
        .ok_or_else(|| {
            CommandError::InvalidArgument(
                "Cannot determine the config directory; pass --path".to_string(),
            )
        })?;
    let written = PromptCatalog::write_defaults(&path)?;

    match format {
        OutputFormat::Json => Ok(to_json(&json!({
            "path": path.display().to_string(),
            "written": written,
        }))),
        OutputFormat::Text if written => Ok(format!("Wrote default prompts to {}\n", path.display())),
        OutputFormat::Text => Ok(format!(
            "Prompt file already exists at {} (left unchanged)\n",
            path.display()
        )),
    }
}
