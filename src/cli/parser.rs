//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::agent::generator::{DEFAULT_MAX_TOKENS, DEFAULT_TEMPERATURE};
use crate::agent::resolve_db_path;
use crate::pipeline::rag::DEFAULT_TOP_K;
use crate::search::SearchMode;

/// rag-labs: retrieval-augmented generation and tool routing.
///
/// Searches a document index, answers questions from retrieved context,
/// and routes questions between the index and a SQLite database.
#[derive(Parser, Debug)]
#[command(name = "rag-labs")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the SQLite database used by the SQL tool.
    ///
    /// Defaults to `data/agent_database.db`.
    #[arg(short, long, env = "RAG_DB_PATH", global = true)]
    pub db_path: Option<PathBuf>,

    /// JSON corpus searched in memory instead of Azure AI Search.
    #[arg(long, env = "RAG_CORPUS", global = true)]
    pub corpus: Option<PathBuf>,

    /// Prompt catalog file (JSON).
    #[arg(long, global = true)]
    pub prompts: Option<PathBuf>,

    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Ask the agent; it picks the retrieval or SQL tool.
    #[command(after_help = r#"Examples:
  rag-labs ask "What is retrieval-augmented generation?"   # routed to RAG
  rag-labs ask "How many employees are in Engineering?"    # routed to SQL
  rag-labs --format json ask "Who has the highest salary?"
"#)]
    Ask {
        /// Question in natural language.
        query: String,

        /// Documents retrieved when the RAG tool is chosen.
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// Answer a question from retrieved documents.
    #[command(after_help = r#"Examples:
  rag-labs rag "What is vector search?"                    # keyword retrieval
  rag-labs rag "Explain RAG" --mode hybrid -k 5            # hybrid, falls back to keyword
  rag-labs rag "Explain RAG" --multi-step                  # follow generated sub-queries
  rag-labs rag "Explain RAG" --manage-context --context-budget 1500
  rag-labs rag "Summarize" --custom-text "Some text to answer from"
"#)]
    Rag {
        /// Question in natural language.
        query: String,

        /// Retrieval mode.
        #[arg(short, long, value_enum, default_value_t = SearchMode::Keyword)]
        mode: SearchMode,

        /// Documents to retrieve (1-50).
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,

        /// Follow model-generated sub-queries.
        #[arg(long)]
        multi_step: bool,

        /// Fit the context into a token budget.
        #[arg(long)]
        manage_context: bool,

        /// Token budget for context management (implies --manage-context).
        #[arg(long)]
        context_budget: Option<usize>,

        /// Answer from this text instead of the index.
        #[arg(long)]
        custom_text: Option<String>,

        /// Sampling temperature (0.0-2.0).
        #[arg(long, default_value_t = DEFAULT_TEMPERATURE)]
        temperature: f32,

        /// Maximum answer tokens.
        #[arg(long, default_value_t = DEFAULT_MAX_TOKENS)]
        max_tokens: u32,

        /// Override the system prompt.
        #[arg(long)]
        system_prompt: Option<String>,
    },

    /// Search the index without generating an answer.
    #[command(after_help = r#"Examples:
  rag-labs search "machine learning"                       # keyword
  rag-labs search "machine learning" --mode semantic -k 5
  rag-labs --format json search "embeddings" | jq '.results[].document.id'
"#)]
    Search {
        /// Search text.
        query: String,

        /// Retrieval mode.
        #[arg(short, long, value_enum, default_value_t = SearchMode::Keyword)]
        mode: SearchMode,

        /// Maximum number of results.
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// Run a query in every retrieval mode side by side.
    Compare {
        /// Search text.
        query: String,

        /// Results per mode.
        #[arg(short = 'k', long, default_value_t = DEFAULT_TOP_K)]
        top_k: usize,
    },

    /// Run a read-only SELECT against the database.
    #[command(after_help = r#"Examples:
  rag-labs sql "SELECT name, salary FROM employees ORDER BY salary DESC"
  rag-labs --format json sql "SELECT COUNT(*) AS n FROM sales"
"#)]
    Sql {
        /// SELECT statement.
        statement: String,
    },

    /// Show the database tables and columns.
    Schema,

    /// Create the sample database (employees, products, sales).
    #[command(after_help = r#"Examples:
  rag-labs init-db                      # create data/agent_database.db
  rag-labs init-db --force              # recreate with fresh sample rows
  rag-labs --db-path ./demo.db init-db
"#)]
    InitDb {
        /// Recreate the database if it exists.
        #[arg(short, long)]
        force: bool,
    },

    /// Write the default prompt catalog for editing.
    InitPrompts {
        /// Destination (defaults to ~/.config/rag-labs/prompts.json).
        #[arg(long)]
        path: Option<PathBuf>,
    },

    /// Show the search index fields and vector configuration.
    #[command(after_help = r#"Examples:
  rag-labs index-info
  rag-labs --format json index-info | jq '.fields[] | select(.dimensions)'
"#)]
    IndexInfo,

    /// Add a text document to the index.
    AddText {
        /// Document text.
        text: String,

        /// Document id (generated when omitted).
        #[arg(long)]
        id: Option<String>,

        /// Document title.
        #[arg(long)]
        title: Option<String>,
    },
}

impl Cli {
    /// Returns the database path, resolving defaults.
    #[must_use]
    pub fn get_db_path(&self) -> PathBuf {
        resolve_db_path(self.db_path.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_parse() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_custom_db_path() {
        let cli = Cli {
            db_path: Some(PathBuf::from("/custom/path.db")),
            corpus: None,
            prompts: None,
            verbose: false,
            format: "text".to_string(),
            command: Commands::Schema,
        };
        assert_eq!(cli.get_db_path(), PathBuf::from("/custom/path.db"));
    }

    #[test]
    fn test_rag_defaults() {
        let cli = Cli::try_parse_from(["rag-labs", "rag", "What is RAG?"])
            .unwrap_or_else(|_| unreachable!());
        match cli.command {
            Commands::Rag {
                mode,
                top_k,
                multi_step,
                context_budget,
                ..
            } => {
                assert_eq!(mode, SearchMode::Keyword);
                assert_eq!(top_k, DEFAULT_TOP_K);
                assert!(!multi_step);
                assert!(context_budget.is_none());
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_mode_value_enum() {
        let cli = Cli::try_parse_from(["rag-labs", "search", "q", "--mode", "hybrid", "-k", "5"])
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(
            cli.command,
            Commands::Search {
                mode: SearchMode::Hybrid,
                top_k: 5,
                ..
            }
        ));
        assert!(Cli::try_parse_from(["rag-labs", "search", "q", "--mode", "bm25"]).is_err());
    }

    #[test]
    fn test_index_info_subcommand() {
        let cli = Cli::try_parse_from(["rag-labs", "index-info", "--format", "json"])
            .unwrap_or_else(|_| unreachable!());
        assert!(matches!(cli.command, Commands::IndexInfo));
    }

    #[test]
    fn test_global_format_after_subcommand() {
        let cli = Cli::try_parse_from(["rag-labs", "schema", "--format", "json"])
            .unwrap_or_else(|_| unreachable!());
        assert_eq!(cli.format, "json");
    }
}
