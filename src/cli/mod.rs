//! CLI layer for rag-labs.
//!
//! Provides the command-line interface using clap, with commands for
//! searching, answering, routing and managing the sample database.

pub mod commands;
pub mod output;
pub mod parser;

pub use commands::execute;
pub use output::OutputFormat;
pub use parser::{Cli, Commands};
