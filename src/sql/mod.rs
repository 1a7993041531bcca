//! Structured store: a `SQLite` database queried through a SELECT-only guard.
//!
//! The guard is a single syntactic check on the leading keyword. It is
//! backed by opening the database read-only and by `rusqlite` refusing
//! multi-statement strings, but it is not a sandbox.

pub mod store;

pub use store::{ColumnInfo, QueryOutput, Schema, SqlStore, TableSchema};

use crate::error::SqlError;

/// Longest statement excerpt echoed back in a rejection.
const REJECTED_EXCERPT_CHARS: usize = 80;

/// Returns the statement's leading keyword, uppercased.
fn leading_keyword(statement: &str) -> String {
    statement
        .trim_start()
        .chars()
        .take_while(char::is_ascii_alphabetic)
        .collect::<String>()
        .to_ascii_uppercase()
}

/// Accepts only statements whose leading keyword is `SELECT`.
///
/// # Errors
///
/// Returns [`SqlError::Rejected`] for anything else.
pub fn ensure_select(statement: &str) -> Result<&str, SqlError> {
    let trimmed = statement.trim();
    if leading_keyword(trimmed) == "SELECT" {
        Ok(trimmed)
    } else {
        Err(SqlError::Rejected {
            statement: trimmed.chars().take(REJECTED_EXCERPT_CHARS).collect(),
        })
    }
}
