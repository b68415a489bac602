//! Bank-statement ingestion pipeline.
//!
//! Turns a raw uploaded file (Excel or CSV with unknown delimiter, encoding
//! and header position) into normalized pending transactions for one user,
//! with dedup against already-recorded data and rule-based categorization.
//!
//! Four stages, applied strictly in order per upload:
//!
//! 1. [`table::load_table`] — brute-force the (format, delimiter, encoding,
//!    header-row) search space into a [`RawTable`].
//! 2. [`columns::resolve_columns`] — map header labels to the date,
//!    description, debit and credit roles.
//! 3. [`normalize::normalize_row`] — per row: parse date and amount, infer
//!    polarity, sanitize the description, or skip.
//! 4. [`pipeline::import_statement`] — drop duplicates, apply the user's
//!    categorization rules, and assemble the [`ImportResult`].

pub mod columns;
pub mod normalize;
pub mod pipeline;
pub mod rules;
pub mod table;

use thiserror::Error;

pub use columns::{ColumnRoleMap, Role};
pub use normalize::NormalizedRow;
pub use pipeline::{import_statement, ImportResult, ImportStore};
pub use rules::RuleEngine;
pub use table::{Cell, RawTable};

/// Fatal import failures. Row-level problems never surface here; malformed
/// rows are skipped individually.
#[derive(Error, Debug)]
pub enum ImportError {
    /// No (format, delimiter, encoding) combination produced a table with a
    /// recognizable header row. `attempts` lists the exhausted strategies,
    /// for diagnostics only.
    #[error("file could not be read: no strategy yielded a statement table (tried: {})", .attempts.join("; "))]
    UnrecognizedFormat { attempts: Vec<String> },

    /// A header row was found but required roles could not be assigned.
    /// Carries the actual labels seen so the caller can adjust the file.
    #[error("could not resolve required column(s) {missing:?}; headers present: {available:?}")]
    UnresolvedColumns {
        missing: Vec<Role>,
        available: Vec<String>,
    },

    #[error("storage error: {0}")]
    Store(#[from] anyhow::Error),
}
