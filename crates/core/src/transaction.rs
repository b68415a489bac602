use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Direction of money movement, from the account holder's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Income,
    Expense,
}

/// Statement descriptions are truncated to this many characters; the raw
/// text is kept alongside for display and audit.
pub const DESCRIPTION_MAX_LEN: usize = 200;

pub fn truncate_description(raw: &str) -> String {
    raw.chars().take(DESCRIPTION_MAX_LEN).collect()
}

/// A normalized statement row awaiting user review. Persisted in a pending
/// state and later either promoted to a confirmed transaction or discarded;
/// never mutated by the import pipeline after emission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateTransaction {
    pub id: Option<i64>,
    pub user_id: i64,
    pub category_id: Option<i64>,
    /// Positive, rounded to 2 decimal places.
    pub amount: Decimal,
    pub kind: TransactionKind,
    /// Sanitized and truncated to [`DESCRIPTION_MAX_LEN`] characters.
    pub description: String,
    pub raw_description: String,
    pub date: NaiveDate,
    /// True iff `category_id` was assigned by an import rule.
    pub auto_categorized: bool,
    /// Shared by every candidate from one upload, for bulk review.
    pub import_batch_id: String,
}
