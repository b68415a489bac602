use serde::{Deserialize, Serialize};

/// User-defined keyword-to-category mapping applied during import.
///
/// Rules are matched in descending `priority` order against the lowercased
/// statement description; the first keyword found as a substring wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportRule {
    #[serde(default)]
    pub id: Option<i64>,
    /// Stored lowercase; matching is case-insensitive either way.
    pub keyword: String,
    pub category_id: i64,
    pub priority: i32,
}
