use serde::Deserialize;

use gastos_core::ImportRule;

/// Priority-ordered keyword matcher, built once per import call.
///
/// Rules are sorted by descending priority with a stable sort, so ties keep
/// their arrival order; the first rule whose keyword occurs in the
/// lowercased description wins.
pub struct RuleEngine {
    rules: Vec<ImportRule>,
}

impl RuleEngine {
    pub fn new(mut rules: Vec<ImportRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self { rules }
    }

    /// Load rules from a TOML document of `[[rules]]` tables.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        #[derive(Deserialize)]
        struct RuleFile {
            #[serde(default)]
            rules: Vec<ImportRule>,
        }
        let file: RuleFile = toml::from_str(content)?;
        Ok(Self::new(file.rules))
    }

    /// Category for `description`, or `None` when no rule matches.
    pub fn categorize(&self, description: &str) -> Option<i64> {
        let haystack = description.to_lowercase();
        self.rules
            .iter()
            .find(|rule| haystack.contains(&rule.keyword.to_lowercase()))
            .map(|rule| rule.category_id)
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
