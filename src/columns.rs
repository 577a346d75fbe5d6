use serde::{Deserialize, Serialize};

use crate::diagnostics::Resolution;
use crate::normalize::normalize_name;

/// One way a column name can satisfy a role. Names are normalized before
/// matching; patterns are written in normalized form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnMatcher {
    Exact(String),
    ContainsAll(Vec<String>),
}

impl ColumnMatcher {
    fn matches(&self, normalized: &str) -> bool {
        match self {
            ColumnMatcher::Exact(n) => normalized == n,
            ColumnMatcher::ContainsAll(tokens) => tokens.iter().all(|t| normalized.contains(t.as_str())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Fallback {
    Position(usize),
    Last,
}

/// Ordered matchers for one column role plus the positional default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnRule {
    pub matchers: Vec<ColumnMatcher>,
    pub fallback: Fallback,
}

fn exact(n: &str) -> ColumnMatcher {
    ColumnMatcher::Exact(n.to_string())
}

fn all(tokens: &[&str]) -> ColumnMatcher {
    ColumnMatcher::ContainsAll(tokens.iter().map(|t| t.to_string()).collect())
}

impl ColumnRule {
    pub fn new(matchers: Vec<ColumnMatcher>, fallback: Fallback) -> Self {
        Self { matchers, fallback }
    }

    /// Entity name in the value table, and name property on geometry features.
    pub fn entity_name() -> Self {
        Self::new(
            vec![exact("local_authority"), all(&["authority"]), all(&["lad", "name"]), all(&["lad", "nm"])],
            Fallback::Position(0),
        )
    }

    pub fn entity_value() -> Self {
        Self::new(
            vec![
                exact("total_value_mgbp"),
                all(&["total", "mgbp"]),
                all(&["value", "mgbp"]),
                all(&["total_value"]),
                all(&["value"]),
            ],
            Fallback::Position(1),
        )
    }

    pub fn co_benefit() -> Self {
        Self::new(vec![all(&["co", "benefit"]), all(&["benefit"])], Fallback::Position(0))
    }

    pub fn pathway() -> Self {
        Self::new(vec![all(&["pathway"]), all(&["mechanism"])], Fallback::Position(1))
    }

    pub fn pathway_value() -> Self {
        Self::new(vec![all(&["value", "mgbp"]), all(&["value"])], Fallback::Position(2))
    }

    pub fn ranking_name() -> Self {
        Self::new(vec![all(&["authority"]), all(&["lad"])], Fallback::Position(0))
    }

    pub fn ranking_value() -> Self {
        Self::new(vec![all(&["value", "mgbp"]), all(&["total"])], Fallback::Position(1))
    }

    pub fn summary_value() -> Self {
        Self::new(vec![all(&["value", "mgbp"]), all(&["value"])], Fallback::Last)
    }

    pub fn places_value() -> Self {
        Self::new(vec![all(&["value", "mgbp"]), all(&["total"])], Fallback::Last)
    }
}

/// Pick the column for a role. Matchers are tried in rule order, and within a
/// matcher columns are scanned in source order, so the answer depends only on
/// the column list.
pub fn resolve_column(columns: &[String], rule: &ColumnRule) -> Resolution<String> {
    let normalized: Vec<String> = columns.iter().map(|c| normalize_name(c)).collect();

    for m in &rule.matchers {
        if let Some(i) = normalized.iter().position(|n| m.matches(n)) {
            return Resolution::Found(columns[i].clone());
        }
    }

    let idx = match rule.fallback {
        Fallback::Position(i) => Some(i),
        Fallback::Last => columns.len().checked_sub(1),
    };
    match idx.and_then(|i| columns.get(i)) {
        Some(c) => Resolution::Fallback {
            value: c.clone(),
            reason: format!("no rule matched among {} columns", columns.len()),
        },
        None => Resolution::Missing {
            reason: format!("positional fallback {:?} outside {} columns", rule.fallback, columns.len()),
        },
    }
}
