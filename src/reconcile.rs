use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info};

use crate::diagnostics::Diagnostics;
use crate::geometry::GeoFeature;
use crate::models::{cell, parse_amount, Table};
use crate::normalize::normalize_name;

/// Entity name -> value, built once per table load.
///
/// Keys are the trimmed names from the table. A `None` value means the name
/// was present but its value cell did not parse.
#[derive(Debug, Clone, Default)]
pub struct EntityValueMap {
    values: HashMap<String, Option<f64>>,
    by_normalized: BTreeMap<String, String>,
}

impl EntityValueMap {
    pub fn from_table(table: &Table, name_col: Option<&str>, value_col: Option<&str>, diag: &mut Diagnostics) -> Self {
        let mut map = Self::default();
        let mut unparseable = 0usize;
        for row in &table.rows {
            let name = cell(row, name_col).as_text().trim().to_string();
            if name.is_empty() {
                continue;
            }
            let v = parse_amount(cell(row, value_col));
            if v.is_none() {
                unparseable += 1;
            }
            map.insert(name, v);
        }
        diag.unparseable(unparseable);
        debug!("Entity value map built - entries={}, unparseable={}", map.len(), unparseable);
        map
    }

    /// Later rows win.
    pub fn insert(&mut self, name: String, value: Option<f64>) {
        self.by_normalized.insert(normalize_name(&name), name.clone());
        self.values.insert(name, value);
    }

    fn len(&self) -> usize {
        self.values.len()
    }

    pub fn get(&self, name: &str) -> Option<Option<f64>> {
        self.values.get(name).copied()
    }

    /// Canonical key for a free-text name: verbatim, trimmed, normalized, then
    /// substring containment either way on normalized names.
    pub fn resolve_fuzzy(&self, raw: &str) -> Option<String> {
        if self.values.contains_key(raw) {
            return Some(raw.to_string());
        }
        let trimmed = raw.trim();
        if self.values.contains_key(trimmed) {
            return Some(trimmed.to_string());
        }
        let n = normalize_name(raw);
        if n.is_empty() {
            return None;
        }
        if let Some(k) = self.by_normalized.get(&n) {
            return Some(k.clone());
        }
        self.by_normalized
            .iter()
            .find(|(cand, _)| !cand.is_empty() && (cand.contains(n.as_str()) || n.contains(cand.as_str())))
            .map(|(_, k)| k.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    /// Feature name looked up verbatim.
    #[default]
    Exact,
    /// Verbatim, then trimmed/normalized, then substring containment.
    Fuzzy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", content = "value", rename_all = "snake_case")]
pub enum MatchStatus {
    Matched(f64),
    /// The name is in the table but its value did not parse.
    NoValue,
    Unmatched,
}

impl MatchStatus {
    pub fn label(&self) -> &'static str {
        match self {
            MatchStatus::Matched(_) => "matched",
            MatchStatus::NoValue => "no_value",
            MatchStatus::Unmatched => "unmatched",
        }
    }

    pub fn value(&self) -> Option<f64> {
        match self {
            MatchStatus::Matched(v) => Some(*v),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ReconciledFeature {
    /// Position in the feature collection.
    pub index: usize,
    pub name: String,
    /// Table key the feature was joined to, if any.
    pub matched_key: Option<String>,
    pub status: MatchStatus,
}

#[derive(Debug, Clone, Serialize)]
pub struct Reconciliation {
    pub mode: ReconcileMode,
    pub features: Vec<ReconciledFeature>,
    pub matched: usize,
    pub total: usize,
}

impl Reconciliation {
    pub fn values(&self) -> Vec<f64> {
        self.features.iter().filter_map(|f| f.status.value()).collect()
    }
}

/// Join features to the value map by name. Never fails: every feature comes
/// back exactly once, matched or flagged.
pub fn reconcile(
    features: &[GeoFeature],
    name_prop: Option<&str>,
    map: &EntityValueMap,
    mode: ReconcileMode,
    diag: &mut Diagnostics,
) -> Reconciliation {
    let mut out = Vec::with_capacity(features.len());
    let mut matched = 0usize;

    for (index, f) in features.iter().enumerate() {
        let raw = f.property_text(name_prop);
        let key = match mode {
            ReconcileMode::Exact => map.values.contains_key(&raw).then(|| raw.clone()),
            ReconcileMode::Fuzzy => map.resolve_fuzzy(&raw),
        };
        let status = match key.as_deref().and_then(|k| map.get(k)) {
            Some(Some(v)) => {
                matched += 1;
                MatchStatus::Matched(v)
            }
            Some(None) => {
                diag.no_value_entities += 1;
                MatchStatus::NoValue
            }
            None => {
                diag.unmatched_entities += 1;
                MatchStatus::Unmatched
            }
        };
        out.push(ReconciledFeature { index, name: raw.trim().to_string(), matched_key: key, status });
    }

    info!("Reconciliation completed - mode={:?}, matched={}/{}", mode, matched, features.len());
    Reconciliation { mode, total: out.len(), features: out, matched }
}

/// Interactive lookup for a picked name. `None` means reset to the default view.
pub fn resolve_entity(name: &str, map: &EntityValueMap) -> Option<String> {
    let hit = map.resolve_fuzzy(name);
    if hit.is_none() {
        debug!("Entity lookup unresolved - name={:?}", name);
    }
    hit
}
