use serde::Serialize;
use tracing::{debug, warn};

/// Result of a heuristic lookup that may have fallen back to a default.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<T> {
    /// A rule matched.
    Found(T),
    /// No rule matched; a documented fallback was used.
    Fallback { value: T, reason: String },
    /// Nothing could be resolved.
    Missing { reason: String },
}

impl<T> Resolution<T> {
    pub fn value(&self) -> Option<&T> {
        match self {
            Resolution::Found(v) | Resolution::Fallback { value: v, .. } => Some(v),
            Resolution::Missing { .. } => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Resolution::Found(v) | Resolution::Fallback { value: v, .. } => Some(v),
            Resolution::Missing { .. } => None,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Resolution::Fallback { .. })
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Resolution::Missing { .. })
    }
}

/// Counters for every silent fallback taken while building the story.
///
/// Nothing here is surfaced to the reader of the story; it is written next
/// to the bundles so a run can be audited.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Diagnostics {
    pub column_fallbacks: usize,
    pub missing_columns: usize,
    pub unparseable_cells: usize,
    pub unmatched_entities: usize,
    pub no_value_entities: usize,
    pub outliers_removed: usize,
    pub source_fallbacks: usize,
    pub failed_sources: usize,
    pub defaulted_buckets: usize,
    pub notes: Vec<String>,
}

impl Diagnostics {
    /// Count a column resolution and pass the chosen column through.
    pub fn column(&mut self, label: &str, res: &Resolution<String>) -> Option<String> {
        match res {
            Resolution::Found(c) => {
                debug!("Column resolved - role={}, column={}", label, c);
            }
            Resolution::Fallback { value, reason } => {
                warn!("Column fallback - role={}, column={}, reason={}", label, value, reason);
                self.column_fallbacks += 1;
                self.notes.push(format!("{label}: positional fallback to '{value}' ({reason})"));
            }
            Resolution::Missing { reason } => {
                warn!("Column missing - role={}, reason={}", label, reason);
                self.missing_columns += 1;
                self.notes.push(format!("{label}: no column ({reason})"));
            }
        }
        res.value().cloned()
    }

    pub fn unparseable(&mut self, n: usize) {
        self.unparseable_cells += n;
    }

    pub fn source_fallback(&mut self, what: &str, reason: &str) {
        warn!("Source fallback - source={}, reason={}", what, reason);
        self.source_fallbacks += 1;
        self.notes.push(format!("{what}: fell back ({reason})"));
    }

    pub fn source_failed(&mut self, what: &str, reason: &str) {
        warn!("Source unavailable - source={}, reason={}", what, reason);
        self.failed_sources += 1;
        self.notes.push(format!("{what}: unavailable ({reason})"));
    }

    pub fn note(&mut self, msg: impl Into<String>) {
        self.notes.push(msg.into());
    }
}
