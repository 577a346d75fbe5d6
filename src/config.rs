use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

use crate::buckets::BucketRules;
use crate::geometry::OutlierPolicy;
use crate::reconcile::ReconcileMode;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InputFiles {
    pub geometry: String,
    pub entity_values: String,
    pub pathways: String,
    /// Falls back to `entity_values` when it cannot be loaded.
    pub ranking: String,
}

impl Default for InputFiles {
    fn default() -> Self {
        Self {
            geometry: "data/la_boundaries_simplified.geojson".into(),
            entity_values: "data/la_values_total.csv".into(),
            pathways: "data/mechanism_national_coben_pathway.json".into(),
            ranking: "data/level1_local_authority_ranking.json".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KpiCandidate {
    pub key: String,
    pub title: String,
    pub slot: String,
}

impl KpiCandidate {
    fn new(key: &str, title: &str, slot: &str) -> Self {
        Self { key: key.into(), title: title.into(), slot: slot.into() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryConfig {
    pub inputs: InputFiles,
    pub outlier: OutlierPolicy,
    /// How map features are joined to the value table.
    pub map_reconcile: ReconcileMode,
    pub composition_top_n: usize,
    pub ranking_top_n: usize,
    pub ranking_bottom_n: usize,
    /// Number of colour classes for the choropleth.
    pub color_classes: usize,
    pub kpis: Vec<KpiCandidate>,
    pub health_keywords: Vec<String>,
    pub buckets: BucketRules,
}

impl Default for StoryConfig {
    fn default() -> Self {
        Self {
            inputs: InputFiles::default(),
            outlier: OutlierPolicy::default(),
            map_reconcile: ReconcileMode::Exact,
            composition_top_n: 10,
            ranking_top_n: 10,
            ranking_bottom_n: 10,
            color_classes: 9,
            kpis: vec![
                KpiCandidate::new("sleep_disturbance", "Better sleep", "sleep"),
                KpiCandidate::new("amenity", "More liveable places", "amenity"),
                KpiCandidate::new("time_saved", "Time back", "time"),
            ],
            health_keywords: vec!["mortality".into(), "health".into(), "sleep".into()],
            buckets: BucketRules::default(),
        }
    }
}

impl StoryConfig {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).context("parsing story config")
    }

    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading story config - path={}", path.display());
        let text = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml_str(&text)
    }
}
