// src/buckets.rs
use serde::{Deserialize, Serialize};

use crate::models::{ClassifiedRecord, PathwayRecord};
use crate::normalize::normalize_name;

/// A narrative bucket and the substrings (normalized form) that select it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BucketRule {
    pub bucket: String,
    pub patterns: Vec<String>,
}

impl BucketRule {
    fn new(bucket: &str, patterns: &[&str]) -> Self {
        Self { bucket: bucket.to_string(), patterns: patterns.iter().map(|p| p.to_string()).collect() }
    }

    fn matches(&self, normalized: &str) -> bool {
        self.patterns.iter().any(|p| !p.is_empty() && normalized.contains(p.as_str()))
    }
}

/// Co-benefit text that forces the impact bucket regardless of pathway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactOverride {
    pub co_benefit_patterns: Vec<String>,
    pub impact_bucket: String,
}

/// Ordered rule table for the flow diagram. First matching rule wins on each
/// axis; the defaults catch everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketRules {
    pub source_rules: Vec<BucketRule>,
    pub impact_rules: Vec<BucketRule>,
    pub impact_override: Option<ImpactOverride>,
    pub default_source: String,
    pub default_impact: String,
}

pub const CALMER_SAFER_STREETS: &str = "Calmer & Safer Streets";
pub const CLEANER_ENVIRONMENTS: &str = "Cleaner Environments";
pub const ACTIVE_MOVEMENT: &str = "Active Movement";
pub const HEALTHIER_HOMES: &str = "Healthier Homes";
pub const OTHER_CO_BENEFITS: &str = "Other Co-benefits";

pub const HEALTH_AND_LIVES: &str = "Health & Lives";
pub const WELLBEING_AND_SLEEP: &str = "Wellbeing & Sleep";
pub const TIME_AND_CONVENIENCE: &str = "Time & Convenience";
pub const ECONOMY_AND_PRODUCTIVITY: &str = "Economy & Productivity";
pub const WIDER_BENEFITS: &str = "Wider Benefits";

impl Default for BucketRules {
    fn default() -> Self {
        Self {
            source_rules: vec![
                BucketRule::new(
                    CALMER_SAFER_STREETS,
                    &["congestion", "road_safety", "road_repair", "noise", "traffic", "collision"],
                ),
                BucketRule::new(
                    CLEANER_ENVIRONMENTS,
                    &["air_quality", "air_pollution", "pollution", "emission", "greenhouse", "carbon"],
                ),
                BucketRule::new(ACTIVE_MOVEMENT, &["physical_activity", "active", "walking", "cycling", "diet"]),
                BucketRule::new(HEALTHIER_HOMES, &["dampness", "excess_cold", "excess_heat", "housing", "home"]),
            ],
            impact_rules: vec![
                BucketRule::new(HEALTH_AND_LIVES, &["mortality", "qaly", "health", "disease", "injur", "life"]),
                BucketRule::new(WELLBEING_AND_SLEEP, &["sleep", "amenity", "wellbeing", "comfort"]),
                BucketRule::new(TIME_AND_CONVENIENCE, &["time", "journey", "travel", "delay"]),
                BucketRule::new(ECONOMY_AND_PRODUCTIVITY, &["productivity", "society", "economic", "cost", "work"]),
            ],
            impact_override: Some(ImpactOverride {
                co_benefit_patterns: vec!["air_quality".into(), "air_pollution".into()],
                impact_bucket: WELLBEING_AND_SLEEP.into(),
            }),
            default_source: OTHER_CO_BENEFITS.into(),
            default_impact: WIDER_BENEFITS.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BucketPair {
    pub source: String,
    pub impact: String,
    pub source_defaulted: bool,
    pub impact_defaulted: bool,
}

impl BucketRules {
    /// Every bucket name either axis can produce, defaults last.
    pub fn source_buckets(&self) -> Vec<String> {
        let mut v: Vec<String> = self.source_rules.iter().map(|r| r.bucket.clone()).collect();
        push_unique(&mut v, &self.default_source);
        v
    }

    pub fn impact_buckets(&self) -> Vec<String> {
        let mut v: Vec<String> = self.impact_rules.iter().map(|r| r.bucket.clone()).collect();
        if let Some(o) = &self.impact_override {
            push_unique(&mut v, &o.impact_bucket);
        }
        push_unique(&mut v, &self.default_impact);
        v
    }

    pub fn classify(&self, co_benefit: &str, pathway: &str) -> BucketPair {
        let cob = normalize_name(co_benefit);
        let path = normalize_name(pathway);

        let source = self.source_rules.iter().find(|r| r.matches(&cob)).map(|r| r.bucket.clone());

        let forced = self.impact_override.as_ref().and_then(|o| {
            o.co_benefit_patterns
                .iter()
                .any(|p| !p.is_empty() && cob.contains(p.as_str()))
                .then(|| o.impact_bucket.clone())
        });
        let impact = forced.or_else(|| self.impact_rules.iter().find(|r| r.matches(&path)).map(|r| r.bucket.clone()));

        BucketPair {
            source_defaulted: source.is_none(),
            impact_defaulted: impact.is_none(),
            source: source.unwrap_or_else(|| self.default_source.clone()),
            impact: impact.unwrap_or_else(|| self.default_impact.clone()),
        }
    }

    pub fn classify_record(&self, r: &PathwayRecord) -> (ClassifiedRecord, BucketPair) {
        let pair = self.classify(&r.co_benefit, &r.pathway);
        let rec = ClassifiedRecord {
            source_bucket: pair.source.clone(),
            impact_bucket: pair.impact.clone(),
            amount: r.amount,
        };
        (rec, pair)
    }
}

fn push_unique(v: &mut Vec<String>, s: &str) {
    if !v.iter().any(|x| x == s) {
        v.push(s.to_string());
    }
}
