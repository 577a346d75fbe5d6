// src/viz_export.rs
use anyhow::{Context, Result};
use serde::Serialize;
use std::{fs, path::Path};
use tracing::{debug, info};
use xxhash_rust::xxh3::xxh3_64;

use crate::aggregate::{
    bottom_k, group_sum, keyword_total, quantile_breaks, share_of, share_of_total, sorted_desc, top_k, total_abs,
    total_signed, GroupTotal,
};
use crate::buckets::BucketRules;
use crate::columns::{resolve_column, ColumnRule};
use crate::config::{KpiCandidate, StoryConfig};
use crate::diagnostics::{Diagnostics, Resolution};
use crate::geometry::{collection_bounds, filter_outliers, projection_hint, FeatureCollection, ProjectionHint};
use crate::models::{cell, parse_amount, PathwayRecord, Table};
use crate::normalize::{humanize, normalize_name};
use crate::reconcile::{reconcile, EntityValueMap, Reconciliation};
use crate::render::{
    composition_note, format_money, format_signed_money, kpi_label, percent, ranking_note,
};
use crate::views::Emphasis;

pub fn write_json<P: AsRef<Path>, T: ?Sized + Serialize>(path: P, value: &T) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, serde_json::to_vec_pretty(value)?).with_context(|| format!("write {}", path.display()))
}

/* -------------------------------------------------------------------------- */
/* 1) Map                                                                     */
/* -------------------------------------------------------------------------- */

/// Everything the choropleth needs before selection styling is applied.
#[derive(Debug, Clone)]
pub struct MapScene {
    pub geo: FeatureCollection,
    pub values: EntityValueMap,
    pub reconciliation: Reconciliation,
    pub name_property: Option<String>,
    pub name_column: Option<String>,
    pub value_column: Option<String>,
    pub projection: ProjectionHint,
    pub color_breaks: Vec<f64>,
}

impl MapScene {
    /// Join key per drawn feature: the matched table name, else the feature's own.
    pub fn selection_keys(&self) -> Vec<String> {
        self.reconciliation
            .features
            .iter()
            .map(|f| f.matched_key.clone().unwrap_or_else(|| f.name.clone()))
            .collect()
    }
}

pub fn build_map_scene(geo: &FeatureCollection, table: &Table, cfg: &StoryConfig, diag: &mut Diagnostics) -> MapScene {
    let before = geo.features.len();
    let geo = filter_outliers(geo, &cfg.outlier);
    diag.outliers_removed += before - geo.features.len();

    let name_column = diag.column("map entity name", &resolve_column(&table.columns, &ColumnRule::entity_name()));
    let value_column = diag.column("map entity value", &resolve_column(&table.columns, &ColumnRule::entity_value()));

    let prop_keys = geo.features.first().map(|f| f.property_keys()).unwrap_or_default();
    let name_property = diag.column("geometry name property", &resolve_column(&prop_keys, &ColumnRule::entity_name()));

    let values = EntityValueMap::from_table(table, name_column.as_deref(), value_column.as_deref(), diag);
    let reconciliation = reconcile(&geo.features, name_property.as_deref(), &values, cfg.map_reconcile, diag);
    let color_breaks = quantile_breaks(&reconciliation.values(), cfg.color_classes);
    let projection = projection_hint(collection_bounds(&geo.features));

    info!(
        "Map scene built - name_column={:?}, value_column={:?}, name_property={:?}, matched={}/{}",
        name_column, value_column, name_property, reconciliation.matched, reconciliation.total
    );

    MapScene { geo, values, reconciliation, name_property, name_column, value_column, projection, color_breaks }
}

#[derive(Serialize)]
pub struct VMapFeature {
    pub id: String,
    pub name: String,
    pub status: &'static str,
    pub value: Option<f64>,
    /// Tooltip amount; unmatched and unparseable features read "No data".
    pub display: String,
    pub emphasis: Emphasis,
    pub geometry: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub struct VMapBundle {
    pub projection: ProjectionHint,
    pub name_property: Option<String>,
    pub name_column: Option<String>,
    pub value_column: Option<String>,
    pub matched: usize,
    pub total: usize,
    pub color_breaks: Vec<f64>,
    pub features: Vec<VMapFeature>,
}

pub fn map_bundle(scene: &MapScene, emphasis: &[Emphasis]) -> VMapBundle {
    let features = scene
        .reconciliation
        .features
        .iter()
        .map(|rf| {
            let geometry = scene.geo.features[rf.index].geometry.clone();
            VMapFeature {
                id: format!("{:016x}", xxh3_64(format!("{}|{}", rf.index, rf.name).as_bytes())),
                name: rf.name.clone(),
                status: rf.status.label(),
                value: rf.status.value(),
                display: format_money(rf.status.value().unwrap_or(f64::NAN)),
                emphasis: emphasis.get(rf.index).copied().unwrap_or(Emphasis::Normal),
                geometry,
            }
        })
        .collect();

    VMapBundle {
        projection: scene.projection,
        name_property: scene.name_property.clone(),
        name_column: scene.name_column.clone(),
        value_column: scene.value_column.clone(),
        matched: scene.reconciliation.matched,
        total: scene.reconciliation.total,
        color_breaks: scene.color_breaks.clone(),
        features,
    }
}

/* -------------------------------------------------------------------------- */
/* Pathway records (shared by composition, flows and KPIs)                    */
/* -------------------------------------------------------------------------- */

/// Clean the pathway table: rows need a pathway name and a finite amount.
pub fn pathway_records(table: &Table, diag: &mut Diagnostics) -> Vec<PathwayRecord> {
    let cob_col = diag.column("co-benefit", &resolve_column(&table.columns, &ColumnRule::co_benefit()));
    let path_col = diag.column("pathway", &resolve_column(&table.columns, &ColumnRule::pathway()));
    let val_col = diag.column("pathway value", &resolve_column(&table.columns, &ColumnRule::pathway_value()));

    let mut out = Vec::with_capacity(table.len());
    let mut unparseable = 0usize;
    for row in &table.rows {
        let pathway = cell(row, path_col.as_deref()).as_text().trim().to_string();
        if pathway.is_empty() {
            continue;
        }
        let Some(amount) = parse_amount(cell(row, val_col.as_deref())) else {
            unparseable += 1;
            continue;
        };
        out.push(PathwayRecord {
            co_benefit: cell(row, cob_col.as_deref()).as_text().trim().to_string(),
            pathway,
            amount,
        });
    }
    diag.unparseable(unparseable);
    debug!("Pathway records cleaned - kept={}, unparseable={}", out.len(), unparseable);
    out
}

pub fn pathway_totals(records: &[PathwayRecord]) -> Vec<GroupTotal<String>> {
    group_sum(records, |r| r.pathway.clone(), |r| r.amount)
}

/* -------------------------------------------------------------------------- */
/* 2) Composition                                                             */
/* -------------------------------------------------------------------------- */

#[derive(Serialize)]
pub struct VCompositionBar {
    pub pathway: String,
    pub label: String,
    pub value: f64,
    pub display: String,
    /// Largest absolute value among the shown bars.
    pub highlight: bool,
}

#[derive(Serialize)]
pub struct VComposition {
    pub note: String,
    pub shown: usize,
    pub negative_shown: usize,
    pub share_shown: f64,
    pub bars: Vec<VCompositionBar>,
}

pub fn build_composition(totals: &[GroupTotal<String>], top_n: usize) -> VComposition {
    let top = top_k(totals, top_n);
    let share_shown = share_of(total_abs(&top), total_abs(totals));
    let max_abs = top.iter().map(|g| g.value.abs()).fold(0.0, f64::max);

    let bars = top
        .iter()
        .map(|g| VCompositionBar {
            pathway: g.key.clone(),
            label: humanize(&g.key),
            value: g.value,
            display: format_signed_money(g.value),
            highlight: g.value.abs() == max_abs,
        })
        .collect();

    VComposition {
        note: composition_note(top.len(), share_shown),
        shown: top.len(),
        negative_shown: top.iter().filter(|g| g.value < 0.0).count(),
        share_shown,
        bars,
    }
}

/* -------------------------------------------------------------------------- */
/* 3) Flows (Sankey)                                                          */
/* -------------------------------------------------------------------------- */

#[derive(Serialize)]
pub struct VFlowNode {
    pub id: String,
    pub side: &'static str,
}

#[derive(Serialize)]
pub struct VFlowLink {
    pub source: String,
    pub target: String,
    /// Magnitude for layout.
    pub value: f64,
    pub signed_value: f64,
    pub display: String,
    pub share: f64,
}

#[derive(Serialize)]
pub struct VFlows {
    pub nodes: Vec<VFlowNode>,
    pub links: Vec<VFlowLink>,
    pub default_source: String,
    pub default_impact: String,
}

pub fn build_flows(records: &[PathwayRecord], rules: &BucketRules, diag: &mut Diagnostics) -> VFlows {
    let mut classified = Vec::with_capacity(records.len());
    for r in records {
        let (rec, pair) = rules.classify_record(r);
        if pair.source_defaulted || pair.impact_defaulted {
            diag.defaulted_buckets += 1;
            debug!("Bucket default used - co_benefit={:?}, pathway={:?}", r.co_benefit, r.pathway);
        }
        classified.push(rec);
    }

    let pairs = group_sum(&classified, |c| (c.source_bucket.clone(), c.impact_bucket.clone()), |c| c.amount);
    let links: Vec<VFlowLink> = sorted_desc(&pairs)
        .iter()
        .map(|g| VFlowLink {
            source: g.key.0.clone(),
            target: g.key.1.clone(),
            value: g.value.abs(),
            signed_value: g.value,
            display: format_signed_money(g.value),
            share: share_of_total(g, &pairs),
        })
        .collect();

    let mut nodes = Vec::new();
    for b in rules.source_buckets() {
        if links.iter().any(|l| l.source == b) {
            nodes.push(VFlowNode { id: b, side: "source" });
        }
    }
    for b in rules.impact_buckets() {
        if links.iter().any(|l| l.target == b) {
            nodes.push(VFlowNode { id: b, side: "impact" });
        }
    }

    info!("Flows built - records={}, links={}, nodes={}", records.len(), links.len(), nodes.len());
    VFlows { nodes, links, default_source: rules.default_source.clone(), default_impact: rules.default_impact.clone() }
}

/* -------------------------------------------------------------------------- */
/* 4) KPI cards                                                               */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Serialize)]
pub struct VKpiCard {
    pub slot: String,
    pub title: String,
    pub pathway: String,
    pub value: f64,
    pub display: String,
    pub share_percent: i64,
    pub fallback: bool,
    pub label: String,
}

#[derive(Serialize)]
pub struct VKpis {
    pub cards: Vec<VKpiCard>,
}

/// Cards for the preferred pathways. A candidate whose pathway is absent takes
/// the largest unused pathway by absolute value and is flagged as a fallback.
pub fn build_kpis(totals: &[GroupTotal<String>], candidates: &[KpiCandidate]) -> VKpis {
    let all_abs = total_abs(totals);
    let mut chosen: Vec<(&KpiCandidate, &GroupTotal<String>, bool)> = Vec::new();
    let mut missing: Vec<&KpiCandidate> = Vec::new();

    for c in candidates {
        let want = normalize_name(&c.key);
        match totals.iter().find(|g| normalize_name(&g.key) == want) {
            Some(g) => chosen.push((c, g, false)),
            None => missing.push(c),
        }
    }

    if !missing.is_empty() {
        let mut by_abs: Vec<&GroupTotal<String>> = totals.iter().collect();
        by_abs.sort_by(|a, b| b.value.abs().partial_cmp(&a.value.abs()).unwrap_or(std::cmp::Ordering::Equal));
        for c in missing {
            if let Some(g) = by_abs.iter().copied().find(|g| !chosen.iter().any(|(_, p, _)| p.key == g.key)) {
                chosen.push((c, g, true));
            }
        }
    }

    // cards follow candidate order, not discovery order
    let cards = candidates
        .iter()
        .filter_map(|c| chosen.iter().find(|(cc, _, _)| cc.slot == c.slot))
        .map(|(c, g, fallback)| {
            let share = share_of(g.value, all_abs);
            VKpiCard {
                slot: c.slot.clone(),
                title: c.title.clone(),
                pathway: g.key.clone(),
                value: g.value,
                display: format_signed_money(g.value),
                share_percent: percent(share),
                fallback: *fallback,
                label: kpi_label(&g.key.replace('_', " "), share, *fallback),
            }
        })
        .collect();

    VKpis { cards }
}

/* -------------------------------------------------------------------------- */
/* 5) Summary                                                                 */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Default, Serialize)]
pub struct VSummary {
    pub national_total: Option<f64>,
    pub national_total_display: Option<String>,
    pub health_share_percent: Option<i64>,
    pub places_share_percent: Option<i64>,
    pub places_positive: Option<usize>,
    pub places_counted: Option<usize>,
}

/// National total and health share from the raw pathway table.
pub fn summarize_pathways(
    summary: &mut VSummary,
    table: &Table,
    health_keywords: &[String],
    diag: &mut Diagnostics,
) {
    let val_col = diag.column("summary value", &resolve_column(&table.columns, &ColumnRule::summary_value()));
    let amount = |row: &crate::models::Row| parse_amount(cell(row, val_col.as_deref()));

    // unparseable amounts were already counted by pathway_records
    let total: f64 = table.rows.iter().filter_map(amount).sum();

    let health = keyword_total(&table.rows, health_keywords, row_text, amount);
    let split = [
        GroupTotal { key: true, value: health, count: 0 },
        GroupTotal { key: false, value: total - health, count: 0 },
    ];
    summary.national_total = Some(total);
    summary.national_total_display = Some(format_signed_money(total));
    summary.health_share_percent = Some(percent(share_of_total(&split[0], &split)));
}

/// Share of entities whose value is positive, among entities with a value.
pub fn summarize_places(summary: &mut VSummary, table: &Table, diag: &mut Diagnostics) {
    let val_col = diag.column("places value", &resolve_column(&table.columns, &ColumnRule::places_value()));
    let values: Vec<f64> =
        table.rows.iter().filter_map(|r| parse_amount(cell(r, val_col.as_deref()))).collect();
    let positive = values.iter().filter(|v| **v > 0.0).count();
    let counted = values.len();
    let share = if counted == 0 { 0.0 } else { positive as f64 / counted as f64 };
    summary.places_positive = Some(positive);
    summary.places_counted = Some(counted);
    summary.places_share_percent = Some(percent(share));
}

/// Cell values of a row joined for keyword search; column names are left out.
fn row_text(row: &crate::models::Row) -> String {
    let mut parts: Vec<String> = row.values().map(|c| c.as_text()).collect();
    parts.sort();
    parts.join(" ")
}

/* -------------------------------------------------------------------------- */
/* 6) Ranking                                                                 */
/* -------------------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct RankedEntity {
    pub name: String,
    /// Name the selection state knows this entity by.
    pub key: String,
    pub value: f64,
    pub group: &'static str,
}

#[derive(Debug, Clone)]
pub struct RankingScene {
    pub source: &'static str,
    pub top_n: usize,
    pub bottom_n: usize,
    pub rows: Vec<RankedEntity>,
}

/// Top and bottom entities by signed value. Duplicate names are summed so each
/// entity gets one bar.
pub fn build_ranking_scene(
    ranking: &Resolution<Table>,
    values: Option<&EntityValueMap>,
    cfg: &StoryConfig,
    diag: &mut Diagnostics,
) -> Option<RankingScene> {
    let (table, source) = match ranking {
        Resolution::Found(t) => (t, "ranking"),
        Resolution::Fallback { value, reason } => {
            diag.source_fallback("ranking", reason);
            (value, "fallback")
        }
        Resolution::Missing { reason } => {
            diag.source_failed("ranking", reason);
            return None;
        }
    };

    let name_col = diag.column("ranking name", &resolve_column(&table.columns, &ColumnRule::ranking_name()));
    let val_col = diag.column("ranking value", &resolve_column(&table.columns, &ColumnRule::ranking_value()));

    let mut entries = Vec::with_capacity(table.len());
    let mut unparseable = 0usize;
    for row in &table.rows {
        let name = cell(row, name_col.as_deref()).as_text().trim().to_string();
        if name.is_empty() {
            continue;
        }
        match parse_amount(cell(row, val_col.as_deref())) {
            Some(v) => entries.push((name, v)),
            None => unparseable += 1,
        }
    }
    // the fallback table is the entity value CSV, already counted when the map was built
    if source == "ranking" || values.is_none() {
        diag.unparseable(unparseable);
    }

    let totals = group_sum(&entries, |e| e.0.clone(), |e| e.1);
    let key_for = |name: &str| values.and_then(|m| m.resolve_fuzzy(name)).unwrap_or_else(|| name.to_string());

    let mut rows = Vec::new();
    for (group, part) in [("top", top_k(&totals, cfg.ranking_top_n)), ("bottom", bottom_k(&totals, cfg.ranking_bottom_n))] {
        for g in part {
            rows.push(RankedEntity { key: key_for(&g.key), name: g.key, value: g.value, group });
        }
    }

    info!("Ranking built - source={}, entities={}, shown={}", source, totals.len(), rows.len());
    Some(RankingScene { source, top_n: cfg.ranking_top_n, bottom_n: cfg.ranking_bottom_n, rows })
}

#[derive(Serialize)]
pub struct VRankBar {
    pub name: String,
    pub label: String,
    pub value: f64,
    pub display: String,
    pub group: &'static str,
    pub emphasis: Emphasis,
}

#[derive(Serialize)]
pub struct VRanking {
    pub source: &'static str,
    pub note: String,
    pub bars: Vec<VRankBar>,
}

pub fn ranking_bundle(scene: &RankingScene, emphasis: &[Emphasis]) -> VRanking {
    let bars = scene
        .rows
        .iter()
        .enumerate()
        .map(|(i, r)| VRankBar {
            name: r.name.clone(),
            label: r.name.replace('_', " "),
            value: r.value,
            display: format_signed_money(r.value),
            group: r.group,
            emphasis: emphasis.get(i).copied().unwrap_or(Emphasis::Normal),
        })
        .collect();
    VRanking { source: scene.source, note: ranking_note(scene.top_n, scene.bottom_n), bars }
}

/// National signed total across pathway groups (for the index counts).
pub fn pathway_net_total(totals: &[GroupTotal<String>]) -> f64 {
    total_signed(totals)
}
