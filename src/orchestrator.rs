// src/orchestrator.rs
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::json;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, info, warn};

use crate::config::StoryConfig;
use crate::diagnostics::Diagnostics;
use crate::fetch::{load_csv_table, load_geometry, load_json_table, load_ranking_table, DataSource};
use crate::reconcile::{resolve_entity, EntityValueMap};
use crate::selection::SelectionState;
use crate::viz_export::{
    build_composition, build_flows, build_kpis, build_map_scene, build_ranking_scene, map_bundle,
    pathway_net_total, pathway_records, pathway_totals, ranking_bundle, summarize_pathways, summarize_places,
    write_json, VSummary,
};
use crate::views::{MapView, RankingView};

/// What a run produced.
#[derive(Debug, Clone, Serialize)]
pub struct StoryReport {
    pub files: Vec<String>,
    pub selected: Option<String>,
    pub diagnostics: Diagnostics,
}

/// Load every input, build every scene whose inputs arrived, and write the
/// bundles into `out_dir`.
///
/// All loads start together; a scene runs only after all of its own inputs
/// have finished loading. A failed input blanks its scenes and nothing else.
pub async fn run_story(
    cfg: &StoryConfig,
    source: &DataSource,
    out_dir: &Path,
    select: Option<&str>,
) -> Result<StoryReport> {
    let pipeline_start = std::time::Instant::now();
    info!("Story build started - out_dir={}", out_dir.display());

    let inputs = &cfg.inputs;
    let (geo, values, pathways, ranking) = tokio::join!(
        load_geometry(source, &inputs.geometry),
        load_csv_table(source, &inputs.entity_values),
        load_json_table(source, &inputs.pathways),
        load_ranking_table(source, &inputs.ranking, &inputs.entity_values),
    );
    info!("Input loads settled - duration={:.2}s", pipeline_start.elapsed().as_secs_f32());

    let mut diag = Diagnostics::default();
    std::fs::create_dir_all(out_dir).with_context(|| format!("create {}", out_dir.display()))?;
    let mut files: Vec<String> = Vec::new();

    // 1) map: geometry + entity values
    let map_scene = match (&geo, &values) {
        (Ok(g), Ok(v)) => Some(build_map_scene(g, v, cfg, &mut diag)),
        (g, v) => {
            for (what, err) in [("geometry", g.as_ref().err()), ("entity values", v.as_ref().err())] {
                if let Some(e) = err {
                    diag.source_failed(what, &e.to_string());
                }
            }
            None
        }
    };

    // 2) ranking: its own table or the entity values
    let entity_map: Option<&EntityValueMap> = map_scene.as_ref().map(|m| &m.values);
    let ranking_scene = build_ranking_scene(&ranking, entity_map, cfg, &mut diag);

    // 3) selection shared by the two entity views
    let map_view = Rc::new(RefCell::new(MapView::default()));
    let rank_view = Rc::new(RefCell::new(RankingView::default()));
    if let Some(m) = &map_scene {
        map_view.borrow_mut().load(m.selection_keys());
    }
    if let Some(r) = &ranking_scene {
        rank_view.borrow_mut().load(r.rows.iter().map(|e| e.key.clone()).collect());
    }
    let mut selection = SelectionState::new();
    selection.subscribe(map_view.clone());
    selection.subscribe(rank_view.clone());

    if let Some(name) = select {
        match entity_map.and_then(|m| resolve_entity(name, m)) {
            Some(key) => {
                info!("Entity selected - requested={:?}, resolved={}", name, key);
                selection.toggle(&key);
            }
            None => {
                warn!("Selection unresolved, showing default view - requested={:?}", name);
                diag.note(format!("selection '{name}' unresolved; default view"));
                selection.clear();
            }
        }
    }

    if let Some(m) = &map_scene {
        write_json(out_dir.join("viz.map.json"), &map_bundle(m, map_view.borrow().emphasis()))?;
        files.push("viz.map.json".into());
    }
    if let Some(r) = &ranking_scene {
        write_json(out_dir.join("viz.ranking.json"), &ranking_bundle(r, rank_view.borrow().emphasis()))?;
        files.push("viz.ranking.json".into());
    }

    // 4) pathway scenes: composition, flows, KPI cards
    let mut summary = VSummary::default();
    let mut pathway_count = 0usize;
    let mut net_total = None;
    match &pathways {
        Ok(table) => {
            let records = pathway_records(table, &mut diag);
            pathway_count = records.len();
            let totals = pathway_totals(&records);
            net_total = Some(pathway_net_total(&totals));

            write_json(out_dir.join("viz.composition.json"), &build_composition(&totals, cfg.composition_top_n))?;
            write_json(out_dir.join("viz.flows.json"), &build_flows(&records, &cfg.buckets, &mut diag))?;
            write_json(out_dir.join("viz.kpis.json"), &build_kpis(&totals, &cfg.kpis))?;
            files.extend(["viz.composition.json", "viz.flows.json", "viz.kpis.json"].map(String::from));

            summarize_pathways(&mut summary, table, &cfg.health_keywords, &mut diag);
        }
        Err(e) => diag.source_failed("pathways", &e.to_string()),
    }

    // 5) closing figures
    if let Ok(table) = &values {
        summarize_places(&mut summary, table, &mut diag);
    }
    if summary.national_total.is_some() || summary.places_share_percent.is_some() {
        write_json(out_dir.join("viz.summary.json"), &summary)?;
        files.push("viz.summary.json".into());
    }

    write_json(out_dir.join("viz.diagnostics.json"), &diag)?;
    files.push("viz.diagnostics.json".into());

    let idx = json!({
        "version": 1,
        "generated_at": chrono::Utc::now().to_rfc3339(),
        "selected": selection.current(),
        "ranking_source": ranking_scene.as_ref().map(|r| r.source),
        "counts": {
            "features": map_scene.as_ref().map(|m| m.reconciliation.total),
            "matched": map_scene.as_ref().map(|m| m.reconciliation.matched),
            "pathway_records": pathway_count,
            "pathway_net_total": net_total,
        },
        "files": files,
    });
    write_json(out_dir.join("viz.index.json"), &idx)?;
    files.push("viz.index.json".into());
    debug!("Wrote viz bundle - files={}", files.len());

    info!(
        "Story build completed - duration={:.2}s, files={}, fallbacks={}, failed_sources={}",
        pipeline_start.elapsed().as_secs_f32(),
        files.len(),
        diag.column_fallbacks + diag.source_fallbacks,
        diag.failed_sources
    );

    Ok(StoryReport {
        files,
        selected: selection.current().map(str::to_string),
        diagnostics: diag,
    })
}

