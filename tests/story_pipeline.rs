use coben_story::config::StoryConfig;
use coben_story::fetch::DataSource;
use coben_story::orchestrator::run_story;
use coben_story::reconcile::ReconcileMode;
use serde_json::{json, Value};
use std::path::Path;

fn square(name: &str, x: f64, y: f64, size: f64) -> Value {
    json!({
        "type": "Feature",
        "properties": { "LAD23NM": name },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[[x, y], [x + size, y], [x + size, y + size], [x, y + size], [x, y]]]
        }
    })
}

/// Four unit authorities plus one union-of-everything feature, a value CSV
/// with a thousands separator and an unparseable cell, and no ranking JSON.
fn seed(dir: &Path) {
    let data = dir.join("data");
    std::fs::create_dir_all(&data).unwrap();

    let geo = json!({
        "type": "FeatureCollection",
        "features": [
            square("Leeds", 0.0, 0.0, 1.0),
            square("York", 1.0, 0.0, 1.0),
            square(" Hull ", 0.0, 1.0, 1.0),
            square("Bradford", 1.0, 1.0, 1.0),
            square("England", 0.0, 0.0, 2.0),
        ]
    });
    std::fs::write(data.join("la_boundaries_simplified.geojson"), geo.to_string()).unwrap();

    std::fs::write(
        data.join("la_values_total.csv"),
        "Local Authority,Total value (mGBP)\nLeeds,\"1,234.5\"\nYork,n/a\nHull,20\nBradford,-5\n",
    )
    .unwrap();

    let pathways = json!([
        { "co_benefit_type": "Air_Quality_Improvement", "damage_pathway": "amenity_value", "value_mgbp": 10 },
        { "co_benefit_type": "noise", "damage_pathway": "sleep_disturbance", "value_mgbp": 5 },
        { "co_benefit_type": "air_quality", "damage_pathway": "mortality", "value_mgbp": 20 },
        { "co_benefit_type": "congestion", "damage_pathway": "time_saved", "value_mgbp": "n/a" }
    ]);
    std::fs::write(data.join("mechanism_national_coben_pathway.json"), pathways.to_string()).unwrap();
}

fn read(dir: &Path, file: &str) -> Value {
    serde_json::from_str(&std::fs::read_to_string(dir.join(file)).unwrap()).unwrap()
}

fn feature<'a>(map: &'a Value, name: &str) -> &'a Value {
    map["features"].as_array().unwrap().iter().find(|f| f["name"] == name).unwrap()
}

#[tokio::test]
async fn builds_every_scene_and_records_fallbacks() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    seed(data.path());

    let src = DataSource::Dir(data.path().to_path_buf());
    let report = run_story(&StoryConfig::default(), &src, out.path(), None).await.unwrap();

    for f in [
        "viz.map.json",
        "viz.ranking.json",
        "viz.composition.json",
        "viz.flows.json",
        "viz.kpis.json",
        "viz.summary.json",
        "viz.diagnostics.json",
        "viz.index.json",
    ] {
        assert!(report.files.iter().any(|x| x == f), "missing {f}");
        assert!(out.path().join(f).exists());
    }

    let d = &report.diagnostics;
    assert_eq!(d.outliers_removed, 1);
    assert_eq!(d.source_fallbacks, 1);
    assert_eq!(d.failed_sources, 0);
    // York's value and the time_saved amount, each counted once even though
    // the summary and the fallback ranking read the same tables again
    assert_eq!(d.unparseable_cells, 2);

    // exact join: the padded name stays unmatched, the unparseable value is "no value"
    let map = read(out.path(), "viz.map.json");
    assert_eq!(map["total"], 4);
    assert_eq!(map["matched"], 2);
    assert_eq!(feature(&map, "Leeds")["value"], 1234.5);
    assert_eq!(feature(&map, "Hull")["status"], "unmatched");
    assert_eq!(feature(&map, "Hull")["display"], "No data");
    assert_eq!(feature(&map, "York")["status"], "no_value");
    assert!(map["features"].as_array().unwrap().iter().all(|f| f["emphasis"] == "normal"));

    let flows = read(out.path(), "viz.flows.json");
    let link = flows["links"]
        .as_array()
        .unwrap()
        .iter()
        .find(|l| l["source"] == "Cleaner Environments" && l["target"] == "Wellbeing & Sleep")
        .unwrap();
    // amenity value plus the air-quality mortality row, both routed to wellbeing
    assert_eq!(link["signed_value"], 30.0);

    let ranking = read(out.path(), "viz.ranking.json");
    assert_eq!(ranking["source"], "fallback");
    assert_eq!(ranking["bars"][0]["name"], "Leeds");

    let summary = read(out.path(), "viz.summary.json");
    assert_eq!(summary["national_total"], 35.0);
    // Hull and Leeds positive, Bradford negative, York unparseable
    assert_eq!(summary["places_share_percent"], 67);

    let index = read(out.path(), "viz.index.json");
    assert_eq!(index["ranking_source"], "fallback");
    assert_eq!(index["counts"]["pathway_records"], 3);
}

#[tokio::test]
async fn fuzzy_join_matches_padded_names() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    seed(data.path());

    let cfg = StoryConfig { map_reconcile: ReconcileMode::Fuzzy, ..StoryConfig::default() };
    let src = DataSource::Dir(data.path().to_path_buf());
    run_story(&cfg, &src, out.path(), None).await.unwrap();

    let map = read(out.path(), "viz.map.json");
    assert_eq!(map["matched"], 3);
    assert_eq!(feature(&map, "Hull")["value"], 20.0);
}

#[tokio::test]
async fn selection_styles_map_and_ranking_together() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    seed(data.path());

    let src = DataSource::Dir(data.path().to_path_buf());
    let report = run_story(&StoryConfig::default(), &src, out.path(), Some("leeds")).await.unwrap();
    assert_eq!(report.selected.as_deref(), Some("Leeds"));

    let map = read(out.path(), "viz.map.json");
    assert_eq!(feature(&map, "Leeds")["emphasis"], "selected");
    assert_eq!(feature(&map, "Bradford")["emphasis"], "faded");

    let ranking = read(out.path(), "viz.ranking.json");
    for bar in ranking["bars"].as_array().unwrap() {
        let want = if bar["name"] == "Leeds" { "selected" } else { "faded" };
        assert_eq!(bar["emphasis"], want);
    }
}

#[tokio::test]
async fn unknown_selection_resets_to_default_view() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    seed(data.path());

    let src = DataSource::Dir(data.path().to_path_buf());
    let report = run_story(&StoryConfig::default(), &src, out.path(), Some("Atlantis")).await.unwrap();
    assert_eq!(report.selected, None);
    assert!(report.diagnostics.notes.iter().any(|n| n.contains("Atlantis")));

    let map = read(out.path(), "viz.map.json");
    assert!(map["features"].as_array().unwrap().iter().all(|f| f["emphasis"] == "normal"));
}

#[tokio::test]
async fn missing_pathways_blank_only_their_scenes() {
    let data = tempfile::tempdir().unwrap();
    let out = tempfile::tempdir().unwrap();
    seed(data.path());
    std::fs::remove_file(data.path().join("data/mechanism_national_coben_pathway.json")).unwrap();

    let src = DataSource::Dir(data.path().to_path_buf());
    let report = run_story(&StoryConfig::default(), &src, out.path(), None).await.unwrap();

    assert_eq!(report.diagnostics.failed_sources, 1);
    assert_eq!(report.diagnostics.unparseable_cells, 1);
    assert!(out.path().join("viz.map.json").exists());
    assert!(out.path().join("viz.ranking.json").exists());
    assert!(!out.path().join("viz.flows.json").exists());
    assert!(!out.path().join("viz.kpis.json").exists());

    let summary = read(out.path(), "viz.summary.json");
    assert!(summary["national_total"].is_null());
    assert_eq!(summary["places_share_percent"], 67);
}
