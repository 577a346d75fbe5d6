use anyhow::Result;
use clap::Parser;
use coben_story::config::StoryConfig;
use coben_story::fetch::DataSource;
use coben_story::orchestrator::run_story;
use coben_story::reconcile::ReconcileMode;
use std::path::PathBuf;
use tracing::{debug, info};

/// Co-benefits story - builds the scene bundles for the scrollytelling page
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Data location: a directory or an http(s) base URL (default: ".")
    #[arg(short, long, default_value = ".")]
    data: String,

    /// Output directory for generated files (default: "out")
    #[arg(short, long, default_value = "out")]
    output_dir: String,

    /// Path to a YAML config file (overrides COBEN_STORY_CONFIG environment variable)
    #[arg(short, long)]
    config: Option<String>,

    /// Entity to pre-select on the map and ranking
    #[arg(short, long)]
    select: Option<String>,

    /// Join map features to values with trimmed/normalized/containment matching
    #[arg(long)]
    fuzzy_map: bool,
}

fn config_path(args: &Args) -> Option<PathBuf> {
    if let Some(ref p) = args.config {
        debug!("Using config file from --config argument: {}", p);
        return Some(PathBuf::from(p));
    }
    std::env::var("COBEN_STORY_CONFIG").ok().map(|p| {
        debug!("Using config file from COBEN_STORY_CONFIG: {}", p);
        PathBuf::from(p)
    })
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(true)
        .init();

    info!("Starting coben_story");

    let args = Args::parse();

    let mut cfg = match config_path(&args) {
        Some(p) if !p.exists() => {
            return Err(anyhow::anyhow!(
                "story config not found at {}\n\
                 Use --config to specify a config file, or set COBEN_STORY_CONFIG environment variable.\n\
                 Example config.yaml:\n\
                 map_reconcile: fuzzy\ncomposition_top_n: 10\ninputs:\n  geometry: data/la_boundaries_simplified.geojson\n",
                p.display()
            ));
        }
        Some(p) => StoryConfig::load(&p)?,
        None => {
            debug!("No config file given, using built-in defaults");
            StoryConfig::default()
        }
    };
    if args.fuzzy_map {
        cfg.map_reconcile = ReconcileMode::Fuzzy;
    }

    let source = DataSource::parse(&args.data)?;
    info!(
        "Story inputs - data={}, output_dir={}, map_reconcile={:?}",
        args.data, args.output_dir, cfg.map_reconcile
    );

    let report = run_story(&cfg, &source, std::path::Path::new(&args.output_dir), args.select.as_deref()).await?;
    info!(
        "Done - files={}, selected={:?}, notes={}",
        report.files.len(),
        report.selected,
        report.diagnostics.notes.len()
    );
    Ok(())
}
