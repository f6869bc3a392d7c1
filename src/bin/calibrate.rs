use anyhow::{Context, Result};
use clap::Parser;
use shoprec::engine::calibration::CalibrationGrid;
use shoprec::services::catalog::ProductCatalog;
use shoprec::services::factors::FactorStore;
use shoprec::services::index::EmbeddingIndex;
use shoprec::services::recommendation::RecommendationService;
use shoprec::{init_tracing, Config, FusionStrategy, Interaction};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

/// Offline fusion calibration: sweeps a weight grid against a held-out
/// evaluation set and writes the winning config artifact.
#[derive(Parser, Debug)]
#[command(name = "shoprec-calibrate")]
struct Args {
    /// Config file (defaults apply when omitted)
    #[arg(long)]
    config: Option<String>,

    /// Held-out evaluation interactions (JSON array)
    #[arg(long)]
    eval_set: PathBuf,

    /// Grid resolution per weight axis (defaults to the configured value)
    #[arg(long)]
    grid_steps: Option<usize>,

    /// Also sweep reciprocal rank fusion, not just weighted sum
    #[arg(long, default_value_t = false)]
    include_rrf: bool,

    /// Where the winning fusion config is written
    #[arg(long)]
    output: Option<PathBuf>,

    /// Where the full grid report is written
    #[arg(long)]
    report: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::default(),
    };

    let factors = Arc::new(FactorStore::new());
    factors.load_from_file(&config.artifacts.factors_path())?;

    let index = Arc::new(EmbeddingIndex::new());
    let embeddings_path = config.artifacts.embeddings_path();
    if embeddings_path.exists() {
        index.load_from_file(&embeddings_path)?;
    } else {
        info!("No embedding artifact, calibrating on the collaborative source only");
    }

    let catalog = Arc::new(ProductCatalog::new());
    let catalog_path = config.artifacts.catalog_path();
    if catalog_path.exists() {
        catalog.load_from_file(&catalog_path)?;
    }

    let eval_data = std::fs::read_to_string(&args.eval_set)
        .with_context(|| format!("reading eval set {}", args.eval_set.display()))?;
    let eval_set: Vec<Interaction> = serde_json::from_str(&eval_data)
        .with_context(|| format!("parsing eval set {}", args.eval_set.display()))?;
    for interaction in &eval_set {
        shoprec::utils::validation::validate_interaction(interaction)?;
    }
    info!(interactions = eval_set.len(), "Loaded evaluation set");

    let mut strategies = vec![FusionStrategy::WeightedSum];
    if args.include_rrf {
        strategies.push(FusionStrategy::ReciprocalRankFusion);
    }
    let steps = args.grid_steps.unwrap_or(config.calibration.grid_steps);
    let grid = CalibrationGrid::evenly_spaced(steps, strategies);

    let service = RecommendationService::new(
        factors,
        index,
        catalog,
        Arc::new(config.clone()),
    )?;

    let report = service.calibrate(&eval_set, &grid).await?;

    println!(
        "{:<24} {:>8} {:>8} {:>12}",
        "strategy", "w_collab", "w_sem", "mean_ndcg"
    );
    for point in &report.grid {
        println!(
            "{:<24} {:>8.2} {:>8.2} {:>12.6}",
            format!("{:?}", point.config.strategy),
            point.config.weight_collaborative,
            point.config.weight_semantic,
            point.mean_ndcg,
        );
    }
    println!(
        "\nWinner: {:?} ({:.2}, {:.2}) — mean NDCG@{} = {:.6} over {} users",
        report.winner.strategy,
        report.winner.weight_collaborative,
        report.winner.weight_semantic,
        report.k,
        report
            .grid
            .iter()
            .find(|p| p.config.version == report.winner.version)
            .map(|p| p.mean_ndcg)
            .unwrap_or_default(),
        report.users_evaluated,
    );

    let output = args
        .output
        .unwrap_or_else(|| config.artifacts.fusion_path());
    std::fs::write(&output, serde_json::to_string_pretty(&report.winner)?)
        .with_context(|| format!("writing fusion config {}", output.display()))?;
    info!(path = %output.display(), "Wrote winning fusion config");

    if let Some(report_path) = args.report {
        std::fs::write(&report_path, serde_json::to_string_pretty(&report)?)
            .with_context(|| format!("writing calibration report {}", report_path.display()))?;
        info!(path = %report_path.display(), "Wrote calibration report");
    }

    Ok(())
}
