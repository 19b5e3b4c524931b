//! Tilewise CLI.
//!
//! - `tilewise worker` serves one process-pool batch over stdin/stdout.
//! - `tilewise demo` trains a classifier on a synthetic volume and predicts it
//!   tile by tile on the configured backend.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::f32::consts::PI;
use std::path::PathBuf;
use std::sync::Arc;
use tilewise::execution::backends::serve_batch;
use tilewise::prelude::*;

/// The tilewise CLI application.
#[derive(Parser)]
#[command(name = "tilewise")]
#[command(version, about)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Read one batch request on stdin and write its response to stdout.
    Worker,
    /// Run a synthetic end-to-end classification.
    Demo(DemoArgs),
}

/// Arguments for the demo subcommand.
#[derive(clap::Args)]
struct DemoArgs {
    /// TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured backend ('thread-pool', 'process-pool' or 'distributed').
    #[arg(long)]
    backend: Option<BackendKind>,

    /// Edge length of the synthetic volume.
    #[arg(long, default_value_t = 128)]
    size: i64,

    /// Number of z slices.
    #[arg(long, default_value_t = 2)]
    depth: i64,

    /// Directory for the wire output and PNG previews.
    #[arg(long, default_value = "tilewise-demo")]
    output: PathBuf,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Worker => run_worker(),
        Commands::Demo(args) => run_demo(args),
    }
}

fn init_logging(level: &str) {
    // RUST_LOG wins over the configured level.
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).try_init();
}

fn run_worker() -> Result<()> {
    init_logging("warn");
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();
    serve_batch::<StandardTask, _, _>(stdin.lock(), stdout.lock()).context("worker failed")?;
    Ok(())
}

/// Bright disks on a dark, gently varying background.
fn synthetic_volume(size: i64, depth: i64) -> Result<Block> {
    let region = Region::from_shape(Shape5::spatial(depth, size, size))?;
    let center = size as f32 / 2.0;
    let radius = size as f32 / 4.0;
    let mut data = Vec::with_capacity(region.volume());
    for z in 0..depth {
        for y in 0..size {
            for x in 0..size {
                let (dy, dx) = (y as f32 - center, x as f32 - center);
                let inside = (dy * dy + dx * dx).sqrt() < radius + z as f32;
                let background = 0.1 + 0.05 * (2.0 * PI * x as f32 / size as f32).sin();
                data.push(if inside { 0.85 } else { background });
            }
        }
    }
    Ok(Block::new(region, data)?)
}

fn run_demo(args: DemoArgs) -> Result<()> {
    let mut config = match &args.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::new(),
    };
    if let Some(backend) = args.backend {
        config = config.with_backend(backend);
    }
    init_logging(&config.logging.level);
    info!("Demo configuration:\n{}", config.to_toml_string()?);

    let size = args.size.max(32);
    let depth = args.depth.max(1);
    let tile = (size / 2).max(8);
    let source = ArrayDataSource::new(synthetic_volume(size, depth)?, Shape5::spatial(1, tile, tile));
    let raw: Arc<dyn DataSource> = Arc::new(source.clone());

    let center = size / 2;
    let foreground = Annotation::from_voxels(
        &[
            Point5::new(0, 0, center - 2, center - 4, 0),
            Point5::new(0, 0, center + 2, center + 4, 0),
        ],
        Color::rgb(255, 64, 0).with_name("disk"),
        Arc::clone(&raw),
    )?;
    let background = Annotation::from_voxels(
        &[Point5::new(0, 0, 2, 2, 0), Point5::new(0, 0, 2, size - 3, 0)],
        Color::rgb(0, 128, 255).with_name("background"),
        Arc::clone(&raw),
    )?;

    // Thread-pool predictions reuse the features computed for training.
    let cache: SharedCache = Arc::new(OperatorCache::from_config(&config.cache));
    let extractors = FeatureExtractorCollection::parse([
        "GaussianSmoothing(0.3, axis_2d=\"z\")",
        "GaussianSmoothing(1.6, axis_2d=\"z\")",
        "GaussianGradientMagnitude(1.0, axis_2d=\"z\")",
        "HessianOfGaussianEigenvalues(1.0, axis_2d=\"z\")",
    ])?
    .with_cache(cache.clone());
    let classifier = Classifier::train_collection(
        extractors,
        &[foreground, background],
        &NaiveBayesTrainer::new(),
        0,
    )?;
    info!("Trained classifier for {} classes", classifier.num_classes());

    let colors = classifier.classes().to_vec();
    let full_region = source.interval();
    let task = StandardTask::from(PredictionTask::new(source, classifier));

    let backend = Backend::from_kind(config.orchestrator.backend)?;
    let orchestrator = Orchestrator::from_config(&config);
    let predictions = orchestrator.run(&full_region, &task, &backend)?;
    let stats = cache.stats();
    info!(
        "Feature cache: {} hits, {} misses, {} evictions, {:?} saved",
        stats.hits, stats.misses, stats.evictions, stats.time_saved
    );

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("cannot create {}", args.output.display()))?;
    let wire = to_u8_wire(&predictions, predictions.region())?;
    let wire_path = args.output.join("predictions.u8");
    std::fs::write(&wire_path, &wire).with_context(|| format!("cannot write {}", wire_path.display()))?;
    for (z, png) in render_z_slice_pngs(&predictions, &colors)?.iter().enumerate() {
        let path = args.output.join(format!("predictions_z{}.png", z));
        std::fs::write(&path, png).with_context(|| format!("cannot write {}", path.display()))?;
    }

    println!(
        "Predicted {} on {} backend: {} bytes written to {}",
        predictions.region(),
        backend.kind(),
        wire.len(),
        args.output.display()
    );
    Ok(())
}
