//! Forest raster tiler.
//!
//! Cuts the national forest-inventory mosaics into per-tile GeoTIFFs:
//! - Window resolution of every AOI tile against every product
//! - Raw and normalized artifacts per (tile, product)
//! - Land cover masks, top-5 species composites, merged structure stacks
//! - Block cropping of finished artifacts

mod config_loader;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use raster_common::PixelBox;
use raster_io::GeoJsonTileGrid;
use tile_pipeline::{crop_into_blocks, PipelineConfig, TilePipeline};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config_loader::{expand_paths, load_tiler_config, validate_logging_config, LoggingConfig};

#[derive(Parser, Debug)]
#[command(name = "tiler")]
#[command(about = "Per-tile extraction and normalization of forest inventory rasters")]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, global = true, env = "TILER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Log format (json, pretty)
    #[arg(long, global = true, env = "TILER_LOG_FORMAT")]
    log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Process every AOI tile
    Run(RunArgs),
    /// Split an artifact into equal normalized blocks
    Crop(CropArgs),
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Configuration file path
    #[arg(short, long, env = "TILER_CONFIG")]
    config: Option<PathBuf>,

    /// Crop relative to each tile window: col_off,row_off,width,height
    #[arg(long)]
    bbox: Option<PixelBox>,

    /// Stack the structure products of each tile into one composite
    #[arg(long)]
    merge_structures: bool,

    /// Output root
    #[arg(long)]
    out_dir: Option<PathBuf>,

    /// Mosaic catalogue root
    #[arg(long)]
    catalog_dir: Option<PathBuf>,

    /// AOI tile grid (GeoJSON)
    #[arg(long)]
    aoi_path: Option<PathBuf>,

    /// Only process these configured products
    #[arg(long, value_delimiter = ',')]
    products: Vec<String>,

    /// Only process these tile ids
    #[arg(long, value_delimiter = ',')]
    tiles: Vec<i64>,

    /// Restrict to a study area (bc, ab, on, nb)
    #[arg(long)]
    study_area: Option<String>,
}

#[derive(Args, Debug)]
struct CropArgs {
    /// Artifact to split
    artifact: PathBuf,

    /// Block width in pixels
    #[arg(long, default_value = "500")]
    width: usize,

    /// Block height in pixels
    #[arg(long, default_value = "500")]
    height: usize,
}

fn main() -> Result<()> {
    // Load environment from .env file if present
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    match cli.command {
        Command::Run(args) => {
            let (logging, config) = load_run_config(&args)?;
            init_tracing(logging, &cli.log_level, &cli.log_format)?;
            run(config)
        }
        Command::Crop(args) => {
            init_tracing(LoggingConfig::default(), &cli.log_level, &cli.log_format)?;
            crop(args)
        }
    }
}

/// File (or defaults), then `TILER_*` variables, then command-line flags.
fn load_run_config(args: &RunArgs) -> Result<(LoggingConfig, PipelineConfig)> {
    let (logging, mut config) = match &args.config {
        Some(path) => {
            let file = load_tiler_config(path)?;
            (file.logging, file.pipeline)
        }
        None => (LoggingConfig::default(), PipelineConfig::default()),
    };
    config.apply_env();

    if let Some(bbox) = args.bbox {
        config.bbox = Some(bbox);
    }
    if args.merge_structures {
        config.merge.enabled = true;
    }
    if let Some(dir) = &args.out_dir {
        config.out_dir = dir.clone();
    }
    if let Some(dir) = &args.catalog_dir {
        config.catalog_dir = dir.clone();
    }
    if let Some(path) = &args.aoi_path {
        config.aoi_path = path.clone();
    }
    if !args.tiles.is_empty() {
        config.tiles = Some(args.tiles.clone());
    }
    if let Some(area) = &args.study_area {
        config.study_area = Some(area.clone());
    }
    if !args.products.is_empty() {
        for name in &args.products {
            anyhow::ensure!(
                config.product(name).is_some(),
                "Product {} is not configured",
                name
            );
        }
        config.products.retain(|p| args.products.contains(&p.name));
        config.merge.products.retain(|p| args.products.contains(p));
    }

    expand_paths(&mut config);
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid pipeline config: {}", e))?;

    Ok((logging, config))
}

/// Install the global subscriber; flags override the configured settings.
fn init_tracing(
    mut logging: LoggingConfig,
    level_flag: &Option<String>,
    format_flag: &Option<String>,
) -> Result<()> {
    if let Some(level) = level_flag {
        logging.level = level.to_lowercase();
    }
    if let Some(format) = format_flag {
        logging.format = format.to_lowercase();
    }
    validate_logging_config(&logging)?;

    let level = match logging.level.as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr);

    if logging.format == "json" {
        tracing::subscriber::set_global_default(builder.json().finish())?;
    } else {
        tracing::subscriber::set_global_default(builder.pretty().finish())?;
    }
    Ok(())
}

fn run(config: PipelineConfig) -> Result<()> {
    info!(
        catalog = %config.catalog_dir.display(),
        aoi = %config.aoi_path.display(),
        out_dir = %config.out_dir.display(),
        products = config.products.len(),
        "Starting forest raster tiler"
    );

    let grid = GeoJsonTileGrid::new(&config.aoi_path);
    let pipeline = TilePipeline::new(config).context("Failed to build tile pipeline")?;
    let report = pipeline.run(&grid).context("Tile run failed")?;

    println!("{}", serde_json::to_string_pretty(&report)?);

    if !report.is_success() {
        warn!(failures = report.failures.len(), "Run finished with failures");
        std::process::exit(1);
    }
    Ok(())
}

fn crop(args: CropArgs) -> Result<()> {
    let blocks = crop_into_blocks(&args.artifact, args.width, args.height)
        .with_context(|| format!("Failed to crop {}", args.artifact.display()))?;

    for block in &blocks {
        println!("{}", block.display());
    }
    Ok(())
}
