//! hydroflow CLI - Hydrological conditioning of elevation grids

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, Level};
use tracing_subscriber::FmtSubscriber;

use hydroflow_algorithms::hydrology::{fill_depressions, Accumulation, FillParams, Propagation};
use hydroflow_algorithms::pipeline::{HydrologyPipeline, PipelineConfig, PipelineOutput, Strategy};
use hydroflow_algorithms::terrain::{slope, SlopeParams};
use hydroflow_colormap::{
    auto_params, classes_to_rgba, directions_to_rgba, raster_to_rgba, write_png, ColorScheme, Stretch,
    STEEPNESS_PALETTE,
};
use hydroflow_core::io::{read_ascii_grid, write_ascii_grid, write_csv, CsvOptions};
use hydroflow_core::{Raster, RasterElement, RasterStatistics};

/// Decimal places for floating point CSV output
const FLOAT_PRECISION: usize = 6;

// ─── CLI structure ──────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "hydroflow")]
#[command(author, version, about = "Depression filling, flow routing and accumulation for DEMs", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Worker threads (defaults to one per core)
    #[arg(short = 'j', long, global = true)]
    threads: Option<usize>,

    /// JSON pipeline configuration; command flags override its values
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Flags shared by commands that route flow
#[derive(clap::Args, Debug, Default)]
struct RoutingArgs {
    /// Routing strategy: steepest (D8) or hybrid (D8/MFD)
    #[arg(short, long)]
    strategy: Option<Strategy>,

    /// Slope in degrees above which hybrid routing uses D8
    #[arg(short, long)]
    threshold: Option<f64>,

    /// Largest partition filled directly
    #[arg(short, long)]
    leaf_cells: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show information about an ASCII grid
    Info {
        /// Input DEM (.asc)
        input: PathBuf,
    },
    /// Fill depressions and write the filled DEM
    Fill {
        /// Input DEM (.asc)
        input: PathBuf,
        /// Output DEM (.asc)
        output: PathBuf,
        /// Largest partition filled directly
        #[arg(short, long)]
        leaf_cells: Option<usize>,
    },
    /// Slope in degrees of the filled DEM
    Slope {
        /// Input DEM (.asc)
        input: PathBuf,
        /// Output grid (.csv)
        output: PathBuf,
        /// Cell size override
        #[arg(long)]
        cell_size: Option<f64>,
    },
    /// Flow directions of the filled DEM
    Direction {
        /// Input DEM (.asc)
        input: PathBuf,
        /// Output grid (.csv)
        output: PathBuf,
        #[command(flatten)]
        routing: RoutingArgs,
    },
    /// Flow accumulation of the filled DEM
    Accumulation {
        /// Input DEM (.asc)
        input: PathBuf,
        /// Output grid (.csv)
        output: PathBuf,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Propagation order: sweep or topological
        #[arg(short, long)]
        propagation: Option<Propagation>,
    },
    /// Run the full pipeline and write every product to a directory
    Run {
        /// Input DEM (.asc)
        input: PathBuf,
        /// Output directory
        out_dir: PathBuf,
        #[command(flatten)]
        routing: RoutingArgs,
        /// Propagation order: sweep or topological
        #[arg(short, long)]
        propagation: Option<Propagation>,
    },
}

// ─── Helpers ────────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("setting default subscriber failed")
}

fn setup_threads(threads: Option<usize>) -> Result<()> {
    if let Some(n) = threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build_global()
            .context("Failed to configure thread pool")?;
        debug!(threads = n, "thread pool configured");
    }
    Ok(())
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    let config = serde_json::from_str(&text)
        .with_context(|| format!("Invalid config {}", path.display()))?;
    debug!(?config, "loaded configuration");
    Ok(config)
}

fn apply_routing(config: &mut PipelineConfig, args: &RoutingArgs) {
    if let Some(strategy) = args.strategy {
        config.strategy = strategy;
    }
    if let Some(threshold) = args.threshold {
        config.steep_threshold_degrees = threshold;
    }
    if let Some(leaf_cells) = args.leaf_cells {
        config.leaf_cells = leaf_cells;
    }
}

fn read_dem(path: &Path) -> Result<Raster<i32>> {
    let pb = spinner("Reading DEM...");
    let raster = read_ascii_grid(path)
        .with_context(|| format!("Failed to read DEM {}", path.display()))?;
    pb.finish_and_clear();
    info!("Input: {} x {}", raster.cols(), raster.rows());
    Ok(raster)
}

/// CSV options writing NODATA cells as the DEM's NODATA integer
fn csv_options(dem: &Raster<i32>) -> CsvOptions {
    let nodata = dem.nodata().unwrap_or_else(i32::default_nodata);
    CsvOptions {
        precision: Some(FLOAT_PRECISION),
        ..CsvOptions::with_nodata(i64::from(nodata))
    }
}

fn write_grid<T: RasterElement>(raster: &Raster<T>, path: &Path, options: &CsvOptions) -> Result<()> {
    let pb = spinner("Writing output...");
    write_csv(raster, path, options)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    pb.finish_and_clear();
    Ok(())
}

fn render<T: RasterElement>(raster: &Raster<T>, scheme: ColorScheme, stretch: Stretch) -> Vec<u8> {
    raster_to_rgba(raster, &auto_params(raster, scheme).with_stretch(stretch))
}

fn save_png(rgba: Vec<u8>, (rows, cols): (usize, usize), path: &Path) -> Result<()> {
    write_png(path, rows, cols, rgba).with_context(|| format!("Failed to write {}", path.display()))
}

/// PNG renderings of each pipeline product, NODATA in black
fn write_images(out: &PipelineOutput, dir: &Path) -> Result<()> {
    let pb = spinner("Rendering images...");
    let shape = out.filled.shape();
    save_png(
        render(&out.filled, ColorScheme::Terrain, Stretch::Linear),
        shape,
        &dir.join("filled.png"),
    )?;
    if let Some(s) = &out.slope {
        save_png(render(s, ColorScheme::Grayscale, Stretch::Linear), shape, &dir.join("slope.png"))?;
    }
    if let Some(st) = &out.steepness {
        save_png(classes_to_rgba(st, STEEPNESS_PALETTE), shape, &dir.join("steepness.png"))?;
    }
    save_png(directions_to_rgba(&out.directions), shape, &dir.join("directions.png"))?;
    let acc = match &out.accumulation {
        Accumulation::Count(r) => render(r, ColorScheme::Accumulation, Stretch::Log),
        Accumulation::Weighted(r) => render(r, ColorScheme::Accumulation, Stretch::Log),
    };
    save_png(acc, shape, &dir.join("accumulation.png"))?;
    pb.finish_and_clear();
    Ok(())
}

fn run_pipeline(dem: &Raster<i32>, config: PipelineConfig) -> Result<PipelineOutput> {
    let pb = spinner("Conditioning DEM...");
    let out = HydrologyPipeline::new(config)
        .run(dem)
        .context("Pipeline failed")?;
    pb.finish_and_clear();
    Ok(out)
}

fn done(name: &str, path: &Path, elapsed: std::time::Duration) {
    println!("{} saved to: {}", name, path.display());
    println!("  Processing time: {:.2?}", elapsed);
}

/// One-line min/max report of a fill, before and after
fn elevation_summary(
    original: &RasterStatistics<i32>,
    filled: &RasterStatistics<i32>,
    raised: usize,
) -> String {
    let fmt = |v: Option<i32>| v.map_or_else(|| "-".to_string(), |v| v.to_string());
    format!(
        "Elevation: {} .. {} (filled {} .. {}), {} cells raised",
        fmt(original.min),
        fmt(original.max),
        fmt(filled.min),
        fmt(filled.max),
        raised,
    )
}

fn print_summary(out: &PipelineOutput) {
    println!(
        "{}",
        elevation_summary(&out.original_stats, &out.filled_stats, out.raised_cells)
    );
    if let Some(max) = out.accumulation.max() {
        println!("Maximum accumulation: {:.2}", max);
    }
}

// ─── Main ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;
    setup_threads(cli.threads)?;
    let mut config = load_config(cli.config.as_deref())?;

    match cli.command {
        // ── Info ─────────────────────────────────────────────────────
        Commands::Info { input } => {
            let raster = read_dem(&input)?;
            let (rows, cols) = raster.shape();
            let bounds = raster.bounds();
            let stats = raster.statistics();

            println!("File: {}", input.display());
            println!("Dimensions: {} x {} ({} cells)", cols, rows, raster.len());
            println!("Cell size: {}", raster.cell_size());
            println!(
                "Bounds: ({:.6}, {:.6}) - ({:.6}, {:.6})",
                bounds.0, bounds.1, bounds.2, bounds.3
            );
            if let Some(nodata) = raster.nodata() {
                println!("NoData: {}", nodata);
            }
            println!("\nStatistics:");
            if let Some(min) = stats.min {
                println!("  Min: {}", min);
            }
            if let Some(max) = stats.max {
                println!("  Max: {}", max);
            }
            if let Some(mean) = stats.mean {
                println!("  Mean: {:.4}", mean);
            }
            if !raster.is_empty() {
                println!(
                    "  Valid cells: {} ({:.1}%)",
                    stats.valid_count,
                    100.0 * stats.valid_count as f64 / raster.len() as f64
                );
            }
        }

        // ── Fill ─────────────────────────────────────────────────────
        Commands::Fill {
            input,
            output,
            leaf_cells,
        } => {
            let dem = read_dem(&input)?;
            let leaf_cells = leaf_cells.unwrap_or(config.leaf_cells);
            let start = Instant::now();
            let filled = fill_depressions(&dem, FillParams { leaf_cells })
                .context("Failed to fill depressions")?;
            let elapsed = start.elapsed();
            let raised = dem
                .data()
                .iter()
                .zip(filled.data().iter())
                .filter(|(o, f)| o != f)
                .count();

            let pb = spinner("Writing output...");
            write_ascii_grid(&filled, &output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            pb.finish_and_clear();
            println!("{}", elevation_summary(&dem.statistics(), &filled.statistics(), raised));
            done("Filled DEM", &output, elapsed);
        }

        // ── Slope ────────────────────────────────────────────────────
        Commands::Slope {
            input,
            output,
            cell_size,
        } => {
            let dem = read_dem(&input)?;
            let start = Instant::now();
            let filled = fill_depressions(&dem, FillParams { leaf_cells: config.leaf_cells })
                .context("Failed to fill depressions")?;
            let result = slope(
                &filled,
                SlopeParams {
                    cell_size: cell_size.or(config.cell_size),
                },
            )
            .context("Failed to calculate slope")?;
            let elapsed = start.elapsed();
            write_grid(&result, &output, &csv_options(&dem))?;
            done("Slope", &output, elapsed);
        }

        // ── Direction ────────────────────────────────────────────────
        Commands::Direction {
            input,
            output,
            routing,
        } => {
            apply_routing(&mut config, &routing);
            let dem = read_dem(&input)?;
            let start = Instant::now();
            let out = run_pipeline(&dem, config)?;
            let elapsed = start.elapsed();
            write_grid(&out.directions, &output, &csv_options(&dem))?;
            done("Flow directions", &output, elapsed);
        }

        // ── Accumulation ─────────────────────────────────────────────
        Commands::Accumulation {
            input,
            output,
            routing,
            propagation,
        } => {
            apply_routing(&mut config, &routing);
            if let Some(p) = propagation {
                config.propagation = p;
            }
            let dem = read_dem(&input)?;
            let start = Instant::now();
            let out = run_pipeline(&dem, config)?;
            let elapsed = start.elapsed();

            let pb = spinner("Writing output...");
            out.accumulation
                .write_csv(&output, &csv_options(&dem))
                .with_context(|| format!("Failed to write {}", output.display()))?;
            pb.finish_and_clear();
            done("Flow accumulation", &output, elapsed);
        }

        // ── Run ──────────────────────────────────────────────────────
        Commands::Run {
            input,
            out_dir,
            routing,
            propagation,
        } => {
            apply_routing(&mut config, &routing);
            if let Some(p) = propagation {
                config.propagation = p;
            }
            let dem = read_dem(&input)?;
            fs::create_dir_all(&out_dir)
                .with_context(|| format!("Failed to create {}", out_dir.display()))?;

            let start = Instant::now();
            let out = run_pipeline(&dem, config)?;
            let elapsed = start.elapsed();

            let options = csv_options(&dem);
            let filled_path = out_dir.join("filled.asc");
            write_ascii_grid(&out.filled, &filled_path)
                .with_context(|| format!("Failed to write {}", filled_path.display()))?;
            if let Some(s) = &out.slope {
                write_grid(s, &out_dir.join("slope.csv"), &options)?;
            }
            if let Some(st) = &out.steepness {
                write_grid(st, &out_dir.join("steepness.csv"), &options)?;
            }
            write_grid(&out.directions, &out_dir.join("directions.csv"), &options)?;
            out.accumulation
                .write_csv(out_dir.join("accumulation.csv"), &options)
                .context("Failed to write accumulation")?;
            write_images(&out, &out_dir)?;

            print_summary(&out);
            done("Pipeline outputs", &out_dir, elapsed);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from([
            "hydroflow",
            "accumulation",
            "dem.asc",
            "acc.csv",
            "--strategy",
            "steepest",
            "--threshold",
            "15",
            "--propagation",
            "topological",
        ]);
        let Commands::Accumulation {
            routing,
            propagation,
            ..
        } = cli.command
        else {
            panic!("expected accumulation command");
        };

        let mut config = PipelineConfig::default();
        apply_routing(&mut config, &routing);
        assert_eq!(config.strategy, Strategy::Steepest);
        assert_eq!(config.steep_threshold_degrees, 15.0);
        assert_eq!(config.leaf_cells, 1000);
        assert_eq!(propagation, Some(Propagation::Topological));
    }

    #[test]
    fn test_load_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "leaf_cells": 64, "strategy": "steepest" }"#).unwrap();

        let config = load_config(Some(path.as_path())).unwrap();
        assert_eq!(config.leaf_cells, 64);
        assert_eq!(config.strategy, Strategy::Steepest);
        assert!(load_config(None).unwrap().resolve_flats);
    }

    #[test]
    fn test_elevation_summary_reports_fill_range() {
        let mut dem: Raster<i32> = Raster::from_vec(vec![5, 6, 7, 4, 1, 8, 9, 6, 5], 3, 3).unwrap();
        dem.set_nodata(Some(-9999));
        let filled = fill_depressions(&dem, FillParams::default()).unwrap();

        let line = elevation_summary(&dem.statistics(), &filled.statistics(), 1);
        assert_eq!(line, "Elevation: 1 .. 9 (filled 4 .. 9), 1 cells raised");
    }

    #[test]
    fn test_run_writes_png_per_product() {
        let mut dem = Raster::from_vec(vec![9, 9, 9, 9, 1, 9, 9, 5, -9999], 3, 3).unwrap();
        dem.set_nodata(Some(-9999));
        let out = HydrologyPipeline::default().run(&dem).unwrap();

        let dir = tempfile::tempdir().unwrap();
        write_images(&out, dir.path()).unwrap();
        for name in ["filled", "slope", "steepness", "directions", "accumulation"] {
            let path = dir.path().join(format!("{}.png", name));
            assert!(path.is_file(), "missing {}", path.display());
        }
    }

    #[test]
    fn test_csv_options_use_dem_nodata() {
        let mut dem: Raster<i32> = Raster::new(1, 1);
        dem.set_nodata(Some(-32768));
        assert_eq!(csv_options(&dem).nodata_literal.as_deref(), Some("-32768"));
    }
}
