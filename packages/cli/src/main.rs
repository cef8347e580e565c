#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for hexagon aggregation.
//!
//! Loads points from CSV, filters them to a box or `GeoJSON` region,
//! aggregates them into H3 hexagons, and writes the result as `GeoJSON`.
//!
//! Uses `indicatif-log-bridge` (via [`hexmap_cli_utils::init_logger`]) to
//! route `log` output through `indicatif::MultiProgress` so that log lines
//! and progress bars never fight for the terminal.

mod input;
mod output;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use hexmap_aggregate::bins::build_bins_capped;
use hexmap_aggregate::config::PipelineConfig;
use hexmap_aggregate::pipeline::Pipeline;
use hexmap_aggregate::session::{PipelineSession, RunOutcome};
use hexmap_aggregate_models::{Bundle, GroupBy};
use hexmap_cli_utils::{IndicatifProgress, MultiProgress};

#[derive(Parser)]
#[command(name = "hexmap", about = "Aggregate geographic points into hexagon bins")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate points and write the hexagons as `GeoJSON`
    Run {
        #[command(flatten)]
        input: InputArgs,
        /// Output file, or output directory with `--group-by bin`
        #[arg(long)]
        output: PathBuf,
    },
    /// Aggregate points and print export size estimates only
    Estimate {
        #[command(flatten)]
        input: InputArgs,
    },
    /// Print the labels and edges for a bin width and count
    Bins {
        /// Pipeline config file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Width of each bin
        #[arg(long)]
        bin_step: Option<u32>,
        /// Number of bins
        #[arg(long)]
        bin_count: Option<u32>,
    },
}

#[derive(Args)]
struct InputArgs {
    /// CSV file with `latitude`/`lat` and `longitude`/`lon`/`lng` columns
    #[arg(long)]
    points: PathBuf,
    /// Bounding box as `west,south,east,north`
    #[arg(long, conflicts_with = "region", required_unless_present = "region")]
    bbox: Option<String>,
    /// `GeoJSON` file with a polygon, multipolygon, or feature collection
    #[arg(long)]
    region: Option<PathBuf>,
    /// Pipeline config file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,
    /// H3 resolution (0-15)
    #[arg(long)]
    resolution: Option<u8>,
    /// Width of each bin
    #[arg(long)]
    bin_step: Option<u32>,
    /// Number of bins
    #[arg(long)]
    bin_count: Option<u32>,
    /// Export grouping: `none` or `bin`
    #[arg(long, value_parser = parse_group_by)]
    group_by: Option<GroupBy>,
    /// Color override for one bin, as `LABEL=#rrggbb` (repeatable)
    #[arg(long = "color", value_name = "LABEL=#HEX")]
    colors: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = hexmap_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { input, output } => {
            let (bundle, group_by) = aggregate(&multi, &input).await?;
            let written = output::write_bundle(&bundle, &output, group_by)?;
            output::print_distribution(&bundle);
            println!();
            println!("Wrote {} file(s)", written.len());
        }
        Commands::Estimate { input } => {
            let (bundle, _) = aggregate(&multi, &input).await?;
            output::print_distribution(&bundle);
            println!();
            output::print_sizes(&bundle.export_sizes);
        }
        Commands::Bins {
            config,
            bin_step,
            bin_count,
        } => {
            let config = load_config(config.as_deref())?;
            let spec = build_bins_capped(
                bin_step.unwrap_or(config.bin_step),
                bin_count.unwrap_or(config.bin_count),
                config.max_bin_count,
            )?;
            println!("{:<6} {:<16} {:>10}", "INDEX", "LABEL", "ABOVE");
            println!("{}", "-".repeat(34));
            for (bin, edge) in spec.bins().iter().zip(spec.edges()) {
                println!("{:<6} {:<16} {edge:>10}", bin.index, bin.label);
            }
        }
    }

    Ok(())
}

fn parse_group_by(value: &str) -> Result<GroupBy, String> {
    value
        .parse()
        .map_err(|_| format!("expected `none` or `bin`, got {value:?}"))
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig, hexmap_aggregate::AggregateError> {
    path.map_or_else(|| Ok(PipelineConfig::default()), PipelineConfig::load)
}

/// Loads the inputs and runs one aggregation through a session.
async fn aggregate(
    multi: &MultiProgress,
    args: &InputArgs,
) -> Result<(Arc<Bundle>, GroupBy), Box<dyn std::error::Error>> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(resolution) = args.resolution {
        config.resolution = resolution;
    }
    if let Some(bin_step) = args.bin_step {
        config.bin_step = bin_step;
    }
    if let Some(bin_count) = args.bin_count {
        config.bin_count = bin_count;
    }
    if let Some(group_by) = args.group_by {
        config.group_by = group_by;
    }

    let colors = args
        .colors
        .iter()
        .map(|value| input::parse_color_override(value))
        .collect::<Result<Vec<_>, _>>()?;
    let region = input::load_region(args.bbox.as_deref(), args.region.as_deref())?;
    let pipeline = Pipeline::new(config)?;
    let request = pipeline.config().request(region);

    let rows_progress = IndicatifProgress::rows_bar(multi, "Reading points");
    let loaded = input::load_points(&args.points, rows_progress.as_ref())?;

    let session = PipelineSession::new(pipeline, loaded.points)
        .with_progress(IndicatifProgress::stages_bar(multi, "Aggregating"));
    for (label, color) in colors {
        session.set_override(label, color).await;
    }

    let group_by = request.group_by;
    match session.submit(request).await? {
        RunOutcome::Applied(bundle) => Ok((bundle, group_by)),
        RunOutcome::Superseded { generation } => {
            Err(format!("run {generation} was superseded").into())
        }
    }
}
