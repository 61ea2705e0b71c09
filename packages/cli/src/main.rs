#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the crime spatial regression pipeline.
//!
//! Uses `indicatif-log-bridge` (via [`crime_spatial_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

use std::fs::File;
use std::io::{self, BufWriter};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use crime_spatial_cli::pipeline::PIPELINE_STAGES;
use crime_spatial_cli::{
    AnalysisConfig, DEFAULT_CONFIG, aggregate, build_weights, render_report, render_weights,
    run_pipeline, write_cells_csv,
};
use crime_spatial_cli_utils::IndicatifProgress;
use crime_spatial_ingest::load_cells;
use crime_spatial_ingest_models::IngestStats;

#[derive(Parser)]
#[command(
    name = "crime_spatial",
    about = "Spatial regression of street crime on bus stops and pedestrian trips"
)]
struct Cli {
    /// Analysis config file
    #[arg(long, short, global = true, default_value = "analysis.toml")]
    config: PathBuf,

    /// Read incident files from this directory instead of the configured one
    #[arg(long, global = true)]
    incidents_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full analysis and print the report
    Run {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Aggregate incidents and stops into cells and write the table as CSV
    Aggregate {
        /// Output file (stdout when omitted)
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
    /// Print the neighbour structure of the grid
    Neighbours,
    /// Print the annotated default config
    DefaultConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = crime_spatial_cli_utils::init_logger();
    let cli = Cli::parse();

    if matches!(cli.command, Commands::DefaultConfig) {
        print!("{DEFAULT_CONFIG}");
        return Ok(());
    }

    let mut config = AnalysisConfig::load(&cli.config)?;
    if let Some(dir) = cli.incidents_dir {
        config.input.incidents.dir = dir;
    }

    match cli.command {
        Commands::Run { json } => {
            let stages = IndicatifProgress::steps_bar(&multi, "Analysis", PIPELINE_STAGES);
            let records = IndicatifProgress::records_bar(&multi, "Reading incidents");
            let report = run_pipeline(&config, Some(stages), Some(records))?;

            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                print!("{}", render_report(&report));
            }
        }
        Commands::Aggregate { output } => {
            let records = IndicatifProgress::records_bar(&multi, "Reading incidents");
            let aggregated = aggregate(&config, Some(records))?;
            log::info!(
                "{} incidents and {} stops attributed to {} cells",
                aggregated.incidents_attributed,
                aggregated.stops_attributed,
                aggregated.table.len()
            );

            match output {
                Some(path) => {
                    write_cells_csv(&aggregated.table, BufWriter::new(File::create(&path)?))?;
                    log::info!("Wrote {}", path.display());
                }
                None => write_cells_csv(&aggregated.table, io::stdout().lock())?,
            }
        }
        Commands::Neighbours => {
            let cells = load_cells(&config.input.cells, &mut IngestStats::default())?;
            let weights = build_weights(&cells, &config.weights);
            print!("{}", render_weights(&weights.summary()));
        }
        Commands::DefaultConfig => {}
    }

    Ok(())
}
