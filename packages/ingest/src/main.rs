#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! CLI entry point for the trip dataset ingestion tool.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use serde::Serialize;

use tripflow_analytics::{detect_anomalies, select_top_k};
use tripflow_ingest::{CleaningConfig, PipelineArgs, load_cleaned_csv, run_pipeline};

#[derive(Parser)]
#[command(name = "tripflow_ingest", about = "Trip dataset cleaning and loading tool")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Clean a raw trip dataset and write the cleaned outputs
    Clean {
        /// Raw dataset path (`.csv`, or `.zip` containing one)
        input: PathBuf,
        /// Directory for `cleaned_data.csv` and `exclusions.csv`
        #[arg(long, default_value = "data")]
        output_dir: PathBuf,
        /// Also load the cleaned rows into this `DuckDB` database
        #[arg(long)]
        db: Option<PathBuf>,
        /// Maximum number of raw rows to read (for testing)
        #[arg(long)]
        limit: Option<u64>,
        /// TOML file overriding the bounding box and plausibility bounds
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Load an already-cleaned CSV into the `DuckDB` database
    Load {
        /// Cleaned dataset path (output of `clean`)
        input: PathBuf,
        /// Companion audit CSV to store alongside the data
        #[arg(long)]
        exclusions: Option<PathBuf>,
        /// `DuckDB` database path
        #[arg(long, default_value = "data/trips.duckdb")]
        db: PathBuf,
    },
    /// Print the K longest trips from a bounded sample of the store
    TopLongest {
        /// `DuckDB` database path
        #[arg(long, default_value = "data/trips.duckdb")]
        db: PathBuf,
        /// Number of trips to keep
        #[arg(long, default_value = "5")]
        k: usize,
        /// Sample size to pull from the store
        #[arg(long, default_value = "5000")]
        sample: u64,
    },
    /// Print m-sigma anomalies over one numeric column of a bounded sample
    Anomalies {
        /// `DuckDB` database path
        #[arg(long, default_value = "data/trips.duckdb")]
        db: PathBuf,
        /// Numeric trip column to scan
        #[arg(long, default_value = "trip_speed_kmh")]
        field: String,
        /// Anomaly threshold in standard deviations
        #[arg(long, default_value = "3.0")]
        m: f64,
        /// Sample size to pull from the store
        #[arg(long, default_value = "5000")]
        sample: u64,
    },
}

/// JSON shape of the `anomalies` subcommand output.
#[derive(Serialize)]
struct AnomalyReport {
    field: String,
    threshold_m_sigma: f64,
    count: usize,
    items: Vec<AnomalyItem>,
}

/// One flagged value with its owning trip id.
#[derive(Serialize)]
struct AnomalyItem {
    id: String,
    value: f64,
}

#[allow(clippy::too_many_lines)]
fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = tripflow_cli_utils::init_logger();
    let cli = Cli::parse();

    match cli.command {
        Commands::Clean {
            input,
            output_dir,
            db,
            limit,
            config,
        } => {
            let config = match config {
                Some(path) => CleaningConfig::from_toml_path(&path)?,
                None => CleaningConfig::default(),
            };

            let bar = tripflow_cli_utils::records_bar(&multi, "Cleaning dataset");
            let summary = run_pipeline(&PipelineArgs {
                input,
                cleaned_csv: output_dir.join("cleaned_data.csv"),
                exclusions_csv: output_dir.join("exclusions.csv"),
                db_path: db,
                limit,
                config,
            })?;
            bar.finish_and_clear();

            log::info!(
                "Final rows: {} of {} raw (dropped {})",
                summary.cleaned_rows,
                summary.raw_rows,
                summary.accounting.total()
            );
        }
        Commands::Load {
            input,
            exclusions,
            db,
        } => {
            let records = load_cleaned_csv(&input, exclusions.as_deref(), &db)?;
            log::info!("Loaded {} trips into {}", records.len(), db.display());
        }
        Commands::TopLongest { db, k, sample } => {
            let conn = tripflow_database::open(&db)?;
            let trips = tripflow_database::fetch_trips_sample(&conn, sample)?;
            let top = select_top_k(&trips, |t| t.trip_duration, k);
            println!("{}", serde_json::to_string_pretty(&top)?);
        }
        Commands::Anomalies {
            db,
            field,
            m,
            sample,
        } => {
            let conn = tripflow_database::open(&db)?;
            let sample_rows = tripflow_database::fetch_column_sample(&conn, &field, sample)?;

            let values = sample_rows.iter().map(|(_, value)| *value);
            let items: Vec<AnomalyItem> = detect_anomalies(values, m)
                .zip(sample_rows.iter())
                .filter(|(flag, _)| flag.is_anomaly)
                .map(|(flag, (id, _))| AnomalyItem {
                    id: id.clone(),
                    value: flag.value,
                })
                .collect();

            let report = AnomalyReport {
                field,
                threshold_m_sigma: m,
                count: items.len(),
                items,
            };
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}
