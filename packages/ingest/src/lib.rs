#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Library for ingesting raw trip datasets into the cleaned trip store.
//!
//! The pipeline reads a raw record-per-trip dataset (CSV, or a zip
//! archive containing one), applies a fixed sequence of row-level
//! cleaning filters with per-reason drop accounting, derives analytic
//! features for the survivors, and writes the result to the cleaned CSV
//! sink and optionally the `DuckDB` store.
//!
//! Row-quality problems never abort a run: bad rows are dropped and
//! tallied. Only structural problems (missing input artifact, missing
//! required column) are surfaced as errors.

pub mod clean;
pub mod read;
pub mod sink;

use std::path::{Path, PathBuf};
use std::time::Instant;

use thiserror::Error;

use tripflow_trips_models::{CleanedRecord, DropAccounting};

pub use clean::{CleaningConfig, PlausibilityBounds, clean_records};
pub use read::read_raw_records;

/// Errors that can occur during ingestion.
///
/// Everything here is an input-shape or environment problem; row-level
/// invalidity is handled inside the cleaning stage and never surfaces as
/// an error.
#[derive(Debug, Error)]
pub enum IngestError {
    /// The input artifact does not exist.
    #[error("input artifact not found: {}", .0.display())]
    MissingInput(PathBuf),

    /// A required raw column is absent from the input dataset.
    #[error("required column '{name}' is missing from the input dataset")]
    MissingColumn {
        /// The missing column name.
        name: String,
    },

    /// A zip archive was supplied but contains no CSV member.
    #[error("no CSV member found inside archive {}", .0.display())]
    NoCsvInArchive(PathBuf),

    /// Zip archive reading failed.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// CSV reading or writing failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Filesystem I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Database load failed.
    #[error(transparent)]
    Database(#[from] tripflow_database::DatabaseError),

    /// A cleaning config file failed to parse.
    #[error("config error: {0}")]
    Config(#[from] toml::de::Error),
}

/// Everything one pipeline invocation needs, passed in explicitly at
/// call time. No paths or bounds are process-wide state.
#[derive(Debug, Clone)]
pub struct PipelineArgs {
    /// Raw dataset (`.csv`, or `.zip` containing one).
    pub input: PathBuf,
    /// Destination for the cleaned rectangular dataset.
    pub cleaned_csv: PathBuf,
    /// Destination for the `reason,count` audit artifact.
    pub exclusions_csv: PathBuf,
    /// Optional `DuckDB` database to load the cleaned rows into.
    pub db_path: Option<PathBuf>,
    /// Maximum number of raw rows to read (for testing).
    pub limit: Option<u64>,
    /// Bounding box and plausibility bounds.
    pub config: CleaningConfig,
}

/// Counts produced by one pipeline invocation.
#[derive(Debug, Clone)]
pub struct PipelineSummary {
    /// Raw rows read from the input, before deduplication.
    pub raw_rows: usize,
    /// Rows surviving every filter.
    pub cleaned_rows: usize,
    /// Per-reason drop tallies for the run.
    pub accounting: DropAccounting,
}

/// Runs the full cleaning pipeline: read, clean, derive, and sink.
///
/// # Errors
///
/// Returns an error if the input is missing or malformed at the
/// structural level, or if a sink write fails.
pub fn run_pipeline(args: &PipelineArgs) -> Result<PipelineSummary, IngestError> {
    let start = Instant::now();

    log::info!("Loading dataset from {}", args.input.display());
    let raw = read::read_raw_records(&args.input, args.limit)?;
    let raw_rows = raw.len();

    log::info!("Cleaning {raw_rows} raw rows");
    let (cleaned, accounting) = clean::clean_records(raw, &args.config);

    sink::write_cleaned_csv(&args.cleaned_csv, &cleaned)?;
    log::info!(
        "Saved {} cleaned rows -> {}",
        cleaned.len(),
        args.cleaned_csv.display()
    );

    sink::write_exclusions_csv(&args.exclusions_csv, &accounting)?;
    log::info!(
        "Saved drop accounting ({} rows excluded) -> {}",
        accounting.total(),
        args.exclusions_csv.display()
    );

    if let Some(db_path) = &args.db_path {
        let conn = tripflow_database::open(db_path)?;
        tripflow_database::load_cleaned(&conn, &cleaned, &accounting)?;
    }

    let elapsed = start.elapsed();
    log::info!(
        "Pipeline complete: {} cleaned from {raw_rows} raw rows, took {:.1}s",
        cleaned.len(),
        elapsed.as_secs_f64()
    );

    Ok(PipelineSummary {
        raw_rows,
        cleaned_rows: cleaned.len(),
        accounting,
    })
}

/// Loads an already-cleaned CSV (plus optional audit CSV) into the
/// `DuckDB` store.
///
/// # Errors
///
/// Returns an error if either CSV is missing or malformed, or the load
/// fails.
pub fn load_cleaned_csv(
    cleaned_csv: &Path,
    exclusions_csv: Option<&Path>,
    db_path: &Path,
) -> Result<Vec<CleanedRecord>, IngestError> {
    let records = sink::read_cleaned_csv(cleaned_csv)?;
    let accounting = match exclusions_csv {
        Some(path) => sink::read_exclusions_csv(path)?,
        None => DropAccounting::new(),
    };

    let conn = tripflow_database::open(db_path)?;
    tripflow_database::load_cleaned(&conn, &records, &accounting)?;

    Ok(records)
}
