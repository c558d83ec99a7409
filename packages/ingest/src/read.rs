//! Raw dataset reading.
//!
//! The raw dataset arrives as a CSV file or a zip archive containing
//! one (a member named `train.csv` is preferred over other CSV members).
//! Reading fails fast if the artifact is missing or a required column is
//! absent; individual cells are never a reason to fail — empty or
//! unparseable cells simply become `None` in the [`RawRecord`] and are
//! handled by the cleaning filters.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use tripflow_trips_models::{RAW_COLUMNS, RawRecord};

use crate::IngestError;

/// Reads raw trip records from a `.csv` file or a `.zip` archive.
///
/// `limit` caps the number of rows read, for test runs over large
/// datasets.
///
/// # Errors
///
/// Returns an error if the artifact is missing, the archive holds no CSV
/// member, or a required column is absent.
pub fn read_raw_records(path: &Path, limit: Option<u64>) -> Result<Vec<RawRecord>, IngestError> {
    if !path.exists() {
        return Err(IngestError::MissingInput(path.to_path_buf()));
    }

    let is_zip = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

    if is_zip {
        read_zip(path, limit)
    } else {
        let file = File::open(path)?;
        parse_csv_reader(BufReader::new(file), limit)
    }
}

/// Extracts and parses the CSV member of a zip archive.
fn read_zip(path: &Path, limit: Option<u64>) -> Result<Vec<RawRecord>, IngestError> {
    let file = File::open(path)?;
    let mut archive = zip::ZipArchive::new(file)?;

    let mut csv_members: Vec<(usize, String)> = Vec::new();
    for i in 0..archive.len() {
        let entry = archive.by_index(i)?;
        let name = entry.name().to_string();
        if name.to_ascii_lowercase().ends_with(".csv") {
            csv_members.push((i, name));
        }
    }

    // Prefer a member whose base name is train.csv.
    let chosen = csv_members
        .iter()
        .find(|(_, name)| {
            name.rsplit('/')
                .next()
                .is_some_and(|base| base.eq_ignore_ascii_case("train.csv"))
        })
        .or_else(|| csv_members.first())
        .ok_or_else(|| IngestError::NoCsvInArchive(path.to_path_buf()))?;

    log::info!("Extracting {} from {}", chosen.1, path.display());

    let entry = archive.by_index(chosen.0)?;
    parse_csv_reader(entry, limit)
}

/// Parses raw records from any CSV source, failing fast on a missing
/// required column.
fn parse_csv_reader(source: impl Read, limit: Option<u64>) -> Result<Vec<RawRecord>, IngestError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(source);

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|header| header.trim().to_owned())
        .collect();

    let mut indices = Vec::with_capacity(RAW_COLUMNS.len());
    for column in RAW_COLUMNS {
        let index = headers
            .iter()
            .position(|header| header == column)
            .ok_or_else(|| IngestError::MissingColumn {
                name: (*column).to_string(),
            })?;
        indices.push(index);
    }

    let mut records = Vec::new();
    for result in reader.records() {
        let row = result?;

        records.push(RawRecord {
            id: cell(&row, indices[0]).map(str::to_owned),
            vendor_id: cell(&row, indices[1]).and_then(|v| v.parse().ok()),
            pickup_datetime: cell(&row, indices[2]).map(str::to_owned),
            dropoff_datetime: cell(&row, indices[3]).map(str::to_owned),
            passenger_count: cell(&row, indices[4]).and_then(|v| v.parse().ok()),
            pickup_longitude: cell(&row, indices[5]).and_then(|v| v.parse().ok()),
            pickup_latitude: cell(&row, indices[6]).and_then(|v| v.parse().ok()),
            dropoff_longitude: cell(&row, indices[7]).and_then(|v| v.parse().ok()),
            dropoff_latitude: cell(&row, indices[8]).and_then(|v| v.parse().ok()),
            trip_duration: cell(&row, indices[9]).and_then(|v| v.parse().ok()),
        });

        if let Some(max) = limit
            && records.len() as u64 >= max
        {
            log::info!("Reached row limit ({max}), stopping read");
            break;
        }
    }

    Ok(records)
}

/// Returns the trimmed cell at `index`, or `None` if absent or empty.
fn cell(row: &csv::StringRecord, index: usize) -> Option<&str> {
    row.get(index).map(str::trim).filter(|value| !value.is_empty())
}
