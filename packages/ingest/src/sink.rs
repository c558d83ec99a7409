//! Cleaned-dataset sinks.
//!
//! The cleaned CSV is the stable rectangular output contract: exactly
//! the [`CLEANED_COLUMNS`] set, in order, one row per surviving trip.
//! The exclusions CSV is the `reason,count` audit side-channel for the
//! run that produced it. Both readers exist so a previously cleaned
//! dataset can be loaded into the store without re-running the pipeline.

use std::path::Path;

use tripflow_trips_models::{CLEANED_COLUMNS, CleanedRecord, DropAccounting};

use crate::IngestError;

/// Writes the cleaned rectangular dataset.
///
/// Serde serialization of [`CleanedRecord`] emits the contract columns
/// in contract order because the struct fields are declared in that
/// order.
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_cleaned_csv(path: &Path, records: &[CleanedRecord]) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    for record in records {
        writer.serialize(record)?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a cleaned dataset back from its CSV form.
///
/// # Errors
///
/// Returns an error if the file is missing or a row fails to
/// deserialize against the contract columns.
pub fn read_cleaned_csv(path: &Path) -> Result<Vec<CleanedRecord>, IngestError> {
    if !path.exists() {
        return Err(IngestError::MissingInput(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut records = Vec::new();
    for result in reader.deserialize() {
        records.push(result?);
    }
    Ok(records)
}

/// Writes the `reason,count` audit artifact, one row per drop reason in
/// fixed filter order (zero counts included).
///
/// # Errors
///
/// Returns an error if the file cannot be created or written.
pub fn write_exclusions_csv(path: &Path, accounting: &DropAccounting) -> Result<(), IngestError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["reason", "count"])?;
    for (reason, count) in accounting.iter() {
        writer.write_record([reason.as_ref(), count.to_string().as_str()])?;
    }
    writer.flush()?;
    Ok(())
}

/// Reads a drop accounting back from its audit CSV.
///
/// Unknown reasons are skipped with a warning rather than failing the
/// load: the audit is informational and must not block reloading data.
///
/// # Errors
///
/// Returns an error if the file is missing or unreadable.
pub fn read_exclusions_csv(path: &Path) -> Result<DropAccounting, IngestError> {
    if !path.exists() {
        return Err(IngestError::MissingInput(path.to_path_buf()));
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut accounting = DropAccounting::new();
    for result in reader.records() {
        let row = result?;
        let Some(reason_str) = row.get(0) else {
            continue;
        };
        let Ok(reason) = reason_str.parse() else {
            log::warn!("Skipping unknown drop reason '{reason_str}' in {}", path.display());
            continue;
        };
        let count: u64 = row.get(1).and_then(|c| c.parse().ok()).unwrap_or(0);
        accounting.add(reason, count);
    }
    Ok(accounting)
}
