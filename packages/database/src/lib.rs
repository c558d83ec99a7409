#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! `DuckDB` storage for cleaned trip data.
//!
//! Owns the `trips` fact table (columns exactly matching
//! [`CLEANED_COLUMNS`]), a `vendors` dimension derived from the distinct
//! vendor ids at load time, and an `exclusions` audit table holding the
//! drop accounting for the run that produced the data. Also provides the
//! bounded sample queries the serving layer uses to feed the analytic
//! primitives.

use std::path::Path;

use thiserror::Error;

use tripflow_trips_models::{CLEANED_COLUMNS, CleanedRecord, DropAccounting, DropReason};

/// Numeric `trips` columns that may be sampled for anomaly detection.
///
/// Column names are interpolated into SQL, so anything outside this list
/// is rejected instead of being passed through.
pub const SAMPLEABLE_COLUMNS: &[&str] = &[
    "distance_km",
    "trip_duration",
    "trip_speed_kmh",
    "fare_estimate",
    "fare_per_km",
];

/// Errors that can occur during database operations.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// `DuckDB` operation failed.
    #[error("DuckDB error: {0}")]
    Duckdb(#[from] duckdb::Error),

    /// A column name was requested that is not sampleable.
    #[error("column '{name}' is not a sampleable numeric trip column")]
    InvalidColumn {
        /// The rejected column name.
        name: String,
    },

    /// A stored drop reason failed to parse back into the taxonomy.
    #[error("unknown drop reason '{reason}' in exclusions table")]
    UnknownDropReason {
        /// The unrecognized reason string.
        reason: String,
    },
}

/// Opens (or creates) the trip database at the given path and ensures the
/// schema exists.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the DDL fails.
pub fn open(path: &Path) -> Result<duckdb::Connection, DatabaseError> {
    let conn = duckdb::Connection::open(path)?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Opens an in-memory trip database with the schema created.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or the DDL fails.
pub fn open_in_memory() -> Result<duckdb::Connection, DatabaseError> {
    let conn = duckdb::Connection::open_in_memory()?;
    create_schema(&conn)?;
    Ok(conn)
}

/// Creates the `trips`, `vendors`, and `exclusions` tables plus secondary
/// indexes, if they do not already exist.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub fn create_schema(conn: &duckdb::Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS vendors (
            vendor_id BIGINT PRIMARY KEY,
            name VARCHAR
        );

        CREATE TABLE IF NOT EXISTS trips (
            id VARCHAR PRIMARY KEY,
            vendor_id BIGINT,
            pickup_datetime VARCHAR,
            dropoff_datetime VARCHAR,
            passenger_count BIGINT,
            pickup_longitude DOUBLE,
            pickup_latitude DOUBLE,
            dropoff_longitude DOUBLE,
            dropoff_latitude DOUBLE,
            distance_km DOUBLE,
            trip_duration DOUBLE,
            trip_speed_kmh DOUBLE,
            fare_estimate DOUBLE,
            fare_per_km DOUBLE,
            pickup_hour INTEGER,
            pickup_dow INTEGER
        );

        CREATE TABLE IF NOT EXISTS exclusions (
            reason VARCHAR PRIMARY KEY,
            count BIGINT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_trips_pickup_datetime ON trips(pickup_datetime);
        CREATE INDEX IF NOT EXISTS idx_trips_hour ON trips(pickup_hour);
        CREATE INDEX IF NOT EXISTS idx_trips_dow ON trips(pickup_dow);
        CREATE INDEX IF NOT EXISTS idx_trips_speed ON trips(trip_speed_kmh);
        CREATE INDEX IF NOT EXISTS idx_trips_distance ON trips(distance_km);
        CREATE INDEX IF NOT EXISTS idx_trips_vendor ON trips(vendor_id);",
    )?;
    Ok(())
}

/// Replaces the stored dataset with the given cleaned records and drop
/// accounting.
///
/// Existing rows are deleted first so the schema and indexes survive a
/// reload. The `vendors` dimension is rebuilt from the distinct vendor
/// ids present in the new data.
///
/// # Errors
///
/// Returns an error if any delete or insert fails.
pub fn load_cleaned(
    conn: &duckdb::Connection,
    records: &[CleanedRecord],
    accounting: &DropAccounting,
) -> Result<(), DatabaseError> {
    conn.execute_batch("DELETE FROM trips; DELETE FROM vendors; DELETE FROM exclusions;")?;

    {
        let mut stmt = conn.prepare(
            "INSERT INTO trips (
                id, vendor_id, pickup_datetime, dropoff_datetime, passenger_count,
                pickup_longitude, pickup_latitude, dropoff_longitude, dropoff_latitude,
                distance_km, trip_duration, trip_speed_kmh, fare_estimate, fare_per_km,
                pickup_hour, pickup_dow
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )?;

        for record in records {
            stmt.execute(duckdb::params![
                record.id,
                record.vendor_id,
                record.pickup_datetime,
                record.dropoff_datetime,
                record.passenger_count,
                record.pickup_longitude,
                record.pickup_latitude,
                record.dropoff_longitude,
                record.dropoff_latitude,
                record.distance_km,
                record.trip_duration,
                record.trip_speed_kmh,
                record.fare_estimate,
                record.fare_per_km,
                record.pickup_hour,
                record.pickup_dow,
            ])?;
        }
    }

    conn.execute_batch(
        "INSERT INTO vendors
         SELECT DISTINCT vendor_id, 'Vendor ' || CAST(vendor_id AS VARCHAR)
         FROM trips
         ORDER BY vendor_id",
    )?;

    {
        let mut stmt = conn.prepare("INSERT INTO exclusions (reason, count) VALUES (?, ?)")?;
        for (reason, count) in accounting.iter() {
            stmt.execute(duckdb::params![reason.to_string(), count])?;
        }
    }

    log::info!(
        "Loaded {} trips ({} rows excluded during cleaning)",
        records.len(),
        accounting.total()
    );

    Ok(())
}

/// Fetches up to `limit` trips in pickup order, as full cleaned records.
///
/// This is the bounded sample the serving layer hands to the top-K
/// selector.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn fetch_trips_sample(
    conn: &duckdb::Connection,
    limit: u64,
) -> Result<Vec<CleanedRecord>, DatabaseError> {
    let sql = format!(
        "SELECT {} FROM trips ORDER BY pickup_datetime LIMIT ?",
        CLEANED_COLUMNS.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(duckdb::params![limit])?;

    let mut trips = Vec::new();
    while let Some(row) = rows.next()? {
        trips.push(CleanedRecord {
            id: row.get(0)?,
            vendor_id: row.get(1)?,
            pickup_datetime: row.get(2)?,
            dropoff_datetime: row.get(3)?,
            passenger_count: row.get(4)?,
            pickup_longitude: row.get(5)?,
            pickup_latitude: row.get(6)?,
            dropoff_longitude: row.get(7)?,
            dropoff_latitude: row.get(8)?,
            distance_km: row.get(9)?,
            trip_duration: row.get(10)?,
            trip_speed_kmh: row.get(11)?,
            fare_estimate: row.get(12)?,
            fare_per_km: row.get(13)?,
            pickup_hour: row.get(14)?,
            pickup_dow: row.get(15)?,
        });
    }

    Ok(trips)
}

/// Fetches up to `limit` values of a single numeric trip column, paired
/// with the owning trip id, in pickup order.
///
/// This is the bounded sample the serving layer streams through the
/// anomaly detector. The column must be one of [`SAMPLEABLE_COLUMNS`].
///
/// # Errors
///
/// Returns [`DatabaseError::InvalidColumn`] for a column outside the
/// allowed list, or an error if the query fails.
pub fn fetch_column_sample(
    conn: &duckdb::Connection,
    column: &str,
    limit: u64,
) -> Result<Vec<(String, f64)>, DatabaseError> {
    if !SAMPLEABLE_COLUMNS.contains(&column) {
        return Err(DatabaseError::InvalidColumn {
            name: column.to_string(),
        });
    }

    let sql =
        format!("SELECT id, {column} FROM trips ORDER BY pickup_datetime LIMIT ?");
    let mut stmt = conn.prepare(&sql)?;
    let mut rows = stmt.query(duckdb::params![limit])?;

    let mut values = Vec::new();
    while let Some(row) = rows.next()? {
        values.push((row.get(0)?, row.get(1)?));
    }

    Ok(values)
}

/// Reads the stored drop accounting back out of the `exclusions` table.
///
/// # Errors
///
/// Returns an error if the query fails or a stored reason is not part of
/// the taxonomy.
pub fn read_exclusions(conn: &duckdb::Connection) -> Result<DropAccounting, DatabaseError> {
    let mut stmt = conn.prepare("SELECT reason, count FROM exclusions")?;
    let mut rows = stmt.query([])?;

    let mut accounting = DropAccounting::new();
    while let Some(row) = rows.next()? {
        let reason_str: String = row.get(0)?;
        let count: i64 = row.get(1)?;
        let count = u64::try_from(count).unwrap_or(0);
        let reason: DropReason =
            reason_str
                .parse()
                .map_err(|_| DatabaseError::UnknownDropReason {
                    reason: reason_str.clone(),
                })?;
        accounting.add(reason, count);
    }

    Ok(accounting)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_record(id: &str, duration: f64) -> CleanedRecord {
        let distance_km = 1.6848;
        CleanedRecord {
            id: id.to_string(),
            vendor_id: 2,
            pickup_datetime: "2016-03-14T17:24:55Z".to_string(),
            dropoff_datetime: "2016-03-14T17:34:55Z".to_string(),
            passenger_count: 1,
            pickup_longitude: -73.99,
            pickup_latitude: 40.75,
            dropoff_longitude: -73.97,
            dropoff_latitude: 40.75,
            distance_km,
            trip_duration: duration,
            trip_speed_kmh: distance_km / (duration / 3600.0),
            fare_estimate: 2.5 + 1.2 * distance_km,
            fare_per_km: (2.5 + 1.2 * distance_km) / distance_km,
            pickup_hour: 17,
            pickup_dow: 0,
        }
    }

    #[test]
    fn load_and_fetch_round_trip() {
        let conn = open_in_memory().unwrap();
        let records = vec![sample_record("a", 600.0), sample_record("b", 700.0)];
        let mut accounting = DropAccounting::new();
        accounting.add(DropReason::OutOfBounds, 3);

        load_cleaned(&conn, &records, &accounting).unwrap();

        let trips = fetch_trips_sample(&conn, 10).unwrap();
        assert_eq!(trips.len(), 2);
        assert_eq!(trips[0], records[0]);
        assert_eq!(trips[1], records[1]);
    }

    #[test]
    fn vendors_dimension_is_rebuilt_from_trips() {
        let conn = open_in_memory().unwrap();
        let records = vec![sample_record("a", 600.0), sample_record("b", 700.0)];
        load_cleaned(&conn, &records, &DropAccounting::new()).unwrap();

        let mut stmt = conn
            .prepare("SELECT vendor_id, name FROM vendors ORDER BY vendor_id")
            .unwrap();
        let mut rows = stmt.query([]).unwrap();
        let row = rows.next().unwrap().unwrap();
        let vendor_id: i64 = row.get(0).unwrap();
        let name: String = row.get(1).unwrap();
        assert_eq!(vendor_id, 2);
        assert_eq!(name, "Vendor 2");
        assert!(rows.next().unwrap().is_none());
    }

    #[test]
    fn exclusions_round_trip() {
        let conn = open_in_memory().unwrap();
        let mut accounting = DropAccounting::new();
        accounting.add(DropReason::MissingCriticalField, 7);
        accounting.add(DropReason::OutlierDistanceDurationSpeed, 2);

        load_cleaned(&conn, &[], &accounting).unwrap();

        let stored = read_exclusions(&conn).unwrap();
        assert_eq!(stored, accounting);
    }

    #[test]
    fn column_sample_rejects_unknown_columns() {
        let conn = open_in_memory().unwrap();
        let result = fetch_column_sample(&conn, "id; DROP TABLE trips", 10);
        assert!(matches!(
            result,
            Err(DatabaseError::InvalidColumn { .. })
        ));
    }

    #[test]
    fn column_sample_returns_ids_and_values() {
        let conn = open_in_memory().unwrap();
        let records = vec![sample_record("a", 600.0), sample_record("b", 700.0)];
        load_cleaned(&conn, &records, &DropAccounting::new()).unwrap();

        let sample = fetch_column_sample(&conn, "trip_duration", 1).unwrap();
        assert_eq!(sample.len(), 1);
        assert_eq!(sample[0].0, "a");
        assert!((sample[0].1 - 600.0).abs() < 1e-9);
    }
}
