//! Validation, cleaning, and feature derivation for raw trip rows.
//!
//! Filters apply in a fixed order, each one narrowing the surviving
//! subset of the previous stage, so a row is only ever tallied under the
//! first reason it fails. Exact duplicates (and repeated identifiers)
//! are removed up front without being tallied: that is deduplication,
//! not a quality drop, and it is what makes the accounting identity hold
//! (drops + survivors = deduplicated input count) while keeping cleaned
//! identifiers unique.

use std::collections::HashSet;

use chrono::{DateTime, Datelike as _, NaiveDate, NaiveDateTime, Timelike as _, Utc};
use serde::{Deserialize, Serialize};

use tripflow_spatial::{BoundingBox, haversine_km};
use tripflow_trips_models::{CleanedRecord, DropAccounting, DropReason, RawRecord};

/// Flag-fall fare component of the fare estimate.
const FARE_BASE: f64 = 2.5;

/// Per-kilometer fare component of the fare estimate.
const FARE_RATE_PER_KM: f64 = 1.2;

/// Canonical timestamp format for cleaned output: UTC, seconds precision.
const CANONICAL_TIMESTAMP: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Plausibility bounds for the outlier filter, as `(min, max)` pairs.
///
/// Distance and speed bounds exclude both endpoints; the duration bound
/// excludes the minimum and includes the maximum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlausibilityBounds {
    /// Plausible trip distance in kilometers.
    pub distance_km: (f64, f64),
    /// Plausible trip duration in seconds.
    pub duration_s: (f64, f64),
    /// Plausible average speed in km/h.
    pub speed_kmh: (f64, f64),
}

impl Default for PlausibilityBounds {
    fn default() -> Self {
        Self {
            distance_km: (0.2, 100.0),
            duration_s: (60.0, 14_400.0),
            speed_kmh: (1.0, 130.0),
        }
    }
}

impl PlausibilityBounds {
    const fn distance_ok(&self, km: f64) -> bool {
        km > self.distance_km.0 && km < self.distance_km.1
    }

    const fn duration_ok(&self, seconds: f64) -> bool {
        seconds > self.duration_s.0 && seconds <= self.duration_s.1
    }

    const fn speed_ok(&self, kmh: f64) -> bool {
        kmh > self.speed_kmh.0 && kmh < self.speed_kmh.1
    }
}

/// Configuration for one cleaning run.
///
/// Every knob the filters consult lives here and is passed in at call
/// time; nothing is hardcoded at the call sites and nothing persists
/// between runs.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CleaningConfig {
    /// Serviceable region for the bounding-box filter.
    pub bounding_box: BoundingBox,
    /// Bounds for the distance/duration/speed outlier filter.
    pub bounds: PlausibilityBounds,
}

impl CleaningConfig {
    /// Reads a config from a TOML file. Missing keys fall back to their
    /// defaults, so a file may override just the bounding box or just
    /// one bounds pair.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_toml_path(path: &std::path::Path) -> Result<Self, crate::IngestError> {
        let text = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&text)?)
    }
}

/// A row with every critical field present, not yet validated further.
struct CompleteRow {
    id: String,
    vendor_id: i64,
    pickup_datetime: String,
    dropoff_datetime: String,
    passenger_count: i64,
    pickup_longitude: f64,
    pickup_latitude: f64,
    dropoff_longitude: f64,
    dropoff_latitude: f64,
    trip_duration: f64,
}

impl CompleteRow {
    fn from_raw(row: RawRecord) -> Option<Self> {
        Some(Self {
            id: row.id?,
            vendor_id: row.vendor_id?,
            pickup_datetime: row.pickup_datetime?,
            dropoff_datetime: row.dropoff_datetime?,
            passenger_count: row.passenger_count?,
            pickup_longitude: row.pickup_longitude?,
            pickup_latitude: row.pickup_latitude?,
            dropoff_longitude: row.dropoff_longitude?,
            dropoff_latitude: row.dropoff_latitude?,
            trip_duration: row.trip_duration?,
        })
    }
}

/// A complete row whose timestamps parsed into UTC instants.
struct TimedRow {
    row: CompleteRow,
    pickup: DateTime<Utc>,
    dropoff: DateTime<Utc>,
}

/// Parses a raw timestamp into a timezone-aware UTC instant.
///
/// Accepts the dataset's native `YYYY-MM-DD HH:MM:SS` form (read as
/// UTC), RFC 3339 with an offset, the `T`-separated naive form, and
/// bare dates (midnight UTC).
#[must_use]
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(with_offset) = DateTime::parse_from_rfc3339(value) {
        return Some(with_offset.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(naive.and_utc());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date.and_hms_opt(0, 0, 0)?.and_utc());
    }

    None
}

/// Cleans raw rows into [`CleanedRecord`]s, tallying every quality drop.
///
/// Stages, in contract order:
/// 1. dedup (exact duplicates and repeated identifiers, uncounted)
/// 2. drop rows missing any critical field
/// 3. drop rows with an unparseable pickup or dropoff timestamp
/// 4. drop rows with either coordinate pair outside the bounding box
/// 5. drop distance/duration/speed outliers, deriving features for the
///    survivors in the same pass
///
/// Never fails: every bad row becomes a tally, not an error.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn clean_records(
    rows: Vec<RawRecord>,
    config: &CleaningConfig,
) -> (Vec<CleanedRecord>, DropAccounting) {
    let mut accounting = DropAccounting::new();

    // Stage 0: deduplication, before any counted filter.
    let mut seen_rows: HashSet<RawRecord> = HashSet::new();
    let mut seen_ids: HashSet<String> = HashSet::new();
    let mut deduped: Vec<RawRecord> = Vec::with_capacity(rows.len());
    for row in rows {
        if !seen_rows.insert(row.clone()) {
            continue;
        }
        if let Some(id) = &row.id
            && !seen_ids.insert(id.clone())
        {
            continue;
        }
        deduped.push(row);
    }
    let deduped_count = deduped.len();

    // Stage 1: critical fields present.
    let mut complete: Vec<CompleteRow> = Vec::with_capacity(deduped.len());
    for row in deduped {
        match CompleteRow::from_raw(row) {
            Some(complete_row) => complete.push(complete_row),
            None => accounting.record(DropReason::MissingCriticalField),
        }
    }

    // Stage 2: timestamps parse into valid UTC instants.
    let mut timed: Vec<TimedRow> = Vec::with_capacity(complete.len());
    for row in complete {
        match (
            parse_timestamp(&row.pickup_datetime),
            parse_timestamp(&row.dropoff_datetime),
        ) {
            (Some(pickup), Some(dropoff)) => timed.push(TimedRow {
                row,
                pickup,
                dropoff,
            }),
            _ => accounting.record(DropReason::InvalidTimestamp),
        }
    }

    // Stage 3: both coordinate pairs inside the serviceable region.
    let bbox = &config.bounding_box;
    let mut in_bounds: Vec<TimedRow> = Vec::with_capacity(timed.len());
    for timed_row in timed {
        let row = &timed_row.row;
        if bbox.contains(row.pickup_latitude, row.pickup_longitude)
            && bbox.contains(row.dropoff_latitude, row.dropoff_longitude)
        {
            in_bounds.push(timed_row);
        } else {
            accounting.record(DropReason::OutOfBounds);
        }
    }

    // Stage 4: outlier filter plus feature derivation. The distance
    // computed for the filter is the one carried into the record, so the
    // two can never diverge.
    let bounds = &config.bounds;
    let mut cleaned: Vec<CleanedRecord> = Vec::with_capacity(in_bounds.len());
    for timed_row in in_bounds {
        let TimedRow {
            row,
            pickup,
            dropoff,
        } = timed_row;

        let distance_km = haversine_km(
            row.pickup_latitude,
            row.pickup_longitude,
            row.dropoff_latitude,
            row.dropoff_longitude,
        );
        let trip_speed_kmh = distance_km / (row.trip_duration / 3600.0);

        if !bounds.distance_ok(distance_km)
            || !bounds.duration_ok(row.trip_duration)
            || !bounds.speed_ok(trip_speed_kmh)
        {
            accounting.record(DropReason::OutlierDistanceDurationSpeed);
            continue;
        }

        let fare_estimate = FARE_RATE_PER_KM.mul_add(distance_km, FARE_BASE);
        cleaned.push(CleanedRecord {
            id: row.id,
            vendor_id: row.vendor_id,
            pickup_datetime: pickup.format(CANONICAL_TIMESTAMP).to_string(),
            dropoff_datetime: dropoff.format(CANONICAL_TIMESTAMP).to_string(),
            passenger_count: row.passenger_count,
            pickup_longitude: row.pickup_longitude,
            pickup_latitude: row.pickup_latitude,
            dropoff_longitude: row.dropoff_longitude,
            dropoff_latitude: row.dropoff_latitude,
            distance_km,
            trip_duration: row.trip_duration,
            trip_speed_kmh,
            fare_estimate,
            fare_per_km: fare_estimate / distance_km,
            pickup_hour: pickup.hour(),
            pickup_dow: pickup.weekday().num_days_from_monday(),
        });
    }

    log::debug!(
        "Cleaned {} of {deduped_count} deduplicated rows ({} dropped)",
        cleaned.len(),
        accounting.total()
    );

    (cleaned, accounting)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_row(id: &str) -> RawRecord {
        RawRecord {
            id: Some(id.to_string()),
            vendor_id: Some(2),
            pickup_datetime: Some("2016-03-14 17:24:55".to_string()),
            dropoff_datetime: Some("2016-03-14 17:34:55".to_string()),
            passenger_count: Some(1),
            pickup_longitude: Some(-73.99),
            pickup_latitude: Some(40.75),
            dropoff_longitude: Some(-73.97),
            dropoff_latitude: Some(40.75),
            trip_duration: Some(600.0),
        }
    }

    fn clean_with_defaults(rows: Vec<RawRecord>) -> (Vec<CleanedRecord>, DropAccounting) {
        clean_records(rows, &CleaningConfig::default())
    }

    #[test]
    fn valid_row_survives_with_derived_features() {
        let (cleaned, accounting) = clean_with_defaults(vec![valid_row("t1")]);

        assert_eq!(accounting.total(), 0);
        assert_eq!(cleaned.len(), 1);

        let record = &cleaned[0];
        assert!((record.distance_km - 1.685).abs() < 0.01, "{record:?}");
        assert!((record.trip_speed_kmh - 10.11).abs() < 0.05);
        assert!((record.fare_estimate - 4.52).abs() < 0.01);
        assert!((record.fare_per_km - record.fare_estimate / record.distance_km).abs() < 1e-12);
        assert_eq!(record.pickup_datetime, "2016-03-14T17:24:55Z");
        assert_eq!(record.dropoff_datetime, "2016-03-14T17:34:55Z");
        assert_eq!(record.pickup_hour, 17);
        // 2016-03-14 was a Monday.
        assert_eq!(record.pickup_dow, 0);
    }

    #[test]
    fn missing_passenger_count_is_tallied_as_missing_field() {
        let mut row = valid_row("t1");
        row.passenger_count = None;

        let (cleaned, accounting) = clean_with_defaults(vec![row]);
        assert!(cleaned.is_empty());
        assert_eq!(accounting.count(DropReason::MissingCriticalField), 1);
        assert_eq!(accounting.total(), 1);
    }

    #[test]
    fn out_of_box_pickup_is_tallied_as_out_of_bounds() {
        let mut row = valid_row("t1");
        row.pickup_latitude = Some(42.0);

        let (cleaned, accounting) = clean_with_defaults(vec![row]);
        assert!(cleaned.is_empty());
        assert_eq!(accounting.count(DropReason::OutOfBounds), 1);
    }

    #[test]
    fn short_duration_is_tallied_as_outlier() {
        let mut row = valid_row("t1");
        row.trip_duration = Some(30.0);

        let (cleaned, accounting) = clean_with_defaults(vec![row]);
        assert!(cleaned.is_empty());
        assert_eq!(
            accounting.count(DropReason::OutlierDistanceDurationSpeed),
            1
        );
    }

    #[test]
    fn unparseable_timestamp_is_tallied_as_invalid() {
        let mut row = valid_row("t1");
        row.pickup_datetime = Some("not a timestamp".to_string());

        let (cleaned, accounting) = clean_with_defaults(vec![row]);
        assert!(cleaned.is_empty());
        assert_eq!(accounting.count(DropReason::InvalidTimestamp), 1);
    }

    #[test]
    fn first_failing_filter_claims_the_row() {
        // Missing field and garbage timestamp: only the earlier filter
        // may tally the row.
        let mut row = valid_row("t1");
        row.passenger_count = None;
        row.pickup_datetime = Some("garbage".to_string());

        let (_, accounting) = clean_with_defaults(vec![row]);
        assert_eq!(accounting.count(DropReason::MissingCriticalField), 1);
        assert_eq!(accounting.count(DropReason::InvalidTimestamp), 0);

        // Garbage timestamp and out-of-box pickup: timestamp filter runs
        // first.
        let mut row = valid_row("t2");
        row.dropoff_datetime = Some("garbage".to_string());
        row.pickup_latitude = Some(42.0);

        let (_, accounting) = clean_with_defaults(vec![row]);
        assert_eq!(accounting.count(DropReason::InvalidTimestamp), 1);
        assert_eq!(accounting.count(DropReason::OutOfBounds), 0);
    }

    #[test]
    fn exact_duplicates_are_removed_uncounted() {
        let (cleaned, accounting) = clean_with_defaults(vec![valid_row("t1"), valid_row("t1")]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(accounting.total(), 0);
    }

    #[test]
    fn repeated_identifiers_are_deduplicated_uncounted() {
        let first = valid_row("t1");
        let mut second = valid_row("t1");
        second.passenger_count = Some(4);

        let (cleaned, accounting) = clean_with_defaults(vec![first, second]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].passenger_count, 1);
        assert_eq!(accounting.total(), 0);
    }

    #[test]
    fn drops_plus_survivors_equal_deduplicated_input() {
        let mut rows = vec![
            valid_row("t1"),
            valid_row("t1"), // exact duplicate, uncounted
            valid_row("t2"),
        ];
        let mut missing = valid_row("t3");
        missing.vendor_id = None;
        rows.push(missing);
        let mut bad_ts = valid_row("t4");
        bad_ts.dropoff_datetime = Some("???".to_string());
        rows.push(bad_ts);
        let mut far_away = valid_row("t5");
        far_away.dropoff_latitude = Some(39.0);
        rows.push(far_away);
        let mut crawl = valid_row("t6");
        crawl.trip_duration = Some(14_000.0); // 1.7 km in ~4 h: speed below 1
        rows.push(crawl);

        let (cleaned, accounting) = clean_with_defaults(rows);

        let deduplicated_input = 6; // 7 raw rows minus 1 exact duplicate
        assert_eq!(cleaned.len() as u64 + accounting.total(), deduplicated_input);
        assert_eq!(cleaned.len(), 2);
    }

    #[test]
    fn every_survivor_satisfies_the_invariants() {
        let mut rows: Vec<RawRecord> = Vec::new();
        for (i, duration) in [90.0, 600.0, 3_000.0, 14_400.0, 20_000.0, 45.0]
            .iter()
            .enumerate()
        {
            let mut row = valid_row(&format!("t{i}"));
            row.trip_duration = Some(*duration);
            // Spread the dropoffs so longer trips keep a plausible speed.
            row.dropoff_longitude = Some(-73.97 - 0.03 * (i as f64));
            rows.push(row);
        }

        let config = CleaningConfig::default();
        let (cleaned, _) = clean_records(rows, &config);
        assert!(!cleaned.is_empty());

        let mut ids = HashSet::new();
        for record in &cleaned {
            assert!(record.trip_duration > 60.0 && record.trip_duration <= 14_400.0);
            assert!(record.distance_km > 0.2 && record.distance_km < 100.0);
            assert!(record.trip_speed_kmh > 1.0 && record.trip_speed_kmh < 130.0);
            assert!(
                config
                    .bounding_box
                    .contains(record.pickup_latitude, record.pickup_longitude)
            );
            assert!(
                config
                    .bounding_box
                    .contains(record.dropoff_latitude, record.dropoff_longitude)
            );
            assert!(ids.insert(record.id.clone()), "duplicate id {}", record.id);
        }
    }

    #[test]
    fn duration_upper_bound_is_inclusive() {
        let mut at_bound = valid_row("t1");
        at_bound.trip_duration = Some(14_400.0);
        at_bound.dropoff_longitude = Some(-73.90); // ~7.6 km keeps speed plausible

        let mut past_bound = valid_row("t2");
        past_bound.trip_duration = Some(14_401.0);
        past_bound.dropoff_longitude = Some(-73.90);

        let (cleaned, accounting) = clean_with_defaults(vec![at_bound, past_bound]);
        assert_eq!(cleaned.len(), 1);
        assert_eq!(cleaned[0].id, "t1");
        assert_eq!(
            accounting.count(DropReason::OutlierDistanceDurationSpeed),
            1
        );
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        let mut row = valid_row("t1");
        row.pickup_datetime = Some("2016-03-14T17:24:55-04:00".to_string());

        let (cleaned, _) = clean_with_defaults(vec![row]);
        assert_eq!(cleaned[0].pickup_datetime, "2016-03-14T21:24:55Z");
        assert_eq!(cleaned[0].pickup_hour, 21);
    }

    #[test]
    fn parse_timestamp_accepts_known_forms() {
        assert!(parse_timestamp("2016-03-14 17:24:55").is_some());
        assert!(parse_timestamp("2016-03-14T17:24:55").is_some());
        assert!(parse_timestamp("2016-03-14T17:24:55+02:00").is_some());
        assert!(parse_timestamp("2016-03-14").is_some());
        assert!(parse_timestamp("14/03/2016").is_none());
        assert!(parse_timestamp("").is_none());
    }

    #[test]
    fn config_round_trips_through_toml() {
        let toml_text = r#"
            [bounding_box]
            lat_min = 40.0
            lat_max = 41.0
            lon_min = -75.0
            lon_max = -73.0

            [bounds]
            distance_km = [0.5, 50.0]
            duration_s = [60.0, 7200.0]
            speed_kmh = [1.0, 130.0]
        "#;

        let config: CleaningConfig = toml::from_str(toml_text).unwrap();
        assert!((config.bounding_box.lat_min - 40.0).abs() < 1e-12);
        assert!((config.bounds.distance_km.1 - 50.0).abs() < 1e-12);
    }

    #[test]
    fn partial_toml_falls_back_to_defaults() {
        let config: CleaningConfig = toml::from_str("").unwrap();
        assert_eq!(config, CleaningConfig::default());
    }
}
