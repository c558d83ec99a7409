#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Trip record types and the drop-reason taxonomy shared across the
//! tripflow pipeline.
//!
//! This crate defines the raw ingest row, the cleaned output row, the
//! per-reason drop accounting produced by the cleaning stage, and the
//! stable column contract that the CSV sink and the `DuckDB` schema both
//! follow. Everything downstream of the cleaning stage depends on these
//! types, so changes here are breaking changes.

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Required columns of the raw input dataset, in the order they appear in
/// the source CSV. Ingestion fails fast if any of these is absent.
pub const RAW_COLUMNS: &[&str] = &[
    "id",
    "vendor_id",
    "pickup_datetime",
    "dropoff_datetime",
    "passenger_count",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
    "trip_duration",
];

/// Columns of the cleaned rectangular dataset, in order.
///
/// This is the stable contract between the cleaning pipeline, the CSV
/// sink, the `trips` table in `DuckDB`, and the serving layer. Renaming or
/// reordering columns is a breaking change.
pub const CLEANED_COLUMNS: &[&str] = &[
    "id",
    "vendor_id",
    "pickup_datetime",
    "dropoff_datetime",
    "passenger_count",
    "pickup_longitude",
    "pickup_latitude",
    "dropoff_longitude",
    "dropoff_latitude",
    "distance_km",
    "trip_duration",
    "trip_speed_kmh",
    "fare_estimate",
    "fare_per_km",
    "pickup_hour",
    "pickup_dow",
];

/// Reason a raw row was removed during cleaning.
///
/// Exact-duplicate removal is intentionally not a reason here: it happens
/// before any quality filter and is treated as deduplication rather than a
/// quality drop, so it is never tallied.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DropReason {
    /// A critical field was null or missing.
    MissingCriticalField,
    /// The pickup or dropoff timestamp failed to parse.
    InvalidTimestamp,
    /// A coordinate pair fell outside the configured bounding box.
    OutOfBounds,
    /// Distance, duration, or derived speed was outside plausible bounds.
    OutlierDistanceDurationSpeed,
}

impl DropReason {
    /// Returns all drop reasons in their fixed filter order.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::MissingCriticalField,
            Self::InvalidTimestamp,
            Self::OutOfBounds,
            Self::OutlierDistanceDurationSpeed,
        ]
    }
}

/// Per-reason tally of rows removed during a cleaning run.
///
/// Produced once per pipeline invocation and used only for audit output.
/// The sum of all counts plus the number of surviving rows equals the
/// deduplicated input row count.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DropAccounting {
    counts: BTreeMap<DropReason, u64>,
}

impl DropAccounting {
    /// Creates an empty accounting with all counters at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a single dropped row under the given reason.
    pub fn record(&mut self, reason: DropReason) {
        self.add(reason, 1);
    }

    /// Adds `n` dropped rows under the given reason. Adding zero is a
    /// no-op, so accountings stay equal regardless of which zero-count
    /// reasons they have seen.
    pub fn add(&mut self, reason: DropReason, n: u64) {
        if n == 0 {
            return;
        }
        *self.counts.entry(reason).or_insert(0) += n;
    }

    /// Returns the count for a single reason.
    #[must_use]
    pub fn count(&self, reason: DropReason) -> u64 {
        self.counts.get(&reason).copied().unwrap_or(0)
    }

    /// Returns the total number of rows dropped across all reasons.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.counts.values().sum()
    }

    /// Merges another accounting into this one by adding counters.
    ///
    /// Lets partitioned cleaning runs combine their per-partition tallies.
    pub fn merge(&mut self, other: &Self) {
        for (reason, count) in &other.counts {
            self.add(*reason, *count);
        }
    }

    /// Iterates over `(reason, count)` pairs in fixed filter order,
    /// including reasons with a zero count.
    pub fn iter(&self) -> impl Iterator<Item = (DropReason, u64)> + '_ {
        DropReason::all()
            .iter()
            .map(|reason| (*reason, self.count(*reason)))
    }
}

/// A raw trip row as read from the input dataset.
///
/// No invariants are guaranteed: every field is optional, coordinates may
/// be out of range, timestamps may be garbage, and rows may be exact
/// duplicates of each other. The cleaning stage turns these into
/// [`CleanedRecord`]s or drops them with an accounted reason.
#[derive(Debug, Clone, Default)]
pub struct RawRecord {
    /// Unique trip identifier.
    pub id: Option<String>,
    /// Vendor identifier.
    pub vendor_id: Option<i64>,
    /// Pickup timestamp as it appeared in the source.
    pub pickup_datetime: Option<String>,
    /// Dropoff timestamp as it appeared in the source.
    pub dropoff_datetime: Option<String>,
    /// Number of passengers.
    pub passenger_count: Option<i64>,
    /// Pickup longitude in degrees.
    pub pickup_longitude: Option<f64>,
    /// Pickup latitude in degrees.
    pub pickup_latitude: Option<f64>,
    /// Dropoff longitude in degrees.
    pub dropoff_longitude: Option<f64>,
    /// Dropoff latitude in degrees.
    pub dropoff_latitude: Option<f64>,
    /// Trip duration in seconds.
    pub trip_duration: Option<f64>,
}

impl RawRecord {
    /// Returns `true` if every critical field is present.
    #[must_use]
    pub const fn has_critical_fields(&self) -> bool {
        self.id.is_some()
            && self.vendor_id.is_some()
            && self.pickup_datetime.is_some()
            && self.dropoff_datetime.is_some()
            && self.passenger_count.is_some()
            && self.pickup_longitude.is_some()
            && self.pickup_latitude.is_some()
            && self.dropoff_longitude.is_some()
            && self.dropoff_latitude.is_some()
            && self.trip_duration.is_some()
    }

    fn float_bits(value: Option<f64>) -> Option<u64> {
        value.map(f64::to_bits)
    }
}

// Equality and hashing compare floats bitwise. Exact-duplicate removal
// needs reflexive equality, which NaN breaks under `==`.
impl PartialEq for RawRecord {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.vendor_id == other.vendor_id
            && self.pickup_datetime == other.pickup_datetime
            && self.dropoff_datetime == other.dropoff_datetime
            && self.passenger_count == other.passenger_count
            && Self::float_bits(self.pickup_longitude) == Self::float_bits(other.pickup_longitude)
            && Self::float_bits(self.pickup_latitude) == Self::float_bits(other.pickup_latitude)
            && Self::float_bits(self.dropoff_longitude) == Self::float_bits(other.dropoff_longitude)
            && Self::float_bits(self.dropoff_latitude) == Self::float_bits(other.dropoff_latitude)
            && Self::float_bits(self.trip_duration) == Self::float_bits(other.trip_duration)
    }
}

impl Eq for RawRecord {}

impl Hash for RawRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
        self.vendor_id.hash(state);
        self.pickup_datetime.hash(state);
        self.dropoff_datetime.hash(state);
        self.passenger_count.hash(state);
        Self::float_bits(self.pickup_longitude).hash(state);
        Self::float_bits(self.pickup_latitude).hash(state);
        Self::float_bits(self.dropoff_longitude).hash(state);
        Self::float_bits(self.dropoff_latitude).hash(state);
        Self::float_bits(self.trip_duration).hash(state);
    }
}

/// A trip row that survived every cleaning filter, with derived features.
///
/// Field order matches [`CLEANED_COLUMNS`] exactly so that serde-based CSV
/// serialization emits the contract columns in contract order. Invariants
/// hold by construction for every record the cleaning stage emits:
/// duration in (60, 14400] seconds, distance in (0.2, 100) km, speed in
/// (1, 130) km/h, both coordinate pairs inside the configured bounding
/// box, both timestamps valid UTC instants, identifiers unique. Records
/// are immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanedRecord {
    /// Unique trip identifier.
    pub id: String,
    /// Vendor identifier.
    pub vendor_id: i64,
    /// Pickup instant, normalized to UTC ISO 8601 with seconds precision.
    pub pickup_datetime: String,
    /// Dropoff instant, normalized to UTC ISO 8601 with seconds precision.
    pub dropoff_datetime: String,
    /// Number of passengers.
    pub passenger_count: i64,
    /// Pickup longitude in degrees.
    pub pickup_longitude: f64,
    /// Pickup latitude in degrees.
    pub pickup_latitude: f64,
    /// Dropoff longitude in degrees.
    pub dropoff_longitude: f64,
    /// Dropoff latitude in degrees.
    pub dropoff_latitude: f64,
    /// Great-circle pickup-to-dropoff distance in kilometers.
    pub distance_km: f64,
    /// Trip duration in seconds.
    pub trip_duration: f64,
    /// Average speed in km/h (`distance_km / (trip_duration / 3600)`).
    pub trip_speed_kmh: f64,
    /// Estimated fare (`2.5 + 1.2 * distance_km`).
    pub fare_estimate: f64,
    /// Fare per kilometer (`fare_estimate / distance_km`).
    pub fare_per_km: f64,
    /// Hour of the pickup instant, 0-23.
    pub pickup_hour: u32,
    /// Day of week of the pickup instant, 0-6 with Monday = 0.
    pub pickup_dow: u32,
}
