#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions)]

//! Geometry primitives for trip records.
//!
//! Provides the great-circle distance used for per-trip distance
//! derivation and the rectangular bounding box used by the cleaning
//! stage's serviceable-region filter. Both are pure functions over their
//! inputs with no table-wide or global state, so they can be applied
//! per-record in any order.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in kilometers.
const EARTH_RADIUS_KM: f64 = 6371.0;

/// Great-circle distance in kilometers between two coordinate pairs,
/// using the haversine formula.
///
/// Total for any finite input; antipodal and degenerate inputs produce a
/// result but are not specifically validated.
#[must_use]
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let (lat1, lon1) = (lat1.to_radians(), lon1.to_radians());
    let (lat2, lon2) = (lat2.to_radians(), lon2.to_radians());

    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

/// A rectangular latitude/longitude bounding box with inclusive edges.
///
/// The default box covers the serviceable region for the trip dataset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Minimum latitude in degrees.
    pub lat_min: f64,
    /// Maximum latitude in degrees.
    pub lat_max: f64,
    /// Minimum longitude in degrees.
    pub lon_min: f64,
    /// Maximum longitude in degrees.
    pub lon_max: f64,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self {
            lat_min: 40.3,
            lat_max: 41.2,
            lon_min: -74.5,
            lon_max: -72.8,
        }
    }
}

impl BoundingBox {
    /// Returns `true` if the point lies inside the box, edges included.
    #[must_use]
    pub const fn contains(&self, lat: f64, lon: f64) -> bool {
        lat >= self.lat_min && lat <= self.lat_max && lon >= self.lon_min && lon <= self.lon_max
    }
}
