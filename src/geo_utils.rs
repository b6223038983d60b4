//! # Geographic Utilities
//!
//! The distance primitive every kinematic feature is built on.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine`] | Great-circle distance between two coordinate pairs |
//! | [`haversine_arrays`] | Elementwise haversine over equal-length arrays |
//! | [`haversine_distance`] | Great-circle distance between two [`GpsPoint`]s |
//! | [`polyline_length`] | Total length of a GPS track in meters |
//! | [`compute_center`] | Arithmetic centroid of a GPS track |
//!
//! ## Example
//!
//! ```rust
//! use track_kinematics::geo_utils;
//!
//! let lats1 = [51.5074, 0.0];
//! let lons1 = [-0.1278, 0.0];
//! let lats2 = [48.8566, 0.0];
//! let lons2 = [2.3522, 0.0];
//!
//! let d = geo_utils::haversine_arrays(&lats1, &lons1, &lats2, &lons2, true).unwrap();
//! assert!((d[0] - 343_560.0).abs() < 5_000.0);
//! assert_eq!(d[1], 0.0);
//! ```
//!
//! ## Algorithm Notes
//!
//! Distances use the `geo` crate's haversine metric on a sphere of mean Earth
//! radius. Results are non-negative, symmetric and zero for coincident
//! points; a NaN coordinate yields a NaN distance rather than an error.

use geo::{Distance, Haversine, Point};

use crate::error::{Result, TrajectoryError};
use crate::GpsPoint;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between `(lat1, lon1)` and `(lat2, lon2)`.
///
/// Coordinates are degrees when `degrees` is true, radians otherwise.
///
/// # Example
///
/// ```rust
/// use track_kinematics::geo_utils::haversine;
///
/// let d = haversine(0.0, 0.0, 0.0, 1.0, true);
/// assert!((d - 111_195.0).abs() < 10.0);
///
/// let r = haversine(0.0, 0.0, 0.0, 1.0_f64.to_radians(), false);
/// assert!((d - r).abs() < 1e-6);
/// ```
#[inline]
pub fn haversine(lat1: f64, lon1: f64, lat2: f64, lon2: f64, degrees: bool) -> f64 {
    let (lat1, lon1, lat2, lon2) = if degrees {
        (lat1, lon1, lat2, lon2)
    } else {
        (
            lat1.to_degrees(),
            lon1.to_degrees(),
            lat2.to_degrees(),
            lon2.to_degrees(),
        )
    };
    let point1 = Point::new(lon1, lat1);
    let point2 = Point::new(lon2, lat2);
    Haversine::distance(point1, point2)
}

/// Elementwise haversine over four equal-length coordinate arrays.
///
/// Returns [`TrajectoryError::MismatchedLengths`] when the arrays differ in
/// length; nothing is computed in that case.
pub fn haversine_arrays(
    lat1: &[f64],
    lon1: &[f64],
    lat2: &[f64],
    lon2: &[f64],
    degrees: bool,
) -> Result<Vec<f64>> {
    let expected = lat1.len();
    for (what, len) in [
        ("lon1", lon1.len()),
        ("lat2", lat2.len()),
        ("lon2", lon2.len()),
    ] {
        if len != expected {
            return Err(TrajectoryError::MismatchedLengths {
                what: format!("haversine input {}", what),
                expected,
                actual: len,
            });
        }
    }

    Ok((0..expected)
        .map(|i| haversine(lat1[i], lon1[i], lat2[i], lon2[i], degrees))
        .collect())
}

/// Great-circle distance between two GPS points in meters.
///
/// # Example
///
/// ```rust
/// use track_kinematics::{GpsPoint, geo_utils};
///
/// let london = GpsPoint::new(51.5074, -0.1278);
/// let paris = GpsPoint::new(48.8566, 2.3522);
///
/// let distance = geo_utils::haversine_distance(&london, &paris);
/// assert!((distance - 343_560.0).abs() < 5000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    haversine(p1.latitude, p1.longitude, p2.latitude, p2.longitude, true)
}

/// Total length of a polyline in meters. Empty or single-point tracks are 0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

// =============================================================================
// Center/Centroid Functions
// =============================================================================

/// Arithmetic mean of latitudes and longitudes.
///
/// Returns `None` for empty input. Tracks crossing the antimeridian are
/// averaged naively.
pub fn compute_center(points: &[GpsPoint]) -> Option<GpsPoint> {
    if points.is_empty() {
        return None;
    }

    let sum_lat: f64 = points.iter().map(|p| p.latitude).sum();
    let sum_lng: f64 = points.iter().map(|p| p.longitude).sum();
    let n = points.len() as f64;

    Some(GpsPoint::new(sum_lat / n, sum_lng / n))
}

// =============================================================================
// Unit Tests
// =============================================================================
