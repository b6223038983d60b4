//! Kinematic feature calculator.
//!
//! For every entity, ordered by timestamp, attaches the distance, elapsed time
//! and speed of each point relative to its neighbours:
//!
//! | Column | Unit | Null on |
//! |--------|------|---------|
//! | `dist_to_prev` | m | first point |
//! | `dist_to_next` | m | last point |
//! | `dist_prev_to_next` | m | first and last point |
//! | `time_to_prev` | s | first point |
//! | `time_to_next` | s | last point |
//! | `speed_to_prev` | m/s | first point |
//! | `speed_to_next` | m/s | last point |
//!
//! A zero elapsed time gives an infinite speed. That value is a sentinel the
//! max-speed cleaner uses to prune duplicate-timestamp fixes, not an error.
//!
//! Columns are overwritten in place; rows are never reordered.

use log::debug;
use serde::{Deserialize, Serialize};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::geo_utils::haversine;
use crate::point_set::{FeatureColumns, PointSet};
use crate::TrackPoint;

/// Neighbour-relative features of one point. `None` where the neighbour does
/// not exist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct KinematicFeatures {
    pub dist_to_prev: Option<f64>,
    pub dist_to_next: Option<f64>,
    pub dist_prev_to_next: Option<f64>,
    pub time_to_prev: Option<f64>,
    pub time_to_next: Option<f64>,
    pub speed_to_prev: Option<f64>,
    pub speed_to_next: Option<f64>,
}

/// Compute every distance, time and speed column.
///
/// # Example
/// ```
/// use track_kinematics::{PointSet, TrackPoint, compute_kinematic_features};
///
/// let mut set = PointSet::new(vec![
///     TrackPoint::new("a", 0.0, 0.0, 0),
///     TrackPoint::new("a", 0.0, 0.001, 10_000),
/// ]);
/// compute_kinematic_features(&mut set);
///
/// let first = &set.points()[0].features;
/// assert!(first.dist_to_prev.is_none());
/// assert_eq!(first.time_to_next, Some(10.0));
/// assert!((first.speed_to_next.unwrap() - 11.12).abs() < 0.01);
/// ```
pub fn compute_kinematic_features(points: &mut PointSet) {
    for_each_group(points, |group| {
        distance_features(group);
        time_features(group);
        speed_features(group);
    });
    points.mark_features(FeatureColumns::ALL);
    debug!(
        "Computed kinematic features for {} points across {} entities",
        points.len(),
        points.entity_count()
    );
}

/// Compute only `dist_to_prev`, `dist_to_next` and `dist_prev_to_next`.
pub fn compute_distance_features(points: &mut PointSet) {
    for_each_group(points, distance_features);
    points.mark_features(FeatureColumns::DISTANCE);
}

/// Compute only `time_to_prev` and `time_to_next`.
pub fn compute_time_features(points: &mut PointSet) {
    for_each_group(points, time_features);
    points.mark_features(FeatureColumns::TIME);
}

/// Speed from a distance and an elapsed time.
///
/// Zero elapsed time yields `+inf` (NaN if the distance itself is NaN).
#[inline]
pub(crate) fn speed(distance: Option<f64>, elapsed: Option<f64>) -> Option<f64> {
    match (distance, elapsed) {
        (Some(d), Some(t)) if t == 0.0 => Some(if d.is_nan() { f64::NAN } else { f64::INFINITY }),
        (Some(d), Some(t)) => Some(d / t),
        _ => None,
    }
}

/// Seconds between two epoch-millisecond timestamps.
///
/// Subtracts in `f64`: any pair of `i64` timestamps is accepted.
#[inline]
pub(crate) fn elapsed_seconds(from: i64, to: i64) -> f64 {
    (to as f64 - from as f64) / 1000.0
}

fn for_each_group(points: &mut PointSet, compute: fn(&mut [TrackPoint])) {
    let slices = points.group_slices_mut();

    #[cfg(feature = "parallel")]
    slices.into_par_iter().for_each(compute);

    #[cfg(not(feature = "parallel"))]
    slices.into_iter().for_each(compute);
}

fn distance_features(group: &mut [TrackPoint]) {
    let n = group.len();
    let coords: Vec<(f64, f64)> = group.iter().map(|p| (p.latitude, p.longitude)).collect();
    let dist = |a: (f64, f64), b: (f64, f64)| haversine(a.0, a.1, b.0, b.1, true);

    for (i, point) in group.iter_mut().enumerate() {
        let here = coords[i];
        let prev = i.checked_sub(1).map(|j| coords[j]);
        let next = (i + 1 < n).then(|| coords[i + 1]);

        point.features.dist_to_prev = prev.map(|p| dist(p, here));
        point.features.dist_to_next = next.map(|q| dist(here, q));
        point.features.dist_prev_to_next = prev.zip(next).map(|(p, q)| dist(p, q));
    }
}

fn time_features(group: &mut [TrackPoint]) {
    let n = group.len();
    let times: Vec<i64> = group.iter().map(|p| p.timestamp).collect();

    for (i, point) in group.iter_mut().enumerate() {
        point.features.time_to_prev = i
            .checked_sub(1)
            .map(|j| elapsed_seconds(times[j], times[i]));
        point.features.time_to_next = (i + 1 < n).then(|| elapsed_seconds(times[i], times[i + 1]));
    }
}

fn speed_features(group: &mut [TrackPoint]) {
    for point in group.iter_mut() {
        let f = &mut point.features;
        f.speed_to_prev = speed(f.dist_to_prev, f.time_to_prev);
        f.speed_to_next = speed(f.dist_to_next, f.time_to_next);
    }
}
