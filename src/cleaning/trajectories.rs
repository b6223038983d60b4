//! Entity-level filters.
//!
//! These drop whole trajectories rather than single fixes: too few points,
//! too short a path, too brief a time span. Removing an entity does not
//! change any other entity's neighbours, so one pass converges; features that
//! were present before the call are still recomputed afterwards so no column
//! is left stale. Segment ids and states of surviving entities stay valid.

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, Result};
use crate::features::{compute_kinematic_features, elapsed_seconds};
use crate::geo_utils::polyline_length;
use crate::point_set::{FeatureColumns, PointSet};
use crate::{GpsPoint, TrackPoint};

/// Default minimum number of points per trajectory.
pub const DEFAULT_MIN_POINTS: usize = 2;
/// Default minimum path length per trajectory (meters).
pub const DEFAULT_MIN_LENGTH: f64 = 100.0;

/// Outcome of an entity-level filter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryFilterReport {
    pub entities_removed: usize,
    pub points_removed: usize,
    pub entities_remaining: usize,
}

/// Drop entities with fewer than `min_points` points.
pub fn drop_sparse_trajectories(
    points: &mut PointSet,
    min_points: usize,
) -> Result<TrajectoryFilterReport> {
    Ok(drop_entities(points, "sparse trajectories", |rows| {
        rows.len() >= min_points
    }))
}

/// Drop entities whose path length is below `min_length` meters.
pub fn drop_short_trajectories(
    points: &mut PointSet,
    min_length: f64,
) -> Result<TrajectoryFilterReport> {
    ensure_non_negative("min_length", min_length)?;
    Ok(drop_entities(points, "short trajectories", |rows| {
        path_length(rows) >= min_length
    }))
}

/// Drop entities with too few points, then those too short.
pub fn drop_short_and_sparse_trajectories(
    points: &mut PointSet,
    min_points: usize,
    min_length: f64,
) -> Result<TrajectoryFilterReport> {
    ensure_non_negative("min_length", min_length)?;
    let sparse = drop_sparse_trajectories(points, min_points)?;
    let short = drop_short_trajectories(points, min_length)?;
    Ok(TrajectoryFilterReport {
        entities_removed: sparse.entities_removed + short.entities_removed,
        points_removed: sparse.points_removed + short.points_removed,
        entities_remaining: short.entities_remaining,
    })
}

/// Drop entities spanning less than `min_duration` seconds.
pub fn drop_brief_trajectories(
    points: &mut PointSet,
    min_duration: f64,
) -> Result<TrajectoryFilterReport> {
    ensure_non_negative("min_duration", min_duration)?;
    Ok(drop_entities(points, "brief trajectories", |rows| {
        let span = match (rows.first(), rows.last()) {
            (Some(first), Some(last)) => elapsed_seconds(first.timestamp, last.timestamp),
            _ => 0.0,
        };
        span >= min_duration
    }))
}

fn path_length(rows: &[TrackPoint]) -> f64 {
    let track: Vec<GpsPoint> = rows.iter().map(TrackPoint::position).collect();
    polyline_length(&track)
}

fn drop_entities<F>(points: &mut PointSet, filter: &str, keep_entity: F) -> TrajectoryFilterReport
where
    F: Fn(&[TrackPoint]) -> bool,
{
    let mut keep = vec![true; points.len()];
    let mut entities_removed = 0;
    for group in points.groups() {
        if !keep_entity(points.group_points(group)) {
            entities_removed += 1;
            keep[group.range.clone()].fill(false);
        }
    }

    if entities_removed == 0 {
        return TrajectoryFilterReport {
            entities_remaining: points.entity_count(),
            ..Default::default()
        };
    }

    let had_features = points.features() != FeatureColumns::NONE;
    let points_removed = points.retain_rows(&keep);
    if had_features {
        compute_kinematic_features(points);
    }

    info!(
        "Dropped {} {} ({} points, {} entities remaining)",
        entities_removed,
        filter,
        points_removed,
        points.entity_count()
    );
    TrajectoryFilterReport {
        entities_removed,
        points_removed,
        entities_remaining: points.entity_count(),
    }
}
