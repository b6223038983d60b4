//! Stop segment compression.
//!
//! A stop segment is a maximal run of consecutive Stop points sharing a
//! segment id inside one entity. Each one is reduced to a representative
//! position, written to its first and last point:
//!
//! - [`RepresentativePolicy::Mode`]: the most frequent `(lat, lon)` pair.
//!   Ties go to the pair that occurs first in the segment's rows, which are
//!   in canonical (timestamp, then input) order, so the result is stable
//!   across runs. `-0.0` and `0.0` count as the same coordinate.
//! - [`RepresentativePolicy::Centroid`]: the arithmetic mean of the segment's
//!   coordinates.
//!
//! With `drop_moves` every other point is deleted (moves and interior stop
//! points); otherwise all points are kept and the non-representative ones
//! report [`crate::MEAN_SENTINEL`] through `lat_mean()`/`lon_mean()`.

use std::collections::HashMap;
use std::ops::Range;
use std::str::FromStr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrajectoryError};
use crate::geo_utils::compute_center;
use crate::point_set::PointSet;
use crate::{GpsPoint, MovementState, TrackPoint};

/// How a stop segment's representative position is chosen.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RepresentativePolicy {
    /// Most frequent coordinate pair
    #[default]
    Mode,
    /// Mean latitude and longitude
    Centroid,
}

impl FromStr for RepresentativePolicy {
    type Err = TrajectoryError;

    /// Accepts `mode` (alias `default`) and `centroid`.
    fn from_str(name: &str) -> Result<Self> {
        match name {
            "mode" | "default" => Ok(RepresentativePolicy::Mode),
            "centroid" => Ok(RepresentativePolicy::Centroid),
            other => Err(TrajectoryError::UnknownPolicy {
                kind: "representative policy".to_string(),
                name: other.to_string(),
            }),
        }
    }
}

/// Configuration for stop compression.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionConfig {
    pub policy: RepresentativePolicy,
    /// Delete every point that does not carry a representative
    pub drop_moves: bool,
}

/// Outcome of a compression run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CompressionSummary {
    pub stop_segments: usize,
    /// Stop segments of a single point, kept at their own position
    pub singleton_segments: usize,
    pub rows_removed: usize,
    pub rows_remaining: usize,
}

/// Collapse every stop segment to a representative position.
///
/// Requires segment ids and movement states. Representatives from a previous
/// run are replaced. When rows are dropped the feature columns are cleared
/// and must be recomputed before further kinematic work.
///
/// # Example
/// ```
/// use track_kinematics::{
///     compress_stop_segments, CompressionConfig, PipelineBuilder, PointSet, RepresentativePolicy,
///     StopConfig, TrackPoint,
/// };
///
/// let mut set = PointSet::new(vec![
///     TrackPoint::new("a", 0.0, 0.0, 0),
///     TrackPoint::new("a", 0.0, 0.0001, 600_000),
///     TrackPoint::new("a", 0.0, 0.0002, 1_200_000),
/// ]);
/// PipelineBuilder::new()
///     .stops_by_dwell(StopConfig { dist_radius: 50.0, time_radius: 900.0 })
///     .build()
///     .unwrap()
///     .run(&mut set)
///     .unwrap();
///
/// let config = CompressionConfig { policy: RepresentativePolicy::Centroid, drop_moves: true };
/// let summary = compress_stop_segments(&mut set, &config).unwrap();
///
/// assert_eq!(summary.stop_segments, 1);
/// assert_eq!(set.len(), 2);
/// assert!((set.points()[0].lon_mean() - 0.0001).abs() < 1e-12);
/// ```
pub fn compress_stop_segments(
    points: &mut PointSet,
    config: &CompressionConfig,
) -> Result<CompressionSummary> {
    points.require_segments("stop compression")?;
    points.require_states("stop compression")?;

    let mut keep = vec![!config.drop_moves; points.len()];
    let mut assignments: Vec<(usize, usize, GpsPoint)> = Vec::new();
    let mut summary = CompressionSummary::default();

    for group in points.groups() {
        let rows = points.group_points(group);
        for run in stop_runs(rows) {
            let segment = &rows[run.clone()];
            let representative = if segment.len() == 1 {
                warn!(
                    "Stop segment {:?} of entity '{}' has a single point; keeping its position",
                    segment[0].segment_id, group.entity_id
                );
                summary.singleton_segments += 1;
                segment[0].position()
            } else {
                match representative_position(segment, config.policy) {
                    Some(position) => position,
                    None => continue,
                }
            };

            let first = group.range.start + run.start;
            let last = group.range.start + run.end - 1;
            keep[first] = true;
            keep[last] = true;
            assignments.push((first, last, representative));
            summary.stop_segments += 1;
        }
    }

    let rows = points.points_mut();
    for row in rows.iter_mut() {
        row.representative = None;
    }
    for (first, last, representative) in assignments {
        rows[first].representative = Some(representative);
        rows[last].representative = Some(representative);
    }

    if config.drop_moves {
        summary.rows_removed = points.retain_rows(&keep);
    }
    summary.rows_remaining = points.len();

    info!(
        "Compressed {} stop segments ({} singletons) with {:?}; removed {} rows",
        summary.stop_segments, summary.singleton_segments, config.policy, summary.rows_removed
    );
    Ok(summary)
}

/// Runs of consecutive Stop rows sharing a segment id.
fn stop_runs(rows: &[TrackPoint]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for (i, row) in rows.iter().enumerate() {
        if row.state != Some(MovementState::Stop) {
            continue;
        }
        match runs.last_mut() {
            Some(run) if run.end == i && rows[run.start].segment_id == row.segment_id => {
                run.end = i + 1
            }
            _ => runs.push(i..i + 1),
        }
    }
    runs
}

fn representative_position(
    segment: &[TrackPoint],
    policy: RepresentativePolicy,
) -> Option<GpsPoint> {
    match policy {
        RepresentativePolicy::Mode => mode_position(segment),
        RepresentativePolicy::Centroid => {
            let positions: Vec<GpsPoint> = segment.iter().map(|p| p.position()).collect();
            compute_center(&positions)
        }
    }
}

/// Most frequent position; ties go to the earliest first occurrence.
fn mode_position(segment: &[TrackPoint]) -> Option<GpsPoint> {
    // key -> (count, first index)
    let mut counts: HashMap<(u64, u64), (usize, usize)> = HashMap::new();
    for (i, point) in segment.iter().enumerate() {
        let entry = counts
            .entry((coordinate_key(point.latitude), coordinate_key(point.longitude)))
            .or_insert((0, i));
        entry.0 += 1;
    }

    counts
        .values()
        .max_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)))
        .map(|&(_, first)| segment[first].position())
}

/// Bit pattern of a coordinate with both zeros folded together.
#[inline]
fn coordinate_key(value: f64) -> u64 {
    if value == 0.0 {
        0
    } else {
        value.to_bits()
    }
}
