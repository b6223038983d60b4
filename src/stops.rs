//! Stay-point detection.
//!
//! Two classifiers label every point as [`MovementState::Move`] or
//! [`MovementState::Stop`]:
//!
//! - **Dwell** ([`label_stops_by_dwell`]): sums `time_to_prev` over the
//!   members of each segment, leaving out the entry point whose value
//!   measures the gap from the previous segment. Every point of a segment
//!   whose total exceeds `time_radius` is a Stop.
//! - **Radius** ([`label_stops_by_radius`]): a point is a Stop when it lies
//!   within `radius` meters of its predecessor.
//!
//! Neither classifier computes its own prerequisites. Build a
//! [`crate::PipelineBuilder`] to have missing features and segments resolved
//! with the defaults of [`StopConfig`].

use std::collections::BTreeMap;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, Result};
use crate::point_set::{FeatureColumns, PointSet};
use crate::segmentation::{segment_runs, SegmentationConfig};
use crate::{MovementState, SegmentId};

/// Default spatial radius for stop segmentation (meters).
pub const DEFAULT_DIST_RADIUS: f64 = 30.0;
/// Default dwell threshold (seconds).
pub const DEFAULT_TIME_RADIUS: f64 = 900.0;

/// Thresholds for dwell-based stop detection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopConfig {
    /// Points further apart than this start a new segment (meters)
    pub dist_radius: f64,
    /// Segments dwelling longer than this are stops (seconds)
    pub time_radius: f64,
}

impl StopConfig {
    /// Segmentation used for stop detection when none has been requested.
    pub fn segmentation(&self) -> SegmentationConfig {
        SegmentationConfig::by_max_distance(self.dist_radius)
    }

    pub fn validate(&self) -> Result<()> {
        ensure_non_negative("dist_radius", self.dist_radius)?;
        ensure_non_negative("time_radius", self.time_radius)
    }
}

impl Default for StopConfig {
    fn default() -> Self {
        Self {
            dist_radius: DEFAULT_DIST_RADIUS,
            time_radius: DEFAULT_TIME_RADIUS,
        }
    }
}

/// Summed elapsed seconds per segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DwellAggregate {
    totals: BTreeMap<SegmentId, f64>,
}

impl DwellAggregate {
    /// Dwell time of a segment.
    pub fn get(&self, segment: SegmentId) -> Option<f64> {
        self.totals.get(&segment).copied()
    }

    /// Segments in id order with their dwell times.
    pub fn iter(&self) -> impl Iterator<Item = (SegmentId, f64)> + '_ {
        self.totals.iter().map(|(&id, &total)| (id, total))
    }

    pub fn len(&self) -> usize {
        self.totals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.totals.is_empty()
    }

    /// True if the segment dwelled strictly longer than `time_radius`.
    pub fn is_stop(&self, segment: SegmentId, time_radius: f64) -> bool {
        self.get(segment).is_some_and(|total| total > time_radius)
    }
}

/// Dwell time of every segment, without labelling.
///
/// Requires segment ids and time features.
pub fn dwell_times(points: &PointSet) -> Result<DwellAggregate> {
    points.require_segments("dwell aggregation")?;
    points.require_features(FeatureColumns::TIME, "dwell aggregation")?;

    let mut aggregate = DwellAggregate::default();
    for group in points.groups() {
        let rows = points.group_points(group);
        for run in segment_runs(rows) {
            let Some(segment) = rows[run.start].segment_id else {
                continue;
            };
            // The entry point's time_to_prev spans the gap from the previous segment
            let total: f64 = rows[run.start + 1..run.end]
                .iter()
                .filter_map(|p| p.features.time_to_prev)
                .sum();
            *aggregate.totals.entry(segment).or_insert(0.0) += total;
        }
    }
    Ok(aggregate)
}

/// Label every point by the dwell time of its segment.
///
/// Stop if the segment's aggregate exceeds `time_radius`, else Move. Returns
/// the aggregate so callers can inspect it.
///
/// # Example
/// ```
/// use track_kinematics::{
///     compute_kinematic_features, label_stops_by_dwell, segment_trajectories, MovementState,
///     PointSet, SegmentationConfig, TrackPoint,
/// };
///
/// let mut set = PointSet::new(
///     (0..4).map(|i| TrackPoint::new("a", 0.0, 0.0, i * 5_000)).collect(),
/// );
/// compute_kinematic_features(&mut set);
/// segment_trajectories(&mut set, &SegmentationConfig::by_max_distance(30.0)).unwrap();
///
/// let dwell = label_stops_by_dwell(&mut set, 3.0).unwrap();
/// assert_eq!(dwell.get(0), Some(15.0));
/// assert!(set.points().iter().all(|p| p.state == Some(MovementState::Stop)));
/// ```
pub fn label_stops_by_dwell(points: &mut PointSet, time_radius: f64) -> Result<DwellAggregate> {
    ensure_non_negative("time_radius", time_radius)?;
    let aggregate = dwell_times(points)?;

    let mut stops = 0;
    for point in points.points_mut() {
        let is_stop = point
            .segment_id
            .is_some_and(|id| aggregate.is_stop(id, time_radius));
        if is_stop {
            stops += 1;
        }
        point.state = Some(if is_stop {
            MovementState::Stop
        } else {
            MovementState::Move
        });
    }
    points.mark_states();

    let stop_segments = aggregate
        .iter()
        .filter(|&(_, total)| total > time_radius)
        .count();
    info!(
        "Dwell classification: {} of {} segments are stops ({} of {} points)",
        stop_segments,
        aggregate.len(),
        stops,
        points.len()
    );
    Ok(aggregate)
}

/// Label each point on its own: Stop when `dist_to_prev <= radius`.
///
/// A point without a predecessor is a Move. Requires distance features.
/// Returns the number of stops.
pub fn label_stops_by_radius(points: &mut PointSet, radius: f64) -> Result<usize> {
    ensure_non_negative("radius", radius)?;
    points.require_features(FeatureColumns::DISTANCE, "radius classification")?;

    let mut stops = 0;
    for point in points.points_mut() {
        let is_stop = point.features.dist_to_prev.is_some_and(|d| d <= radius);
        if is_stop {
            stops += 1;
        }
        point.state = Some(if is_stop {
            MovementState::Stop
        } else {
            MovementState::Move
        });
    }
    points.mark_states();

    info!(
        "Radius classification ({}m): {} of {} points are stops",
        radius,
        stops,
        points.len()
    );
    Ok(stops)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_kinematic_features;
    use crate::segmentation::segment_trajectories;
    use crate::{TrackPoint, TrajectoryError};

    fn segmented(points: Vec<TrackPoint>, max_distance: f64) -> PointSet {
        let mut set = PointSet::new(points);
        compute_kinematic_features(&mut set);
        segment_trajectories(&mut set, &SegmentationConfig::by_max_distance(max_distance)).unwrap();
        set
    }

    fn states(set: &PointSet) -> Vec<MovementState> {
        set.points().iter().map(|p| p.state.unwrap()).collect()
    }

    #[test]
    fn test_four_close_points_are_one_stop() {
        let mut set = segmented(
            vec![
                TrackPoint::new("a", 0.0, 0.0, 0),
                TrackPoint::new("a", 0.0, 0.000001, 5_000),
                TrackPoint::new("a", 0.000001, 0.0, 10_000),
                TrackPoint::new("a", 0.0, 0.0, 15_000),
            ],
            30.0,
        );
        let dwell = label_stops_by_dwell(&mut set, 3.0).unwrap();
        assert_eq!(dwell.len(), 1);
        assert_eq!(dwell.get(0), Some(15.0));
        assert_eq!(states(&set), vec![MovementState::Stop; 4]);
        assert!(set.has_states());
    }

    #[test]
    fn test_entry_point_gap_is_excluded() {
        // Two clusters 1km apart with a 10 minute gap between them
        let mut set = segmented(
            vec![
                TrackPoint::new("a", 0.0, 0.0, 0),
                TrackPoint::new("a", 0.0, 0.0, 10_000),
                TrackPoint::new("a", 0.0, 0.01, 610_000),
                TrackPoint::new("a", 0.0, 0.01, 620_000),
                TrackPoint::new("a", 0.0, 0.01, 630_000),
            ],
            30.0,
        );
        let dwell = dwell_times(&set).unwrap();
        assert_eq!(dwell.get(0), Some(10.0));
        assert_eq!(dwell.get(1), Some(20.0));

        label_stops_by_dwell(&mut set, 15.0).unwrap();
        assert_eq!(
            states(&set),
            vec![
                MovementState::Move,
                MovementState::Move,
                MovementState::Stop,
                MovementState::Stop,
                MovementState::Stop,
            ]
        );
    }

    #[test]
    fn test_threshold_is_strict() {
        let mut set = segmented(
            vec![
                TrackPoint::new("a", 0.0, 0.0, 0),
                TrackPoint::new("a", 0.0, 0.0, 10_000),
            ],
            30.0,
        );
        label_stops_by_dwell(&mut set, 10.0).unwrap();
        assert_eq!(states(&set), vec![MovementState::Move; 2]);
    }

    #[test]
    fn test_dwell_matches_labels() {
        let mut set = segmented(
            vec![
                TrackPoint::new("a", 0.0, 0.0, 0),
                TrackPoint::new("a", 0.0, 0.0, 400_000),
                TrackPoint::new("a", 0.0, 0.5, 800_000),
                TrackPoint::new("a", 0.0, 0.5, 2_000_000),
                TrackPoint::new("b", 1.0, 1.0, 0),
            ],
            30.0,
        );
        let time_radius = 900.0;
        let dwell = label_stops_by_dwell(&mut set, time_radius).unwrap();
        for point in set.points() {
            let total = dwell.get(point.segment_id.unwrap()).unwrap();
            assert_eq!(point.state == Some(MovementState::Stop), total > time_radius);
        }
    }

    #[test]
    fn test_single_point_segment_is_move() {
        let mut set = segmented(vec![TrackPoint::new("solo", 0.0, 0.0, 0)], 30.0);
        let dwell = label_stops_by_dwell(&mut set, 0.0).unwrap();
        assert_eq!(dwell.get(0), Some(0.0));
        assert_eq!(states(&set), vec![MovementState::Move]);
    }

    #[test]
    fn test_requires_segments() {
        let mut set = PointSet::new(vec![TrackPoint::new("a", 0.0, 0.0, 0)]);
        compute_kinematic_features(&mut set);
        let result = label_stops_by_dwell(&mut set, 900.0);
        assert!(matches!(result, Err(TrajectoryError::MissingPrerequisite { .. })));
        assert!(!set.has_states());
    }

    #[test]
    fn test_label_by_radius() {
        let mut set = PointSet::new(vec![
            TrackPoint::new("a", 0.0, 0.0, 0),
            TrackPoint::new("a", 0.0, 0.00001, 1_000),
            TrackPoint::new("a", 0.0, 0.01, 2_000),
        ]);
        compute_kinematic_features(&mut set);
        let stops = label_stops_by_radius(&mut set, 5.0).unwrap();
        assert_eq!(stops, 1);
        assert_eq!(
            states(&set),
            vec![MovementState::Move, MovementState::Stop, MovementState::Move]
        );
    }

    #[test]
    fn test_stop_config_segmentation() {
        let config = StopConfig::default();
        assert_eq!(config.segmentation(), SegmentationConfig::by_max_distance(30.0));
        assert!(StopConfig {
            dist_radius: -1.0,
            time_radius: 1.0
        }
        .validate()
        .is_err());
    }
}
