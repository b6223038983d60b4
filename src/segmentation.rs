//! Segmentation engine.
//!
//! Splits every trajectory into contiguous segments wherever the movement
//! from the previous point is discontinuous: too far, too long, too fast, or
//! all three at once. One running counter walks each entity in order; the
//! first point of an entity always opens a new segment, and so does every
//! point whose `*_to_prev` feature(s) exceed the threshold(s). O(n).
//!
//! Segment ids are unique across the whole point set and carry no meaning
//! beyond grouping.

use std::ops::Range;

use log::info;
use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, Result};
use crate::features::KinematicFeatures;
use crate::point_set::{FeatureColumns, PointSet};
use crate::{SegmentId, TrackPoint};

/// Default maximum distance between adjacent points (meters).
pub const DEFAULT_MAX_DISTANCE: f64 = 3000.0;
/// Default maximum time between adjacent points (seconds).
pub const DEFAULT_MAX_TIME: f64 = 900.0;
/// Default maximum speed between adjacent points (m/s).
pub const DEFAULT_MAX_SPEED: f64 = 50.0;
/// Default distance threshold of the combined rule (meters).
pub const DEFAULT_COMBINED_MAX_DISTANCE: f64 = 5000.0;

/// Predicate deciding that a point starts a new segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum SplitRule {
    /// `dist_to_prev > max_distance`
    MaxDistance { max_distance: f64 },
    /// `time_to_prev > max_time`
    MaxTime { max_time: f64 },
    /// `speed_to_prev > max_speed`
    MaxSpeed { max_speed: f64 },
    /// All three exceeded at once
    DistanceTimeSpeed {
        max_distance: f64,
        max_time: f64,
        max_speed: f64,
    },
}

impl SplitRule {
    /// Feature columns the rule reads.
    pub fn required_features(&self) -> FeatureColumns {
        match self {
            SplitRule::MaxDistance { .. } => FeatureColumns::DISTANCE,
            SplitRule::MaxTime { .. } => FeatureColumns::TIME,
            SplitRule::MaxSpeed { .. } | SplitRule::DistanceTimeSpeed { .. } => {
                FeatureColumns::ALL
            }
        }
    }

    /// True if a point with these features opens a new segment.
    pub fn triggers(&self, features: &KinematicFeatures) -> bool {
        match *self {
            SplitRule::MaxDistance { max_distance } => exceeds(features.dist_to_prev, max_distance),
            SplitRule::MaxTime { max_time } => exceeds(features.time_to_prev, max_time),
            SplitRule::MaxSpeed { max_speed } => exceeds(features.speed_to_prev, max_speed),
            SplitRule::DistanceTimeSpeed {
                max_distance,
                max_time,
                max_speed,
            } => {
                exceeds(features.dist_to_prev, max_distance)
                    && exceeds(features.time_to_prev, max_time)
                    && exceeds(features.speed_to_prev, max_speed)
            }
        }
    }

    fn validate(&self) -> Result<()> {
        match *self {
            SplitRule::MaxDistance { max_distance } => {
                ensure_non_negative("max_distance", max_distance)
            }
            SplitRule::MaxTime { max_time } => ensure_non_negative("max_time", max_time),
            SplitRule::MaxSpeed { max_speed } => ensure_non_negative("max_speed", max_speed),
            SplitRule::DistanceTimeSpeed {
                max_distance,
                max_time,
                max_speed,
            } => {
                ensure_non_negative("max_distance", max_distance)?;
                ensure_non_negative("max_time", max_time)?;
                ensure_non_negative("max_speed", max_speed)
            }
        }
    }
}

/// Null or NaN never exceeds a threshold.
#[inline]
fn exceeds(value: Option<f64>, threshold: f64) -> bool {
    value.is_some_and(|v| v > threshold)
}

/// Configuration for segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationConfig {
    pub rule: SplitRule,
    /// Name of the resulting segment column
    pub label: String,
}

impl SegmentationConfig {
    /// Split where `dist_to_prev > max_distance`; label `tid_dist`.
    pub fn by_max_distance(max_distance: f64) -> Self {
        Self {
            rule: SplitRule::MaxDistance { max_distance },
            label: "tid_dist".to_string(),
        }
    }

    /// Split where `time_to_prev > max_time`; label `tid_time`.
    pub fn by_max_time(max_time: f64) -> Self {
        Self {
            rule: SplitRule::MaxTime { max_time },
            label: "tid_time".to_string(),
        }
    }

    /// Split where `speed_to_prev > max_speed`; label `tid_speed`.
    pub fn by_max_speed(max_speed: f64) -> Self {
        Self {
            rule: SplitRule::MaxSpeed { max_speed },
            label: "tid_speed".to_string(),
        }
    }

    /// Split where distance, time and speed all exceed; label `tid_part`.
    pub fn by_distance_time_speed(max_distance: f64, max_time: f64, max_speed: f64) -> Self {
        Self {
            rule: SplitRule::DistanceTimeSpeed {
                max_distance,
                max_time,
                max_speed,
            },
            label: "tid_part".to_string(),
        }
    }

    /// Rename the segment column.
    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        self.rule.validate()
    }
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self::by_distance_time_speed(
            DEFAULT_COMBINED_MAX_DISTANCE,
            DEFAULT_MAX_TIME,
            DEFAULT_MAX_SPEED,
        )
    }
}

/// Outcome of a segmentation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationSummary {
    pub label: String,
    pub entities: usize,
    pub segments: usize,
    /// Segments opened by a discontinuity rather than an entity start
    pub splits: usize,
}

/// Assign a segment id to every point.
///
/// Requires the feature columns the rule reads; returns
/// [`crate::TrajectoryError::MissingPrerequisite`] without touching the set
/// otherwise. Existing segment ids are replaced.
///
/// # Example
/// ```
/// use track_kinematics::{
///     compute_kinematic_features, segment_trajectories, PointSet, SegmentationConfig, TrackPoint,
/// };
///
/// let mut set = PointSet::new(vec![
///     TrackPoint::new("a", 0.0, 0.0, 0),
///     TrackPoint::new("a", 0.0, 0.0, 60_000),
///     TrackPoint::new("a", 0.0, 0.0, 3_600_000), // an hour-long gap
/// ]);
/// compute_kinematic_features(&mut set);
/// let summary = segment_trajectories(&mut set, &SegmentationConfig::by_max_time(900.0)).unwrap();
///
/// assert_eq!(summary.segments, 2);
/// let ids: Vec<_> = set.points().iter().map(|p| p.segment_id.unwrap()).collect();
/// assert_eq!(ids, vec![0, 0, 1]);
/// ```
pub fn segment_trajectories(
    points: &mut PointSet,
    config: &SegmentationConfig,
) -> Result<SegmentationSummary> {
    config.validate()?;
    points.require_features(config.rule.required_features(), "segmentation")?;

    let mut next_id: SegmentId = 0;
    let mut splits = 0;
    for group in points.group_slices_mut() {
        let mut current = next_id;
        for (i, point) in group.iter_mut().enumerate() {
            let opens = i == 0 || config.rule.triggers(&point.features);
            if opens {
                if i > 0 {
                    splits += 1;
                }
                current = next_id;
                next_id += 1;
            }
            point.segment_id = Some(current);
        }
    }

    points.mark_segmented(&config.label);

    let summary = SegmentationSummary {
        label: config.label.clone(),
        entities: points.entity_count(),
        segments: next_id as usize,
        splits,
    };
    info!(
        "Segmented {} entities into {} segments ({} discontinuities) as '{}'",
        summary.entities, summary.segments, summary.splits, summary.label
    );
    Ok(summary)
}

/// Row ranges of consecutive points sharing a segment id within one entity.
pub(crate) fn segment_runs(group: &[TrackPoint]) -> Vec<Range<usize>> {
    let mut runs: Vec<Range<usize>> = Vec::new();
    for (i, point) in group.iter().enumerate() {
        match runs.last_mut() {
            Some(run) if group[run.start].segment_id == point.segment_id => run.end = i + 1,
            _ => runs.push(i..i + 1),
        }
    }
    runs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::compute_kinematic_features;
    use crate::TrajectoryError;

    fn featured(points: Vec<TrackPoint>) -> PointSet {
        let mut set = PointSet::new(points);
        compute_kinematic_features(&mut set);
        set
    }

    fn ids(set: &PointSet) -> Vec<SegmentId> {
        set.points().iter().map(|p| p.segment_id.unwrap()).collect()
    }

    #[test]
    fn test_split_by_distance() {
        // ~111m legs with one ~11km jump
        let mut set = featured(vec![
            TrackPoint::new("a", 0.0, 0.0, 0),
            TrackPoint::new("a", 0.0, 0.001, 1_000),
            TrackPoint::new("a", 0.0, 0.101, 2_000),
            TrackPoint::new("a", 0.0, 0.102, 3_000),
        ]);
        let config = SegmentationConfig::by_max_distance(500.0);
        let summary = segment_trajectories(&mut set, &config).unwrap();
        assert_eq!(ids(&set), vec![0, 0, 1, 1]);
        assert_eq!(summary.splits, 1);
        assert_eq!(set.segment_label(), Some("tid_dist"));
    }

    #[test]
    fn test_monotonic_and_strict_only_on_trigger() {
        let mut set = featured(vec![
            TrackPoint::new("a", 0.0, 0.0, 0),
            TrackPoint::new("a", 0.0, 0.0, 1_000_000),
            TrackPoint::new("a", 0.0, 0.0, 1_001_000),
            TrackPoint::new("a", 0.0, 0.0, 3_000_000),
            TrackPoint::new("b", 1.0, 1.0, 0),
            TrackPoint::new("b", 1.0, 1.0, 1_000),
        ]);
        let config = SegmentationConfig::by_max_time(900.0);
        segment_trajectories(&mut set, &config).unwrap();

        for group in set.groups() {
            let rows = set.group_points(group);
            for w in rows.windows(2) {
                let (a, b) = (w[0].segment_id.unwrap(), w[1].segment_id.unwrap());
                assert!(b >= a);
                assert_eq!(b > a, config.rule.triggers(&w[1].features));
            }
        }
        assert_eq!(ids(&set), vec![0, 1, 1, 2, 3, 3]);
    }

    #[test]
    fn test_combined_rule_is_conjunction() {
        let rule = SplitRule::DistanceTimeSpeed {
            max_distance: 100.0,
            max_time: 10.0,
            max_speed: 5.0,
        };
        let mut f = KinematicFeatures {
            dist_to_prev: Some(1000.0),
            time_to_prev: Some(100.0),
            speed_to_prev: Some(10.0),
            ..Default::default()
        };
        assert!(rule.triggers(&f));
        f.speed_to_prev = Some(5.0);
        assert!(!rule.triggers(&f));
        f.speed_to_prev = None;
        assert!(!rule.triggers(&f));
    }

    #[test]
    fn test_infinite_speed_triggers() {
        let rule = SplitRule::MaxSpeed { max_speed: 50.0 };
        let f = KinematicFeatures {
            speed_to_prev: Some(f64::INFINITY),
            ..Default::default()
        };
        assert!(rule.triggers(&f));
    }

    #[test]
    fn test_single_point_is_singleton_segment() {
        let mut set = featured(vec![TrackPoint::new("solo", 0.0, 0.0, 0)]);
        let summary = segment_trajectories(&mut set, &SegmentationConfig::default()).unwrap();
        assert_eq!(summary.segments, 1);
        assert_eq!(ids(&set), vec![0]);
    }

    #[test]
    fn test_missing_features() {
        let mut set = PointSet::new(vec![TrackPoint::new("a", 0.0, 0.0, 0)]);
        let result = segment_trajectories(&mut set, &SegmentationConfig::by_max_distance(10.0));
        assert!(matches!(result, Err(TrajectoryError::MissingPrerequisite { .. })));
        assert!(set.points()[0].segment_id.is_none());
    }

    #[test]
    fn test_invalid_threshold() {
        let mut set = featured(vec![TrackPoint::new("a", 0.0, 0.0, 0)]);
        let result = segment_trajectories(&mut set, &SegmentationConfig::by_max_speed(-1.0));
        assert!(matches!(result, Err(TrajectoryError::InvalidParameter { .. })));
    }

    #[test]
    fn test_custom_label() {
        let mut set = featured(vec![TrackPoint::new("a", 0.0, 0.0, 0)]);
        let config = SegmentationConfig::default().with_label("segment_stop");
        segment_trajectories(&mut set, &config).unwrap();
        assert_eq!(set.segment_label(), Some("segment_stop"));
    }

    #[test]
    fn test_segment_runs() {
        let mut rows = vec![
            TrackPoint::new("a", 0.0, 0.0, 0),
            TrackPoint::new("a", 0.0, 0.0, 1),
            TrackPoint::new("a", 0.0, 0.0, 2),
        ];
        rows[0].segment_id = Some(4);
        rows[1].segment_id = Some(4);
        rows[2].segment_id = Some(5);
        assert_eq!(segment_runs(&rows), vec![0..2, 2..3]);
    }
}
