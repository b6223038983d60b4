//! # Track Kinematics
//!
//! Kinematic and topological structure for GPS trajectories.
//!
//! This library provides:
//! - Neighbour-relative distance, time and speed for every point
//! - Segmentation of trajectories at movement discontinuities
//! - Stay-point (Move/Stop) classification
//! - Iterative cleaning of jumps, near-duplicates and implausible speeds
//! - Compression of stop segments into representative points
//!
//! ## Features
//!
//! - **`parallel`** - Compute per-entity features on disjoint slices with rayon
//!
//! ## Quick Start
//!
//! ```rust
//! use track_kinematics::{PointSet, TrackPoint, MovementState, StopConfig, PipelineBuilder};
//!
//! // Four fixes, five seconds apart, all within a metre of each other
//! let mut points = PointSet::new(vec![
//!     TrackPoint::new("bus-1", -3.7960, -38.5230, 0),
//!     TrackPoint::new("bus-1", -3.7960, -38.5230, 5_000),
//!     TrackPoint::new("bus-1", -3.79601, -38.5230, 10_000),
//!     TrackPoint::new("bus-1", -3.7960, -38.52301, 15_000),
//! ]);
//!
//! let pipeline = PipelineBuilder::new()
//!     .stops_by_dwell(StopConfig { dist_radius: 30.0, time_radius: 3.0 })
//!     .build()
//!     .unwrap();
//! pipeline.run(&mut points).unwrap();
//!
//! assert!(points.points().iter().all(|p| p.state == Some(MovementState::Stop)));
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

// Unified error handling
pub mod error;
pub use error::{Result, TrajectoryError};

// Great-circle distance primitive
pub mod geo_utils;
pub use geo_utils::{haversine, haversine_arrays};

// Arena holding every point, grouped by entity
pub mod point_set;
pub use point_set::{ColumnNames, EntityGroup, FeatureColumns, PointSet};

// Neighbour-relative distance/time/speed
pub mod features;
pub use features::{
    compute_distance_features, compute_kinematic_features, compute_time_features,
    KinematicFeatures,
};

// Sub-trajectory segmentation
pub mod segmentation;
pub use segmentation::{
    segment_trajectories, SegmentationConfig, SegmentationSummary, SplitRule,
};

// Move/Stop classification
pub mod stops;
pub use stops::{
    dwell_times, label_stops_by_dwell, label_stops_by_radius, DwellAggregate, StopConfig,
};

// Iterative cleaning passes
pub mod cleaning;
pub use cleaning::{
    clean_by_max_speed, clean_consecutive_duplicates, clean_gps_jumps,
    clean_nearby_points_by_distance, clean_nearby_points_by_speed, clean_until_converged,
    drop_brief_trajectories, drop_short_and_sparse_trajectories, drop_short_trajectories,
    drop_sparse_trajectories, label_violations, select_violations, CleaningObserver,
    CleaningProgress, CleaningReport, GpsJump, MaxSpeed, NearbyByDistance, NearbyBySpeed,
    NoopObserver, SpeedDirection, TrajectoryFilterReport, ViolationPredicate,
};

// Stop segment compression
pub mod compression;
pub use compression::{
    compress_stop_segments, CompressionConfig, CompressionSummary, RepresentativePolicy,
};

// Explicit prerequisite resolution
pub mod pipeline;
pub use pipeline::{
    CleaningStage, Pipeline, PipelineBuilder, PipelineReport, PlannedStage, Stage, StageOrigin,
    StageOutcome,
};

// Algorithm toolbox - flat access to every operation
pub mod algorithms;

// ============================================================================
// Core Types
// ============================================================================

/// Value reported by [`TrackPoint::lat_mean`] / [`TrackPoint::lon_mean`] when no
/// representative position has been assigned.
pub const MEAN_SENTINEL: f64 = -1.0;

/// Identifier assigned to a contiguous sub-trajectory by the segmentation engine.
pub type SegmentId = u64;

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use track_kinematics::GpsPoint;
/// let point = GpsPoint::new(51.5074, -0.1278); // London
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Movement regime of a point or segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementState {
    Move,
    Stop,
}

impl fmt::Display for MovementState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MovementState::Move => write!(f, "move"),
            MovementState::Stop => write!(f, "stop"),
        }
    }
}

/// One GPS fix of one moving entity, with the columns derived from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackPoint {
    /// Identifier of the trajectory this fix belongs to
    pub entity_id: String,
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
    /// Unix epoch milliseconds
    pub timestamp: i64,
    /// Neighbour-relative distance/time/speed
    #[serde(flatten)]
    pub features: KinematicFeatures,
    /// Segment assigned by the segmentation engine
    pub segment_id: Option<SegmentId>,
    /// Move/Stop label
    pub state: Option<MovementState>,
    /// Representative position assigned by stop compression
    pub representative: Option<GpsPoint>,
}

impl TrackPoint {
    /// Create a raw point with no derived columns.
    pub fn new(
        entity_id: impl Into<String>,
        latitude: f64,
        longitude: f64,
        timestamp: i64,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            latitude,
            longitude,
            timestamp,
            features: KinematicFeatures::default(),
            segment_id: None,
            state: None,
            representative: None,
        }
    }

    /// Position of this fix.
    #[inline]
    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Representative latitude, or [`MEAN_SENTINEL`] when unset.
    pub fn lat_mean(&self) -> f64 {
        self.representative
            .map(|p| p.latitude)
            .unwrap_or(MEAN_SENTINEL)
    }

    /// Representative longitude, or [`MEAN_SENTINEL`] when unset.
    pub fn lon_mean(&self) -> f64 {
        self.representative
            .map(|p| p.longitude)
            .unwrap_or(MEAN_SENTINEL)
    }

    /// Drop every derived column, keeping the raw fix.
    pub(crate) fn reset_derived(&mut self) {
        self.features = KinematicFeatures::default();
        self.segment_id = None;
        self.state = None;
        self.representative = None;
    }
}
