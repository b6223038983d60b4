//! # Algorithm Toolbox
//!
//! Direct access to every trajectory operation. Use these to run a single
//! step on your own terms instead of building a [`crate::Pipeline`].
//!
//! ## Core Algorithms
//!
//! - **Kinematic Features**: neighbour-relative distance, time and speed
//! - **Segmentation**: split trajectories at distance/time/speed discontinuities
//! - **Stay Points**: dwell-based or radius-based Move/Stop labels
//! - **Iterative Cleaning**: delete violations until none remain
//! - **Stop Compression**: collapse stop segments to a representative
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: great-circle distance, scalar or element-wise
//! - **Polyline Length**: total distance along a path
//! - **Center**: mean position of a set of points
//!
//! # Example
//!
//! ```rust
//! use track_kinematics::algorithms::{haversine_distance, GpsPoint};
//!
//! let london = GpsPoint::new(51.5074, -0.1278);
//! let paris = GpsPoint::new(48.8566, 2.3522);
//! let distance = haversine_distance(&london, &paris);
//! assert!((distance / 1000.0 - 343.5).abs() < 1.0);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{
    GpsPoint,
    MovementState,
    PointSet,
    SegmentId,
    TrackPoint,
    MEAN_SENTINEL,
};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    compute_center,
    haversine,
    haversine_arrays,
    haversine_distance,
    polyline_length,
};

// =============================================================================
// Kinematic Features
// =============================================================================

/// Compute all seven feature columns for every entity.
///
/// Boundary points get nulls where a neighbour is missing; a zero time
/// delta yields an infinite speed.
pub use crate::features::compute_kinematic_features;

/// Distance columns only.
pub use crate::features::compute_distance_features;

/// Time columns only.
pub use crate::features::compute_time_features;

// =============================================================================
// Segmentation
// =============================================================================

/// Assign segment ids using a [`SplitRule`].
pub use crate::segmentation::segment_trajectories;

pub use crate::segmentation::{SegmentationConfig, SegmentationSummary, SplitRule};

// =============================================================================
// Stay Points
// =============================================================================

pub use crate::stops::{
    dwell_times,
    label_stops_by_dwell,
    label_stops_by_radius,
    DwellAggregate,
    StopConfig,
};

// =============================================================================
// Cleaning
// =============================================================================

/// Generic fixed-point cleaner over any [`ViolationPredicate`].
pub use crate::cleaning::clean_until_converged;

pub use crate::cleaning::{
    clean_by_max_speed,
    clean_consecutive_duplicates,
    clean_gps_jumps,
    clean_nearby_points_by_distance,
    clean_nearby_points_by_speed,
    label_violations,
    select_violations,
    GpsJump,
    MaxSpeed,
    NearbyByDistance,
    NearbyBySpeed,
    SpeedDirection,
    ViolationPredicate,
};

/// Entity-level filters.
pub use crate::cleaning::trajectories::{
    drop_brief_trajectories,
    drop_short_and_sparse_trajectories,
    drop_short_trajectories,
    drop_sparse_trajectories,
};

// =============================================================================
// Compression
// =============================================================================

pub use crate::compression::{compress_stop_segments, CompressionConfig, RepresentativePolicy};
