//! Point-level violation predicates.
//!
//! Each predicate is also the configuration of its cleaning pass: the fields
//! are the thresholds, `Default` gives the library defaults.

use serde::{Deserialize, Serialize};

use crate::error::{ensure_non_negative, ensure_positive, Result};
use crate::point_set::FeatureColumns;
use crate::TrackPoint;

use super::ViolationPredicate;

/// A spurious fix whose distance to both neighbours is disproportionate to the
/// distance between those neighbours.
///
/// A point is a jump when `dist_to_prev`, `dist_to_next` and
/// `dist_prev_to_next` all exceed `min_distance`, and both legs exceed
/// `jump_coefficient * dist_prev_to_next`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsJump {
    pub jump_coefficient: f64,
    /// Floor below which distances are treated as GPS jitter (meters)
    pub min_distance: f64,
}

impl Default for GpsJump {
    fn default() -> Self {
        Self {
            jump_coefficient: 3.0,
            min_distance: 1.0,
        }
    }
}

impl ViolationPredicate for GpsJump {
    fn name(&self) -> &'static str {
        "gps jumps"
    }

    fn required_features(&self) -> FeatureColumns {
        FeatureColumns::DISTANCE
    }

    fn validate(&self) -> Result<()> {
        ensure_positive("jump_coefficient", self.jump_coefficient)?;
        ensure_non_negative("min_distance", self.min_distance)
    }

    fn is_violation(&self, point: &TrackPoint) -> bool {
        let f = &point.features;
        let (Some(to_prev), Some(to_next), Some(direct)) =
            (f.dist_to_prev, f.dist_to_next, f.dist_prev_to_next)
        else {
            return false;
        };
        let limit = self.jump_coefficient * direct;
        to_prev > self.min_distance
            && to_next > self.min_distance
            && direct > self.min_distance
            && to_prev > limit
            && to_next > limit
    }
}

/// Near-duplicate fix: within `radius` meters of its predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NearbyByDistance {
    pub radius: f64,
}

impl Default for NearbyByDistance {
    fn default() -> Self {
        Self { radius: 10.0 }
    }
}

impl ViolationPredicate for NearbyByDistance {
    fn name(&self) -> &'static str {
        "nearby points by distance"
    }

    fn required_features(&self) -> FeatureColumns {
        FeatureColumns::DISTANCE
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative("radius", self.radius)
    }

    fn is_violation(&self, point: &TrackPoint) -> bool {
        point.features.dist_to_prev.is_some_and(|d| d <= self.radius)
    }
}

/// Near-duplicate fix: reached from its predecessor at no more than
/// `speed_radius` m/s.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct NearbyBySpeed {
    pub speed_radius: f64,
}

impl ViolationPredicate for NearbyBySpeed {
    fn name(&self) -> &'static str {
        "nearby points by speed"
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative("speed_radius", self.speed_radius)
    }

    fn is_violation(&self, point: &TrackPoint) -> bool {
        point
            .features
            .speed_to_prev
            .is_some_and(|s| s <= self.speed_radius)
    }
}

/// Which neighbour speed a [`MaxSpeed`] pass checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpeedDirection {
    /// `speed_to_prev` only
    #[default]
    ToPrev,
    /// `speed_to_next` only
    ToNext,
    /// Either `speed_to_prev` or `speed_to_next`
    Both,
}

/// Physically implausible fix: reached faster than `speed_max` m/s.
///
/// Duplicate timestamps give an infinite speed and are removed too.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MaxSpeed {
    pub speed_max: f64,
    pub direction: SpeedDirection,
}

impl Default for MaxSpeed {
    fn default() -> Self {
        Self {
            speed_max: 50.0,
            direction: SpeedDirection::ToPrev,
        }
    }
}

impl ViolationPredicate for MaxSpeed {
    fn name(&self) -> &'static str {
        "max speed"
    }

    fn validate(&self) -> Result<()> {
        ensure_non_negative("speed_max", self.speed_max)
    }

    fn is_violation(&self, point: &TrackPoint) -> bool {
        let too_fast = |speed: Option<f64>| speed.is_some_and(|s| s > self.speed_max);
        let f = &point.features;
        match self.direction {
            SpeedDirection::ToPrev => too_fast(f.speed_to_prev),
            SpeedDirection::ToNext => too_fast(f.speed_to_next),
            SpeedDirection::Both => too_fast(f.speed_to_prev) || too_fast(f.speed_to_next),
        }
    }
}
