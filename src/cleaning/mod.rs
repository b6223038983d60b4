//! # Iterative Cleaning
//!
//! Removes noisy or implausible fixes until a trajectory is physically
//! consistent. Every point-level pass runs the same fixed-point loop:
//!
//! 1. Compute kinematic features if they are not current
//! 2. Select the points violating the predicate
//! 3. Stop when nothing is selected
//! 4. Delete the selection (never the last surviving point of an entity)
//! 5. Recompute features, since deletion changes neighbour relations, and repeat
//!
//! Each iteration removes at least one point, so a pass finishes after at
//! most `n` iterations. An iteration that cannot shrink the set ends the
//! loop. Callers can observe progress and cancel between iterations through
//! a [`CleaningObserver`].
//!
//! Deleting rows invalidates segment ids and movement states; they are
//! cleared and must be recomputed. Entity-level filters live in
//! [`trajectories`].

mod predicates;
pub mod trajectories;

use std::ops::ControlFlow;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::features::compute_kinematic_features;
use crate::point_set::{FeatureColumns, PointSet};
use crate::TrackPoint;

pub use predicates::{GpsJump, MaxSpeed, NearbyByDistance, NearbyBySpeed, SpeedDirection};
pub use trajectories::{
    drop_brief_trajectories, drop_short_and_sparse_trajectories, drop_short_trajectories,
    drop_sparse_trajectories, TrajectoryFilterReport,
};

/// A point-level rule selecting fixes to delete.
pub trait ViolationPredicate {
    /// Short name used in logs and reports.
    fn name(&self) -> &'static str;

    /// Feature columns `is_violation` reads.
    fn required_features(&self) -> FeatureColumns {
        FeatureColumns::ALL
    }

    /// Reject invalid thresholds before any point is touched.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    fn is_violation(&self, point: &TrackPoint) -> bool;
}

/// Snapshot passed to a [`CleaningObserver`] after each iteration.
#[derive(Debug, Clone, PartialEq)]
pub struct CleaningProgress {
    pub pass: &'static str,
    /// 1-based iteration that just finished
    pub iteration: usize,
    pub removed_this_iteration: usize,
    pub removed_total: usize,
    pub remaining: usize,
}

/// Hook called between cleaning iterations. Returning
/// `ControlFlow::Break(())` stops the pass with features recomputed.
pub trait CleaningObserver {
    fn on_iteration(&mut self, progress: &CleaningProgress) -> ControlFlow<()>;
}

/// Observer that never interrupts.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CleaningObserver for NoopObserver {
    fn on_iteration(&mut self, _progress: &CleaningProgress) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl<F> CleaningObserver for F
where
    F: FnMut(&CleaningProgress) -> ControlFlow<()>,
{
    fn on_iteration(&mut self, progress: &CleaningProgress) -> ControlFlow<()> {
        self(progress)
    }
}

/// Outcome of a cleaning pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CleaningReport {
    pub pass: String,
    /// Iterations that deleted at least one point
    pub iterations: usize,
    pub removed: usize,
    pub remaining: usize,
    /// True if the observer stopped the pass early
    pub cancelled: bool,
}

/// Flag the points violating `predicate` without deleting anything.
///
/// Requires the predicate's feature columns.
pub fn select_violations<P: ViolationPredicate + ?Sized>(
    points: &PointSet,
    predicate: &P,
) -> Result<Vec<bool>> {
    predicate.validate()?;
    points.require_features(predicate.required_features(), predicate.name())?;
    Ok(points
        .points()
        .iter()
        .map(|p| predicate.is_violation(p))
        .collect())
}

/// Like [`select_violations`], computing kinematic features first when the
/// predicate's columns are missing.
pub fn label_violations<P: ViolationPredicate + ?Sized>(
    points: &mut PointSet,
    predicate: &P,
) -> Result<Vec<bool>> {
    predicate.validate()?;
    if !points.features().contains(predicate.required_features()) {
        compute_kinematic_features(points);
    }
    let flags = select_violations(points, predicate)?;
    debug!(
        "{}: {} of {} points flagged",
        predicate.name(),
        flags.iter().filter(|&&f| f).count(),
        flags.len()
    );
    Ok(flags)
}

/// Delete violating points and recompute until none remain.
///
/// # Example
/// ```
/// use std::ops::ControlFlow;
/// use track_kinematics::{clean_until_converged, CleaningProgress, MaxSpeed, PointSet, TrackPoint};
///
/// let mut set = PointSet::new(vec![
///     TrackPoint::new("a", 0.0, 0.0, 0),
///     TrackPoint::new("a", 0.0, 0.001, 0), // same instant: infinite speed
///     TrackPoint::new("a", 0.0, 0.002, 60_000),
/// ]);
///
/// let mut iterations = 0;
/// let mut observer = |_: &CleaningProgress| {
///     iterations += 1;
///     ControlFlow::Continue(())
/// };
/// let report = clean_until_converged(&mut set, &MaxSpeed::default(), &mut observer).unwrap();
///
/// assert_eq!(report.removed, 1);
/// assert_eq!(set.len(), 2);
/// assert_eq!(iterations, 1);
/// ```
pub fn clean_until_converged<P: ViolationPredicate + ?Sized>(
    points: &mut PointSet,
    predicate: &P,
    observer: &mut dyn CleaningObserver,
) -> Result<CleaningReport> {
    predicate.validate()?;

    let name = predicate.name();
    let mut report = CleaningReport {
        pass: name.to_string(),
        remaining: points.len(),
        ..Default::default()
    };
    if points.is_empty() {
        debug!("{}: nothing to clean", name);
        return Ok(report);
    }

    loop {
        if !points.features().contains(predicate.required_features()) {
            compute_kinematic_features(points);
        }

        let mut selected = select_violations(points, predicate)?;
        let candidates = selected.iter().filter(|&&s| s).count();
        if candidates == 0 {
            break;
        }

        protect_last_survivors(points, &mut selected);
        let keep: Vec<bool> = selected.iter().map(|&s| !s).collect();
        let before = points.len();
        let removed = points.retain_rows(&keep);
        if removed == 0 {
            warn!(
                "{}: {} violations left but no point can be removed",
                name, candidates
            );
            compute_kinematic_features(points);
            break;
        }
        debug_assert!(points.len() < before);
        points.clear_labels();

        report.iterations += 1;
        report.removed += removed;
        report.remaining = points.len();
        debug!(
            "{}: iteration {} removed {} points ({} remaining)",
            name, report.iterations, removed, report.remaining
        );

        let progress = CleaningProgress {
            pass: name,
            iteration: report.iterations,
            removed_this_iteration: removed,
            removed_total: report.removed,
            remaining: report.remaining,
        };
        if observer.on_iteration(&progress).is_break() {
            compute_kinematic_features(points);
            report.cancelled = true;
            info!("{}: cancelled after {} iterations", name, report.iterations);
            break;
        }
    }

    info!(
        "{}: removed {} points in {} iterations ({} remaining)",
        name, report.removed, report.iterations, report.remaining
    );
    Ok(report)
}

/// Unselect the earliest point of any entity whose points are all selected.
fn protect_last_survivors(points: &PointSet, selected: &mut [bool]) {
    for group in points.groups() {
        if selected[group.range.clone()].iter().all(|&s| s) {
            debug!(
                "Keeping last surviving point of entity '{}'",
                group.entity_id
            );
            selected[group.range.start] = false;
        }
    }
}

/// Remove GPS jumps until none remain.
pub fn clean_gps_jumps(points: &mut PointSet, jump: &GpsJump) -> Result<CleaningReport> {
    clean_until_converged(points, jump, &mut NoopObserver)
}

/// Remove fixes within `radius` meters of their predecessor until none remain.
pub fn clean_nearby_points_by_distance(
    points: &mut PointSet,
    nearby: &NearbyByDistance,
) -> Result<CleaningReport> {
    clean_until_converged(points, nearby, &mut NoopObserver)
}

/// Remove fixes reached at or below `speed_radius` until none remain.
pub fn clean_nearby_points_by_speed(
    points: &mut PointSet,
    nearby: &NearbyBySpeed,
) -> Result<CleaningReport> {
    clean_until_converged(points, nearby, &mut NoopObserver)
}

/// Remove fixes faster than `speed_max` until none remain.
pub fn clean_by_max_speed(points: &mut PointSet, max_speed: &MaxSpeed) -> Result<CleaningReport> {
    clean_until_converged(points, max_speed, &mut NoopObserver)
}

/// Drop rows repeating the previous row's position and timestamp within an
/// entity. Returns the number of removed rows.
///
/// Features present before the call are recomputed; labels are cleared when
/// anything is removed.
pub fn clean_consecutive_duplicates(points: &mut PointSet) -> usize {
    let rows = points.points();
    let mut keep = vec![true; rows.len()];
    for group in points.groups() {
        for i in group.range.start + 1..group.range.end {
            let (prev, here) = (&rows[i - 1], &rows[i]);
            if prev.latitude == here.latitude
                && prev.longitude == here.longitude
                && prev.timestamp == here.timestamp
            {
                keep[i] = false;
            }
        }
    }

    let had_features = points.features() != FeatureColumns::NONE;
    let removed = points.retain_rows(&keep);
    if removed > 0 {
        points.clear_labels();
        info!("Removed {} consecutive duplicate points", removed);
    }
    if had_features {
        compute_kinematic_features(points);
    }
    removed
}
