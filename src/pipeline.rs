//! # Pipeline
//!
//! Ordered processing stages with explicit prerequisite resolution.
//!
//! Stop detection needs segments, segmentation needs features, compression
//! needs segments and states. Rather than computing missing inputs silently
//! inside each operation, [`PipelineBuilder::build`] walks the requested
//! stages and inserts whatever is missing, recording every inserted stage as
//! [`StageOrigin::Resolved`] together with the parameters it will run with.
//! The resulting plan can be inspected before it touches any data.
//!
//! ## Resolution rules
//!
//! | Stage | Needs | Inserted when missing |
//! |-------|-------|-----------------------|
//! | `Segment` | the rule's feature columns | `Features` |
//! | `StopsByDwell` | segments, time features | `Segment(StopConfig::segmentation())`, `Features` |
//! | `StopsByRadius` | distance features | `Features` |
//! | `Compress` | segments, states | `StopsByDwell(StopConfig::default())` |
//!
//! Planning assumes raw input. Point-level cleaning and duplicate removal
//! count as invalidating segments and states; compression with
//! `drop_moves` counts as invalidating features.

use std::fmt;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::cleaning::{
    clean_consecutive_duplicates, clean_until_converged, drop_brief_trajectories,
    drop_short_trajectories, drop_sparse_trajectories, CleaningObserver, CleaningReport, GpsJump,
    MaxSpeed, NearbyByDistance, NearbyBySpeed, NoopObserver, TrajectoryFilterReport,
    ViolationPredicate,
};
use crate::compression::{compress_stop_segments, CompressionConfig, CompressionSummary};
use crate::error::{ensure_non_negative, Result};
use crate::features::compute_kinematic_features;
use crate::point_set::{FeatureColumns, PointSet};
use crate::segmentation::{segment_trajectories, SegmentationConfig, SegmentationSummary};
use crate::stops::{label_stops_by_dwell, label_stops_by_radius, DwellAggregate, StopConfig};

// ============================================================================
// Stages
// ============================================================================

/// A cleaning pass run as a pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CleaningStage {
    Jumps(GpsJump),
    NearbyByDistance(NearbyByDistance),
    NearbyBySpeed(NearbyBySpeed),
    MaxSpeed(MaxSpeed),
    ConsecutiveDuplicates,
    SparseTrajectories { min_points: usize },
    ShortTrajectories { min_length: f64 },
    BriefTrajectories { min_duration: f64 },
}

impl CleaningStage {
    fn validate(&self) -> Result<()> {
        match self {
            CleaningStage::Jumps(p) => p.validate(),
            CleaningStage::NearbyByDistance(p) => p.validate(),
            CleaningStage::NearbyBySpeed(p) => p.validate(),
            CleaningStage::MaxSpeed(p) => p.validate(),
            CleaningStage::ConsecutiveDuplicates | CleaningStage::SparseTrajectories { .. } => {
                Ok(())
            }
            CleaningStage::ShortTrajectories { min_length } => {
                ensure_non_negative("min_length", *min_length)
            }
            CleaningStage::BriefTrajectories { min_duration } => {
                ensure_non_negative("min_duration", *min_duration)
            }
        }
    }

    /// Deletes single points, which invalidates segments and states.
    fn removes_points(&self) -> bool {
        !matches!(
            self,
            CleaningStage::SparseTrajectories { .. }
                | CleaningStage::ShortTrajectories { .. }
                | CleaningStage::BriefTrajectories { .. }
        )
    }

    fn predicate(&self) -> Option<&dyn ViolationPredicate> {
        match self {
            CleaningStage::Jumps(p) => Some(p),
            CleaningStage::NearbyByDistance(p) => Some(p),
            CleaningStage::NearbyBySpeed(p) => Some(p),
            CleaningStage::MaxSpeed(p) => Some(p),
            _ => None,
        }
    }
}

/// One step of a [`Pipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Compute all kinematic features
    Features,
    Segment(SegmentationConfig),
    StopsByDwell(StopConfig),
    StopsByRadius { radius: f64 },
    Compress(CompressionConfig),
    Clean(CleaningStage),
}

impl Stage {
    fn validate(&self) -> Result<()> {
        match self {
            Stage::Features | Stage::Compress(_) => Ok(()),
            Stage::Segment(config) => config.validate(),
            Stage::StopsByDwell(config) => config.validate(),
            Stage::StopsByRadius { radius } => ensure_non_negative("radius", *radius),
            Stage::Clean(stage) => stage.validate(),
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Features => write!(f, "features"),
            Stage::Segment(config) => write!(f, "segment({})", config.label),
            Stage::StopsByDwell(config) => write!(f, "stops by dwell({}s)", config.time_radius),
            Stage::StopsByRadius { radius } => write!(f, "stops by radius({}m)", radius),
            Stage::Compress(config) => write!(f, "compress({:?})", config.policy),
            Stage::Clean(stage) => match stage.predicate() {
                Some(predicate) => write!(f, "clean({})", predicate.name()),
                None => write!(f, "clean({:?})", stage),
            },
        }
    }
}

/// Whether a stage was asked for or inserted to satisfy a prerequisite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StageOrigin {
    Requested,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedStage {
    pub stage: Stage,
    pub origin: StageOrigin,
}

/// What a stage produced.
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    Features,
    Segmented(SegmentationSummary),
    Dwell(DwellAggregate),
    RadiusStops { stops: usize },
    Compressed(CompressionSummary),
    Cleaned(CleaningReport),
    Filtered(TrajectoryFilterReport),
    Deduplicated { removed: usize },
}

/// Outcomes of a pipeline run, one per executed stage.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineReport {
    pub outcomes: Vec<StageOutcome>,
    /// True if a cleaning observer stopped the run; later stages were skipped
    pub cancelled: bool,
}

// ============================================================================
// Builder
// ============================================================================

/// Collects requested stages; [`build`](Self::build) validates them and
/// resolves prerequisites.
#[derive(Debug, Clone, Default)]
pub struct PipelineBuilder {
    requested: Vec<Stage>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(mut self, stage: Stage) -> Self {
        self.requested.push(stage);
        self
    }

    pub fn features(self) -> Self {
        self.stage(Stage::Features)
    }

    pub fn segment(self, config: SegmentationConfig) -> Self {
        self.stage(Stage::Segment(config))
    }

    pub fn stops_by_dwell(self, config: StopConfig) -> Self {
        self.stage(Stage::StopsByDwell(config))
    }

    pub fn stops_by_radius(self, radius: f64) -> Self {
        self.stage(Stage::StopsByRadius { radius })
    }

    pub fn compress(self, config: CompressionConfig) -> Self {
        self.stage(Stage::Compress(config))
    }

    pub fn clean(self, stage: CleaningStage) -> Self {
        self.stage(Stage::Clean(stage))
    }

    /// Validate every requested stage and produce the resolved plan.
    ///
    /// Fails on the first invalid threshold; nothing is planned in that case.
    ///
    /// # Example
    /// ```
    /// use track_kinematics::{PipelineBuilder, Stage, StageOrigin, StopConfig};
    ///
    /// let pipeline = PipelineBuilder::new()
    ///     .stops_by_dwell(StopConfig::default())
    ///     .build()
    ///     .unwrap();
    ///
    /// let plan: Vec<_> = pipeline.stages().iter().map(|s| s.origin).collect();
    /// assert_eq!(
    ///     plan,
    ///     vec![StageOrigin::Resolved, StageOrigin::Resolved, StageOrigin::Requested]
    /// );
    /// assert_eq!(pipeline.stages()[0].stage, Stage::Features);
    /// ```
    pub fn build(self) -> Result<Pipeline> {
        for stage in &self.requested {
            stage.validate()?;
        }

        let mut planner = Planner::default();
        for stage in self.requested {
            planner.resolve_prerequisites(&stage);
            planner.push(stage, StageOrigin::Requested);
        }

        let resolved = planner
            .stages
            .iter()
            .filter(|s| s.origin == StageOrigin::Resolved)
            .count();
        debug!(
            "Planned {} stages ({} resolved): {}",
            planner.stages.len(),
            resolved,
            planner
                .stages
                .iter()
                .map(|s| s.stage.to_string())
                .collect::<Vec<_>>()
                .join(" -> ")
        );
        Ok(Pipeline {
            stages: planner.stages,
        })
    }
}

/// Tracks which derived columns the plan has produced so far.
#[derive(Debug, Default)]
struct Planner {
    stages: Vec<PlannedStage>,
    features: FeatureColumns,
    segmented: bool,
    states: bool,
}

impl Planner {
    fn resolve_prerequisites(&mut self, stage: &Stage) {
        match stage {
            Stage::Features | Stage::Clean(_) => {}
            Stage::Segment(config) => self.ensure_features(config.rule.required_features()),
            Stage::StopsByDwell(config) => {
                if !self.segmented {
                    self.resolve(Stage::Segment(config.segmentation()));
                }
                self.ensure_features(FeatureColumns::TIME);
            }
            Stage::StopsByRadius { .. } => self.ensure_features(FeatureColumns::DISTANCE),
            Stage::Compress(_) => {
                if !self.states {
                    self.resolve(Stage::StopsByDwell(StopConfig::default()));
                } else if !self.segmented {
                    self.resolve(Stage::Segment(StopConfig::default().segmentation()));
                }
            }
        }
    }

    fn resolve(&mut self, stage: Stage) {
        self.resolve_prerequisites(&stage);
        self.push(stage, StageOrigin::Resolved);
    }

    fn ensure_features(&mut self, required: FeatureColumns) {
        if !self.features.contains(required) {
            self.push(Stage::Features, StageOrigin::Resolved);
        }
    }

    fn push(&mut self, stage: Stage, origin: StageOrigin) {
        match &stage {
            Stage::Features => self.features = FeatureColumns::ALL,
            Stage::Segment(_) => self.segmented = true,
            Stage::StopsByDwell(_) | Stage::StopsByRadius { .. } => self.states = true,
            Stage::Compress(config) => {
                if config.drop_moves {
                    self.features = FeatureColumns::NONE;
                }
            }
            Stage::Clean(cleaning) => {
                if cleaning.predicate().is_some() {
                    self.features = FeatureColumns::ALL;
                }
                if cleaning.removes_points() {
                    self.segmented = false;
                    self.states = false;
                }
            }
        }
        self.stages.push(PlannedStage { stage, origin });
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// A validated, resolved sequence of stages.
#[derive(Debug, Clone, PartialEq)]
pub struct Pipeline {
    stages: Vec<PlannedStage>,
}

impl Pipeline {
    /// The full plan, resolved stages included.
    pub fn stages(&self) -> &[PlannedStage] {
        &self.stages
    }

    pub fn run(&self, points: &mut PointSet) -> Result<PipelineReport> {
        self.run_with_observer(points, &mut NoopObserver)
    }

    /// Run every stage in order. `observer` sees each cleaning iteration and
    /// may cancel; the remaining stages are then skipped.
    pub fn run_with_observer(
        &self,
        points: &mut PointSet,
        observer: &mut dyn CleaningObserver,
    ) -> Result<PipelineReport> {
        let mut report = PipelineReport::default();

        for (i, planned) in self.stages.iter().enumerate() {
            debug!(
                "Stage {}/{}: {} ({:?})",
                i + 1,
                self.stages.len(),
                planned.stage,
                planned.origin
            );
            let outcome = run_stage(&planned.stage, points, observer)?;
            let cancelled = matches!(&outcome, StageOutcome::Cleaned(r) if r.cancelled);
            report.outcomes.push(outcome);

            if cancelled {
                info!(
                    "Pipeline cancelled during '{}'; skipping {} stages",
                    planned.stage,
                    self.stages.len() - i - 1
                );
                report.cancelled = true;
                break;
            }
        }

        Ok(report)
    }
}

fn run_stage(
    stage: &Stage,
    points: &mut PointSet,
    observer: &mut dyn CleaningObserver,
) -> Result<StageOutcome> {
    let outcome = match stage {
        Stage::Features => {
            compute_kinematic_features(points);
            StageOutcome::Features
        }
        Stage::Segment(config) => StageOutcome::Segmented(segment_trajectories(points, config)?),
        Stage::StopsByDwell(config) => {
            StageOutcome::Dwell(label_stops_by_dwell(points, config.time_radius)?)
        }
        Stage::StopsByRadius { radius } => StageOutcome::RadiusStops {
            stops: label_stops_by_radius(points, *radius)?,
        },
        Stage::Compress(config) => {
            StageOutcome::Compressed(compress_stop_segments(points, config)?)
        }
        Stage::Clean(cleaning) => match cleaning {
            CleaningStage::ConsecutiveDuplicates => StageOutcome::Deduplicated {
                removed: clean_consecutive_duplicates(points),
            },
            CleaningStage::SparseTrajectories { min_points } => {
                StageOutcome::Filtered(drop_sparse_trajectories(points, *min_points)?)
            }
            CleaningStage::ShortTrajectories { min_length } => {
                StageOutcome::Filtered(drop_short_trajectories(points, *min_length)?)
            }
            CleaningStage::BriefTrajectories { min_duration } => {
                StageOutcome::Filtered(drop_brief_trajectories(points, *min_duration)?)
            }
            CleaningStage::Jumps(p) => {
                StageOutcome::Cleaned(clean_until_converged(points, p, observer)?)
            }
            CleaningStage::NearbyByDistance(p) => {
                StageOutcome::Cleaned(clean_until_converged(points, p, observer)?)
            }
            CleaningStage::NearbyBySpeed(p) => {
                StageOutcome::Cleaned(clean_until_converged(points, p, observer)?)
            }
            CleaningStage::MaxSpeed(p) => {
                StageOutcome::Cleaned(clean_until_converged(points, p, observer)?)
            }
        },
    };
    Ok(outcome)
}
