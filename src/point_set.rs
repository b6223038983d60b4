//! Arena holding every point of every trajectory.
//!
//! Rows are kept in a canonical order: entities in order of first appearance,
//! each entity's rows contiguous and ascending by timestamp (ties keep input
//! order). Per-entity work maps over the [`EntityGroup`] slices instead of
//! filtering the whole set once per entity.
//!
//! The set also records which derived columns are currently valid. Deleting
//! rows invalidates every feature column, so a caller can never read a
//! distance or speed computed against a neighbour that no longer exists.

use std::collections::{BTreeMap, HashMap};
use std::ops::Range;

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::error::{Result, TrajectoryError};
use crate::{MovementState, SegmentId, TrackPoint};

/// Which kinematic feature columns are present on a [`PointSet`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureColumns {
    /// `dist_to_prev`, `dist_to_next`, `dist_prev_to_next`
    pub distance: bool,
    /// `time_to_prev`, `time_to_next`
    pub time: bool,
    /// `speed_to_prev`, `speed_to_next`
    pub speed: bool,
}

impl FeatureColumns {
    pub const NONE: Self = Self {
        distance: false,
        time: false,
        speed: false,
    };
    pub const DISTANCE: Self = Self {
        distance: true,
        time: false,
        speed: false,
    };
    pub const TIME: Self = Self {
        distance: false,
        time: true,
        speed: false,
    };
    pub const ALL: Self = Self {
        distance: true,
        time: true,
        speed: true,
    };

    /// True if every column set in `other` is also set here.
    pub fn contains(&self, other: FeatureColumns) -> bool {
        (self.distance || !other.distance)
            && (self.time || !other.time)
            && (self.speed || !other.speed)
    }

    pub fn union(self, other: FeatureColumns) -> Self {
        Self {
            distance: self.distance || other.distance,
            time: self.time || other.time,
            speed: self.speed || other.speed,
        }
    }

    fn describe(&self) -> String {
        let mut names = Vec::new();
        if self.distance {
            names.push("distance");
        }
        if self.time {
            names.push("time");
        }
        if self.speed {
            names.push("speed");
        }
        format!("{} features", names.join("/"))
    }
}

/// Contiguous rows of one entity inside a [`PointSet`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityGroup {
    pub entity_id: String,
    pub range: Range<usize>,
}

impl EntityGroup {
    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

/// Column names used when reading JSON records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnNames {
    pub entity_id: String,
    pub latitude: String,
    pub longitude: String,
    /// Unix epoch milliseconds (integer)
    pub timestamp: String,
}

impl Default for ColumnNames {
    fn default() -> Self {
        Self {
            entity_id: "id".to_string(),
            latitude: "lat".to_string(),
            longitude: "lon".to_string(),
            timestamp: "datetime".to_string(),
        }
    }
}

/// All points of all trajectories, in canonical order.
#[derive(Debug, Clone, Default)]
pub struct PointSet {
    points: Vec<TrackPoint>,
    groups: Vec<EntityGroup>,
    features: FeatureColumns,
    segment_label: Option<String>,
    has_states: bool,
}

impl PointSet {
    /// Build a point set from raw fixes.
    ///
    /// Rows are brought into canonical order; derived columns present on the
    /// input are discarded.
    ///
    /// # Example
    /// ```
    /// use track_kinematics::{PointSet, TrackPoint};
    ///
    /// let set = PointSet::new(vec![
    ///     TrackPoint::new("a", 0.0, 0.0, 2_000),
    ///     TrackPoint::new("b", 1.0, 1.0, 0),
    ///     TrackPoint::new("a", 0.0, 0.1, 1_000),
    /// ]);
    /// assert_eq!(set.entity_count(), 2);
    /// assert_eq!(set.entity("a").unwrap()[0].timestamp, 1_000);
    /// ```
    pub fn new(mut points: Vec<TrackPoint>) -> Self {
        let mut order: HashMap<String, usize> = HashMap::new();
        for point in &points {
            let next = order.len();
            order.entry(point.entity_id.clone()).or_insert(next);
        }

        // Stable: equal timestamps keep their input order
        points.sort_by_cached_key(|p| (order[&p.entity_id], p.timestamp));
        for point in &mut points {
            point.reset_derived();
        }

        let groups = build_groups(&points);
        Self {
            points,
            groups,
            features: FeatureColumns::NONE,
            segment_label: None,
            has_states: false,
        }
    }

    /// Build a point set from parallel columns.
    ///
    /// All four columns must have the same length.
    pub fn from_columns(
        entity_ids: Vec<String>,
        latitudes: Vec<f64>,
        longitudes: Vec<f64>,
        timestamps: Vec<i64>,
    ) -> Result<Self> {
        let expected = entity_ids.len();
        for (what, len) in [
            ("latitude column", latitudes.len()),
            ("longitude column", longitudes.len()),
            ("timestamp column", timestamps.len()),
        ] {
            if len != expected {
                return Err(TrajectoryError::MismatchedLengths {
                    what: what.to_string(),
                    expected,
                    actual: len,
                });
            }
        }

        let points = entity_ids
            .into_iter()
            .zip(latitudes)
            .zip(longitudes)
            .zip(timestamps)
            .map(|(((id, lat), lon), ts)| TrackPoint::new(id, lat, lon, ts))
            .collect();
        Ok(Self::new(points))
    }

    /// Read a JSON array of flat records.
    ///
    /// Every record must carry the four columns named in `columns`. The entity
    /// id may be a string or a number; a `null` coordinate is read as NaN.
    ///
    /// # Example
    /// ```
    /// use track_kinematics::{ColumnNames, PointSet};
    ///
    /// let json = r#"[
    ///     {"id": 1, "lat": -3.79, "lon": -38.52, "datetime": 0},
    ///     {"id": 1, "lat": -3.80, "lon": -38.53, "datetime": 60000}
    /// ]"#;
    /// let set = PointSet::from_json_records(json, &ColumnNames::default()).unwrap();
    /// assert_eq!(set.len(), 2);
    /// assert_eq!(set.points()[0].entity_id, "1");
    /// ```
    pub fn from_json_records(json: &str, columns: &ColumnNames) -> Result<Self> {
        let value: Value = serde_json::from_str(json)?;
        let records = value.as_array().ok_or_else(|| TrajectoryError::InvalidValue {
            column: "<root>".to_string(),
            row: 0,
            message: "expected an array of records".to_string(),
        })?;

        let mut points = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            let entity_id = match field(record, &columns.entity_id, row)? {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    return Err(invalid_value(&columns.entity_id, row, other));
                }
            };
            let latitude = read_coordinate(record, &columns.latitude, row)?;
            let longitude = read_coordinate(record, &columns.longitude, row)?;
            let timestamp_value = field(record, &columns.timestamp, row)?;
            let timestamp = timestamp_value
                .as_i64()
                .ok_or_else(|| invalid_value(&columns.timestamp, row, timestamp_value))?;

            points.push(TrackPoint::new(entity_id, latitude, longitude, timestamp));
        }

        Ok(Self::new(points))
    }

    /// Serialize every row as a flat JSON record.
    ///
    /// Columns: the raw fix, the seven features, the segment column under
    /// its configured label (absent before segmentation), `state`, and
    /// `lat_mean`/`lon_mean` ([`crate::MEAN_SENTINEL`] without a
    /// representative). Missing features are `null`; infinite or NaN
    /// features are written as the strings `"inf"`, `"-inf"` and `"nan"`.
    ///
    /// # Example
    /// ```
    /// use track_kinematics::{compute_kinematic_features, PointSet, TrackPoint};
    ///
    /// let mut set = PointSet::new(vec![
    ///     TrackPoint::new("a", 0.0, 0.0, 0),
    ///     TrackPoint::new("a", 0.0, 0.001, 0),
    /// ]);
    /// compute_kinematic_features(&mut set);
    ///
    /// let json = set.to_json().unwrap();
    /// assert!(json.contains(r#""speed_to_prev":"inf""#));
    /// assert!(json.contains(r#""lat_mean":-1.0"#));
    /// ```
    pub fn to_json(&self) -> Result<String> {
        let label = self.segment_label.as_deref();
        let rows: Vec<ExportRow<'_>> = self
            .points
            .iter()
            .map(|point| ExportRow::new(point, label))
            .collect();
        Ok(serde_json::to_string(&rows)?)
    }

    // ------------------------------------------------------------------------
    // Accessors
    // ------------------------------------------------------------------------

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// All rows in canonical order.
    pub fn points(&self) -> &[TrackPoint] {
        &self.points
    }

    pub fn into_points(self) -> Vec<TrackPoint> {
        self.points
    }

    pub fn groups(&self) -> &[EntityGroup] {
        &self.groups
    }

    pub fn entity_count(&self) -> usize {
        self.groups.len()
    }

    /// Rows of one group.
    pub fn group_points(&self, group: &EntityGroup) -> &[TrackPoint] {
        &self.points[group.range.clone()]
    }

    /// Rows of the entity with the given id.
    pub fn entity(&self, entity_id: &str) -> Option<&[TrackPoint]> {
        self.groups
            .iter()
            .find(|g| g.entity_id == entity_id)
            .map(|g| self.group_points(g))
    }

    /// Feature columns currently valid.
    pub fn features(&self) -> FeatureColumns {
        self.features
    }

    /// Label of the current segment column, if segmentation has run.
    pub fn segment_label(&self) -> Option<&str> {
        self.segment_label.as_deref()
    }

    /// True once a stop detector has labelled every row.
    pub fn has_states(&self) -> bool {
        self.has_states
    }

    // ------------------------------------------------------------------------
    // Prerequisite checks
    // ------------------------------------------------------------------------

    // An empty set trivially satisfies every requirement.
    pub(crate) fn require_features(&self, required: FeatureColumns, operation: &str) -> Result<()> {
        if self.features.contains(required) || self.points.is_empty() {
            return Ok(());
        }
        Err(TrajectoryError::MissingPrerequisite {
            operation: operation.to_string(),
            requirement: required.describe(),
        })
    }

    pub(crate) fn require_segments(&self, operation: &str) -> Result<()> {
        if self.segment_label.is_some() || self.points.is_empty() {
            return Ok(());
        }
        Err(TrajectoryError::MissingPrerequisite {
            operation: operation.to_string(),
            requirement: "segment ids".to_string(),
        })
    }

    pub(crate) fn require_states(&self, operation: &str) -> Result<()> {
        if self.has_states || self.points.is_empty() {
            return Ok(());
        }
        Err(TrajectoryError::MissingPrerequisite {
            operation: operation.to_string(),
            requirement: "move/stop states".to_string(),
        })
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Mutable rows. Entity ids, coordinates and timestamps must not be edited
    /// through this; only derived columns.
    pub(crate) fn points_mut(&mut self) -> &mut [TrackPoint] {
        &mut self.points
    }

    /// One mutable slice per entity, in group order.
    pub(crate) fn group_slices_mut(&mut self) -> Vec<&mut [TrackPoint]> {
        let mut slices = Vec::with_capacity(self.groups.len());
        let mut rest: &mut [TrackPoint] = &mut self.points;
        for group in &self.groups {
            let (head, tail) = std::mem::take(&mut rest).split_at_mut(group.len());
            slices.push(head);
            rest = tail;
        }
        slices
    }

    pub(crate) fn mark_features(&mut self, columns: FeatureColumns) {
        self.features = self.features.union(columns);
    }

    pub(crate) fn mark_segmented(&mut self, label: &str) {
        self.segment_label = Some(label.to_string());
    }

    pub(crate) fn mark_states(&mut self) {
        self.has_states = true;
    }

    /// Keep rows whose flag is true. Every feature column is cleared and
    /// marked absent; segment and state labels are left for the caller.
    ///
    /// Returns the number of removed rows.
    pub(crate) fn retain_rows(&mut self, keep: &[bool]) -> usize {
        debug_assert_eq!(keep.len(), self.points.len());
        let before = self.points.len();

        let mut row = 0;
        self.points.retain(|_| {
            let kept = keep.get(row).copied().unwrap_or(true);
            row += 1;
            kept
        });

        for point in &mut self.points {
            point.features = Default::default();
        }
        self.features = FeatureColumns::NONE;
        self.groups = build_groups(&self.points);

        before - self.points.len()
    }

    /// Clear segment ids, states and representatives.
    pub(crate) fn clear_labels(&mut self) {
        for point in &mut self.points {
            point.segment_id = None;
            point.state = None;
            point.representative = None;
        }
        self.segment_label = None;
        self.has_states = false;
    }
}

/// One exported row.
#[derive(Serialize)]
struct ExportRow<'a> {
    entity_id: &'a str,
    latitude: f64,
    longitude: f64,
    timestamp: i64,
    #[serde(serialize_with = "serialize_feature")]
    dist_to_prev: Option<f64>,
    #[serde(serialize_with = "serialize_feature")]
    dist_to_next: Option<f64>,
    #[serde(serialize_with = "serialize_feature")]
    dist_prev_to_next: Option<f64>,
    #[serde(serialize_with = "serialize_feature")]
    time_to_prev: Option<f64>,
    #[serde(serialize_with = "serialize_feature")]
    time_to_next: Option<f64>,
    #[serde(serialize_with = "serialize_feature")]
    speed_to_prev: Option<f64>,
    #[serde(serialize_with = "serialize_feature")]
    speed_to_next: Option<f64>,
    /// Segment label -> id; empty before segmentation
    #[serde(flatten)]
    segment: BTreeMap<&'a str, Option<SegmentId>>,
    state: Option<MovementState>,
    lat_mean: f64,
    lon_mean: f64,
}

impl<'a> ExportRow<'a> {
    fn new(point: &'a TrackPoint, segment_label: Option<&'a str>) -> Self {
        let f = &point.features;
        Self {
            entity_id: &point.entity_id,
            latitude: point.latitude,
            longitude: point.longitude,
            timestamp: point.timestamp,
            dist_to_prev: f.dist_to_prev,
            dist_to_next: f.dist_to_next,
            dist_prev_to_next: f.dist_prev_to_next,
            time_to_prev: f.time_to_prev,
            time_to_next: f.time_to_next,
            speed_to_prev: f.speed_to_prev,
            speed_to_next: f.speed_to_next,
            segment: segment_label
                .map(|label| (label, point.segment_id))
                .into_iter()
                .collect(),
            state: point.state,
            lat_mean: point.lat_mean(),
            lon_mean: point.lon_mean(),
        }
    }
}

/// JSON has no non-finite numbers; write them as strings instead of `null`.
fn serialize_feature<S: Serializer>(
    value: &Option<f64>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    match *value {
        None => serializer.serialize_none(),
        Some(v) if v.is_finite() => serializer.serialize_f64(v),
        Some(v) if v.is_nan() => serializer.serialize_str("nan"),
        Some(v) if v > 0.0 => serializer.serialize_str("inf"),
        Some(_) => serializer.serialize_str("-inf"),
    }
}

fn build_groups(points: &[TrackPoint]) -> Vec<EntityGroup> {
    let mut groups: Vec<EntityGroup> = Vec::new();
    for (i, point) in points.iter().enumerate() {
        match groups.last_mut() {
            Some(group) if group.entity_id == point.entity_id => group.range.end = i + 1,
            _ => groups.push(EntityGroup {
                entity_id: point.entity_id.clone(),
                range: i..i + 1,
            }),
        }
    }
    groups
}

fn field<'a>(record: &'a Value, column: &str, row: usize) -> Result<&'a Value> {
    record
        .get(column)
        .ok_or_else(|| TrajectoryError::MissingColumn {
            column: column.to_string(),
            row,
        })
}

fn read_coordinate(record: &Value, column: &str, row: usize) -> Result<f64> {
    let value = field(record, column, row)?;
    match value {
        Value::Null => Ok(f64::NAN),
        Value::Number(n) => n.as_f64().ok_or_else(|| invalid_value(column, row, value)),
        other => Err(invalid_value(column, row, other)),
    }
}

fn invalid_value(column: &str, row: usize, value: &Value) -> TrajectoryError {
    TrajectoryError::InvalidValue {
        column: column.to_string(),
        row,
        message: format!("unexpected value {}", value),
    }
}
