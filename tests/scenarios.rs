//! End-to-end trajectory scenarios.
//!
//! Exercises the public API the way a caller would: build a point set, run
//! features, segmentation, stop detection, cleaning and compression, then
//! check the structural properties that must hold across all of them.
//!
//! Run with: `cargo test --test scenarios`

use track_kinematics::{
    clean_by_max_speed, clean_gps_jumps, clean_nearby_points_by_distance,
    clean_nearby_points_by_speed, compress_stop_segments, compute_kinematic_features,
    dwell_times, select_violations, CleaningStage, ColumnNames, CompressionConfig, GpsJump,
    GpsPoint, MaxSpeed, MovementState, NearbyByDistance, NearbyBySpeed, PipelineBuilder,
    PointSet, RepresentativePolicy, SegmentationConfig, SpeedDirection, StopConfig, TrackPoint,
    MEAN_SENTINEL,
};

/// Three vehicles alternating between dwelling and driving.
///
/// Each vehicle dwells four times (8 fixes two minutes apart, jittering by a
/// metre or so) and drives in between (6 fixes a minute apart, ~500m each).
/// With `noisy`, every vehicle also gets a 2km spike and a duplicate-timestamp
/// fix during its second dwell.
fn synthetic_fleet(noisy: bool) -> PointSet {
    let mut points = Vec::new();
    for vehicle in 0..3 {
        let id = format!("vehicle-{}", vehicle);
        let lat = -3.79 + vehicle as f64 * 0.05;
        let mut lon = -38.52;
        let mut t: i64 = 0;

        for leg in 0..4 {
            for i in 0..8 {
                let jitter = ((leg * 8 + i) as f64).sin() * 0.00001;
                points.push(TrackPoint::new(id.clone(), lat + jitter, lon - jitter, t));
                if noisy && leg == 1 && i == 4 {
                    points.push(TrackPoint::new(id.clone(), lat + 0.02, lon, t + 60_000));
                    points.push(TrackPoint::new(id.clone(), lat, lon + 0.0001, t));
                }
                t += 120_000;
            }
            for _ in 0..6 {
                lon += 0.0045;
                points.push(TrackPoint::new(id.clone(), lat, lon, t));
                t += 60_000;
            }
        }
    }
    PointSet::new(points)
}

/// Lengths of the maximal runs of Stop points sharing a segment id.
fn stop_run_lengths(set: &PointSet) -> Vec<usize> {
    let mut lengths = Vec::new();
    for group in set.groups() {
        let rows = set.group_points(group);
        let mut i = 0;
        while i < rows.len() {
            if rows[i].state != Some(MovementState::Stop) {
                i += 1;
                continue;
            }
            let start = i;
            while i < rows.len()
                && rows[i].state == Some(MovementState::Stop)
                && rows[i].segment_id == rows[start].segment_id
            {
                i += 1;
            }
            lengths.push(i - start);
        }
    }
    lengths
}

// ============================================================================
// Scenarios
// ============================================================================

#[test]
fn test_close_fixes_form_one_stop() {
    let mut set = PointSet::new(vec![
        TrackPoint::new("a", 0.0, 0.0, 0),
        TrackPoint::new("a", 0.0, 0.000005, 5_000),
        TrackPoint::new("a", 0.000005, 0.0, 10_000),
        TrackPoint::new("a", 0.0, 0.0, 15_000),
    ]);
    let pipeline = PipelineBuilder::new()
        .stops_by_dwell(StopConfig {
            dist_radius: 30.0,
            time_radius: 3.0,
        })
        .build()
        .unwrap();
    pipeline.run(&mut set).unwrap();

    let dwell = dwell_times(&set).unwrap();
    assert_eq!(dwell.len(), 1, "Expected a single segment");
    assert_eq!(dwell.get(0), Some(15.0));
    assert!(set
        .points()
        .iter()
        .all(|p| p.state == Some(MovementState::Stop)));
}

#[test]
fn test_duplicate_timestamp_is_infinite_speed() {
    let mut set = PointSet::new(vec![
        TrackPoint::new("a", 0.0, 0.0, 1_000),
        TrackPoint::new("a", 0.0, 0.0001, 1_000),
    ]);
    compute_kinematic_features(&mut set);
    assert_eq!(set.points()[1].features.speed_to_prev, Some(f64::INFINITY));

    let report = clean_by_max_speed(
        &mut set,
        &MaxSpeed {
            speed_max: 50.0,
            direction: SpeedDirection::ToPrev,
        },
    )
    .unwrap();
    assert_eq!(report.removed, 1);
    assert_eq!(set.len(), 1);
    assert_eq!(set.points()[0].longitude, 0.0);
}

#[test]
fn test_jump_removed_leaves_null_cross_features() {
    let mut set = PointSet::new(vec![
        TrackPoint::new("a", 0.0, 0.0, 0),
        TrackPoint::new("a", 0.05, 0.0, 10_000),
        TrackPoint::new("a", 0.0, 0.0002, 20_000),
    ]);
    let report = clean_gps_jumps(&mut set, &GpsJump::default()).unwrap();

    assert_eq!(report.removed, 1);
    assert!(!report.cancelled);
    assert_eq!(set.len(), 2);
    assert!(set
        .points()
        .iter()
        .all(|p| p.features.dist_prev_to_next.is_none()));
}

#[test]
fn test_centroid_of_stop_segment() {
    let mut set = PointSet::new(vec![
        TrackPoint::new("a", 0.0, 0.0, 0),
        TrackPoint::new("a", 0.0, 2.0, 1_000_000),
        TrackPoint::new("a", 0.0, 4.0, 2_000_000),
    ]);
    // One segment regardless of distance, dwelling for 2000s
    PipelineBuilder::new()
        .stops_by_dwell(StopConfig {
            dist_radius: 1_000_000.0,
            time_radius: 0.0,
        })
        .compress(CompressionConfig {
            policy: RepresentativePolicy::Centroid,
            drop_moves: false,
        })
        .build()
        .unwrap()
        .run(&mut set)
        .unwrap();

    let rows = set.points();
    assert_eq!((rows[0].lat_mean(), rows[0].lon_mean()), (0.0, 2.0));
    assert_eq!((rows[2].lat_mean(), rows[2].lon_mean()), (0.0, 2.0));
    assert_eq!(rows[1].lat_mean(), MEAN_SENTINEL);
}

// ============================================================================
// Properties
// ============================================================================

#[test]
fn test_feature_recomputation_is_idempotent() {
    let mut set = synthetic_fleet(true);
    compute_kinematic_features(&mut set);
    let first = set.points().to_vec();
    compute_kinematic_features(&mut set);
    assert_eq!(set.points(), first.as_slice());
}

#[test]
fn test_boundary_nullity() {
    let mut set = synthetic_fleet(true);
    compute_kinematic_features(&mut set);

    for group in set.groups() {
        let rows = set.group_points(group);
        let first = &rows[0].features;
        let last = &rows[rows.len() - 1].features;
        assert!(first.dist_to_prev.is_none() && first.time_to_prev.is_none());
        assert!(first.speed_to_prev.is_none() && first.dist_prev_to_next.is_none());
        assert!(last.dist_to_next.is_none() && last.time_to_next.is_none());
        assert!(last.speed_to_next.is_none() && last.dist_prev_to_next.is_none());
    }
}

#[test]
fn test_segmentation_monotonicity() {
    for config in [
        SegmentationConfig::by_max_distance(30.0),
        SegmentationConfig::by_max_time(100.0),
        SegmentationConfig::by_max_speed(5.0),
        SegmentationConfig::default(),
    ] {
        let mut set = synthetic_fleet(true);
        PipelineBuilder::new()
            .segment(config.clone())
            .build()
            .unwrap()
            .run(&mut set)
            .unwrap();

        for group in set.groups() {
            for w in set.group_points(group).windows(2) {
                let (a, b) = (w[0].segment_id.unwrap(), w[1].segment_id.unwrap());
                assert!(b >= a, "{}: ids decreased", config.label);
                assert_eq!(
                    b > a,
                    config.rule.triggers(&w[1].features),
                    "{}: split without trigger",
                    config.label
                );
            }
        }
    }
}

#[test]
fn test_dwell_matches_stop_labels() {
    let mut set = synthetic_fleet(false);
    let time_radius = 600.0;
    PipelineBuilder::new()
        .stops_by_dwell(StopConfig {
            dist_radius: 30.0,
            time_radius,
        })
        .build()
        .unwrap()
        .run(&mut set)
        .unwrap();

    let dwell = dwell_times(&set).unwrap();
    let mut stops = 0;
    for point in set.points() {
        let total = dwell.get(point.segment_id.unwrap()).unwrap();
        let is_stop = point.state == Some(MovementState::Stop);
        assert_eq!(is_stop, total > time_radius);
        stops += usize::from(is_stop);
    }
    assert!(stops > 0, "Expected the dwells to be detected");
}

#[test]
fn test_cleaners_converge() {
    let gps_jump = GpsJump::default();
    let mut set = synthetic_fleet(true);
    clean_gps_jumps(&mut set, &gps_jump).unwrap();
    assert!(select_violations(&set, &gps_jump).unwrap().iter().all(|&f| !f));

    let nearby = NearbyByDistance { radius: 5.0 };
    let mut set = synthetic_fleet(true);
    clean_nearby_points_by_distance(&mut set, &nearby).unwrap();
    assert!(select_violations(&set, &nearby).unwrap().iter().all(|&f| !f));

    let slow = NearbyBySpeed { speed_radius: 0.1 };
    let mut set = synthetic_fleet(true);
    clean_nearby_points_by_speed(&mut set, &slow).unwrap();
    assert!(select_violations(&set, &slow).unwrap().iter().all(|&f| !f));

    let fast = MaxSpeed {
        speed_max: 20.0,
        direction: SpeedDirection::Both,
    };
    let mut set = synthetic_fleet(true);
    let report = clean_by_max_speed(&mut set, &fast).unwrap();
    assert!(report.removed >= 3, "Expected spikes and duplicates removed");
    assert!(select_violations(&set, &fast).unwrap().iter().all(|&f| !f));
    assert_eq!(set.entity_count(), 3);
}

#[test]
fn test_compression_keeps_two_rows_per_dwell_stop() {
    let mut set = synthetic_fleet(true);
    PipelineBuilder::new()
        .clean(CleaningStage::Jumps(GpsJump::default()))
        .clean(CleaningStage::MaxSpeed(MaxSpeed::default()))
        .stops_by_dwell(StopConfig {
            dist_radius: 30.0,
            time_radius: 600.0,
        })
        .build()
        .unwrap()
        .run(&mut set)
        .unwrap();

    let runs = stop_run_lengths(&set);
    assert!(!runs.is_empty());
    let expected: usize = runs.iter().map(|&len| len.min(2)).sum();

    let summary = compress_stop_segments(
        &mut set,
        &CompressionConfig {
            policy: RepresentativePolicy::Mode,
            drop_moves: true,
        },
    )
    .unwrap();

    assert_eq!(summary.stop_segments, runs.len());
    assert_eq!(set.len(), expected);
    for point in set.points() {
        assert_ne!(point.lat_mean(), MEAN_SENTINEL);
        assert_ne!(point.lon_mean(), MEAN_SENTINEL);
        assert_eq!(point.state, Some(MovementState::Stop));
    }
}

#[test]
fn test_compression_counts_singletons_once() {
    let mut set = synthetic_fleet(false);
    PipelineBuilder::new()
        .segment(SegmentationConfig::by_max_time(100.0))
        .stops_by_radius(5.0)
        .build()
        .unwrap()
        .run(&mut set)
        .unwrap();

    let runs = stop_run_lengths(&set);
    let singletons = runs.iter().filter(|&&len| len == 1).count();
    let expected: usize = runs.iter().map(|&len| len.min(2)).sum();

    let summary = compress_stop_segments(
        &mut set,
        &CompressionConfig {
            policy: RepresentativePolicy::Centroid,
            drop_moves: true,
        },
    )
    .unwrap();

    assert_eq!(summary.singleton_segments, singletons);
    assert_eq!(set.len(), expected);
    assert!(set.points().iter().all(|p| p.representative.is_some()));
}

// ============================================================================
// Ingestion and export
// ============================================================================

#[test]
fn test_json_records_through_pipeline() {
    let json = r#"[
        {"id": 7, "lat": -3.7960, "lon": -38.5230, "datetime": 0},
        {"id": 7, "lat": -3.7960, "lon": -38.5230, "datetime": 600000},
        {"id": 7, "lat": -3.7960, "lon": -38.5230, "datetime": 1200000},
        {"id": 8, "lat": -3.7000, "lon": -38.5000, "datetime": 0}
    ]"#;
    let mut set = PointSet::from_json_records(json, &ColumnNames::default()).unwrap();
    PipelineBuilder::new()
        .compress(CompressionConfig::default())
        .build()
        .unwrap()
        .run(&mut set)
        .unwrap();

    let vehicle = set.entity("7").unwrap();
    assert_eq!(vehicle[0].representative, Some(GpsPoint::new(-3.7960, -38.5230)));
    assert_eq!(set.entity("8").unwrap()[0].state, Some(MovementState::Move));

    let exported: serde_json::Value = serde_json::from_str(&set.to_json().unwrap()).unwrap();
    let rows = exported.as_array().unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0]["state"], "stop");
    assert_eq!(rows[0]["entity_id"], "7");
    assert_eq!(rows[0]["lat_mean"], -3.7960);
    assert_eq!(rows[1]["lat_mean"], MEAN_SENTINEL, "interior stop rows carry the sentinel");
    assert_eq!(rows[3]["tid_dist"], 1, "segment column is named after its rule");
    assert!(rows[0]["speed_to_prev"].is_null());
}
