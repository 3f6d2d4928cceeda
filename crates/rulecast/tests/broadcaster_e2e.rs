// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end broadcaster scenarios: load a map, solicit geofences, ingest
//! one, and watch the activation/deactivation diffs flow through the sink.

mod common;

use common::*;
use rulecast::map::annotation::RuleAnnotation;
use rulecast::{GeofenceState, Timestamp, TrafficControlMessage};

fn secs(s: f64) -> Timestamp {
    Timestamp::from_secs_f64(s)
}

#[test]
fn test_base_map_load_publishes_normalized_map() {
    let (broadcaster, sink, _clock, _timers) = test_broadcaster();
    broadcaster.load_base_map(four_segment_chain()).expect("load map");

    assert_eq!(sink.map_count(), 1);
    let published = &sink.maps.lock()[0];
    assert_eq!(published.len(), 4);
    // the conformer attached default passing restrictions to every segment
    for seg in [S0, S1, S2, S3] {
        assert_eq!(published.annotations_on(seg).len(), 2);
    }
}

#[test]
fn test_speed_limit_geofence_full_lifecycle() {
    let (broadcaster, sink, _clock, timers) = test_broadcaster();

    let mut map = four_segment_chain();
    let old_limit = attach_speed_limit(&mut map, S0, 5.0);
    broadcaster.load_base_map(map).expect("load map");
    broadcaster.set_georeference(MAP_PROJ);
    broadcaster.set_route(vec![S0, S1, S2, S3]).expect("route");

    // solicit geofences; the returned reqid gates the response
    let request = broadcaster.build_control_request().expect("request");

    let ten_kmh = rulecast::Speed::from_kmh(10.0).as_mps();
    let message = max_speed_message(
        request.reqid,
        MAP_PROJ,
        &[(0.5, 0.5)],
        ten_kmh,
        (0.0, 8.0),
        (2.0, 1.1),
    );
    broadcaster.ingest_geofence(&message).expect("ingest");

    let TrafficControlMessage::V1(v1) = &message else { unreachable!() };
    assert_eq!(
        broadcaster.scheduler().state_of(v1.id),
        Some(GeofenceState::Pending)
    );
    assert!(sink.diffs().is_empty(), "nothing published before activation");

    // activation at t = 2
    timers.advance_to(secs(2.5));
    assert_eq!(broadcaster.scheduler().state_of(v1.id), Some(GeofenceState::Active));
    assert_eq!(broadcaster.active_region(), vec![S0]);

    let diffs = sink.diffs();
    assert_eq!(diffs.len(), 1);
    let activation = &diffs[0];
    assert_eq!(activation.geofence_id, v1.id);
    assert_eq!(activation.update_list.len(), 1);
    assert_eq!(activation.update_list[0].0, S0);
    match &activation.update_list[0].1 {
        RuleAnnotation::SpeedLimit { max, .. } => assert!((max.as_kmh() - 10.0).abs() < 1e-9),
        other => panic!("unexpected annotation {:?}", other),
    }
    // the displaced 5 km/h limit shows up in the removals
    assert_eq!(activation.remove_list.len(), 1);
    assert_eq!(activation.remove_list[0].0, S0);
    match &activation.remove_list[0].1 {
        RuleAnnotation::SpeedLimit { max, .. } => assert!((max.as_kmh() - 5.0).abs() < 1e-9),
        other => panic!("unexpected annotation {:?}", other),
    }

    // the live map now carries only the 10 km/h limit on S0
    let current = broadcaster.current_map().expect("map loaded");
    assert_eq!(speed_limits_on(&current, S0), vec![10.0]);

    // deactivation at t = 3.1 publishes the inverse diff
    timers.advance_to(secs(8.0));
    assert_eq!(broadcaster.scheduler().state_of(v1.id), Some(GeofenceState::Expired));
    assert!(broadcaster.active_region().is_empty());

    let diffs = sink.diffs();
    assert_eq!(diffs.len(), 2);
    let deactivation = &diffs[1];
    assert_eq!(deactivation.update_list.len(), 1);
    match &deactivation.update_list[0].1 {
        RuleAnnotation::SpeedLimit { max, .. } => assert!((max.as_kmh() - 5.0).abs() < 1e-9),
        other => panic!("unexpected annotation {:?}", other),
    }
    match &deactivation.remove_list[0].1 {
        RuleAnnotation::SpeedLimit { max, .. } => assert!((max.as_kmh() - 10.0).abs() < 1e-9),
        other => panic!("unexpected annotation {:?}", other),
    }

    // the original limit object (same id) is back on the segment
    let current = broadcaster.current_map().expect("map loaded");
    assert_eq!(speed_limits_on(&current, S0), vec![5.0]);
    assert!(current
        .annotations_on(S0)
        .iter()
        .any(|(id, _)| *id == old_limit));
}

#[test]
fn test_geofence_in_foreign_frame_is_reprojected() {
    let (broadcaster, sink, _clock, timers) = test_broadcaster();

    broadcaster.load_base_map(four_segment_chain()).expect("load map");
    broadcaster.set_georeference(MAP_PROJ);
    broadcaster.set_route(vec![S0, S1, S2, S3]).expect("route");
    let request = broadcaster.build_control_request().expect("request");

    // the fence frame origin sits ~(10, 10) in map coordinates, so a point
    // at (-9.5, -9.5) in the fence frame lands inside S0
    let message = max_speed_message(
        request.reqid,
        FENCE_PROJ,
        &[(-9.5, -9.5)],
        5.0,
        (0.0, 10.0),
        (0.0, 10.0),
    );
    broadcaster.ingest_geofence(&message).expect("ingest");

    timers.advance_to(secs(1.0));
    assert_eq!(broadcaster.active_region(), vec![S0]);
    assert_eq!(sink.diffs().len(), 1);
}

#[test]
fn test_two_point_geofence_spans_adjacent_segments() {
    let (broadcaster, _sink, _clock, timers) = test_broadcaster();

    broadcaster.load_base_map(four_segment_chain()).expect("load map");
    broadcaster.set_georeference(MAP_PROJ);
    broadcaster.set_route(vec![S0, S1, S2, S3]).expect("route");
    let request = broadcaster.build_control_request().expect("request");

    let message = max_speed_message(
        request.reqid,
        MAP_PROJ,
        &[(0.5, 1.5), (0.5, 2.5)],
        5.0,
        (0.0, 10.0),
        (0.0, 10.0),
    );
    broadcaster.ingest_geofence(&message).expect("ingest");
    timers.advance_to(secs(1.0));

    assert_eq!(broadcaster.active_region(), vec![S1, S2]);
}

#[test]
fn test_control_request_covers_route_bounds() {
    let (broadcaster, sink, _clock, _timers) = test_broadcaster();

    broadcaster.load_base_map(four_segment_chain()).expect("load map");
    broadcaster.set_georeference(MAP_PROJ);
    broadcaster.set_route(vec![S0, S1, S2, S3]).expect("route");

    let request = broadcaster.build_control_request().expect("request");
    assert_eq!(sink.requests.lock().len(), 1, "request also goes to the sink");

    assert_eq!(request.bounds.len(), 1);
    let bounds = &request.bounds[0];
    // reference corner (0, 0) is the map origin
    assert!((bounds.ref_lat - 39.46636844371259).abs() < 1e-6);
    assert!((bounds.ref_lon - -76.16919523566943).abs() < 1e-6);
    // remaining corners as offsets over the 1 x 4 route box
    assert!((bounds.offsets[0].dx - 0.0).abs() < 1e-9);
    assert!((bounds.offsets[0].dy - 4.0).abs() < 1e-9);
    assert!((bounds.offsets[1].dx - 1.0).abs() < 1e-9);
    assert!((bounds.offsets[1].dy - 0.0).abs() < 1e-9);
    assert!((bounds.offsets[2].dx - 1.0).abs() < 1e-9);
    assert!((bounds.offsets[2].dy - 4.0).abs() < 1e-9);

    // each request gets a fresh correlation id
    let second = broadcaster.build_control_request().expect("request");
    assert_ne!(request.reqid, second.reqid);
}

#[test]
fn test_replayed_geofence_id_keeps_first_schedule() {
    let (broadcaster, _sink, _clock, timers) = test_broadcaster();

    broadcaster.load_base_map(four_segment_chain()).expect("load map");
    broadcaster.set_georeference(MAP_PROJ);
    broadcaster.set_route(vec![S0, S1, S2, S3]).expect("route");
    let request = broadcaster.build_control_request().expect("request");

    let first = max_speed_message(
        request.reqid,
        MAP_PROJ,
        &[(0.5, 0.5)],
        5.0,
        (0.0, 100.0),
        (50.0, 10.0),
    );
    broadcaster.ingest_geofence(&first).expect("ingest");
    let TrafficControlMessage::V1(v1) = &first else { unreachable!() };

    // a second message reusing the id (earlier window) is a replay and is
    // dropped by the processed-id gate
    let TrafficControlMessage::V1(template) = max_speed_message(
        request.reqid,
        MAP_PROJ,
        &[(0.5, 0.5)],
        5.0,
        (0.0, 100.0),
        (5.0, 10.0),
    ) else {
        unreachable!()
    };
    let replay = TrafficControlMessage::V1(rulecast::messages::TrafficControlMessageV1 {
        id: v1.id,
        ..template
    });
    broadcaster.ingest_geofence(&replay).expect("ingest replay");

    // the replay's window (5..15) must not take effect; the original
    // schedule does not activate before t = 50
    timers.advance_to(secs(20.0));
    assert_eq!(broadcaster.scheduler().state_of(v1.id), Some(GeofenceState::Pending));
    assert!(broadcaster.active_region().is_empty());
    assert_eq!(broadcaster.scheduler().tracked_count(), 1);
}
