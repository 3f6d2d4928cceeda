// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Shared helpers for broadcaster integration tests: a collecting sink, a
//! small reference map, and message builders.

#![allow(dead_code)] // not every test binary uses every helper

use parking_lot::Mutex;
use rulecast::map::annotation::{AnnotationId, Participant, RuleAnnotation, Speed};
use rulecast::map::segment::{RoadSegment, SegmentId};
use rulecast::messages::{
    ActiveRuleStatus, ControlDetail, ControlGeometry, DailyWindow, GeoPoint, MapDiff, ScheduleMsg,
    TrafficControlMessage, TrafficControlMessageV1, TrafficControlRequest,
};
use rulecast::RoadMap;
use rulecast::{BroadcastSink, Broadcaster, BroadcasterConfig, Timestamp};
use rulecast::scheduler::timer::{manual_timing, ManualClock, ManualTimerFactory};
use glam::dvec2;
use std::sync::Arc;
use uuid::Uuid;

pub const MAP_PROJ: &str = "+proj=tmerc +lat_0=39.46636844371259 +lon_0=-76.16919523566943 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +vunits=m +no_defs";
pub const FENCE_PROJ: &str = "+proj=tmerc +lat_0=39.46645851394806215 +lon_0=-76.16907903057393980 +k=1 +x_0=0 +y_0=0 +datum=WGS84 +units=m +vunits=m +no_defs";

pub const S0: SegmentId = SegmentId(10000);
pub const S1: SegmentId = SegmentId(10001);
pub const S2: SegmentId = SegmentId(10002);
pub const S3: SegmentId = SegmentId(10003);

/// Records everything the broadcaster publishes.
#[derive(Default)]
pub struct CollectingSink {
    pub maps: Mutex<Vec<RoadMap>>,
    pub diffs: Mutex<Vec<MapDiff>>,
    pub requests: Mutex<Vec<TrafficControlRequest>>,
    pub statuses: Mutex<Vec<ActiveRuleStatus>>,
}

impl CollectingSink {
    pub fn diffs(&self) -> Vec<MapDiff> {
        self.diffs.lock().clone()
    }

    pub fn map_count(&self) -> usize {
        self.maps.lock().len()
    }
}

impl BroadcastSink for CollectingSink {
    fn publish_map(&self, map: &RoadMap) {
        self.maps.lock().push(map.clone());
    }

    fn publish_diff(&self, diff: &MapDiff) {
        self.diffs.lock().push(diff.clone());
    }

    fn publish_request(&self, request: &TrafficControlRequest) {
        self.requests.lock().push(request.clone());
    }

    fn publish_active_status(&self, status: &ActiveRuleStatus) {
        self.statuses.lock().push(status.clone());
    }
}

/// Four one-meter cells stacked northbound: S0 at y 0..1 through S3 at y 3..4.
pub fn four_segment_chain() -> RoadMap {
    let mut map = RoadMap::new();
    for (i, id) in [S0, S1, S2, S3].into_iter().enumerate() {
        let y0 = i as f64;
        map.insert_segment(RoadSegment::new(
            id,
            vec![dvec2(0.0, y0), dvec2(0.0, y0 + 1.0)],
            vec![dvec2(1.0, y0), dvec2(1.0, y0 + 1.0)],
        ))
        .expect("insert segment");
    }
    map
}

/// Attach a pre-existing car speed limit to `seg` and return its id.
pub fn attach_speed_limit(map: &mut RoadMap, seg: SegmentId, kmh: f64) -> AnnotationId {
    let ann = map.register_annotation(RuleAnnotation::SpeedLimit {
        min: Speed::ZERO,
        max: Speed::from_kmh(kmh),
        participants: vec![Participant::Car],
    });
    map.attach(seg, ann).expect("attach");
    ann
}

/// Broadcaster wired to a collecting sink and a manual clock at t = 0.
pub fn test_broadcaster() -> (
    Broadcaster,
    Arc<CollectingSink>,
    Arc<ManualClock>,
    Arc<ManualTimerFactory>,
) {
    let sink = Arc::new(CollectingSink::default());
    let (clock, timers) = manual_timing(Timestamp::ZERO);
    let broadcaster = Broadcaster::new(
        BroadcasterConfig::default(),
        sink.clone(),
        clock.clone(),
        timers.clone(),
    )
    .expect("construct broadcaster");
    (broadcaster, sink, clock, timers)
}

/// A MaxSpeed geofence message with a single daily window and no repeat.
pub fn max_speed_message(
    reqid: [u8; 8],
    proj: &str,
    points: &[(f64, f64)],
    max_mps: f64,
    valid: (f64, f64),
    window: (f64, f64),
) -> TrafficControlMessage {
    TrafficControlMessage::V1(TrafficControlMessageV1 {
        id: Uuid::new_v4(),
        reqid,
        geometry: ControlGeometry {
            proj: proj.to_string(),
            points: points.iter().map(|&(x, y)| GeoPoint { x, y }).collect(),
        },
        detail: ControlDetail::MaxSpeed(max_mps),
        participants: vec![Participant::Car],
        schedule: ScheduleMsg {
            valid_from: valid.0,
            valid_to: valid.1,
            daily_windows: vec![DailyWindow { begin: window.0, duration: window.1 }],
            repeat: None,
        },
    })
}

/// The segment's attached speed limits as km/h values, link order.
pub fn speed_limits_on(map: &RoadMap, seg: SegmentId) -> Vec<f64> {
    map.annotations_on(seg)
        .iter()
        .filter_map(|(_, ann)| match ann {
            RuleAnnotation::SpeedLimit { max, .. } => Some((max.as_kmh() * 1000.0).round() / 1000.0),
            _ => None,
        })
        .collect()
}
