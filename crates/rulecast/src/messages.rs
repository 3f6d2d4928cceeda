// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Wire-facing message types.
//!
//! These are the value types crossing the broadcaster's boundary: the
//! inbound geofence notification and the outbound control request, map
//! diff, and active-rule status. Transport encoding is a collaborator
//! concern; everything here is serde-serializable plain data.

use crate::map::annotation::{BoundarySide, Participant, RuleAnnotation, RuleKind};
use crate::map::segment::SegmentId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Inbound traffic-control notification. Only version 1 is understood;
/// anything else is ignored on ingest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TrafficControlMessage {
    V1(TrafficControlMessageV1),
    /// A version this broadcaster does not speak.
    Unsupported { version: u8 },
}

/// Version-1 geofence payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficControlMessageV1 {
    /// Unique message id; replays of an already-processed id are dropped.
    pub id: Uuid,
    /// Correlation id copied from the control request this answers.
    pub reqid: [u8; 8],
    pub geometry: ControlGeometry,
    pub detail: ControlDetail,
    /// Participants the rule applies to; empty means everyone.
    pub participants: Vec<Participant>,
    pub schedule: ScheduleMsg,
}

/// Geofence geometry in the sender's frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ControlGeometry {
    /// Proj string describing the frame of `points`.
    pub proj: String,
    pub points: Vec<GeoPoint>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub x: f64,
    pub y: f64,
}

/// The single rule a version-1 message carries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ControlDetail {
    /// Maximum speed, m/s.
    MaxSpeed(f64),
    /// Minimum speed, m/s.
    MinSpeed(f64),
    /// Who may cross the given boundary side.
    LateralPermission {
        side: BoundarySide,
        allowed: Vec<Participant>,
    },
}

/// Schedule block of a version-1 message, seconds since the clock epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleMsg {
    pub valid_from: f64,
    pub valid_to: f64,
    /// Daily active windows; the broadcaster uses the first one.
    pub daily_windows: Vec<DailyWindow>,
    pub repeat: Option<RepeatParams>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyWindow {
    /// Offset of the window start past `valid_from`, seconds.
    pub begin: f64,
    /// Window length, seconds.
    pub duration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RepeatParams {
    /// 1-based index of the first eligible occurrence; 0 = no restriction.
    pub offset: u32,
    /// Number of eligible occurrences; 0 = unbounded.
    pub span: u32,
    /// Repeat period, seconds; 0 = a single non-repeating window.
    pub period: f64,
}

/// Outbound request soliciting geofences for a route's bounding region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrafficControlRequest {
    /// Fresh correlation id; responses must echo it.
    pub reqid: [u8; 8],
    pub bounds: Vec<RequestBounds>,
}

/// One bounding region: a geodetic reference corner plus the three other
/// corners as map-frame offsets from it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestBounds {
    pub ref_lat: f64,
    pub ref_lon: f64,
    pub offsets: [Offset; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Offset {
    pub dx: f64,
    pub dy: f64,
}

/// Outbound map delta for one geofence activation or deactivation.
///
/// Annotation payloads are resolved from the map arena at publish time so
/// subscribers never need id-to-object context of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapDiff {
    pub geofence_id: Uuid,
    pub update_list: Vec<(SegmentId, RuleAnnotation)>,
    pub remove_list: Vec<(SegmentId, RuleAnnotation)>,
}

/// Outbound answer to "am I on an active rule, and how far is the next one".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveRuleStatus {
    pub on_active_segment: bool,
    /// Kind of the rule on the occupied segment, when on one.
    pub kind: Option<RuleKind>,
    /// Rule value (max speed, m/s) when the occupied rule carries one.
    pub value: Option<f64>,
    /// Route distance to the nearest active rule ahead; 0 when none.
    pub distance_to_next_rule: f64,
}

impl Default for ActiveRuleStatus {
    fn default() -> Self {
        ActiveRuleStatus {
            on_active_segment: false,
            kind: None,
            value: None,
            distance_to_next_rule: 0.0,
        }
    }
}
