// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The traffic-rule broadcaster: orchestrates map, scheduler, and patches.
//!
//! One instance owns the base and current maps, the correlation-id set, the
//! active-region index, and the geofence scheduler, all behind a single
//! mutex. Inbound geofence messages are validated, resolved against the map
//! geometry, and handed to the scheduler; scheduler callbacks patch the
//! current map and publish the resulting diff through the [`BroadcastSink`].
//!
//! Lifecycle is explicit: construct, `load_base_map`, `set_georeference`,
//! then steady state. There is no global or static instance.
//!
//! # Locking
//!
//! Every entry point takes the core lock for its full duration and releases
//! it before anything is published. The scheduler is only ever called while
//! holding the core lock; scheduler callbacks acquire the core lock after
//! the scheduler has released its own bookkeeping lock, so the lock order
//! is always core -> scheduler, never the reverse.

use crate::config::BroadcasterConfig;
use crate::geofence::GeofenceRecord;
use crate::geometry::{self, projection::FrameProjector, projection::ProjSpec, BoundingBox2};
use crate::map::annotation::{Participant, RuleAnnotation, RuleKind, Speed};
use crate::map::segment::SegmentId;
use crate::map::{conformer, RoadMap};
use crate::messages::{
    ActiveRuleStatus, ControlDetail, MapDiff, Offset, RequestBounds, ScheduleMsg,
    TrafficControlMessage, TrafficControlMessageV1, TrafficControlRequest,
};
use crate::patch;
use crate::resolver;
use crate::schedule::{Schedule, Timestamp};
use crate::scheduler::timer::{Clock, TimerFactory};
use crate::scheduler::{GeofenceScheduler, SharedRecord};
use crate::{Error, Result};
use glam::DVec2;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Outbound side of the broadcaster.
///
/// Implementations hand the message to a transport queue and return; they
/// are called from timer threads and from within request handling, and must
/// not block.
pub trait BroadcastSink: Send + Sync {
    /// The normalized base map, published once per `load_base_map`.
    fn publish_map(&self, map: &RoadMap);
    /// A geofence activation/deactivation delta.
    fn publish_diff(&self, diff: &MapDiff);
    /// A control request soliciting geofences for the current route.
    fn publish_request(&self, request: &TrafficControlRequest);
    /// Answer to an active-rule status query.
    fn publish_active_status(&self, status: &ActiveRuleStatus);
}

struct CoreState {
    config: BroadcasterConfig,
    base_map: Option<RoadMap>,
    current_map: Option<RoadMap>,
    georeference: Option<String>,
    /// Correlation ids handed out by `build_control_request`; inbound
    /// geofences must echo one of them.
    issued_reqids: HashSet<[u8; 8]>,
    /// Message ids already ingested, for replay rejection.
    processed_ids: HashSet<Uuid>,
    /// Segments currently carrying at least one active geofence.
    active_index: HashSet<SegmentId>,
    route: Vec<SegmentId>,
}

/// Dynamic traffic-rule broadcaster over one shared road map.
pub struct Broadcaster {
    core: Arc<Mutex<CoreState>>,
    scheduler: Arc<GeofenceScheduler>,
    sink: Arc<dyn BroadcastSink>,
}

impl Broadcaster {
    /// Build a broadcaster and wire the scheduler callbacks.
    pub fn new(
        config: BroadcasterConfig,
        sink: Arc<dyn BroadcastSink>,
        clock: Arc<dyn Clock>,
        timers: Arc<dyn TimerFactory>,
    ) -> Result<Self> {
        config.validate()?;

        let core = Arc::new(Mutex::new(CoreState {
            config,
            base_map: None,
            current_map: None,
            georeference: None,
            issued_reqids: HashSet::new(),
            processed_ids: HashSet::new(),
            active_index: HashSet::new(),
            route: Vec::new(),
        }));
        let scheduler = GeofenceScheduler::new(clock, timers);

        let cb_core = core.clone();
        let cb_sink = sink.clone();
        scheduler.on_geofence_active(move |record| {
            if let Some(diff) = apply_active_geofence(&cb_core, record) {
                cb_sink.publish_diff(&diff);
            }
        });

        let cb_core = core.clone();
        let cb_sink = sink.clone();
        scheduler.on_geofence_inactive(move |record| {
            if let Some(diff) = revert_inactive_geofence(&cb_core, record) {
                cb_sink.publish_diff(&diff);
            }
        });

        Ok(Broadcaster { core, scheduler, sink })
    }

    /// Store and publish the compliance-normalized base map.
    ///
    /// Meant to be called once; a repeated call replaces both map copies
    /// (with a warning) and republishes.
    pub fn load_base_map(&self, map: RoadMap) -> Result<()> {
        let snapshot = {
            let mut state = self.core.lock();
            if state.base_map.is_some() {
                log::warn!("[broadcaster] base map loaded more than once, replacing");
            } else {
                log::info!("[broadcaster] base map loaded ({} segments)", map.len());
            }

            let mut normalized = map;
            conformer::ensure_compliance(&mut normalized, state.config.speed_limit_ceiling)?;
            state.base_map = Some(normalized.clone());
            state.current_map = Some(normalized.clone());
            normalized
        };
        self.sink.publish_map(&snapshot);
        Ok(())
    }

    /// Store the proj string geofence geometry is reprojected against.
    pub fn set_georeference(&self, proj_string: impl Into<String>) {
        self.core.lock().georeference = Some(proj_string.into());
    }

    /// Store the route used for control requests and proximity queries.
    ///
    /// Every id must name a segment of the current map.
    pub fn set_route(&self, segment_ids: Vec<SegmentId>) -> Result<()> {
        let mut state = self.core.lock();
        let map = state
            .current_map
            .as_ref()
            .ok_or_else(|| Error::InvalidState("base map is not loaded".to_string()))?;
        for id in &segment_ids {
            if map.segment(*id).is_none() {
                return Err(Error::InvalidArgument(format!("route names unknown segment {}", id)));
            }
        }
        state.route = segment_ids;
        Ok(())
    }

    /// Validate and schedule an inbound geofence message.
    ///
    /// Recoverable problems (unsupported version, replayed id, unknown
    /// correlation id, empty affected region, unusable schedule) drop the
    /// message with a log entry. A missing map or georeference is the
    /// caller's setup error and comes back as `InvalidState`; a broken
    /// proj string propagates as `InvalidArgument`.
    pub fn ingest_geofence(&self, message: &TrafficControlMessage) -> Result<()> {
        let mut state = self.core.lock();
        match self.validate_and_schedule(&mut state, message) {
            Ok(()) => Ok(()),
            Err(Error::DuplicateGeofence(_)) => Ok(()), // replay, dropped silently
            Err(Error::UnknownCorrelation(reqid)) => {
                log::warn!(
                    "[broadcaster] geofence answers unknown control request {}, dropping",
                    reqid
                );
                Ok(())
            }
            Err(Error::EmptyAffectedRegion) => {
                log::warn!("[broadcaster] geofence touches no applicable part of the map, dropping");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn validate_and_schedule(
        &self,
        state: &mut CoreState,
        message: &TrafficControlMessage,
    ) -> Result<()> {
        let TrafficControlMessage::V1(v1) = message else {
            log::debug!("[broadcaster] ignoring traffic control message of unsupported version");
            return Ok(());
        };

        if state.processed_ids.contains(&v1.id) {
            return Err(Error::DuplicateGeofence(v1.id.to_string()));
        }
        if !state.issued_reqids.contains(&v1.reqid) {
            return Err(Error::UnknownCorrelation(reqid_hex(&v1.reqid)));
        }

        let georeference = state
            .georeference
            .clone()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Error::InvalidState("map georeference is not loaded".to_string()))?;
        if state.current_map.is_none() {
            return Err(Error::InvalidState("base map is not loaded".to_string()));
        }

        state.processed_ids.insert(v1.id);

        let projector = FrameProjector::between(&v1.geometry.proj, &georeference)?;
        let points: Vec<DVec2> = v1
            .geometry
            .points
            .iter()
            .map(|p| projector.forward(DVec2::new(p.x, p.y)))
            .collect();

        let affected = {
            let map = state
                .current_map
                .as_ref()
                .ok_or_else(|| Error::InvalidState("base map is not loaded".to_string()))?;
            resolver::resolve_affected_region(map, &points, state.config.max_lane_width)
        };
        if affected.is_empty() {
            return Err(Error::EmptyAffectedRegion);
        }

        let Some(schedule) = schedule_from_msg(v1.id, &v1.schedule) else {
            return Ok(()); // logged inside
        };

        let annotation = annotation_from_detail(&state.config, v1);
        let annotation_id = match state.current_map.as_mut() {
            Some(map) => map.register_annotation(annotation),
            None => return Err(Error::InvalidState("base map is not loaded".to_string())),
        };

        let record = GeofenceRecord::new(v1.id, schedule, annotation_id, affected);
        log::info!(
            "[broadcaster] geofence {} accepted ({} affected segments)",
            v1.id,
            record.affected_segments.len()
        );
        // core lock is held here; the scheduler takes only its own lock
        self.scheduler.schedule(record);
        Ok(())
    }

    /// Compute a control request covering the current route, record its
    /// correlation id, publish it, and return it.
    pub fn build_control_request(&self) -> Result<TrafficControlRequest> {
        let request = {
            let mut state = self.core.lock();
            let map = state
                .current_map
                .as_ref()
                .ok_or_else(|| Error::InvalidState("base map is not loaded".to_string()))?;
            if state.route.is_empty() {
                return Err(Error::InvalidState("no route segments available".to_string()));
            }

            let mut bounds: Option<BoundingBox2> = None;
            for id in &state.route {
                let seg = map
                    .segment(*id)
                    .ok_or_else(|| Error::InvalidArgument(format!("route names unknown segment {}", id)))?;
                let bb = seg.bounding_box();
                bounds = Some(match bounds {
                    Some(prev) => prev.union(bb),
                    None => bb,
                });
            }
            let bounds = bounds.expect("route checked non-empty");

            let georeference = state
                .georeference
                .clone()
                .filter(|s| !s.is_empty())
                .ok_or_else(|| Error::InvalidState("map georeference is not loaded".to_string()))?;
            let spec = ProjSpec::parse(&georeference)?;
            let (ref_lat, ref_lon) = spec.to_latlon(bounds.min);

            let reqid = fresh_reqid();
            state.issued_reqids.insert(reqid);

            let (w, h) = (bounds.width(), bounds.height());
            TrafficControlRequest {
                reqid,
                bounds: vec![RequestBounds {
                    ref_lat,
                    ref_lon,
                    offsets: [
                        Offset { dx: 0.0, dy: h },
                        Offset { dx: w, dy: 0.0 },
                        Offset { dx: w, dy: h },
                    ],
                }],
            }
        };
        self.sink.publish_request(&request);
        Ok(request)
    }

    /// Route distance (`|downtrack| + |crosstrack|`) from `position` to the
    /// nearest active rule ahead on the route; 0 when there is none.
    ///
    /// `position` must lie inside some segment of the map.
    pub fn distance_to_nearest_active_rule(&self, position: DVec2) -> Result<f64> {
        let state = self.core.lock();
        nearest_active_distance(&state, position)
    }

    /// Report whether `position` is on a segment with an active rule, plus
    /// the distance to the next one; the status is also published.
    pub fn active_rule_status(&self, position: DVec2) -> Result<ActiveRuleStatus> {
        let status = {
            let state = self.core.lock();
            let map = state
                .current_map
                .as_ref()
                .ok_or_else(|| Error::InvalidState("base map is not loaded".to_string()))?;
            if map.is_empty() {
                return Err(Error::InvalidState("loaded map has no segments".to_string()));
            }

            let mut status = ActiveRuleStatus::default();
            if state.active_index.is_empty() {
                log::info!("[broadcaster] no active geofences to report");
                status
            } else {
                let nearest = map
                    .nearest_segment(position)
                    .ok_or_else(|| Error::InvalidState("loaded map has no segments".to_string()))?;
                let on_segment = map.segment(nearest).is_some_and(|s| s.contains(position));
                if on_segment {
                    status.distance_to_next_rule = nearest_active_distance(&state, position)?;
                    if state.active_index.contains(&nearest) {
                        status.on_active_segment = true;
                        for (_, ann) in map.annotations_on(nearest) {
                            if let RuleAnnotation::SpeedLimit { max, .. } = ann {
                                status.kind = Some(RuleKind::SpeedLimit);
                                status.value = Some(max.as_mps());
                            }
                        }
                    }
                }
                status
            }
        };
        self.sink.publish_active_status(&status);
        Ok(status)
    }

    /// Snapshot of the current (patched) map.
    pub fn current_map(&self) -> Option<RoadMap> {
        self.core.lock().current_map.clone()
    }

    /// Segment ids currently carrying an active geofence, in id order.
    pub fn active_region(&self) -> Vec<SegmentId> {
        let state = self.core.lock();
        let mut ids: Vec<SegmentId> = state.active_index.iter().copied().collect();
        ids.sort();
        ids
    }

    /// The scheduler driving this broadcaster's geofence lifecycles.
    pub fn scheduler(&self) -> &Arc<GeofenceScheduler> {
        &self.scheduler
    }
}

/// Activation callback body: patch the map, update the index, build the diff.
fn apply_active_geofence(core: &Arc<Mutex<CoreState>>, record: &SharedRecord) -> Option<MapDiff> {
    let mut state = core.lock();
    let mut rec = record.lock();
    log::info!("[broadcaster] activating geofence {}", rec.id);

    let CoreState { current_map, active_index, .. } = &mut *state;
    let Some(map) = current_map.as_mut() else {
        log::error!("[broadcaster] geofence {} activated without a loaded map", rec.id);
        return None;
    };
    if let Err(e) = patch::apply_geofence(map, &mut rec) {
        log::error!("[broadcaster] failed to apply geofence {}: {}", rec.id, e);
        return None;
    }
    for (seg, _) in &rec.update_list {
        active_index.insert(*seg);
    }
    Some(diff_from_record(map, &rec))
}

/// Deactivation callback body: revert the patch, shrink the index.
fn revert_inactive_geofence(
    core: &Arc<Mutex<CoreState>>,
    record: &SharedRecord,
) -> Option<MapDiff> {
    let mut state = core.lock();
    let mut rec = record.lock();
    log::info!("[broadcaster] deactivating geofence {}", rec.id);

    let CoreState { current_map, active_index, .. } = &mut *state;
    let Some(map) = current_map.as_mut() else {
        log::error!("[broadcaster] geofence {} deactivated without a loaded map", rec.id);
        return None;
    };
    if let Err(e) = patch::revert_geofence(map, &mut rec) {
        log::error!("[broadcaster] failed to revert geofence {}: {}", rec.id, e);
        return None;
    }
    for (seg, _) in &rec.remove_list {
        active_index.remove(seg);
    }
    Some(diff_from_record(map, &rec))
}

/// Resolve a record's id-based lists into a publishable diff.
fn diff_from_record(map: &RoadMap, record: &GeofenceRecord) -> MapDiff {
    let resolve = |list: &[(SegmentId, crate::map::annotation::AnnotationId)]| {
        list.iter()
            .filter_map(|(seg, ann)| map.annotation(*ann).map(|a| (*seg, a.clone())))
            .collect()
    };
    MapDiff {
        geofence_id: record.id,
        update_list: resolve(&record.update_list),
        remove_list: resolve(&record.remove_list),
    }
}

/// Distance to the nearest active rule ahead on the route, shared between
/// the public query and the status report. Assumes the core lock is held.
fn nearest_active_distance(state: &CoreState, position: DVec2) -> Result<f64> {
    let map = state
        .current_map
        .as_ref()
        .ok_or_else(|| Error::InvalidState("base map is not loaded".to_string()))?;
    let current = map
        .nearest_segment(position)
        .ok_or_else(|| Error::InvalidState("loaded map has no segments".to_string()))?;
    let on_current = map.segment(current).is_some_and(|s| s.contains(position));
    if !on_current {
        return Err(Error::InvalidArgument(
            "position does not lie within any segment".to_string(),
        ));
    }

    let mut best: Option<f64> = None;
    for id in &state.route {
        // the occupied segment does not count as "ahead"
        if *id == current || !state.active_index.contains(id) {
            continue;
        }
        let Some(seg) = map.segment(*id) else { continue };
        let Some(tp) = geometry::track_pos(&seg.centerline(), position) else { continue };
        // negative downtrack: the segment start is still ahead of us
        if tp.downtrack < 0.0 {
            let d = tp.downtrack.abs() + tp.crosstrack.abs();
            best = Some(best.map_or(d, |b: f64| b.min(d)));
        }
    }
    Ok(best.unwrap_or(0.0))
}

/// Build the rule annotation a message's detail block asks for, clamping
/// speed values into the configured bounds.
fn annotation_from_detail(
    config: &BroadcasterConfig,
    message: &TrafficControlMessageV1,
) -> RuleAnnotation {
    let participants = if message.participants.is_empty() {
        Participant::all()
    } else {
        message.participants.clone()
    };
    match &message.detail {
        ControlDetail::MaxSpeed(mps) => RuleAnnotation::SpeedLimit {
            min: Speed::ZERO,
            max: config.effective_speed_limit(Speed::from_mps(*mps)),
            participants,
        },
        ControlDetail::MinSpeed(mps) => RuleAnnotation::SpeedLimit {
            min: config.effective_speed_limit(Speed::from_mps(*mps)),
            max: config.speed_limit_ceiling,
            participants,
        },
        ControlDetail::LateralPermission { side, allowed } => RuleAnnotation::PassingRestriction {
            side: *side,
            allowed: allowed.clone(),
        },
    }
}

/// First daily window of the message as a [`Schedule`]; drops (with a log
/// entry) messages that carry no usable window.
fn schedule_from_msg(id: Uuid, msg: &ScheduleMsg) -> Option<Schedule> {
    let Some(window) = msg.daily_windows.first() else {
        log::warn!("[broadcaster] geofence {} has no daily window, dropping", id);
        return None;
    };
    if msg.daily_windows.len() > 1 {
        log::warn!(
            "[broadcaster] geofence {} carries {} daily windows, using the first",
            id,
            msg.daily_windows.len()
        );
    }

    let (offset, span, period) = msg
        .repeat
        .map(|r| (r.offset, r.span, sane_duration(r.period)))
        .unwrap_or((0, 0, Duration::ZERO));

    match Schedule::new(
        Timestamp::from_secs_f64(msg.valid_from),
        Timestamp::from_secs_f64(msg.valid_to),
        sane_duration(window.begin),
        sane_duration(window.duration),
        offset,
        span,
        period,
    ) {
        Ok(schedule) => Some(schedule),
        Err(e) => {
            log::warn!("[broadcaster] geofence {} has an unusable schedule ({}), dropping", id, e);
            None
        }
    }
}

fn sane_duration(secs: f64) -> Duration {
    if secs.is_finite() && secs > 0.0 {
        Duration::from_secs_f64(secs)
    } else {
        Duration::ZERO
    }
}

/// Random 8-byte correlation id (half a v4 UUID, as the request format
/// carries only eight bytes).
fn fresh_reqid() -> [u8; 8] {
    let uuid = Uuid::new_v4();
    let mut reqid = [0u8; 8];
    reqid.copy_from_slice(&uuid.as_bytes()[..8]);
    reqid
}

fn reqid_hex(reqid: &[u8; 8]) -> String {
    reqid.iter().map(|b| format!("{:02x}", b)).collect()
}
