// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Geofence records: one accepted, schedulable rule change.

use crate::map::annotation::AnnotationId;
use crate::map::segment::SegmentId;
use crate::schedule::Schedule;
use uuid::Uuid;

/// A validated geofence: its schedule, its rule annotation (owned by the
/// current map's arena), the segments it affects, and the bookkeeping used
/// for reversible patching.
///
/// `update_list` and `remove_list` are fully recomputed on every apply and
/// revert; together they form the outbound map diff. `prior_annotations`
/// captures, at apply time, exactly the annotations that were displaced so
/// revert can re-link them. Calling apply twice without an intervening
/// revert keeps appending to `prior_annotations`; that is a documented
/// precondition of the patching protocol, not something the record guards.
#[derive(Debug, Clone)]
pub struct GeofenceRecord {
    pub id: Uuid,
    pub schedule: Schedule,
    pub annotation_id: AnnotationId,
    /// Affected segments in traversal order, as resolved from the geometry.
    pub affected_segments: Vec<SegmentId>,
    pub update_list: Vec<(SegmentId, AnnotationId)>,
    pub remove_list: Vec<(SegmentId, AnnotationId)>,
    pub prior_annotations: Vec<(SegmentId, AnnotationId)>,
}

impl GeofenceRecord {
    pub fn new(
        id: Uuid,
        schedule: Schedule,
        annotation_id: AnnotationId,
        affected_segments: Vec<SegmentId>,
    ) -> Self {
        GeofenceRecord {
            id,
            schedule,
            annotation_id,
            affected_segments,
            update_list: Vec::new(),
            remove_list: Vec::new(),
            prior_annotations: Vec::new(),
        }
    }
}
