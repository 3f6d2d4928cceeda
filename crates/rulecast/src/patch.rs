// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Reversible application of a geofence's rule annotation to the live map.
//!
//! `apply_geofence` displaces every same-kind annotation (side-matched for
//! passing restrictions) from the affected segments into the record's
//! `prior_annotations`, then attaches the geofence's own annotation.
//! `revert_geofence` is the exact inverse: it detaches the geofence's
//! annotation and re-links the displaced ones by id.
//!
//! Both operations fully recompute `update_list`/`remove_list`, so the
//! outbound diff is always self-consistent. `prior_annotations` however
//! accumulates: apply must be paired with a revert before the next apply,
//! otherwise the second call captures the geofence's own annotation as
//! "prior" state. When two active geofences patch the same segment the
//! second one captures the first's annotation rather than the true
//! original; both behaviors are knowingly kept (see DESIGN.md).

use crate::geofence::GeofenceRecord;
use crate::map::annotation::AnnotationId;
use crate::map::RoadMap;
use crate::Result;

/// Patch `map` with the record's annotation, remembering displaced state.
pub fn apply_geofence(map: &mut RoadMap, record: &mut GeofenceRecord) -> Result<()> {
    record.update_list.clear();
    record.remove_list.clear();

    let annotation = map
        .annotation(record.annotation_id)
        .cloned()
        .ok_or_else(|| {
            crate::Error::InvalidArgument(format!(
                "geofence {} references unknown annotation {}",
                record.id, record.annotation_id
            ))
        })?;

    // First pass: capture and detach whatever the new annotation displaces,
    // so the displaced ids can be re-linked on revert.
    let affected = record.affected_segments.clone();
    for &seg in &affected {
        let displaced: Vec<AnnotationId> = map
            .annotations_on(seg)
            .iter()
            .filter(|(_, existing)| annotation.displaces(existing))
            .map(|(id, _)| *id)
            .collect();
        for ann in displaced {
            map.detach(seg, ann)?;
            record.prior_annotations.push((seg, ann));
            record.remove_list.push((seg, ann));
        }
    }

    // Second pass: link the geofence's annotation everywhere it applies.
    for &seg in &affected {
        map.attach(seg, record.annotation_id)?;
        record.update_list.push((seg, record.annotation_id));
    }

    log::debug!(
        "[patch] applied geofence {} ({} updates, {} removals)",
        record.id,
        record.update_list.len(),
        record.remove_list.len()
    );
    Ok(())
}

/// Undo a previous [`apply_geofence`], restoring the displaced annotations.
pub fn revert_geofence(map: &mut RoadMap, record: &mut GeofenceRecord) -> Result<()> {
    record.update_list.clear();
    record.remove_list.clear();

    let affected = record.affected_segments.clone();
    for &seg in &affected {
        if map.detach(seg, record.annotation_id)? {
            record.remove_list.push((seg, record.annotation_id));
        }
    }

    for (seg, ann) in std::mem::take(&mut record.prior_annotations) {
        map.attach(seg, ann)?;
        record.update_list.push((seg, ann));
    }

    log::debug!(
        "[patch] reverted geofence {} ({} restored, {} removed)",
        record.id,
        record.update_list.len(),
        record.remove_list.len()
    );
    Ok(())
}
