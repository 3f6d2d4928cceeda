// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Compliance normalization of a freshly loaded map.
//!
//! Loaded maps come from external tooling and routinely miss the rule
//! annotations the rest of the system assumes: every boundary side should
//! carry a passing restriction and no speed limit may exceed the configured
//! ceiling. Rather than rejecting such maps, normalization patches them in
//! place, once, at load time.

use super::annotation::{BoundarySide, Participant, RuleAnnotation, Speed};
use super::segment::BoundaryMarking;
use super::RoadMap;
use crate::Result;

/// Normalize `map` in place.
///
/// - Speed limits above `ceiling` are clamped (with a warning); a `min`
///   above the clamped `max` is pulled down with it.
/// - Each segment side without an explicit passing restriction gets a
///   default derived from its boundary marking: dashed boundaries allow all
///   participants to pass, solid boundaries allow none.
///
/// Running it again on an already-normalized map changes nothing.
pub fn ensure_compliance(map: &mut RoadMap, ceiling: Speed) -> Result<()> {
    let annotation_ids: Vec<_> = map.annotation_ids().collect();
    for id in annotation_ids {
        if let Some(RuleAnnotation::SpeedLimit { min, max, .. }) = map.annotation_mut(id) {
            if *max > ceiling {
                log::warn!(
                    "[conformer] speed limit {} exceeds ceiling {}, clamping",
                    max,
                    ceiling
                );
                *max = ceiling;
            }
            if *min > *max {
                *min = *max;
            }
        }
    }

    let segment_ids: Vec<_> = map.segment_ids().collect();
    for seg_id in segment_ids {
        for side in [BoundarySide::Left, BoundarySide::Right] {
            let covered = map.annotations_on(seg_id).iter().any(|(_, ann)| {
                matches!(ann, RuleAnnotation::PassingRestriction { side: s, .. } if *s == side)
            });
            if covered {
                continue;
            }

            let marking = {
                let segment = map.segment(seg_id).expect("segment id from this map");
                match side {
                    BoundarySide::Left => segment.left_marking(),
                    BoundarySide::Right => segment.right_marking(),
                }
            };
            let allowed = match marking {
                BoundaryMarking::Dashed => Participant::all(),
                BoundaryMarking::Solid => Vec::new(),
            };
            let ann = map.register_annotation(RuleAnnotation::PassingRestriction { side, allowed });
            map.attach(seg_id, ann)?;
        }
    }

    Ok(())
}
