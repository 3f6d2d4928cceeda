// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Affected-region resolution: noisy point geometry onto map segments.
//!
//! A geofence arrives as a point sequence in map coordinates. Each point
//! nominates candidate segments (those containing the point, searched within
//! `max_lane_width`); a candidate is confirmed when the line to the next
//! point crosses the candidate's closing line, or when both points sit
//! inside the candidate and head towards its exit. The final point only
//! confirms segments reachable as `following`-successors of what the path
//! already confirmed, which discards geometrically overlapping but
//! unconnected segments such as the opposite carriageway.

use crate::geometry;
use crate::map::routing::RoutingGraph;
use crate::map::segment::SegmentId;
use crate::map::RoadMap;
use glam::DVec2;
use std::collections::HashSet;
use std::f64::consts::FRAC_PI_2;

/// Resolve the ordered set of segments affected by a geofence point
/// sequence already projected into the map frame.
///
/// The result is ordered by confirmation (traversal) order and independent
/// of segment insertion order. An empty result means the geometry touches
/// no usable part of the map.
pub fn resolve_affected_region(
    map: &RoadMap,
    points: &[DVec2],
    max_lane_width: f64,
) -> Vec<SegmentId> {
    let mut confirmed: Vec<SegmentId> = Vec::new();
    let mut seen: HashSet<SegmentId> = HashSet::new();

    for (idx, &pt) in points.iter().enumerate() {
        // candidate segments actually housing this point, search bounded by
        // max_lane_width rather than a fixed neighbor count
        let candidates: Vec<SegmentId> = map
            .segments_within(pt, max_lane_width)
            .into_iter()
            .filter(|id| map.segment(*id).is_some_and(|s| s.contains(pt)))
            .collect();

        if idx + 1 == points.len() {
            if confirmed.is_empty() {
                // no roots to filter against (single-point geofence, or no
                // earlier point confirmed anything): the containing segments
                // are the region
                for id in candidates {
                    if seen.insert(id) {
                        confirmed.push(id);
                    }
                }
            } else {
                // keep only candidates topologically reachable from the
                // already-confirmed path
                let graph = RoutingGraph::build(map);
                for root in confirmed.clone() {
                    for &next in graph.following(root) {
                        if candidates.contains(&next) && seen.insert(next) {
                            confirmed.push(next);
                        }
                    }
                }
            }
            break;
        }

        let next_pt = points[idx + 1];
        for id in candidates {
            if seen.contains(&id) {
                continue;
            }
            let seg = map.segment(id).expect("candidate id comes from this map");

            let (close_l, close_r) = seg.closing_line();
            if geometry::segments_intersect(close_l, close_r, pt, next_pt) {
                seen.insert(id);
                confirmed.push(id);
            } else if seg.contains(next_pt) {
                // both points inside one cell: confirmed only when the pair
                // heads towards the cell's exit
                let to_mid = seg.closing_midpoint() - pt;
                let to_next = next_pt - pt;
                if geometry::interior_angle(to_mid, to_next) < FRAC_PI_2 {
                    seen.insert(id);
                    confirmed.push(id);
                }
            }
        }
    }

    confirmed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::segment::RoadSegment;
    use glam::dvec2;

    const LANE_WIDTH: f64 = 3.7;

    fn cell(id: u64, y0: f64) -> RoadSegment {
        RoadSegment::new(
            SegmentId(id),
            vec![dvec2(0.0, y0), dvec2(0.0, y0 + 1.0)],
            vec![dvec2(1.0, y0), dvec2(1.0, y0 + 1.0)],
        )
    }

    /// Four cells stacked northbound: 1 -> 2 -> 3 -> 4.
    fn chain_map(insertion: &[u64]) -> RoadMap {
        let mut map = RoadMap::new();
        for &id in insertion {
            map.insert_segment(cell(id, (id - 1) as f64)).expect("insert");
        }
        map
    }

    #[test]
    fn test_two_point_line_across_adjacent_cells() {
        let map = chain_map(&[1, 2, 3, 4]);
        let region = resolve_affected_region(
            &map,
            &[dvec2(0.5, 0.5), dvec2(0.5, 1.5)],
            LANE_WIDTH,
        );
        assert_eq!(region, vec![SegmentId(1), SegmentId(2)]);
    }

    #[test]
    fn test_result_independent_of_insertion_order() {
        let shuffled = chain_map(&[4, 2, 1, 3]);
        let region = resolve_affected_region(
            &shuffled,
            &[dvec2(0.5, 0.5), dvec2(0.5, 1.5)],
            LANE_WIDTH,
        );
        assert_eq!(region, vec![SegmentId(1), SegmentId(2)]);
    }

    #[test]
    fn test_longer_traversal_keeps_order() {
        let map = chain_map(&[1, 2, 3, 4]);
        let region = resolve_affected_region(
            &map,
            &[dvec2(0.5, 0.5), dvec2(0.5, 1.5), dvec2(0.5, 2.5)],
            LANE_WIDTH,
        );
        assert_eq!(region, vec![SegmentId(1), SegmentId(2), SegmentId(3)]);
    }

    #[test]
    fn test_single_point_confirms_containing_cell() {
        let map = chain_map(&[1, 2, 3, 4]);
        let region = resolve_affected_region(&map, &[dvec2(0.5, 0.5)], LANE_WIDTH);
        assert_eq!(region, vec![SegmentId(1)]);
    }

    #[test]
    fn test_points_outside_resolve_empty() {
        let map = chain_map(&[1, 2, 3, 4]);
        let region = resolve_affected_region(
            &map,
            &[dvec2(50.0, 50.0), dvec2(51.0, 50.0)],
            LANE_WIDTH,
        );
        assert!(region.is_empty());
    }

    #[test]
    fn test_opposite_direction_overlap_is_filtered() {
        let mut map = chain_map(&[1, 2]);
        // southbound twin occupying the same space as cell 1
        map.insert_segment(RoadSegment::new(
            SegmentId(9),
            vec![dvec2(0.0, 1.0), dvec2(0.0, 0.0)],
            vec![dvec2(1.0, 1.0), dvec2(1.0, 0.0)],
        ))
        .expect("insert");

        // both points inside the overlap, heading north
        let region = resolve_affected_region(
            &map,
            &[dvec2(0.5, 0.2), dvec2(0.5, 0.8)],
            LANE_WIDTH,
        );
        assert_eq!(region, vec![SegmentId(1)], "southbound twin must not appear");

        // and a northbound crossing into cell 2 still excludes the twin
        let region = resolve_affected_region(
            &map,
            &[dvec2(0.5, 0.5), dvec2(0.5, 1.5)],
            LANE_WIDTH,
        );
        assert_eq!(region, vec![SegmentId(1), SegmentId(2)]);
    }

    #[test]
    fn test_interior_pair_needs_exitward_heading() {
        let map = chain_map(&[1, 2]);
        // both points inside cell 2 but heading back towards its entry
        let region = resolve_affected_region(
            &map,
            &[dvec2(0.5, 1.8), dvec2(0.5, 1.2)],
            LANE_WIDTH,
        );
        // cell 2's closing midpoint is at y=2: moving away from it, the
        // interior-angle rule rejects the cell; the final point then has no
        // roots and falls back to its containing cell
        assert_eq!(region, vec![SegmentId(2)]);
    }
}
