// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Directed routing graph over the map's segments.
//!
//! Segment B follows segment A when A's exit edge coincides with B's entry
//! edge (both boundary endpoints, within snap tolerance). Two segments
//! occupying the same space in opposite directions therefore never connect,
//! which is exactly what the affected-region resolver relies on to discard
//! the wrong carriageway.

use super::segment::{RoadSegment, SegmentId};
use super::RoadMap;
use glam::DVec2;
use std::collections::HashMap;

/// Boundary endpoints closer than this are the same junction, in meters.
const EDGE_SNAP_EPS: f64 = 1e-6;

fn entry_direction(seg: &RoadSegment) -> DVec2 {
    let c = seg.centerline();
    c[1] - c[0]
}

fn exit_direction(seg: &RoadSegment) -> DVec2 {
    let c = seg.centerline();
    c[c.len() - 1] - c[c.len() - 2]
}

/// `following`/`preceding` adjacency of one map snapshot.
///
/// The graph is a derived index; rebuild it after segments are added. Rule
/// annotation changes do not affect connectivity.
#[derive(Debug, Default)]
pub struct RoutingGraph {
    following: HashMap<SegmentId, Vec<SegmentId>>,
    preceding: HashMap<SegmentId, Vec<SegmentId>>,
}

impl RoutingGraph {
    /// Build the adjacency for every segment pair of `map`.
    pub fn build(map: &RoadMap) -> Self {
        let mut graph = RoutingGraph::default();
        for a in map.segments() {
            let (exit_l, exit_r) = a.closing_line();
            for b in map.segments() {
                if a.id() == b.id() {
                    continue;
                }
                let (entry_l, entry_r) = b.entry_line();
                // shared junction, and travel direction must continue: a
                // segment re-entering the junction the other way (the
                // opposite carriageway) is not a successor
                if exit_l.distance(entry_l) <= EDGE_SNAP_EPS
                    && exit_r.distance(entry_r) <= EDGE_SNAP_EPS
                    && exit_direction(a).dot(entry_direction(b)) > 0.0
                {
                    graph.following.entry(a.id()).or_default().push(b.id());
                    graph.preceding.entry(b.id()).or_default().push(a.id());
                }
            }
        }
        graph
    }

    /// Segments reachable directly after `id`.
    pub fn following(&self, id: SegmentId) -> &[SegmentId] {
        self.following.get(&id).map_or(&[], Vec::as_slice)
    }

    /// Segments leading directly into `id`.
    pub fn preceding(&self, id: SegmentId) -> &[SegmentId] {
        self.preceding.get(&id).map_or(&[], Vec::as_slice)
    }
}
