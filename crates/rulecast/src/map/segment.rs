// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Road segments: the atomic directed units of the map graph.

use crate::geometry::{self, BoundingBox2};
use crate::map::annotation::AnnotationId;
use glam::DVec2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a road segment within one map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SegmentId(pub u64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seg:{}", self.0)
    }
}

/// Lane-boundary marking, which the conformer turns into a default passing
/// restriction when no explicit one exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryMarking {
    Solid,
    Dashed,
}

/// A directed road cell with left/right boundary polylines.
///
/// Both boundaries run in travel direction: the first points form the entry
/// edge, the last points the exit edge. Rule annotations are linked by id;
/// the map arena owns the annotation objects.
#[derive(Debug, Clone)]
pub struct RoadSegment {
    id: SegmentId,
    left_bound: Vec<DVec2>,
    right_bound: Vec<DVec2>,
    left_marking: BoundaryMarking,
    right_marking: BoundaryMarking,
    annotations: Vec<AnnotationId>,
}

impl RoadSegment {
    /// Build a segment from its two boundary polylines (at least two points
    /// each, sampled in travel direction). Markings default to dashed.
    pub fn new(id: SegmentId, left_bound: Vec<DVec2>, right_bound: Vec<DVec2>) -> Self {
        debug_assert!(left_bound.len() >= 2 && right_bound.len() >= 2);
        RoadSegment {
            id,
            left_bound,
            right_bound,
            left_marking: BoundaryMarking::Dashed,
            right_marking: BoundaryMarking::Dashed,
            annotations: Vec::new(),
        }
    }

    pub fn with_markings(mut self, left: BoundaryMarking, right: BoundaryMarking) -> Self {
        self.left_marking = left;
        self.right_marking = right;
        self
    }

    pub fn id(&self) -> SegmentId {
        self.id
    }

    pub fn left_bound(&self) -> &[DVec2] {
        &self.left_bound
    }

    pub fn right_bound(&self) -> &[DVec2] {
        &self.right_bound
    }

    pub fn left_marking(&self) -> BoundaryMarking {
        self.left_marking
    }

    pub fn right_marking(&self) -> BoundaryMarking {
        self.right_marking
    }

    /// Annotation ids currently linked to this segment.
    pub fn annotations(&self) -> &[AnnotationId] {
        &self.annotations
    }

    pub(crate) fn link(&mut self, ann: AnnotationId) -> bool {
        if self.annotations.contains(&ann) {
            return false;
        }
        self.annotations.push(ann);
        true
    }

    pub(crate) fn unlink(&mut self, ann: AnnotationId) -> bool {
        let before = self.annotations.len();
        self.annotations.retain(|a| *a != ann);
        self.annotations.len() != before
    }

    /// Outline polygon: left boundary forward, right boundary reversed.
    pub fn polygon(&self) -> Vec<DVec2> {
        let mut ring = self.left_bound.clone();
        ring.extend(self.right_bound.iter().rev());
        ring
    }

    /// Entry edge: the first points of the two boundaries.
    pub fn entry_line(&self) -> (DVec2, DVec2) {
        (self.left_bound[0], self.right_bound[0])
    }

    /// Closing line: the line between the terminal points of the two
    /// boundaries, i.e. the segment's exit edge.
    pub fn closing_line(&self) -> (DVec2, DVec2) {
        (
            *self.left_bound.last().expect("boundary has points"),
            *self.right_bound.last().expect("boundary has points"),
        )
    }

    /// Midpoint of the closing line.
    pub fn closing_midpoint(&self) -> DVec2 {
        let (l, r) = self.closing_line();
        (l + r) * 0.5
    }

    /// Centerline approximated by pairwise boundary midpoints.
    pub fn centerline(&self) -> Vec<DVec2> {
        self.left_bound
            .iter()
            .zip(self.right_bound.iter())
            .map(|(l, r)| (*l + *r) * 0.5)
            .collect()
    }

    pub fn contains(&self, p: DVec2) -> bool {
        geometry::point_in_polygon(p, &self.polygon())
    }

    /// Distance from `p` to this segment's outline; 0 inside.
    pub fn distance_to(&self, p: DVec2) -> f64 {
        geometry::distance_to_polygon(p, &self.polygon())
    }

    pub fn bounding_box(&self) -> BoundingBox2 {
        BoundingBox2::from_points(&self.polygon()).expect("segment has boundary points")
    }
}
