// SPDX-License-Identifier: Apache-2.0 OR MIT

//! The shared road-network map.
//!
//! `RoadMap` is a single-writer arena: it owns every [`RoadSegment`] and
//! every [`RuleAnnotation`] and hands out ids, never pointers. Cross
//! references (segment -> annotation, geofence bookkeeping, diffs) are all
//! id-based, so annotations can be detached and re-attached during geofence
//! revert without any dangling-reference risk.
//!
//! The broadcaster keeps two copies: the compliance-normalized base map as
//! loaded, and the current map that geofence patches mutate. `Clone` gives a
//! deep, independent copy.

pub mod annotation;
pub mod conformer;
pub mod routing;
pub mod segment;

use crate::{Error, Result};
use annotation::{AnnotationId, RuleAnnotation};
use glam::DVec2;
use segment::{RoadSegment, SegmentId};
use std::collections::{BTreeMap, HashMap};

/// Arena owning all segments and rule annotations of one map.
#[derive(Debug, Clone, Default)]
pub struct RoadMap {
    // BTreeMap keeps iteration deterministic regardless of insertion order.
    segments: BTreeMap<SegmentId, RoadSegment>,
    annotations: HashMap<AnnotationId, RuleAnnotation>,
    next_annotation: u64,
}

impl RoadMap {
    pub fn new() -> Self {
        RoadMap::default()
    }

    /// Number of segments.
    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Add a segment to the arena. Ids must be unique.
    pub fn insert_segment(&mut self, segment: RoadSegment) -> Result<()> {
        let id = segment.id();
        if self.segments.contains_key(&id) {
            return Err(Error::InvalidArgument(format!(
                "segment {} already exists in the map",
                id
            )));
        }
        self.segments.insert(id, segment);
        Ok(())
    }

    pub fn segment(&self, id: SegmentId) -> Option<&RoadSegment> {
        self.segments.get(&id)
    }

    /// All segments in id order.
    pub fn segments(&self) -> impl Iterator<Item = &RoadSegment> {
        self.segments.values()
    }

    pub fn segment_ids(&self) -> impl Iterator<Item = SegmentId> + '_ {
        self.segments.keys().copied()
    }

    /// Take ownership of a new annotation and return its arena id.
    pub fn register_annotation(&mut self, annotation: RuleAnnotation) -> AnnotationId {
        let id = AnnotationId(self.next_annotation);
        self.next_annotation += 1;
        self.annotations.insert(id, annotation);
        id
    }

    pub fn annotation(&self, id: AnnotationId) -> Option<&RuleAnnotation> {
        self.annotations.get(&id)
    }

    pub(crate) fn annotation_mut(&mut self, id: AnnotationId) -> Option<&mut RuleAnnotation> {
        self.annotations.get_mut(&id)
    }

    /// Annotation ids of the arena, unordered.
    pub fn annotation_ids(&self) -> impl Iterator<Item = AnnotationId> + '_ {
        self.annotations.keys().copied()
    }

    /// Link an annotation to a segment. Returns whether a new link was made
    /// (linking twice is a no-op).
    pub fn attach(&mut self, seg: SegmentId, ann: AnnotationId) -> Result<bool> {
        if !self.annotations.contains_key(&ann) {
            return Err(Error::InvalidArgument(format!("unknown annotation {}", ann)));
        }
        let segment = self
            .segments
            .get_mut(&seg)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown segment {}", seg)))?;
        Ok(segment.link(ann))
    }

    /// Remove an annotation link from a segment. Returns whether a link was
    /// removed. The annotation object itself stays in the arena so its id
    /// remains valid for later re-attachment.
    pub fn detach(&mut self, seg: SegmentId, ann: AnnotationId) -> Result<bool> {
        let segment = self
            .segments
            .get_mut(&seg)
            .ok_or_else(|| Error::InvalidArgument(format!("unknown segment {}", seg)))?;
        Ok(segment.unlink(ann))
    }

    /// Annotations currently linked to `seg`, in link order. Empty for an
    /// unknown segment.
    pub fn annotations_on(&self, seg: SegmentId) -> Vec<(AnnotationId, &RuleAnnotation)> {
        let Some(segment) = self.segments.get(&seg) else {
            return Vec::new();
        };
        segment
            .annotations()
            .iter()
            .filter_map(|id| self.annotations.get(id).map(|a| (*id, a)))
            .collect()
    }

    /// Segments whose outline lies within `max_dist` of `p`, nearest first
    /// (ties broken by id).
    pub fn segments_within(&self, p: DVec2, max_dist: f64) -> Vec<SegmentId> {
        let mut hits: Vec<(f64, SegmentId)> = self
            .segments
            .values()
            .filter_map(|s| {
                let d = s.distance_to(p);
                (d <= max_dist).then_some((d, s.id()))
            })
            .collect();
        hits.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)));
        hits.into_iter().map(|(_, id)| id).collect()
    }

    /// The segment nearest to `p`, if the map has any.
    pub fn nearest_segment(&self, p: DVec2) -> Option<SegmentId> {
        self.segments
            .values()
            .map(|s| (s.distance_to(p), s.id()))
            .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal).then(a.1.cmp(&b.1)))
            .map(|(_, id)| id)
    }
}
