// SPDX-License-Identifier: Apache-2.0 OR MIT

//! 2-D geometry primitives for map queries.
//!
//! Everything operates on `glam::DVec2` in the map's local metric frame.
//! The map itself stores boundary polylines; this module supplies the
//! point/polygon/segment predicates the resolver and proximity queries
//! are built from.

pub mod projection;

use glam::DVec2;

/// Tolerance for on-boundary and endpoint-continuity checks, in meters.
pub const GEOM_EPS: f64 = 1e-9;

/// Axis-aligned bounding box over map-frame points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox2 {
    pub min: DVec2,
    pub max: DVec2,
}

impl BoundingBox2 {
    /// Tightest box around `points`. Returns `None` for an empty slice.
    pub fn from_points(points: &[DVec2]) -> Option<Self> {
        let first = *points.first()?;
        let mut bb = BoundingBox2 { min: first, max: first };
        for p in &points[1..] {
            bb.min = bb.min.min(*p);
            bb.max = bb.max.max(*p);
        }
        Some(bb)
    }

    /// Smallest box covering both boxes.
    pub fn union(self, other: BoundingBox2) -> BoundingBox2 {
        BoundingBox2 {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn width(self) -> f64 {
        self.max.x - self.min.x
    }

    pub fn height(self) -> f64 {
        self.max.y - self.min.y
    }
}

fn orientation(a: DVec2, b: DVec2, c: DVec2) -> f64 {
    (b - a).perp_dot(c - a)
}

fn on_segment(a: DVec2, b: DVec2, p: DVec2) -> bool {
    orientation(a, b, p).abs() <= GEOM_EPS
        && p.x >= a.x.min(b.x) - GEOM_EPS
        && p.x <= a.x.max(b.x) + GEOM_EPS
        && p.y >= a.y.min(b.y) - GEOM_EPS
        && p.y <= a.y.max(b.y) + GEOM_EPS
}

/// Whether segment `(a1, a2)` intersects segment `(b1, b2)`, endpoints
/// and collinear overlap included.
pub fn segments_intersect(a1: DVec2, a2: DVec2, b1: DVec2, b2: DVec2) -> bool {
    let d1 = orientation(b1, b2, a1);
    let d2 = orientation(b1, b2, a2);
    let d3 = orientation(a1, a2, b1);
    let d4 = orientation(a1, a2, b2);

    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }

    on_segment(b1, b2, a1) || on_segment(b1, b2, a2) || on_segment(a1, a2, b1) || on_segment(a1, a2, b2)
}

/// Distance from `p` to segment `(a, b)`.
pub fn distance_to_segment(p: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= GEOM_EPS * GEOM_EPS {
        return p.distance(a);
    }
    let t = ((p - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    p.distance(a + ab * t)
}

/// Even-odd point-in-polygon test; points on the boundary count as inside.
pub fn point_in_polygon(p: DVec2, polygon: &[DVec2]) -> bool {
    if polygon.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        let (a, b) = (polygon[j], polygon[i]);
        if on_segment(a, b, p) {
            return true;
        }
        if (a.y > p.y) != (b.y > p.y) {
            let x_cross = a.x + (p.y - a.y) / (b.y - a.y) * (b.x - a.x);
            if p.x < x_cross {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Distance from `p` to a polygon outline; 0 when `p` is inside.
pub fn distance_to_polygon(p: DVec2, polygon: &[DVec2]) -> f64 {
    if point_in_polygon(p, polygon) {
        return 0.0;
    }
    let mut best = f64::INFINITY;
    let mut j = polygon.len() - 1;
    for i in 0..polygon.len() {
        best = best.min(distance_to_segment(p, polygon[j], polygon[i]));
        j = i;
    }
    best
}

/// Interior angle between two vectors, in radians within `[0, pi]`.
pub fn interior_angle(a: DVec2, b: DVec2) -> f64 {
    let denom = a.length() * b.length();
    if denom <= GEOM_EPS {
        return 0.0;
    }
    (a.dot(b) / denom).clamp(-1.0, 1.0).acos()
}

/// Position of a point relative to a directed centerline.
///
/// `downtrack` is the arc length of the point's projection measured from
/// the start of the centerline; negative when the point projects before
/// the start, larger than the total length when it projects past the end.
/// `crosstrack` is the lateral offset, positive to the left of travel.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackPos {
    pub downtrack: f64,
    pub crosstrack: f64,
}

/// Project `p` onto the polyline `centerline` and report track coordinates.
///
/// Returns `None` when the centerline has fewer than two points.
pub fn track_pos(centerline: &[DVec2], p: DVec2) -> Option<TrackPos> {
    if centerline.len() < 2 {
        return None;
    }

    let mut best_dist = f64::INFINITY;
    let mut best = TrackPos { downtrack: 0.0, crosstrack: 0.0 };
    let mut len_before = 0.0;

    for (i, pair) in centerline.windows(2).enumerate() {
        let (a, b) = (pair[0], pair[1]);
        let ab = b - a;
        let seg_len = ab.length();
        if seg_len <= GEOM_EPS {
            continue;
        }
        let dir = ab / seg_len;
        let raw_t = (p - a).dot(dir) / seg_len;

        // only the first segment extends backwards and the last forwards
        let lo = if i == 0 { f64::NEG_INFINITY } else { 0.0 };
        let hi = if i + 2 == centerline.len() { f64::INFINITY } else { 1.0 };
        let t = raw_t.clamp(lo, hi);

        let closest = a + ab * t.clamp(0.0, 1.0);
        let dist = p.distance(closest);
        if dist < best_dist {
            best_dist = dist;
            best = TrackPos {
                downtrack: len_before + t * seg_len,
                crosstrack: dir.perp_dot(p - a),
            };
        }
        len_before += seg_len;
    }

    Some(best)
}
