// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Rule annotations attached to road segments.
//!
//! A rule annotation is a traffic rule (digital speed limit, passing
//! restriction) owned by the map arena and linked to segments by id.
//! The annotation kinds form a closed enum: adding a new kind requires a
//! new variant arm everywhere, enforced at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a rule annotation, unique within one map arena.
///
/// Ids stay stable across detach/re-attach cycles, so undo bookkeeping can
/// reference displaced annotations without holding onto the objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnnotationId(pub u64);

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ann:{}", self.0)
    }
}

/// Road users a rule applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Participant {
    Car,
    Truck,
    Bus,
    Motorcycle,
    Bicycle,
    Pedestrian,
    Emergency,
}

impl Participant {
    /// Every participant class, used when a message names no one explicitly.
    pub fn all() -> Vec<Participant> {
        vec![
            Participant::Car,
            Participant::Truck,
            Participant::Bus,
            Participant::Motorcycle,
            Participant::Bicycle,
            Participant::Pedestrian,
            Participant::Emergency,
        ]
    }
}

/// Which boundary of a segment a passing restriction governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BoundarySide {
    Left,
    Right,
}

/// Speed stored canonically in meters per second.
///
/// Inbound messages carry m/s; the constructors exist because road signage
/// (and the configured ceiling) is usually given in km/h or mph.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Speed(f64);

impl Speed {
    pub const ZERO: Speed = Speed(0.0);

    pub fn from_mps(mps: f64) -> Self {
        Speed(mps)
    }

    pub fn from_kmh(kmh: f64) -> Self {
        Speed(kmh / 3.6)
    }

    pub fn from_mph(mph: f64) -> Self {
        Speed(mph * 0.44704)
    }

    pub fn as_mps(self) -> f64 {
        self.0
    }

    pub fn as_kmh(self) -> f64 {
        self.0 * 3.6
    }

    pub fn as_mph(self) -> f64 {
        self.0 / 0.44704
    }

    /// Clamp into `[lo, hi]`.
    pub fn clamp(self, lo: Speed, hi: Speed) -> Speed {
        Speed(self.0.clamp(lo.0, hi.0))
    }
}

impl fmt::Display for Speed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} m/s", self.0)
    }
}

/// Discriminant of a rule annotation, used for displacement matching and
/// status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuleKind {
    SpeedLimit,
    PassingRestriction,
}

/// A traffic rule attachable to road segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RuleAnnotation {
    /// Digital speed limit band for the named participants.
    SpeedLimit {
        min: Speed,
        max: Speed,
        participants: Vec<Participant>,
    },
    /// Restricts who may cross one boundary side of the segment.
    PassingRestriction {
        side: BoundarySide,
        allowed: Vec<Participant>,
    },
}

impl RuleAnnotation {
    pub fn kind(&self) -> RuleKind {
        match self {
            RuleAnnotation::SpeedLimit { .. } => RuleKind::SpeedLimit,
            RuleAnnotation::PassingRestriction { .. } => RuleKind::PassingRestriction,
        }
    }

    /// Whether applying `self` displaces `existing` from a segment.
    ///
    /// Same-kind annotations displace each other; passing restrictions
    /// additionally only displace a restriction governing the same boundary
    /// side (a lane usually carries one restriction per side).
    pub fn displaces(&self, existing: &RuleAnnotation) -> bool {
        match (self, existing) {
            (RuleAnnotation::SpeedLimit { .. }, RuleAnnotation::SpeedLimit { .. }) => true,
            (
                RuleAnnotation::PassingRestriction { side: new_side, .. },
                RuleAnnotation::PassingRestriction { side: old_side, .. },
            ) => new_side == old_side,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_speed_conversions() {
        let s = Speed::from_kmh(36.0);
        assert!((s.as_mps() - 10.0).abs() < 1e-9);
        assert!((s.as_kmh() - 36.0).abs() < 1e-9);

        let m = Speed::from_mph(80.0);
        assert!((m.as_mps() - 35.7632).abs() < 1e-4);
    }

    #[test]
    fn test_speed_clamp() {
        let ceiling = Speed::from_mph(80.0);
        let over = Speed::from_mph(95.0);
        assert_eq!(over.clamp(Speed::ZERO, ceiling), ceiling);

        let negative = Speed::from_mps(-3.0);
        assert_eq!(negative.clamp(Speed::ZERO, ceiling), Speed::ZERO);
    }

    #[test]
    fn test_speed_limit_displaces_speed_limit() {
        let new = RuleAnnotation::SpeedLimit {
            min: Speed::ZERO,
            max: Speed::from_kmh(10.0),
            participants: vec![Participant::Car],
        };
        let old = RuleAnnotation::SpeedLimit {
            min: Speed::ZERO,
            max: Speed::from_kmh(5.0),
            participants: vec![Participant::Car],
        };
        assert!(new.displaces(&old));
        assert_eq!(new.kind(), RuleKind::SpeedLimit);
    }

    #[test]
    fn test_passing_restriction_side_match() {
        let left = RuleAnnotation::PassingRestriction {
            side: BoundarySide::Left,
            allowed: vec![],
        };
        let right = RuleAnnotation::PassingRestriction {
            side: BoundarySide::Right,
            allowed: Participant::all(),
        };
        assert!(!left.displaces(&right));
        assert!(left.displaces(&left.clone()));
    }

    #[test]
    fn test_cross_kind_never_displaces() {
        let limit = RuleAnnotation::SpeedLimit {
            min: Speed::ZERO,
            max: Speed::from_kmh(50.0),
            participants: vec![Participant::Car],
        };
        let restriction = RuleAnnotation::PassingRestriction {
            side: BoundarySide::Left,
            allowed: vec![],
        };
        assert!(!limit.displaces(&restriction));
        assert!(!restriction.displaces(&limit));
    }
}
