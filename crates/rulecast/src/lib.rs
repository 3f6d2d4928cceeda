// SPDX-License-Identifier: Apache-2.0 OR MIT

//! # rulecast - dynamic traffic-rule broadcasting
//!
//! `rulecast` ingests time-bounded geofence notifications, resolves which
//! parts of a shared road-network map they affect, schedules their
//! activation and deactivation, applies (and exactly reverts) the resulting
//! rule annotations on the live map, and republishes the deltas together
//! with proximity queries about currently-active rules.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use rulecast::{Broadcaster, BroadcasterConfig, Result};
//! use rulecast::scheduler::timer::system_timing;
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let (clock, timers) = system_timing();
//!     let broadcaster = Broadcaster::new(
//!         BroadcasterConfig::default(),
//!         Arc::new(MySink),
//!         clock,
//!         timers,
//!     )?;
//!
//!     broadcaster.load_base_map(load_map_somehow())?;
//!     broadcaster.set_georeference("+proj=tmerc +lat_0=39.4 +lon_0=-76.1 +k=1");
//!
//!     // inbound messages now flow through broadcaster.ingest_geofence(..)
//!     Ok(())
//! }
//! # struct MySink;
//! # impl rulecast::BroadcastSink for MySink {
//! #     fn publish_map(&self, _: &rulecast::RoadMap) {}
//! #     fn publish_diff(&self, _: &rulecast::MapDiff) {}
//! #     fn publish_request(&self, _: &rulecast::messages::TrafficControlRequest) {}
//! #     fn publish_active_status(&self, _: &rulecast::messages::ActiveRuleStatus) {}
//! # }
//! # fn load_map_somehow() -> rulecast::RoadMap { rulecast::RoadMap::new() }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------------+
//! |                          Broadcaster                               |
//! |  correlation gating | active-region index | publication (sink)    |
//! +--------------------------------------------------------------------+
//! |   Resolver          |   GeofenceScheduler    |   PatchApplier      |
//! |   points->segments  |   timers + lifecycle   |   apply / revert    |
//! +--------------------------------------------------------------------+
//! |                      RoadMap (id arena)                            |
//! |   RoadSegment | RuleAnnotation | RoutingGraph | Conformer          |
//! +--------------------------------------------------------------------+
//! |        Geometry / Projection        |        Schedule              |
//! +--------------------------------------------------------------------+
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Broadcaster`] | Entry point: owns the map, scheduler, and indexes |
//! | [`RoadMap`] | Id-based arena of segments and rule annotations |
//! | [`Schedule`] | Pure validity/repeat window arithmetic |
//! | [`GeofenceRecord`] | One accepted geofence with its undo bookkeeping |
//! | [`BroadcastSink`] | Outbound seam towards the transport layer |

/// The orchestrator: validation pipeline, callbacks, queries, publication.
pub mod broadcaster;
/// Runtime configuration and policy constants.
pub mod config;
/// Geofence records and their patch bookkeeping.
pub mod geofence;
/// 2-D primitives and georeference projection.
pub mod geometry;
/// The shared road-network map arena and its derived structures.
pub mod map;
/// Wire-facing inbound/outbound message types.
pub mod messages;
/// Reversible application of rule annotations onto the live map.
pub mod patch;
/// Point-sequence to affected-segment resolution.
pub mod resolver;
/// Validity schedules and timestamps.
pub mod schedule;
/// Geofence lifecycle scheduling and the clock/timer abstraction.
pub mod scheduler;

pub use broadcaster::{BroadcastSink, Broadcaster};
pub use config::BroadcasterConfig;
pub use geofence::GeofenceRecord;
pub use map::annotation::{
    AnnotationId, BoundarySide, Participant, RuleAnnotation, RuleKind, Speed,
};
pub use map::segment::{BoundaryMarking, RoadSegment, SegmentId};
pub use map::RoadMap;
pub use messages::{MapDiff, TrafficControlMessage};
pub use schedule::{Schedule, Timestamp};
pub use scheduler::{GeofenceScheduler, GeofenceState};

/// Errors returned by rulecast operations.
///
/// Recoverable ingest conditions (replays, unsolicited responses, geometry
/// that resolves to nothing) never escape [`Broadcaster::ingest_geofence`];
/// they are logged and the message is dropped. What does escape is setup
/// misuse (`InvalidState`), bad inputs (`InvalidArgument`), and
/// configuration outside its documented bounds (`OutOfRangeValue`).
#[derive(Debug)]
pub enum Error {
    /// Operation requires state that is not loaded yet (map, georeference).
    InvalidState(String),
    /// Malformed or out-of-domain input (proj strings, unknown ids,
    /// inverted schedules, off-map query positions).
    InvalidArgument(String),
    /// Inbound geofence echoes a correlation id this instance never issued.
    UnknownCorrelation(String),
    /// Inbound geofence id was already processed.
    DuplicateGeofence(String),
    /// Geofence geometry resolved to no road segments.
    EmptyAffectedRegion,
    /// Configured value outside its permitted range.
    OutOfRangeValue(String),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Error::InvalidArgument(msg) => write!(f, "invalid argument: {}", msg),
            Error::UnknownCorrelation(reqid) => {
                write!(f, "unknown correlation id: {}", reqid)
            }
            Error::DuplicateGeofence(id) => write!(f, "duplicate geofence: {}", id),
            Error::EmptyAffectedRegion => write!(f, "geofence affects no road segments"),
            Error::OutOfRangeValue(msg) => write!(f, "value out of range: {}", msg),
        }
    }
}

impl std::error::Error for Error {}

/// Convenient alias for API results using the crate's [`Error`] type.
pub type Result<T> = core::result::Result<T, Error>;

/// rulecast version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
