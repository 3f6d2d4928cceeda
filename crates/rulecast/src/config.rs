// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Broadcaster configuration - single source of truth for tunables.
//!
//! All numeric policy lives here; nothing else hardcodes lane widths or
//! speed bounds. Parameter loading from files or the command line is a
//! collaborator concern; embedders fill this struct however they like.

use crate::map::annotation::Speed;
use crate::{Error, Result};

/// Default search radius for matching geofence points to segments, meters.
///
/// Matches a generous interstate lane width; points farther than this from
/// any segment outline never nominate candidates.
pub const DEFAULT_MAX_LANE_WIDTH: f64 = 3.7;

/// Hard ceiling on any digital speed limit, mph.
///
/// Geofence messages asking for more are clamped with a warning.
pub const SPEED_LIMIT_CEILING_MPH: f64 = 80.0;

/// Runtime configuration of one broadcaster instance.
#[derive(Debug, Clone)]
pub struct BroadcasterConfig {
    /// Candidate search radius for affected-region resolution, meters.
    pub max_lane_width: f64,
    /// Upper bound for speed limits taken from geofence messages.
    pub speed_limit_ceiling: Speed,
    /// When set, replaces every message-provided speed limit outright
    /// (operator override; must lie in `(0, ceiling]`).
    pub speed_limit_override: Option<Speed>,
}

impl Default for BroadcasterConfig {
    fn default() -> Self {
        BroadcasterConfig {
            max_lane_width: DEFAULT_MAX_LANE_WIDTH,
            speed_limit_ceiling: Speed::from_mph(SPEED_LIMIT_CEILING_MPH),
            speed_limit_override: None,
        }
    }
}

impl BroadcasterConfig {
    /// Check the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.max_lane_width > 0.0) {
            return Err(Error::OutOfRangeValue(format!(
                "max_lane_width must be positive, got {}",
                self.max_lane_width
            )));
        }
        if !(self.speed_limit_ceiling > Speed::ZERO) {
            return Err(Error::OutOfRangeValue(format!(
                "speed_limit_ceiling must be positive, got {}",
                self.speed_limit_ceiling
            )));
        }
        if let Some(limit) = self.speed_limit_override {
            if !(limit > Speed::ZERO) || limit > self.speed_limit_ceiling {
                return Err(Error::OutOfRangeValue(format!(
                    "speed_limit_override {} outside (0, {}]",
                    limit, self.speed_limit_ceiling
                )));
            }
        }
        Ok(())
    }

    /// Resolve the speed limit actually attached to the map for a message
    /// asking for `requested`: the operator override wins when configured,
    /// and out-of-range values clamp to `[0, ceiling]` with a warning.
    pub fn effective_speed_limit(&self, requested: Speed) -> Speed {
        let chosen = self.speed_limit_override.unwrap_or(requested);
        if chosen > self.speed_limit_ceiling {
            log::warn!(
                "[config] speed limit {} exceeds ceiling {}, clamping",
                chosen,
                self.speed_limit_ceiling
            );
            return self.speed_limit_ceiling;
        }
        if chosen < Speed::ZERO {
            log::warn!("[config] negative speed limit {}, clamping to zero", chosen);
            return Speed::ZERO;
        }
        chosen
    }
}
