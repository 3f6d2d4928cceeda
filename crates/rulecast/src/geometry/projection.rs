// SPDX-License-Identifier: Apache-2.0 OR MIT

//! Georeference handling: proj-string parsing and frame-to-frame transforms.
//!
//! Geofence geometry arrives in the sender's local frame and must be moved
//! into the map's frame before segment resolution; control-request bounds go
//! the other way, from map coordinates back to lat/lon. Both frames are
//! described by transverse-mercator proj strings
//! (`+proj=tmerc +lat_0=.. +lon_0=.. +k=..`). Over the few kilometers a
//! geofence spans, a local tangent-plane approximation of the projection is
//! exact enough; full PROJ pipelines are a deployment concern, not ours.

use crate::{Error, Result};
use glam::DVec2;

/// WGS84 equatorial radius, meters.
const EARTH_RADIUS_M: f64 = 6_378_137.0;

/// Parsed georeference of one local frame.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjSpec {
    /// Latitude of the frame origin, degrees.
    pub lat_0: f64,
    /// Longitude of the frame origin, degrees.
    pub lon_0: f64,
    /// Scale factor (`+k`), 1.0 when absent.
    pub k: f64,
}

impl ProjSpec {
    /// Parse a `+proj=tmerc` string. `lat_0`/`lon_0` are required.
    pub fn parse(proj: &str) -> Result<Self> {
        let mut kind = None;
        let mut lat_0 = None;
        let mut lon_0 = None;
        let mut k = 1.0;

        for token in proj.split_whitespace() {
            let Some(param) = token.strip_prefix('+') else { continue };
            let mut halves = param.splitn(2, '=');
            let key = halves.next().unwrap_or_default();
            let value = halves.next();
            match (key, value) {
                ("proj", Some(v)) => kind = Some(v.to_string()),
                ("lat_0", Some(v)) => lat_0 = Some(parse_num(proj, v)?),
                ("lon_0", Some(v)) => lon_0 = Some(parse_num(proj, v)?),
                ("k", Some(v)) => k = parse_num(proj, v)?,
                _ => {}
            }
        }

        match kind.as_deref() {
            Some("tmerc") => {}
            Some(other) => {
                return Err(Error::InvalidArgument(format!(
                    "unsupported projection kind '{}' in georeference",
                    other
                )))
            }
            None => {
                return Err(Error::InvalidArgument(
                    "georeference string carries no +proj= parameter".to_string(),
                ))
            }
        }

        let (Some(lat_0), Some(lon_0)) = (lat_0, lon_0) else {
            return Err(Error::InvalidArgument(
                "georeference string is missing +lat_0/+lon_0".to_string(),
            ));
        };

        Ok(ProjSpec { lat_0, lon_0, k })
    }

    /// Project `(lat, lon)` in degrees into this frame's local meters.
    pub fn to_local(&self, lat: f64, lon: f64) -> DVec2 {
        let x = (lon - self.lon_0).to_radians() * EARTH_RADIUS_M * self.k * self.lat_0.to_radians().cos();
        let y = (lat - self.lat_0).to_radians() * EARTH_RADIUS_M * self.k;
        DVec2::new(x, y)
    }

    /// Inverse of [`to_local`](Self::to_local): local meters to `(lat, lon)` degrees.
    pub fn to_latlon(&self, p: DVec2) -> (f64, f64) {
        let lat = self.lat_0 + (p.y / (EARTH_RADIUS_M * self.k)).to_degrees();
        let lon = self.lon_0
            + (p.x / (EARTH_RADIUS_M * self.k * self.lat_0.to_radians().cos())).to_degrees();
        (lat, lon)
    }
}

fn parse_num(proj: &str, v: &str) -> Result<f64> {
    v.parse::<f64>().map_err(|_| {
        Error::InvalidArgument(format!("malformed numeric parameter '{}' in '{}'", v, proj))
    })
}

/// Transform from one local frame into another.
///
/// When both frames are described by the byte-identical proj string the
/// transform is the identity and neither string needs to parse; geofence
/// senders colocated with the map exercise exactly that path.
#[derive(Debug, Clone)]
pub enum FrameProjector {
    Identity,
    Frames { src: ProjSpec, dst: ProjSpec },
}

impl FrameProjector {
    pub fn between(src: &str, dst: &str) -> Result<Self> {
        if src == dst {
            return Ok(FrameProjector::Identity);
        }
        Ok(FrameProjector::Frames {
            src: ProjSpec::parse(src)?,
            dst: ProjSpec::parse(dst)?,
        })
    }

    /// Move a source-frame point into the destination frame.
    pub fn forward(&self, p: DVec2) -> DVec2 {
        match self {
            FrameProjector::Identity => p,
            FrameProjector::Frames { src, dst } => {
                let (lat, lon) = src.to_latlon(p);
                dst.to_local(lat, lon)
            }
        }
    }
}
