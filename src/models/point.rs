// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Geographic point recorded along a run.

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// A single latitude/longitude reading in WGS84 degrees.
///
/// Points are values: once recorded on a path they are never changed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

// geo uses x = longitude, y = latitude.
impl From<GeoPoint> for geo::Coord<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::coord! { x: p.longitude, y: p.latitude }
    }
}

impl From<GeoPoint> for geo::Point<f64> {
    fn from(p: GeoPoint) -> Self {
        geo::Point::new(p.longitude, p.latitude)
    }
}

impl From<geo::Coord<f64>> for GeoPoint {
    fn from(c: geo::Coord<f64>) -> Self {
        Self::new(c.y, c.x)
    }
}
