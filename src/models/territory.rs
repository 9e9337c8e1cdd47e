// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Claimed territory model.

use crate::models::GeoPoint;
use serde::{Deserialize, Serialize};

/// A territory currently held by some user, from `/territories/active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Territory {
    pub id: u64,
    /// GeoJSON polygon; coordinates are `[longitude, latitude]`
    #[serde(default)]
    pub polygon: Option<geojson::Geometry>,
    pub area_square_meters: Option<f64>,
    #[serde(default, deserialize_with = "crate::models::run::null_as_false")]
    pub is_active: bool,
}

impl Territory {
    /// Exterior ring of the polygon, if the geometry is a polygon.
    pub fn ring(&self) -> Option<Vec<GeoPoint>> {
        match &self.polygon.as_ref()?.value {
            geojson::Value::Polygon(rings) => {
                let exterior = rings.first()?;
                let points: Vec<GeoPoint> = exterior
                    .iter()
                    .filter(|pos| pos.len() >= 2)
                    .map(|pos| GeoPoint::new(pos[1], pos[0]))
                    .collect();
                (!points.is_empty()).then_some(points)
            }
            _ => None,
        }
    }
}
