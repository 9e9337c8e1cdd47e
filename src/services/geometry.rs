// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Path geometry: distance, step estimates, territory rings, and
//! GeoJSON / polyline conversions for recorded tracks.

use crate::models::GeoPoint;
use geo::{Distance, Haversine, LineString, Point, Polygon};
use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use std::fs;
use std::path::Path;

/// Average stride used to turn distance into steps.
pub const STEP_LENGTH_METERS: f64 = 0.78;

/// A path needs this many points before it encloses a territory.
pub const MIN_TERRITORY_POINTS: usize = 3;

/// Great-circle length of the path in meters.
pub fn path_distance_meters(path: &[GeoPoint]) -> f64 {
    path.windows(2)
        .map(|pair| Haversine.distance(Point::from(pair[0]), Point::from(pair[1])))
        .sum()
}

/// Steps walked over `distance_meters`, rounded to the nearest step.
pub fn estimated_steps(distance_meters: f64) -> u32 {
    (distance_meters / STEP_LENGTH_METERS).round() as u32
}

/// The path closed back onto its first point, if it can enclose an area.
pub fn closing_ring(path: &[GeoPoint]) -> Option<Vec<GeoPoint>> {
    if path.len() < MIN_TERRITORY_POINTS {
        return None;
    }
    let mut ring = Vec::with_capacity(path.len() + 1);
    ring.extend_from_slice(path);
    ring.push(path[0]);
    Some(ring)
}

pub fn line_string(path: &[GeoPoint]) -> LineString<f64> {
    path.iter().map(|p| geo::Coord::from(*p)).collect()
}

/// Territory polygon for a finished path.
pub fn territory_polygon(path: &[GeoPoint]) -> Option<Polygon<f64>> {
    let ring = closing_ring(path)?;
    Some(Polygon::new(line_string(&ring), vec![]))
}

/// Encode the path as a Google polyline (precision 5).
pub fn encode_path(path: &[GeoPoint]) -> Result<String, TrackError> {
    polyline::encode_coordinates(path.iter().map(|p| geo::Coord::from(*p)), 5)
        .map_err(|e| TrackError::Polyline(e.to_string()))
}

/// GeoJSON features for a finished run: the path and, if any, its territory.
pub fn run_feature_collection(path: &[GeoPoint]) -> FeatureCollection {
    let mut features = Vec::new();

    if !path.is_empty() {
        let mut feature = feature_of(Value::from(&line_string(path)));
        feature.set_property("kind", "path");
        features.push(feature);
    }

    if let Some(polygon) = territory_polygon(path) {
        let mut feature = feature_of(Value::from(&polygon));
        feature.set_property("kind", "territory");
        feature.set_property("distance_meters", path_distance_meters(path));
        features.push(feature);
    }

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

fn feature_of(value: Value) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: None,
        foreign_members: None,
    }
}

/// Load a track from a GeoJSON file.
pub fn load_track_from_file<P: AsRef<Path>>(path: P) -> Result<Vec<GeoPoint>, TrackError> {
    let json_data =
        fs::read_to_string(path.as_ref()).map_err(|e| TrackError::IoError(e.to_string()))?;
    load_track_from_json(&json_data)
}

/// Load a track from GeoJSON text.
///
/// Accepts a bare geometry, a feature, or a collection; the first
/// `LineString` (or `MultiLineString`, flattened) found is used.
pub fn load_track_from_json(json_data: &str) -> Result<Vec<GeoPoint>, TrackError> {
    let geojson: GeoJson = json_data
        .parse()
        .map_err(|e: geojson::Error| TrackError::ParseError(e.to_string()))?;

    let points = match &geojson {
        GeoJson::Geometry(geometry) => points_from_geometry(geometry),
        GeoJson::Feature(feature) => feature.geometry.as_ref().and_then(points_from_geometry),
        GeoJson::FeatureCollection(collection) => collection
            .features
            .iter()
            .filter_map(|f| f.geometry.as_ref())
            .find_map(points_from_geometry),
    }
    .ok_or(TrackError::NoLineString)?;

    tracing::debug!(points = points.len(), "Loaded track");
    Ok(points)
}

fn points_from_geometry(geometry: &Geometry) -> Option<Vec<GeoPoint>> {
    let positions: Vec<&Vec<f64>> = match &geometry.value {
        Value::LineString(line) => line.iter().collect(),
        Value::MultiLineString(lines) => lines.iter().flatten().collect(),
        _ => return None,
    };

    Some(
        positions
            .into_iter()
            .filter(|pos| pos.len() >= 2)
            .map(|pos| GeoPoint::new(pos[1], pos[0]))
            .collect(),
    )
}

/// Errors from track loading and encoding.
#[derive(Debug, thiserror::Error)]
pub enum TrackError {
    #[error("Failed to read file: {0}")]
    IoError(String),

    #[error("Failed to parse GeoJSON: {0}")]
    ParseError(String),

    #[error("No LineString geometry found")]
    NoLineString,

    #[error("Failed to encode polyline: {0}")]
    Polyline(String),
}
