// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Map widget seam.
//!
//! The controller only tells the widget what to show; tiles, styling and
//! viewport behavior belong to the widget.

use crate::models::GeoPoint;
use std::sync::{Arc, Mutex, PoisonError};

/// Center shown before the first fix (SRM KTR campus).
pub const DEFAULT_CENTER: GeoPoint = GeoPoint::new(12.8232, 80.0452);

/// Display surface for a run.
pub trait MapView: Send + 'static {
    /// Move the view (and the runner marker) to `point`.
    fn set_center(&mut self, point: GeoPoint);

    /// Append a point to the live path polyline.
    fn extend_path(&mut self, point: GeoPoint);

    /// Draw the closed territory for the finished run.
    fn draw_territory(&mut self, ring: &[GeoPoint]);

    /// Draw a territory held by another user.
    fn draw_claimed(&mut self, ring: &[GeoPoint]);
}

/// Everything drawn so far on a [`RecordingMap`].
#[derive(Debug, Clone, PartialEq)]
pub struct MapState {
    pub center: GeoPoint,
    pub path: Vec<GeoPoint>,
    pub territory: Option<Vec<GeoPoint>>,
    pub claimed: Vec<Vec<GeoPoint>>,
}

impl Default for MapState {
    fn default() -> Self {
        Self {
            center: DEFAULT_CENTER,
            path: Vec::new(),
            territory: None,
            claimed: Vec::new(),
        }
    }
}

/// In-memory map whose clones share one [`MapState`].
///
/// Used headless: the CLI exports from it once the run is over.
#[derive(Clone, Default)]
pub struct RecordingMap {
    state: Arc<Mutex<MapState>>,
}

impl RecordingMap {
    pub fn snapshot(&self) -> MapState {
        self.with_state(|s| s.clone())
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut MapState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }
}

impl MapView for RecordingMap {
    fn set_center(&mut self, point: GeoPoint) {
        self.with_state(|s| s.center = point);
    }

    fn extend_path(&mut self, point: GeoPoint) {
        self.with_state(|s| s.path.push(point));
    }

    fn draw_territory(&mut self, ring: &[GeoPoint]) {
        self.with_state(|s| s.territory = Some(ring.to_vec()));
    }

    fn draw_claimed(&mut self, ring: &[GeoPoint]) {
        self.with_state(|s| s.claimed.push(ring.to_vec()));
    }
}
