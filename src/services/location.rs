// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Device location providers and the watch subscription handle.

use crate::models::GeoPoint;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Why a location fix or watch reading could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocationFailure {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable: {0}")]
    Unavailable(String),
}

/// One delivery from a location watch.
pub type Reading = Result<GeoPoint, LocationFailure>;

/// Source of device positions.
pub trait LocationProvider: Clone + Send + Sync + 'static {
    /// One-shot high-accuracy fix.
    fn current_position(&self) -> impl Future<Output = Reading> + Send;

    /// Open a fresh continuous watch. Dropping the handle releases it.
    fn watch(&self) -> LocationWatch;
}

/// Live subscription to position updates.
///
/// Exactly one owner; the subscription ends when the handle is dropped, and
/// nothing queued behind it is delivered afterwards.
pub struct LocationWatch {
    readings: mpsc::UnboundedReceiver<Reading>,
    feeder: Option<JoinHandle<()>>,
    delivered: Option<Arc<AtomicUsize>>,
}

impl LocationWatch {
    /// Wrap a channel whose sender is owned by the provider.
    pub fn from_channel(readings: mpsc::UnboundedReceiver<Reading>) -> Self {
        Self {
            readings,
            feeder: None,
            delivered: None,
        }
    }

    /// Wrap a channel fed by a task; the task is aborted on release.
    pub fn with_feeder(readings: mpsc::UnboundedReceiver<Reading>, feeder: JoinHandle<()>) -> Self {
        Self {
            readings,
            feeder: Some(feeder),
            delivered: None,
        }
    }

    /// Count every position handed out through [`next`](Self::next) in `counter`.
    ///
    /// Readings still queued when the watch is released are not counted.
    pub fn counting_into(mut self, counter: Arc<AtomicUsize>) -> Self {
        self.delivered = Some(counter);
        self
    }

    /// Next reading, or `None` once the provider stops delivering.
    pub async fn next(&mut self) -> Option<Reading> {
        let reading = self.readings.recv().await;
        if let (Some(Ok(_)), Some(counter)) = (&reading, &self.delivered) {
            counter.fetch_add(1, Ordering::SeqCst);
        }
        reading
    }
}

impl Drop for LocationWatch {
    fn drop(&mut self) {
        self.readings.close();
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
        }
    }
}

/// Replays a recorded track as if it came from the device.
///
/// The first point doubles as the one-shot fix. Each watch continues from
/// the first point the previous one did not hand out, so pausing neither
/// replays nor skips points.
#[derive(Clone)]
pub struct TrackReplay {
    points: Arc<[GeoPoint]>,
    /// Points handed out so far, across all watches
    delivered: Arc<AtomicUsize>,
    cadence: Duration,
}

impl TrackReplay {
    pub fn new(points: Vec<GeoPoint>, cadence: Duration) -> Self {
        Self {
            points: points.into(),
            delivered: Arc::new(AtomicUsize::new(0)),
            cadence,
        }
    }

    /// Points not yet delivered.
    pub fn remaining(&self) -> usize {
        self.points
            .len()
            .saturating_sub(self.delivered.load(Ordering::SeqCst))
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }
}

impl LocationProvider for TrackReplay {
    async fn current_position(&self) -> Reading {
        self.points
            .first()
            .copied()
            .ok_or_else(|| LocationFailure::Unavailable("track is empty".to_string()))
    }

    fn watch(&self) -> LocationWatch {
        let (tx, rx) = mpsc::unbounded_channel();
        let points = Arc::clone(&self.points);
        let cadence = self.cadence;
        let mut index = self.delivered.load(Ordering::SeqCst);

        let feeder = tokio::spawn(async move {
            loop {
                tokio::time::sleep(cadence).await;
                let Some(point) = points.get(index).copied() else {
                    tracing::debug!(queued = index, "Track replay exhausted");
                    break;
                };
                if tx.send(Ok(point)).is_err() {
                    break;
                }
                index += 1;
            }
        });

        LocationWatch::with_feeder(rx, feeder).counting_into(Arc::clone(&self.delivered))
    }
}
