// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Services module - collaborators of the run session.

pub mod api;
pub mod geometry;
pub mod live;
pub mod location;
pub mod map;
pub mod runs;

pub use api::ApiClient;
pub use geometry::TrackError;
pub use live::{LeaderboardUpdate, LiveError, LiveLeaderboard};
pub use location::{LocationFailure, LocationProvider, LocationWatch, TrackReplay};
pub use map::{MapView, RecordingMap};
pub use runs::RunService;
