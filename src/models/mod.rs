// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Data models for the application.

pub mod leaderboard;
pub mod point;
pub mod run;
pub mod territory;
pub mod user;

pub use leaderboard::{LeaderboardEntry, LeaderboardPeriod};
pub use point::GeoPoint;
pub use run::Run;
pub use territory::Territory;
pub use user::{LoginResponse, User, UserUpdate};
