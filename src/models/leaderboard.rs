// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Leaderboard entries (read-only, owned by the server).

use serde::{Deserialize, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// One row of a leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct LeaderboardEntry {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    pub name: String,
    #[serde(default)]
    pub avatar: Option<String>,
    pub total_steps: u32,
    pub rank: u32,
    pub total_distance: Option<f64>,
    pub territories_claimed: Option<u32>,
}

/// Time window a leaderboard aggregates over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub enum LeaderboardPeriod {
    Daily,
    Weekly,
    AllTime,
}

impl LeaderboardPeriod {
    /// Path segment under `/leaderboard/`.
    pub fn slug(self) -> &'static str {
        match self {
            LeaderboardPeriod::Daily => "daily",
            LeaderboardPeriod::Weekly => "weekly",
            LeaderboardPeriod::AllTime => "all-time",
        }
    }
}
