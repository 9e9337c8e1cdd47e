// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@kernel.org>

//! Run model as returned by the Athlos run endpoints.

use crate::models::GeoPoint;
use chrono::NaiveDateTime;
use serde::{Deserialize, Deserializer, Serialize};
#[cfg(feature = "binding-generation")]
use ts_rs::TS;

/// Server-side view of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "binding-generation", derive(TS))]
#[cfg_attr(
    feature = "binding-generation",
    ts(export, export_to = "web/src/lib/generated/")
)]
pub struct Run {
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub id: u64,
    #[cfg_attr(feature = "binding-generation", ts(type = "number"))]
    pub user_id: u64,
    /// Server local time (no offset)
    pub start_time: Option<NaiveDateTime>,
    pub end_time: Option<NaiveDateTime>,
    #[cfg_attr(feature = "binding-generation", ts(type = "number | null"))]
    pub duration_seconds: Option<u64>,
    pub total_steps: Option<u32>,
    pub distance_meters: Option<f64>,
    #[serde(default)]
    pub path: Option<Vec<GeoPoint>>,
    #[serde(default)]
    pub claimed_territory: Option<Vec<GeoPoint>>,
    #[serde(default, deserialize_with = "null_as_false")]
    pub is_active: bool,
}

/// Boxed `Boolean` fields arrive as `null` when unset; treat that as `false`.
pub(crate) fn null_as_false<'de, D: Deserializer<'de>>(deserializer: D) -> Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Body for `POST /runs/start`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    pub user_id: u64,
}

/// Body for `POST /runs/{id}/point`.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunPointRequest {
    pub latitude: f64,
    pub longitude: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_count: Option<u32>,
}
