// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Remote run service contract used by the run session controller.

use crate::error::Result;
use crate::models::{GeoPoint, Run, Territory};
use crate::services::ApiClient;
use std::future::Future;

/// Remote collaborator that mirrors a run's lifecycle.
///
/// Implementations are cloned into spawned tasks, one per call.
pub trait RunService: Clone + Send + Sync + 'static {
    fn start_run(&self, user_id: u64) -> impl Future<Output = Result<Run>> + Send;

    fn add_point(
        &self,
        run_id: u64,
        point: GeoPoint,
        step_count: Option<u32>,
    ) -> impl Future<Output = Result<Run>> + Send;

    fn pause_run(&self, run_id: u64) -> impl Future<Output = Result<Run>> + Send;

    fn resume_run(&self, run_id: u64) -> impl Future<Output = Result<Run>> + Send;

    fn end_run(&self, run_id: u64) -> impl Future<Output = Result<Run>> + Send;

    /// Territories currently held by any user, for display only.
    fn active_territories(&self) -> impl Future<Output = Result<Vec<Territory>>> + Send;
}

impl RunService for ApiClient {
    async fn start_run(&self, user_id: u64) -> Result<Run> {
        ApiClient::start_run(self, user_id).await
    }

    async fn add_point(&self, run_id: u64, point: GeoPoint, step_count: Option<u32>) -> Result<Run> {
        self.add_run_point(run_id, point, step_count).await
    }

    async fn pause_run(&self, run_id: u64) -> Result<Run> {
        ApiClient::pause_run(self, run_id).await
    }

    async fn resume_run(&self, run_id: u64) -> Result<Run> {
        ApiClient::resume_run(self, run_id).await
    }

    async fn end_run(&self, run_id: u64) -> Result<Run> {
        ApiClient::end_run(self, run_id).await
    }

    async fn active_territories(&self) -> Result<Vec<Territory>> {
        ApiClient::active_territories(self).await
    }
}
