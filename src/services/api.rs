// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Athlos REST API client.
//!
//! Handles:
//! - Account registration and login
//! - Profile reads and updates
//! - Run lifecycle calls (start, point, pause, resume, end)
//! - Leaderboards and active territories

use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::models::leaderboard::{LeaderboardEntry, LeaderboardPeriod};
use crate::models::run::{RunPointRequest, StartRunRequest};
use crate::models::user::{LocationUpdate, LoginRequest, RegisterRequest};
use crate::models::{GeoPoint, LoginResponse, Run, Territory, User, UserUpdate};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Athlos API client.
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    /// Create an unauthenticated client rooted at `base_url` (e.g. `http://host/api`).
    pub fn new(base_url: impl Into<String>) -> Self {
        let base_url: String = base_url.into();
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let client = Self::new(config.api_base_url.clone());
        match &config.auth_token {
            Some(token) => client.with_token(token.clone()),
            None => client,
        }
    }

    /// Attach a bearer token to every request.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    // ─── Users ───────────────────────────────────────────────────

    pub async fn register(&self, email: &str, password: &str, name: &str) -> Result<User> {
        let body = RegisterRequest {
            email,
            password,
            name,
        };
        self.post_json("/users/register", Some(&body)).await
    }

    /// Log in. The caller decides where to keep the returned token.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginResponse> {
        let body = LoginRequest { email, password };
        let response: LoginResponse = self.post_json("/auth/login", Some(&body)).await?;
        tracing::info!(user_id = response.user.id, "Logged in");
        Ok(response)
    }

    pub async fn get_user(&self, user_id: u64) -> Result<User> {
        self.get_json(&format!("/users/{}", user_id)).await
    }

    pub async fn update_user(&self, user_id: u64, update: &UserUpdate) -> Result<User> {
        let request = self.request(reqwest::Method::PUT, &format!("/users/{}", user_id));
        let response = request.json(update).send().await?;
        check_response_json(response).await
    }

    /// Report the user's last known position. The server answers with an empty body.
    pub async fn update_location(&self, user_id: u64, point: GeoPoint) -> Result<()> {
        let body = LocationUpdate {
            latitude: point.latitude,
            longitude: point.longitude,
        };
        let request = self.request(
            reqwest::Method::PUT,
            &format!("/users/{}/location", user_id),
        );
        let response = request.json(&body).send().await?;
        check_response(response).await
    }

    pub async fn search_users(&self, query: &str) -> Result<Vec<User>> {
        let response = self
            .request(reqwest::Method::GET, "/users/search")
            .query(&[("q", query)])
            .send()
            .await?;
        check_response_json(response).await
    }

    // ─── Runs ────────────────────────────────────────────────────

    /// Start a run. The server ends any run the user still has open.
    pub async fn start_run(&self, user_id: u64) -> Result<Run> {
        self.post_json("/runs/start", Some(&StartRunRequest { user_id }))
            .await
    }

    pub async fn pause_run(&self, run_id: u64) -> Result<Run> {
        self.post_json::<(), _>(&format!("/runs/{}/pause", run_id), None)
            .await
    }

    pub async fn resume_run(&self, run_id: u64) -> Result<Run> {
        self.post_json::<(), _>(&format!("/runs/{}/resume", run_id), None)
            .await
    }

    pub async fn end_run(&self, run_id: u64) -> Result<Run> {
        self.post_json::<(), _>(&format!("/runs/{}/end", run_id), None)
            .await
    }

    /// Append a point to the server-side path.
    pub async fn add_run_point(
        &self,
        run_id: u64,
        point: GeoPoint,
        step_count: Option<u32>,
    ) -> Result<Run> {
        let body = RunPointRequest {
            latitude: point.latitude,
            longitude: point.longitude,
            step_count,
        };
        self.post_json(&format!("/runs/{}/point", run_id), Some(&body))
            .await
    }

    /// All runs for a user, newest first.
    pub async fn user_runs(&self, user_id: u64) -> Result<Vec<Run>> {
        self.get_json(&format!("/runs/user/{}", user_id)).await
    }

    /// The user's open run, if any.
    pub async fn active_run(&self, user_id: u64) -> Result<Option<Run>> {
        match self
            .get_json(&format!("/runs/user/{}/active", user_id))
            .await
        {
            Ok(run) => Ok(Some(run)),
            Err(e) if e.is_not_found() => Ok(None),
            Err(e) => Err(e),
        }
    }

    // ─── Leaderboards & territories ──────────────────────────────

    pub async fn leaderboard(&self, period: LeaderboardPeriod) -> Result<Vec<LeaderboardEntry>> {
        self.get_json(&format!("/leaderboard/{}", period.slug()))
            .await
    }

    pub async fn active_territories(&self) -> Result<Vec<Territory>> {
        self.get_json("/territories/active").await
    }

    // ─── Plumbing ────────────────────────────────────────────────

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    /// Generic GET request with JSON response.
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let response = self.request(reqwest::Method::GET, path).send().await?;
        check_response_json(response).await
    }

    /// Generic POST request with optional JSON body and JSON response.
    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: Option<&B>,
    ) -> Result<T> {
        let mut request = self.request(reqwest::Method::POST, path);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;
        check_response_json(response).await
    }
}

/// Check response status and return error if not successful.
async fn check_response(response: reqwest::Response) -> Result<()> {
    if response.status().is_success() {
        return Ok(());
    }

    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    let err = ApiError::from_response(status, &body);
    tracing::debug!(status = status.as_u16(), error = %err, "API request failed");
    Err(err)
}

/// Check response and parse JSON body.
async fn check_response_json<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        let err = ApiError::from_response(status, &body);
        tracing::debug!(status = status.as_u16(), error = %err, "API request failed");
        return Err(err);
    }

    response
        .json()
        .await
        .map_err(|e| ApiError::Decode(format!("JSON parse error: {}", e)))
}
