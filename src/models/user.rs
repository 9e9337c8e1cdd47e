//! User model and auth payloads.

use crate::time_utils::progress_percent;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Step goal the home screen assumes when the profile has none.
pub const DEFAULT_DAILY_STEP_GOAL: u32 = 6000;

/// User profile as returned by `/users` and `/auth/login`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: u64,
    pub email: String,
    pub name: String,
    pub age: Option<u32>,
    pub gender: Option<String>,
    pub daily_step_goal: Option<u32>,
    /// Last reported position
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: Option<NaiveDateTime>,
    pub last_active: Option<NaiveDateTime>,
}

impl User {
    /// Daily step goal, falling back to the app default.
    pub fn step_goal(&self) -> u32 {
        self.daily_step_goal
            .filter(|g| *g > 0)
            .unwrap_or(DEFAULT_DAILY_STEP_GOAL)
    }

    /// Progress toward the daily goal as a display percentage (0-100).
    pub fn daily_progress(&self, steps_today: u32) -> u8 {
        progress_percent(steps_today, self.step_goal())
    }
}

/// Partial profile update for `PUT /users/{id}`. Unset fields are omitted.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub age: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gender: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub daily_step_goal: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct RegisterRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub name: &'a str,
}

#[derive(Debug, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

/// `POST /auth/login` response.
#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub user: User,
    pub token: String,
}

#[derive(Debug, Serialize)]
pub struct LocationUpdate {
    pub latitude: f64,
    pub longitude: f64,
}
