// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Error types for calls to the Athlos API.

use serde::Deserialize;

/// Error returned by the REST client.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Non-success status with the message extracted from the response body.
    #[error("{message}")]
    Status { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    Decode(String),
}

impl ApiError {
    /// HTTP status code, if the server answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized => Some(401),
            ApiError::NotFound(_) => Some(404),
            ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(_) | ApiError::Decode(_) => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ApiError::NotFound(_))
    }

    /// Build an error from a failed response's status and raw body.
    ///
    /// The backend reports failures as `{"message": ...}` or `{"error": ...}`;
    /// anything else falls back to the status line.
    pub fn from_response(status: reqwest::StatusCode, body: &str) -> Self {
        let message = extract_message(body).unwrap_or_else(|| {
            format!(
                "API Error: {} {}",
                status.as_u16(),
                status.canonical_reason().unwrap_or("")
            )
            .trim_end()
            .to_string()
        });

        match status.as_u16() {
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound(message),
            code => ApiError::Status {
                status: code,
                message,
            },
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Network(err.to_string())
        }
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
    error: Option<String>,
}

fn extract_message(body: &str) -> Option<String> {
    let parsed: ErrorBody = serde_json::from_str(body).ok()?;
    parsed
        .message
        .filter(|m| !m.is_empty())
        .or(parsed.error.filter(|e| !e.is_empty()))
}

/// Result type alias for API calls
pub type Result<T> = std::result::Result<T, ApiError>;
