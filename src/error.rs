// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which daily limit rejected an XP award.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapKind {
    /// Too many meal awards today.
    DailyMeals,
    /// Too many walk awards today.
    DailyWalks,
    /// Too many photo awards today.
    DailyPhotos,
    /// Aggregate daily XP exhausted.
    DailyXp,
}

impl CapKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CapKind::DailyMeals => "daily_meals",
            CapKind::DailyWalks => "daily_walks",
            CapKind::DailyPhotos => "daily_photos",
            CapKind::DailyXp => "daily_xp",
        }
    }
}

impl fmt::Display for CapKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Authentication required")]
    Unauthorized,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Invalid XP amount: {0} (must be 1..=100)")]
    InvalidAward(i64),

    #[error("Daily cap reached: {0}")]
    CapExceeded(CapKind),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("Concurrent update conflict: {0}")]
    Conflict(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Whether the failure is transient.
    ///
    /// A timed-out write may still have been applied; re-read before
    /// repeating it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::Database(_) | AppError::Timeout(_) | AppError::Conflict(_)
        )
    }
}

/// JSON error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error, details) = match &self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::InvalidToken => (StatusCode::UNAUTHORIZED, "invalid_token", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::InvalidAward(xp) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_award",
                Some(format!("xp={}", xp)),
            ),
            AppError::CapExceeded(kind) => (
                StatusCode::TOO_MANY_REQUESTS,
                "cap_exceeded",
                Some(kind.to_string()),
            ),
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::SERVICE_UNAVAILABLE, "database_error", None)
            }
            AppError::Timeout(what) => {
                tracing::warn!(what, "Persistence timeout");
                (StatusCode::SERVICE_UNAVAILABLE, "timeout", None)
            }
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "conflict", Some(msg.clone())),
            AppError::Internal(err) => {
                tracing::error!(error = %err, "Internal server error");
                (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", None)
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            details,
        };

        (status, Json(body)).into_response()
    }
}

/// Result type alias for handlers
pub type Result<T> = std::result::Result<T, AppError>;
