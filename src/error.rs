// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Application error types with consistent API responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Application error type that converts to HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // --- OAuth flow ---
    #[error("Strava authorization denied: {0}")]
    AuthorizationDenied(String),

    #[error("No authorization code received")]
    MissingCode,

    #[error("Invalid authorization state")]
    InvalidState,

    #[error("Token exchange failed: {0}")]
    TokenExchangeFailed(String),

    #[error("User has no active Strava connection")]
    NotConnected,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),

    // --- Provider / sync ---
    #[error("Invalid response from Strava: {0}")]
    InvalidProviderResponse(String),

    #[error("Network error: {0}")]
    NetworkError(String),

    #[error("Failed to save activity: {0}")]
    UpsertFailed(String),

    #[error("Strava API error: {0}")]
    StravaApi(String),

    // --- Webhook ---
    #[error("Invalid webhook event: {0}")]
    InvalidEvent(String),

    #[error("Invalid subscription mode")]
    InvalidMode,

    #[error("Invalid verify token")]
    InvalidToken,

    // --- HTTP surface ---
    #[error("Authentication required")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl AppError {
    /// Detail string used for HTTP 429 responses from Strava.
    pub const STRAVA_RATE_LIMIT: &'static str = "Rate limit exceeded";
    /// Detail string used for HTTP 401 responses from Strava.
    pub const STRAVA_TOKEN_ERROR: &'static str = "Token expired or invalid";

    /// True when Strava rejected the access token itself.
    pub fn is_strava_token_error(&self) -> bool {
        matches!(self, AppError::StravaApi(msg) if msg == Self::STRAVA_TOKEN_ERROR)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, AppError::StravaApi(msg) if msg == Self::STRAVA_RATE_LIMIT)
    }

    /// Human-readable message shown to the user after the OAuth callback.
    pub fn user_message(&self) -> String {
        match self {
            AppError::AuthorizationDenied(_) | AppError::MissingCode | AppError::InvalidState => {
                self.to_string()
            }
            AppError::TokenExchangeFailed(_) => "Failed to get access token".to_string(),
            _ => "Failed to connect to Strava".to_string(),
        }
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
            AppError::AuthorizationDenied(msg) => (
                StatusCode::BAD_REQUEST,
                "authorization_denied",
                Some(msg.clone()),
            ),
            AppError::MissingCode => (StatusCode::BAD_REQUEST, "missing_code", None),
            AppError::InvalidState => (StatusCode::BAD_REQUEST, "invalid_state", None),
            AppError::TokenExchangeFailed(msg) => {
                tracing::warn!(error = %msg, "Token exchange failed");
                (StatusCode::BAD_GATEWAY, "token_exchange_failed", None)
            }
            AppError::NotConnected => (StatusCode::NOT_FOUND, "not_connected", None),
            AppError::RefreshFailed(msg) => {
                tracing::warn!(error = %msg, "Token refresh failed");
                (StatusCode::BAD_GATEWAY, "refresh_failed", None)
            }
            AppError::InvalidProviderResponse(msg) => (
                StatusCode::BAD_GATEWAY,
                "invalid_provider_response",
                Some(msg.clone()),
            ),
            AppError::NetworkError(msg) => {
                (StatusCode::BAD_GATEWAY, "network_error", Some(msg.clone()))
            }
            AppError::UpsertFailed(msg) => {
                tracing::error!(error = %msg, "Activity upsert failed");
                (StatusCode::INTERNAL_SERVER_ERROR, "upsert_failed", None)
            }
            AppError::StravaApi(msg) if msg == Self::STRAVA_RATE_LIMIT => (
                StatusCode::TOO_MANY_REQUESTS,
                "strava_rate_limited",
                Some(msg.clone()),
            ),
            AppError::StravaApi(msg) => {
                (StatusCode::BAD_GATEWAY, "strava_error", Some(msg.clone()))
            }
            AppError::InvalidEvent(msg) => {
                (StatusCode::BAD_REQUEST, "invalid_event", Some(msg.clone()))
            }
            AppError::InvalidMode => (StatusCode::BAD_REQUEST, "invalid_mode", None),
            AppError::InvalidToken => (StatusCode::FORBIDDEN, "invalid_token", None),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", Some(msg.clone())),
            AppError::BadRequest(msg) => {
                (StatusCode::BAD_REQUEST, "bad_request", Some(msg.clone()))
            }
            AppError::Database(msg) => {
                tracing::error!(error = %msg, "Database error");
                (StatusCode::INTERNAL_SERVER_ERROR, "database_error", None)
            }
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
