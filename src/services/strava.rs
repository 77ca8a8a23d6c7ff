// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava API client.
//!
//! Handles:
//! - OAuth code exchange and token refresh
//! - Activity list and detail fetches
//! - Athlete profile (connectivity check)
//! - Status classification (rate limit, rejected token, transport failure)

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::config::Config;
use crate::error::AppError;

pub const DEFAULT_OAUTH_BASE_URL: &str = "https://www.strava.com/oauth";
pub const DEFAULT_API_BASE_URL: &str = "https://www.strava.com/api/v3";

/// Maximum page size Strava accepts on list endpoints.
pub const ACTIVITIES_PER_PAGE: u32 = 200;

const DEFAULT_TIMEOUT_SECS: u64 = 30;
const CONNECTIVITY_TIMEOUT_SECS: u64 = 10;

/// Strava API client.
#[derive(Clone)]
pub struct StravaClient {
    http: reqwest::Client,
    oauth_base_url: String,
    api_base_url: String,
    client_id: String,
    client_secret: String,
}

impl StravaClient {
    /// Create a new Strava client against the public endpoints.
    pub fn new(client_id: String, client_secret: String) -> Result<Self, AppError> {
        Self::with_options(
            client_id,
            client_secret,
            DEFAULT_OAUTH_BASE_URL,
            DEFAULT_API_BASE_URL,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn from_config(config: &Config) -> Result<Self, AppError> {
        Self::with_options(
            config.strava_client_id.clone(),
            config.strava_client_secret.clone(),
            &config.strava_oauth_url,
            &config.strava_api_url,
            Duration::from_secs(config.http_timeout_secs),
        )
    }

    pub fn with_options(
        client_id: String,
        client_secret: String,
        oauth_base_url: &str,
        api_base_url: &str,
        timeout: Duration,
    ) -> Result<Self, AppError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            oauth_base_url: oauth_base_url.trim_end_matches('/').to_string(),
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client_id,
            client_secret,
        })
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Browser-facing authorization endpoint.
    pub fn authorize_endpoint(&self) -> String {
        format!("{}/authorize", self.oauth_base_url)
    }

    fn token_endpoint(&self) -> String {
        format!("{}/token", self.oauth_base_url)
    }

    // ─── OAuth ───────────────────────────────────────────────────────────────

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(self.token_endpoint())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("code", code),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .map_err(|e| AppError::TokenExchangeFailed(format!("request failed: {}", e)))?;

        let tokens: TokenResponse = self
            .check_response_json(response)
            .await
            .map_err(|e| AppError::TokenExchangeFailed(e.to_string()))?;

        if tokens.refresh_token.is_none() {
            return Err(AppError::TokenExchangeFailed(
                "response has no refresh_token".to_string(),
            ));
        }
        if tokens.athlete_id().is_none() {
            return Err(AppError::TokenExchangeFailed(
                "response has no athlete id".to_string(),
            ));
        }
        Ok(tokens)
    }

    /// Refresh an expiring access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<TokenResponse, AppError> {
        let response = self
            .http
            .post(self.token_endpoint())
            .form(&[
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("refresh_token", refresh_token),
                ("grant_type", "refresh_token"),
            ])
            .send()
            .await
            .map_err(|e| AppError::RefreshFailed(format!("request failed: {}", e)))?;

        self.check_response_json(response)
            .await
            .map_err(|e| AppError::RefreshFailed(e.to_string()))
    }

    // ─── Activities ──────────────────────────────────────────────────────────

    /// List the athlete's activities started after `after` (Unix seconds).
    ///
    /// Elements are returned as raw JSON so callers can keep the full payload.
    pub async fn list_activities(
        &self,
        access_token: &str,
        after: i64,
        per_page: u32,
    ) -> Result<Vec<serde_json::Value>, AppError> {
        let url = format!("{}/athlete/activities", self.api_base_url);

        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .query(&[("after", after.to_string()), ("per_page", per_page.to_string())])
            .send()
            .await
            .map_err(network_error)?;

        match self.check_response_json::<serde_json::Value>(response).await? {
            serde_json::Value::Array(items) => Ok(items),
            other => Err(AppError::InvalidProviderResponse(format!(
                "expected a list of activities, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Get a detailed activity by ID.
    pub async fn get_activity(
        &self,
        access_token: &str,
        activity_id: u64,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}/activities/{}", self.api_base_url, activity_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network_error)?;

        match self.check_response_json::<serde_json::Value>(response).await? {
            value @ serde_json::Value::Object(_) => Ok(value),
            other => Err(AppError::InvalidProviderResponse(format!(
                "expected an activity object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Get the authenticated athlete. Uses the short connectivity timeout.
    pub async fn get_athlete(&self, access_token: &str) -> Result<serde_json::Value, AppError> {
        let url = format!("{}/athlete", self.api_base_url);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .timeout(Duration::from_secs(CONNECTIVITY_TIMEOUT_SECS))
            .send()
            .await
            .map_err(network_error)?;

        self.check_response_json(response).await
    }

    /// Lifetime, year-to-date and recent totals for `athlete_id`.
    pub async fn get_athlete_stats(
        &self,
        access_token: &str,
        athlete_id: u64,
    ) -> Result<serde_json::Value, AppError> {
        let url = format!("{}/athletes/{}/stats", self.api_base_url, athlete_id);
        let response = self
            .http
            .get(&url)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(network_error)?;

        match self.check_response_json::<serde_json::Value>(response).await? {
            value @ serde_json::Value::Object(_) => Ok(value),
            other => Err(AppError::InvalidProviderResponse(format!(
                "expected an athlete stats object, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Check response status and parse the JSON body.
    async fn check_response_json<T: for<'de> Deserialize<'de>>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, AppError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();

            if status.as_u16() == 429 {
                tracing::warn!("Strava rate limit hit (429)");
                return Err(AppError::StravaApi(AppError::STRAVA_RATE_LIMIT.to_string()));
            }

            if status.as_u16() == 401 {
                return Err(AppError::StravaApi(
                    AppError::STRAVA_TOKEN_ERROR.to_string(),
                ));
            }

            return Err(AppError::StravaApi(format!("HTTP {}: {}", status, body)));
        }

        let body = response.bytes().await.map_err(network_error)?;
        serde_json::from_slice(&body)
            .map_err(|e| AppError::InvalidProviderResponse(format!("JSON parse error: {}", e)))
    }
}

fn network_error(e: reqwest::Error) -> AppError {
    if e.is_timeout() {
        AppError::NetworkError(format!("request timed out: {}", e))
    } else {
        AppError::NetworkError(e.to_string())
    }
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "a boolean",
        serde_json::Value::Number(_) => "a number",
        serde_json::Value::String(_) => "a string",
        serde_json::Value::Array(_) => "a list",
        serde_json::Value::Object(_) => "an object",
    }
}

/// Token endpoint response (both code exchange and refresh).
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Strava may omit this on refresh when the token is not rotated.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Absolute expiry, Unix seconds
    #[serde(default)]
    pub expires_at: Option<i64>,
    /// Relative expiry, seconds
    #[serde(default)]
    pub expires_in: Option<i64>,
    /// Athlete summary (code exchange only)
    #[serde(default)]
    pub athlete: Option<serde_json::Value>,
}

impl TokenResponse {
    /// Absolute expiry: `expires_at` if present, else `now + expires_in`.
    pub fn expiry(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        self.expires_at
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
            .or_else(|| {
                self.expires_in
                    .map(|secs| now + chrono::Duration::seconds(secs))
            })
            .unwrap_or(now)
    }

    pub fn athlete_id(&self) -> Option<u64> {
        self.athlete.as_ref()?.get("id")?.as_u64()
    }
}

/// Fields read from a Strava activity (summary or detailed representation).
///
/// Everything but the ID and start date is optional; absent numbers
/// normalize to zero.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaActivity {
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(rename = "type", default)]
    pub activity_type: Option<String>,
    #[serde(default)]
    pub sport_type: Option<String>,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub distance: Option<f64>,
    #[serde(default)]
    pub moving_time: Option<u64>,
    #[serde(default)]
    pub total_elevation_gain: Option<f64>,
    #[serde(default)]
    pub average_speed: Option<f64>,
    #[serde(default)]
    pub max_speed: Option<f64>,
    #[serde(default)]
    pub average_heartrate: Option<f64>,
    #[serde(default)]
    pub max_heartrate: Option<f64>,
    #[serde(default)]
    pub average_cadence: Option<f64>,
    #[serde(default)]
    pub average_watts: Option<f64>,
    #[serde(default)]
    pub kilojoules: Option<f64>,
}
