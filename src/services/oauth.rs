// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! OAuth authorization-code flow and token lifecycle.
//!
//! Handles:
//! - Authorization URL with a single-use `state` token
//! - Callback: state check, code exchange, integration activation
//! - Silent refresh when a token is about to expire
//! - Disconnect

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use ring::rand::{SecureRandom, SystemRandom};
use tokio::sync::Mutex;

use crate::clock::SharedClock;
use crate::db::{IntegrationStore, PendingAuthorizationStore};
use crate::error::AppError;
use crate::models::{Integration, IntegrationStatus, PendingAuthorization, TokenUpdate};
use crate::services::strava::StravaClient;

/// Margin before token expiration when we proactively refresh (5 minutes).
pub const TOKEN_REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Scopes requested from Strava.
pub const OAUTH_SCOPES: &str = "read,activity:read_all,profile:read_all";

const STATE_BYTES: usize = 32;

/// Shared refresh locks type.
pub type RefreshLocks = Arc<DashMap<u64, Arc<Mutex<()>>>>;

/// True when a token expiring at `expires_at` must be refreshed before use.
pub fn token_needs_refresh(expires_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    expires_at <= now + Duration::seconds(TOKEN_REFRESH_MARGIN_SECS)
}

/// Random URL-safe OAuth `state` value.
pub fn generate_state() -> Result<String, AppError> {
    let mut bytes = [0u8; STATE_BYTES];
    SystemRandom::new()
        .fill(&mut bytes)
        .map_err(|_| AppError::Internal(anyhow::anyhow!("Failed to generate OAuth state")))?;
    Ok(URL_SAFE_NO_PAD.encode(bytes))
}

#[derive(Clone)]
pub struct OAuthClient {
    client: StravaClient,
    integrations: Arc<dyn IntegrationStore>,
    pending: Arc<dyn PendingAuthorizationStore>,
    clock: SharedClock,
    redirect_uri: String,
    /// Per-user mutex to serialize token refresh operations.
    refresh_locks: RefreshLocks,
}

impl OAuthClient {
    pub fn new(
        client: StravaClient,
        integrations: Arc<dyn IntegrationStore>,
        pending: Arc<dyn PendingAuthorizationStore>,
        clock: SharedClock,
        redirect_uri: String,
    ) -> Self {
        Self {
            client,
            integrations,
            pending,
            clock,
            redirect_uri,
            refresh_locks: Arc::new(DashMap::new()),
        }
    }

    pub fn strava_client(&self) -> &StravaClient {
        &self.client
    }

    pub fn integration_store(&self) -> Arc<dyn IntegrationStore> {
        self.integrations.clone()
    }

    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    // ─── Authorization ───────────────────────────────────────────────────────

    /// Issue a state token for `user_id` and return the Strava authorization URL.
    pub async fn build_authorization_url(&self, user_id: u64) -> Result<String, AppError> {
        let now = self.clock.now();

        match self.pending.purge_expired_pending(now).await {
            Ok(0) => {}
            Ok(purged) => tracing::debug!(purged, "Purged expired authorization states"),
            Err(e) => tracing::warn!(error = %e, "Failed to purge expired authorization states"),
        }

        let state = generate_state()?;
        self.pending
            .put_pending(&PendingAuthorization::new(state.clone(), user_id, now))
            .await?;

        tracing::info!(user_id, "Issued Strava authorization state");

        Ok(format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&approval_prompt=auto&scope={}&state={}",
            self.client.authorize_endpoint(),
            urlencoding::encode(self.client.client_id()),
            urlencoding::encode(&self.redirect_uri),
            OAUTH_SCOPES,
            state
        ))
    }

    /// Complete the authorization-code flow.
    ///
    /// Consumes the state token, exchanges the code, and makes the new
    /// integration the user's only active one.
    pub async fn handle_callback(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        error: Option<&str>,
    ) -> Result<Integration, AppError> {
        if let Some(error) = error.filter(|e| !e.is_empty()) {
            tracing::warn!(error, "Strava authorization denied");
            return Err(AppError::AuthorizationDenied(error.to_string()));
        }

        let code = code.filter(|c| !c.is_empty()).ok_or(AppError::MissingCode)?;
        let state = state.filter(|s| !s.is_empty()).ok_or(AppError::InvalidState)?;

        let user_id = self
            .pending
            .take_pending(state, self.clock.now())
            .await?
            .ok_or_else(|| {
                tracing::warn!("Unknown, consumed or expired authorization state");
                AppError::InvalidState
            })?;

        let tokens = self.client.exchange_code(code).await.map_err(|e| {
            tracing::warn!(user_id, error = %e, "Strava code exchange failed");
            e
        })?;
        let athlete_id = tokens.athlete_id().ok_or_else(|| {
            AppError::TokenExchangeFailed("response has no athlete id".to_string())
        })?;

        let now = self.clock.now();
        let integration = Integration {
            id: uuid::Uuid::new_v4().to_string(),
            user_id,
            provider_athlete_id: athlete_id,
            access_token: tokens.access_token.clone(),
            refresh_token: tokens.refresh_token.clone().unwrap_or_default(),
            token_expires_at: tokens.expiry(now),
            profile_snapshot: tokens
                .athlete
                .as_ref()
                .map(|a| a.to_string())
                .unwrap_or_default(),
            last_sync_at: None,
            status: IntegrationStatus::Active,
            created_at: now,
            updated_at: now,
        };

        let replaced = self.integrations.activate_integration(&integration).await?;
        tracing::info!(user_id, athlete_id, replaced, "Strava connected");

        Ok(integration)
    }

    // ─── Token Management ────────────────────────────────────────────────────

    /// Get a valid (non-expiring) access token for the given user.
    ///
    /// Refreshes synchronously inside the margin. Concurrent callers for the
    /// same user wait on one refresh instead of each spending the refresh
    /// token.
    pub async fn get_valid_access_token(&self, user_id: u64) -> Result<String, AppError> {
        let integration = self
            .integrations
            .find_active(user_id)
            .await?
            .ok_or(AppError::NotConnected)?;

        if !token_needs_refresh(integration.token_expires_at, self.clock.now()) {
            return Ok(integration.access_token);
        }

        let lock = self
            .refresh_locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();

        let _guard = lock.lock().await;

        // Another task may have refreshed while we were waiting.
        let integration = self
            .integrations
            .find_active(user_id)
            .await?
            .ok_or(AppError::NotConnected)?;

        if !token_needs_refresh(integration.token_expires_at, self.clock.now()) {
            return Ok(integration.access_token);
        }

        tracing::info!(user_id, "Access token expiring, refreshing");

        let refreshed = match self.client.refresh_token(&integration.refresh_token).await {
            Ok(t) => t,
            Err(e) => {
                // Another instance may have won the refresh and rotated the
                // refresh token under us.
                if let Some(current) = self.integrations.find_active(user_id).await? {
                    if current.refresh_token != integration.refresh_token
                        && !token_needs_refresh(current.token_expires_at, self.clock.now())
                    {
                        tracing::info!(user_id, "Token refreshed elsewhere, using stored token");
                        return Ok(current.access_token);
                    }
                }
                tracing::warn!(user_id, error = %e, "Token refresh failed");
                return Err(e);
            }
        };

        let now = self.clock.now();
        let tokens = TokenUpdate {
            access_token: refreshed.access_token.clone(),
            refresh_token: refreshed
                .refresh_token
                .clone()
                .unwrap_or(integration.refresh_token),
            token_expires_at: refreshed.expiry(now),
            updated_at: now,
        };

        match self.integrations.update_tokens(&integration.id, &tokens).await {
            Ok(()) => {}
            Err(AppError::NotConnected) => {
                // Disconnected or reconnected while the refresh was in flight.
                return match self.integrations.find_active(user_id).await? {
                    Some(current)
                        if current.id != integration.id
                            && !token_needs_refresh(current.token_expires_at, now) =>
                    {
                        tracing::info!(user_id, "Reconnected during refresh, using new token");
                        Ok(current.access_token)
                    }
                    _ => {
                        tracing::info!(user_id, "Disconnected during refresh, dropping tokens");
                        Err(AppError::NotConnected)
                    }
                };
            }
            Err(e) => return Err(e),
        }

        tracing::info!(user_id, "Token refreshed");
        Ok(tokens.access_token)
    }

    /// Mark the user's active integration inactive. Idempotent.
    pub async fn disconnect(&self, user_id: u64) -> Result<bool, AppError> {
        let deactivated = self
            .integrations
            .deactivate_user(user_id, self.clock.now())
            .await?;
        self.refresh_locks.remove(&user_id);
        tracing::info!(user_id, deactivated, "Strava disconnected");
        Ok(true)
    }

    /// Check the stored token against Strava.
    ///
    /// Returns `Ok(false)` when Strava rejects the token.
    pub async fn verify_connection(&self, user_id: u64) -> Result<bool, AppError> {
        let access_token = self.get_valid_access_token(user_id).await?;
        match self.client.get_athlete(&access_token).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_strava_token_error() => {
                tracing::warn!(user_id, "Stored Strava token was rejected");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}
