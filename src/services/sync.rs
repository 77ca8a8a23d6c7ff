// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Activity synchronization: fetch from Strava, normalize, upsert.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::clock::SharedClock;
use crate::db::{ActivityStore, IntegrationStore};
use crate::error::AppError;
use crate::models::activity::pace_from_speed;
use crate::models::Activity;
use crate::services::oauth::OAuthClient;
use crate::services::strava::{StravaActivity, StravaClient, ACTIVITIES_PER_PAGE};

/// History fetched right after a user connects.
pub const DEFAULT_BACKFILL_DAYS: i64 = 30;
/// History fetched by the periodic sync.
pub const DEFAULT_SCHEDULED_DAYS: i64 = 7;
/// Pause between users in `sync_all_active_users`.
pub const DEFAULT_USER_DELAY: StdDuration = StdDuration::from_secs(1);

/// Per-call result of a user sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub saved: usize,
    pub failed: usize,
}

/// Result of a sync over every active user.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncSummary {
    pub users: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub activities_saved: usize,
}

/// Convert a Strava activity payload into the stored record.
pub fn normalize_activity(
    user_id: u64,
    payload: &serde_json::Value,
    synced_at: DateTime<Utc>,
) -> Result<Activity, AppError> {
    let parsed: StravaActivity = serde_json::from_value(payload.clone())
        .map_err(|e| AppError::InvalidProviderResponse(format!("activity payload: {}", e)))?;

    let average_speed = parsed.average_speed.unwrap_or(0.0);
    let activity_type = parsed
        .activity_type
        .or(parsed.sport_type)
        .unwrap_or_else(|| "Workout".to_string());

    Ok(Activity {
        user_id,
        provider_activity_id: parsed.id,
        activity_type,
        name: parsed.name.unwrap_or_default(),
        start_time: parsed.start_date,
        distance: parsed.distance.unwrap_or(0.0),
        moving_time: parsed.moving_time.unwrap_or(0),
        elevation_gain: parsed.total_elevation_gain.unwrap_or(0.0),
        average_speed,
        max_speed: parsed.max_speed.unwrap_or(0.0),
        average_heartrate: parsed.average_heartrate.unwrap_or(0.0),
        max_heartrate: parsed.max_heartrate.unwrap_or(0.0),
        average_cadence: parsed.average_cadence.unwrap_or(0.0),
        average_power: parsed.average_watts.unwrap_or(0.0),
        kilojoules: parsed.kilojoules.unwrap_or(0.0),
        pace: pace_from_speed(average_speed),
        raw_payload: payload.to_string(),
        synced_at,
    })
}

#[derive(Clone)]
pub struct SyncEngine {
    oauth: OAuthClient,
    client: StravaClient,
    integrations: Arc<dyn IntegrationStore>,
    activities: Arc<dyn ActivityStore>,
    clock: SharedClock,
    user_delay: StdDuration,
}

impl SyncEngine {
    pub fn new(oauth: OAuthClient, activities: Arc<dyn ActivityStore>) -> Self {
        Self {
            client: oauth.strava_client().clone(),
            integrations: oauth.integration_store(),
            clock: oauth.clock(),
            oauth,
            activities,
            user_delay: DEFAULT_USER_DELAY,
        }
    }

    pub fn with_user_delay(mut self, user_delay: StdDuration) -> Self {
        self.user_delay = user_delay;
        self
    }

    pub fn oauth(&self) -> &OAuthClient {
        &self.oauth
    }

    /// Fetch the last `days_back` days of activities and upsert them.
    ///
    /// Returns the number saved. Per-activity failures are logged and
    /// skipped.
    pub async fn sync_user(&self, user_id: u64, days_back: i64) -> Result<usize, AppError> {
        Ok(self.sync_user_detailed(user_id, days_back).await?.saved)
    }

    /// Like `sync_user` but also reports per-activity failures.
    pub async fn sync_user_detailed(
        &self,
        user_id: u64,
        days_back: i64,
    ) -> Result<SyncOutcome, AppError> {
        let access_token = self.oauth.get_valid_access_token(user_id).await?;

        let after = (self.clock.now() - Duration::days(days_back)).timestamp();
        let payloads = self
            .client
            .list_activities(&access_token, after, ACTIVITIES_PER_PAGE)
            .await
            .map_err(|e| {
                tracing::error!(user_id, error = %e, "Failed to fetch activities");
                e
            })?;

        let synced_at = self.clock.now();
        let mut outcome = SyncOutcome::default();
        for payload in &payloads {
            match self.save_payload(user_id, payload, synced_at).await {
                Ok(()) => outcome.saved += 1,
                Err(e) => {
                    outcome.failed += 1;
                    tracing::warn!(
                        user_id,
                        activity_id = payload.get("id").and_then(|v| v.as_u64()),
                        error = %e,
                        "Skipping activity"
                    );
                }
            }
        }

        if let Err(e) = self.integrations.record_sync(user_id, self.clock.now()).await {
            tracing::warn!(user_id, error = %e, "Failed to record last sync time");
        }

        if outcome.saved == 0 && outcome.failed > 0 {
            tracing::error!(
                user_id,
                failed = outcome.failed,
                "Sync saved no activities"
            );
        }

        tracing::info!(
            user_id,
            days_back,
            fetched = payloads.len(),
            saved = outcome.saved,
            failed = outcome.failed,
            "User sync complete"
        );

        Ok(outcome)
    }

    /// Fetch and upsert a single activity (webhook path).
    pub async fn sync_one_activity(&self, user_id: u64, activity_id: u64) -> Result<(), AppError> {
        let access_token = self.oauth.get_valid_access_token(user_id).await?;
        let payload = self.client.get_activity(&access_token, activity_id).await?;
        self.save_payload(user_id, &payload, self.clock.now()).await?;
        tracing::info!(user_id, activity_id, "Activity synced");
        Ok(())
    }

    /// Sync every user with an active integration, one after another.
    pub async fn sync_all_active_users(&self, days_back: i64) -> Result<SyncSummary, AppError> {
        let user_ids = self.integrations.list_active_user_ids().await?;
        let mut summary = SyncSummary {
            users: user_ids.len(),
            ..Default::default()
        };

        tracing::info!(users = user_ids.len(), days_back, "Starting sync for all users");

        for (index, user_id) in user_ids.iter().copied().enumerate() {
            match self.sync_user(user_id, days_back).await {
                Ok(saved) => {
                    summary.succeeded += 1;
                    summary.activities_saved += saved;
                }
                Err(e) => {
                    summary.failed += 1;
                    tracing::warn!(user_id, error = %e, "User sync failed");
                }
            }

            if index + 1 < user_ids.len() && !self.user_delay.is_zero() {
                tokio::time::sleep(self.user_delay).await;
            }
        }

        tracing::info!(
            users = summary.users,
            succeeded = summary.succeeded,
            failed = summary.failed,
            activities_saved = summary.activities_saved,
            "Sync for all users complete"
        );

        Ok(summary)
    }

    /// Fetch the full Strava payload for one activity without storing it.
    pub async fn get_activity_details(
        &self,
        user_id: u64,
        activity_id: u64,
    ) -> Result<serde_json::Value, AppError> {
        let access_token = self.oauth.get_valid_access_token(user_id).await?;
        self.client.get_activity(&access_token, activity_id).await
    }

    /// Strava's own totals for the user's connected athlete.
    pub async fn get_athlete_stats(&self, user_id: u64) -> Result<serde_json::Value, AppError> {
        let integration = self
            .integrations
            .find_active(user_id)
            .await?
            .ok_or(AppError::NotConnected)?;
        let access_token = self.oauth.get_valid_access_token(user_id).await?;
        self.client
            .get_athlete_stats(&access_token, integration.provider_athlete_id)
            .await
    }

    async fn save_payload(
        &self,
        user_id: u64,
        payload: &serde_json::Value,
        synced_at: DateTime<Utc>,
    ) -> Result<(), AppError> {
        let activity = normalize_activity(user_id, payload, synced_at)?;
        match self.activities.save_activity(&activity).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(AppError::UpsertFailed(format!(
                "activity {} was not written",
                activity.provider_activity_id
            ))),
            Err(e) => Err(AppError::UpsertFailed(format!(
                "activity {}: {}",
                activity.provider_activity_id, e
            ))),
        }
    }
}
