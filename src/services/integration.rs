// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Operations the rest of the coaching platform calls.

use std::sync::Arc;

use serde::Serialize;

use crate::db::{ActivityStore, IntegrationStore};
use crate::error::AppError;
use crate::models::{Activity, ActivityFilters, ActivityStats, ConnectionStatus, Integration};
use crate::services::oauth::OAuthClient;
use crate::services::sync::SyncEngine;

/// Result of a completed OAuth callback.
#[derive(Debug, Clone, Serialize)]
pub struct ConnectOutcome {
    #[serde(skip)]
    pub integration: Integration,
    /// Activities saved by the initial backfill; `None` if it failed.
    pub synced: Option<usize>,
}

#[derive(Clone)]
pub struct IntegrationService {
    oauth: OAuthClient,
    sync: SyncEngine,
    integrations: Arc<dyn IntegrationStore>,
    activities: Arc<dyn ActivityStore>,
    backfill_days: i64,
}

impl IntegrationService {
    pub fn new(sync: SyncEngine, activities: Arc<dyn ActivityStore>, backfill_days: i64) -> Self {
        let oauth = sync.oauth().clone();
        Self {
            integrations: oauth.integration_store(),
            oauth,
            sync,
            activities,
            backfill_days,
        }
    }

    pub async fn start_connect(&self, user_id: u64) -> Result<String, AppError> {
        self.oauth.build_authorization_url(user_id).await
    }

    /// Finish the OAuth callback and backfill recent history.
    ///
    /// A failed backfill is logged; the connection still stands.
    pub async fn connect(
        &self,
        code: Option<&str>,
        state: Option<&str>,
        error: Option<&str>,
    ) -> Result<ConnectOutcome, AppError> {
        let integration = self.oauth.handle_callback(code, state, error).await?;
        let user_id = integration.user_id;

        let synced = match self.sync.sync_user(user_id, self.backfill_days).await {
            Ok(count) => Some(count),
            Err(e) => {
                tracing::warn!(user_id, error = %e, "Initial backfill failed");
                None
            }
        };

        Ok(ConnectOutcome {
            integration,
            synced,
        })
    }

    pub async fn is_connected(&self, user_id: u64) -> Result<bool, AppError> {
        Ok(self.integrations.find_active(user_id).await?.is_some())
    }

    pub async fn connection_status(&self, user_id: u64) -> Result<ConnectionStatus, AppError> {
        Ok(match self.integrations.find_active(user_id).await? {
            Some(integration) => ConnectionStatus::from_integration(&integration),
            None => ConnectionStatus::disconnected(),
        })
    }

    pub async fn sync_user_activities(&self, user_id: u64, days_back: i64) -> Result<usize, AppError> {
        self.sync.sync_user(user_id, days_back).await
    }

    pub async fn get_activity_details(
        &self,
        user_id: u64,
        activity_id: u64,
    ) -> Result<serde_json::Value, AppError> {
        self.sync.get_activity_details(user_id, activity_id).await
    }

    /// Strava-side athlete totals, fetched live.
    pub async fn athlete_stats(&self, user_id: u64) -> Result<serde_json::Value, AppError> {
        self.sync.get_athlete_stats(user_id).await
    }

    pub async fn disconnect_user(&self, user_id: u64) -> Result<bool, AppError> {
        self.oauth.disconnect(user_id).await
    }

    pub async fn verify_connection(&self, user_id: u64) -> Result<bool, AppError> {
        self.oauth.verify_connection(user_id).await
    }

    pub async fn get_user_activities(
        &self,
        user_id: u64,
        filters: &ActivityFilters,
    ) -> Result<Vec<Activity>, AppError> {
        self.activities.query_activities(user_id, filters).await
    }

    pub async fn get_stored_activity(
        &self,
        user_id: u64,
        activity_id: u64,
    ) -> Result<Option<Activity>, AppError> {
        self.activities.get_activity(user_id, activity_id).await
    }

    pub async fn activity_stats(
        &self,
        user_id: u64,
        filters: &ActivityFilters,
    ) -> Result<ActivityStats, AppError> {
        let activities = self.activities.query_activities(user_id, filters).await?;
        Ok(ActivityStats::from_activities(&activities))
    }

    pub fn sync_engine(&self) -> &SyncEngine {
        &self.sync
    }
}
