// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! In-process store used by tests and `STORAGE_BACKEND=memory`.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::db::{ActivityStore, IntegrationStore, PendingAuthorizationStore};
use crate::error::AppError;
use crate::models::{
    Activity, ActivityFilters, Integration, IntegrationStatus, PendingAuthorization, TokenUpdate,
};

#[derive(Default)]
pub struct MemoryDb {
    integrations: RwLock<Vec<Integration>>,
    pending: RwLock<HashMap<String, PendingAuthorization>>,
    activities: RwLock<HashMap<(u64, u64), Activity>>,
}

impl MemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn activity_count(&self) -> usize {
        self.activities.read().await.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.pending.read().await.len()
    }
}

#[async_trait]
impl IntegrationStore for MemoryDb {
    async fn activate_integration(&self, integration: &Integration) -> Result<usize, AppError> {
        let mut integrations = self.integrations.write().await;
        let mut deactivated = 0;
        for existing in integrations
            .iter_mut()
            .filter(|i| i.user_id == integration.user_id && i.is_active())
        {
            existing.status = IntegrationStatus::Inactive;
            existing.updated_at = integration.created_at;
            deactivated += 1;
        }
        integrations.push(integration.clone());
        Ok(deactivated)
    }

    async fn find_active(&self, user_id: u64) -> Result<Option<Integration>, AppError> {
        Ok(self
            .integrations
            .read()
            .await
            .iter()
            .find(|i| i.user_id == user_id && i.is_active())
            .cloned())
    }

    async fn find_active_by_athlete(
        &self,
        athlete_id: u64,
    ) -> Result<Option<Integration>, AppError> {
        Ok(self
            .integrations
            .read()
            .await
            .iter()
            .find(|i| i.provider_athlete_id == athlete_id && i.is_active())
            .cloned())
    }

    async fn update_tokens(&self, id: &str, tokens: &TokenUpdate) -> Result<(), AppError> {
        let mut integrations = self.integrations.write().await;
        match integrations.iter_mut().find(|i| i.id == id && i.is_active()) {
            Some(existing) => {
                tokens.apply_to(existing);
                Ok(())
            }
            None => Err(AppError::NotConnected),
        }
    }

    async fn deactivate_user(&self, user_id: u64, at: DateTime<Utc>) -> Result<usize, AppError> {
        let mut integrations = self.integrations.write().await;
        let mut count = 0;
        for integration in integrations
            .iter_mut()
            .filter(|i| i.user_id == user_id && i.is_active())
        {
            integration.status = IntegrationStatus::Inactive;
            integration.updated_at = at;
            count += 1;
        }
        Ok(count)
    }

    async fn record_sync(&self, user_id: u64, at: DateTime<Utc>) -> Result<(), AppError> {
        let mut integrations = self.integrations.write().await;
        for integration in integrations
            .iter_mut()
            .filter(|i| i.user_id == user_id && i.is_active())
        {
            integration.last_sync_at = Some(at);
            integration.updated_at = at;
        }
        Ok(())
    }

    async fn list_active_user_ids(&self) -> Result<Vec<u64>, AppError> {
        let ids: BTreeSet<u64> = self
            .integrations
            .read()
            .await
            .iter()
            .filter(|i| i.is_active())
            .map(|i| i.user_id)
            .collect();
        Ok(ids.into_iter().collect())
    }

    async fn list_integrations(&self, user_id: u64) -> Result<Vec<Integration>, AppError> {
        let mut found: Vec<Integration> = self
            .integrations
            .read()
            .await
            .iter()
            .filter(|i| i.user_id == user_id)
            .cloned()
            .collect();
        found.sort_by_key(|i| i.created_at);
        Ok(found)
    }
}

#[async_trait]
impl PendingAuthorizationStore for MemoryDb {
    async fn put_pending(&self, pending: &PendingAuthorization) -> Result<(), AppError> {
        self.pending
            .write()
            .await
            .insert(pending.state.clone(), pending.clone());
        Ok(())
    }

    async fn take_pending(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, AppError> {
        let taken = self.pending.write().await.remove(state);
        Ok(taken.filter(|p| !p.is_expired(now)).map(|p| p.user_id))
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let mut pending = self.pending.write().await;
        let before = pending.len();
        pending.retain(|_, p| !p.is_expired(now));
        Ok(before - pending.len())
    }
}

#[async_trait]
impl ActivityStore for MemoryDb {
    async fn save_activity(&self, activity: &Activity) -> Result<bool, AppError> {
        self.activities.write().await.insert(
            (activity.user_id, activity.provider_activity_id),
            activity.clone(),
        );
        Ok(true)
    }

    async fn get_activity(
        &self,
        user_id: u64,
        provider_activity_id: u64,
    ) -> Result<Option<Activity>, AppError> {
        Ok(self
            .activities
            .read()
            .await
            .get(&(user_id, provider_activity_id))
            .cloned())
    }

    async fn query_activities(
        &self,
        user_id: u64,
        filters: &ActivityFilters,
    ) -> Result<Vec<Activity>, AppError> {
        let activities = self.activities.read().await;
        Ok(filters.apply(
            activities
                .values()
                .filter(|a| a.user_id == user_id)
                .cloned(),
        ))
    }
}
