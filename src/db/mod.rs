// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Storage layer: store traits plus Firestore and in-memory backends.

pub mod firestore;
pub mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use firestore::FirestoreDb;
pub use memory::MemoryDb;

use crate::error::AppError;
use crate::models::{Activity, ActivityFilters, Integration, PendingAuthorization, TokenUpdate};

/// Collection names as constants.
pub mod collections {
    pub const INTEGRATIONS: &str = "integrations";
    pub const ACTIVITIES: &str = "activities";
    pub const PENDING_AUTHORIZATIONS: &str = "pending_authorizations";
}

/// Per-user OAuth credentials.
#[async_trait]
pub trait IntegrationStore: Send + Sync {
    /// Mark every active integration of `integration.user_id` inactive and
    /// store `integration` as the new active one, atomically.
    ///
    /// Returns the number of integrations deactivated.
    async fn activate_integration(&self, integration: &Integration) -> Result<usize, AppError>;

    async fn find_active(&self, user_id: u64) -> Result<Option<Integration>, AppError>;

    async fn find_active_by_athlete(&self, athlete_id: u64)
        -> Result<Option<Integration>, AppError>;

    /// Store refreshed tokens on integration `id`, leaving status and sync
    /// fields untouched.
    ///
    /// Fails with `NotConnected` if the integration is no longer active.
    async fn update_tokens(&self, id: &str, tokens: &TokenUpdate) -> Result<(), AppError>;

    /// Returns the number of integrations that were active.
    async fn deactivate_user(&self, user_id: u64, at: DateTime<Utc>) -> Result<usize, AppError>;

    async fn record_sync(&self, user_id: u64, at: DateTime<Utc>) -> Result<(), AppError>;

    async fn list_active_user_ids(&self) -> Result<Vec<u64>, AppError>;

    /// Every integration a user ever had, oldest first.
    async fn list_integrations(&self, user_id: u64) -> Result<Vec<Integration>, AppError>;
}

/// OAuth `state` tokens awaiting their callback.
#[async_trait]
pub trait PendingAuthorizationStore: Send + Sync {
    async fn put_pending(&self, pending: &PendingAuthorization) -> Result<(), AppError>;

    /// Consume a state token. Returns the user it was issued to, or `None` if
    /// it was never issued, was already consumed, or has expired.
    async fn take_pending(&self, state: &str, now: DateTime<Utc>)
        -> Result<Option<u64>, AppError>;

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<usize, AppError>;
}

/// Normalized activities keyed by (user, Strava activity ID).
#[async_trait]
pub trait ActivityStore: Send + Sync {
    /// Insert or overwrite. Returns `true` once the write is durable.
    async fn save_activity(&self, activity: &Activity) -> Result<bool, AppError>;

    async fn get_activity(
        &self,
        user_id: u64,
        provider_activity_id: u64,
    ) -> Result<Option<Activity>, AppError>;

    async fn query_activities(
        &self,
        user_id: u64,
        filters: &ActivityFilters,
    ) -> Result<Vec<Activity>, AppError>;
}

/// The set of stores the services are wired against.
#[derive(Clone)]
pub struct Storage {
    pub integrations: Arc<dyn IntegrationStore>,
    pub pending: Arc<dyn PendingAuthorizationStore>,
    pub activities: Arc<dyn ActivityStore>,
}

impl Storage {
    pub fn memory() -> Self {
        Self::from_memory(Arc::new(MemoryDb::new()))
    }

    pub fn from_memory(db: Arc<MemoryDb>) -> Self {
        Self {
            integrations: db.clone(),
            pending: db.clone(),
            activities: db,
        }
    }

    pub fn firestore(db: FirestoreDb) -> Self {
        let db = Arc::new(db);
        Self {
            integrations: db.clone(),
            pending: db.clone(),
            activities: db,
        }
    }
}
