// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore client wrapper with typed operations.
//!
//! Provides the store traits for:
//! - Integrations (per-user OAuth credentials, never deleted)
//! - Pending authorizations (single-use OAuth `state` tokens)
//! - Activities (normalized Strava activities)

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use firestore::{
    FirestoreConsistencySelector, FirestoreQueryDirection, FirestoreTransaction,
    FirestoreWritePrecondition,
};

use crate::db::{collections, ActivityStore, IntegrationStore, PendingAuthorizationStore};
use crate::error::AppError;
use crate::models::{
    Activity, ActivityFilters, ActivityOrder, Integration, IntegrationStatus,
    PendingAuthorization, TokenUpdate,
};
use crate::time_utils::format_utc_rfc3339;

/// Firestore database client.
#[derive(Clone)]
pub struct FirestoreDb {
    client: Option<firestore::FirestoreDb>,
}

impl FirestoreDb {
    /// Create a new Firestore client.
    ///
    /// For local development with emulator, set FIRESTORE_EMULATOR_HOST.
    pub async fn new(project_id: &str) -> Result<Self, AppError> {
        if std::env::var("FIRESTORE_EMULATOR_HOST").is_ok() {
            return Self::create_emulator_client(project_id).await;
        }

        let client = firestore::FirestoreDb::new(project_id)
            .await
            .map_err(|e| AppError::Database(format!("Failed to connect to Firestore: {}", e)))?;

        tracing::info!(project = project_id, "Connected to Firestore");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Create a Firestore client for the emulator with unauthenticated access.
    async fn create_emulator_client(project_id: &str) -> Result<Self, AppError> {
        let token_source = gcloud_sdk::ExternalJwtFunctionSource::new(|| async {
            Ok(gcloud_sdk::Token {
                token_type: "Bearer".to_string(),
                token: gcloud_sdk::SecretValue::new(
                    "eyJhbGciOiJub25lIn0.eyJ1aWQiOiJ0ZXN0In0."
                        .to_string()
                        .into(),
                ),
                expiry: chrono::Utc::now() + chrono::Duration::hours(1),
            })
        });

        let options = firestore::FirestoreDbOptions::new(project_id.to_string());

        let client = firestore::FirestoreDb::with_options_token_source(
            options,
            gcloud_sdk::GCP_DEFAULT_SCOPES.clone(),
            gcloud_sdk::TokenSourceType::ExternalSource(Box::new(token_source)),
        )
        .await
        .map_err(|e| {
            AppError::Database(format!("Failed to connect to Firestore Emulator: {}", e))
        })?;

        tracing::info!(project = project_id, "Connected to Firestore Emulator");

        Ok(Self {
            client: Some(client),
        })
    }

    /// Offline client; every operation returns a database error.
    pub fn new_mock() -> Self {
        Self { client: None }
    }

    fn get_client(&self) -> Result<&firestore::FirestoreDb, AppError> {
        self.client
            .as_ref()
            .ok_or_else(|| AppError::Database("Database not connected (offline mode)".to_string()))
    }

    async fn active_for_user(&self, user_id: u64) -> Result<Vec<Integration>, AppError> {
        Self::query_active_for_user(self.get_client()?, user_id).await
    }

    async fn query_active_for_user(
        db: &firestore::FirestoreDb,
        user_id: u64,
    ) -> Result<Vec<Integration>, AppError> {
        db.fluent()
            .select()
            .from(collections::INTEGRATIONS)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    q.field("status").eq(IntegrationStatus::Active.as_str()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// A client whose reads join `transaction`, so concurrent writers to the
    /// documents read make the commit fail.
    fn reader_in(
        client: &firestore::FirestoreDb,
        transaction: &FirestoreTransaction<'_>,
    ) -> firestore::FirestoreDb {
        client.clone_with_consistency_selector(FirestoreConsistencySelector::Transaction(
            transaction.transaction_id().clone(),
        ))
    }

    /// Write only `fields` of `integration`.
    fn add_masked_update(
        client: &firestore::FirestoreDb,
        transaction: &mut FirestoreTransaction<'_>,
        integration: &Integration,
        fields: &[&str],
    ) -> Result<(), AppError> {
        client
            .fluent()
            .update()
            .fields(fields.iter().copied())
            .in_col(collections::INTEGRATIONS)
            .document_id(&integration.id)
            .object(integration)
            .add_to_transaction(transaction)
            .map_err(|e| AppError::Database(format!("Failed to add update to transaction: {}", e)))?;
        Ok(())
    }

    /// Apply `change` to every active integration of `user_id` and write back
    /// only `fields`, reading and writing in one transaction.
    async fn update_active_fields<F>(
        &self,
        user_id: u64,
        fields: &[&str],
        change: F,
    ) -> Result<usize, AppError>
    where
        F: Fn(&mut Integration),
    {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let active =
            Self::query_active_for_user(&Self::reader_in(client, &transaction), user_id).await?;
        if active.is_empty() {
            let _ = transaction.rollback().await;
            return Ok(0);
        }

        for mut integration in active.iter().cloned() {
            change(&mut integration);
            Self::add_masked_update(client, &mut transaction, &integration, fields)?;
        }

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit update: {}", e)))?;
        Ok(active.len())
    }
}

const STATUS_FIELDS: [&str; 2] = ["status", "updated_at"];
const SYNC_FIELDS: [&str; 2] = ["last_sync_at", "updated_at"];
const TOKEN_FIELDS: [&str; 4] = ["access_token", "refresh_token", "token_expires_at", "updated_at"];

// ─── Integration Operations ──────────────────────────────────────

#[async_trait]
impl IntegrationStore for FirestoreDb {
    async fn activate_integration(&self, integration: &Integration) -> Result<usize, AppError> {
        let client = self.get_client()?;

        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        // Read the prior active records inside the transaction so two
        // concurrent activations cannot both see none.
        let prior = Self::query_active_for_user(
            &Self::reader_in(client, &transaction),
            integration.user_id,
        )
        .await?;

        for mut old in prior.iter().cloned() {
            old.status = IntegrationStatus::Inactive;
            old.updated_at = integration.created_at;
            Self::add_masked_update(client, &mut transaction, &old, &STATUS_FIELDS)?;
        }

        client
            .fluent()
            .update()
            .in_col(collections::INTEGRATIONS)
            .document_id(&integration.id)
            .object(integration)
            .add_to_transaction(&mut transaction)
            .map_err(|e| {
                AppError::Database(format!("Failed to add integration to transaction: {}", e))
            })?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit integration: {}", e)))?;

        Ok(prior.len())
    }

    async fn find_active(&self, user_id: u64) -> Result<Option<Integration>, AppError> {
        let mut active = self.active_for_user(user_id).await?;
        active.sort_by_key(|i| i.created_at);
        Ok(active.pop())
    }

    async fn find_active_by_athlete(
        &self,
        athlete_id: u64,
    ) -> Result<Option<Integration>, AppError> {
        let mut active: Vec<Integration> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::INTEGRATIONS)
            .filter(move |q| {
                q.for_all([
                    q.field("provider_athlete_id").eq(athlete_id),
                    q.field("status").eq(IntegrationStatus::Active.as_str()),
                ])
            })
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        active.sort_by_key(|i| i.created_at);
        Ok(active.pop())
    }

    async fn update_tokens(&self, id: &str, tokens: &TokenUpdate) -> Result<(), AppError> {
        let client = self.get_client()?;
        let mut transaction = client
            .begin_transaction()
            .await
            .map_err(|e| AppError::Database(format!("Failed to begin transaction: {}", e)))?;

        let current: Option<Integration> = Self::reader_in(client, &transaction)
            .fluent()
            .select()
            .by_id_in(collections::INTEGRATIONS)
            .obj()
            .one(id)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(mut current) = current.filter(|i| i.is_active()) else {
            let _ = transaction.rollback().await;
            return Err(AppError::NotConnected);
        };

        tokens.apply_to(&mut current);
        Self::add_masked_update(client, &mut transaction, &current, &TOKEN_FIELDS)?;

        transaction
            .commit()
            .await
            .map_err(|e| AppError::Database(format!("Failed to commit tokens: {}", e)))?;
        Ok(())
    }

    async fn deactivate_user(&self, user_id: u64, at: DateTime<Utc>) -> Result<usize, AppError> {
        self.update_active_fields(user_id, &STATUS_FIELDS, |integration| {
            integration.status = IntegrationStatus::Inactive;
            integration.updated_at = at;
        })
        .await
    }

    async fn record_sync(&self, user_id: u64, at: DateTime<Utc>) -> Result<(), AppError> {
        self.update_active_fields(user_id, &SYNC_FIELDS, |integration| {
            integration.last_sync_at = Some(at);
            integration.updated_at = at;
        })
        .await?;
        Ok(())
    }

    async fn list_active_user_ids(&self) -> Result<Vec<u64>, AppError> {
        let active: Vec<Integration> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::INTEGRATIONS)
            .filter(|q| q.field("status").eq(IntegrationStatus::Active.as_str()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let ids: BTreeSet<u64> = active.iter().map(|i| i.user_id).collect();
        Ok(ids.into_iter().collect())
    }

    async fn list_integrations(&self, user_id: u64) -> Result<Vec<Integration>, AppError> {
        let mut found: Vec<Integration> = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::INTEGRATIONS)
            .filter(move |q| q.field("user_id").eq(user_id))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        found.sort_by_key(|i| i.created_at);
        Ok(found)
    }
}

// ─── Pending Authorization Operations ────────────────────────────

#[async_trait]
impl PendingAuthorizationStore for FirestoreDb {
    async fn put_pending(&self, pending: &PendingAuthorization) -> Result<(), AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::PENDING_AUTHORIZATIONS)
            .document_id(&pending.state)
            .object(pending)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(())
    }

    async fn take_pending(
        &self,
        state: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<u64>, AppError> {
        let client = self.get_client()?;
        let pending: Option<PendingAuthorization> = client
            .fluent()
            .select()
            .by_id_in(collections::PENDING_AUTHORIZATIONS)
            .obj()
            .one(state)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        let Some(pending) = pending else {
            return Ok(None);
        };

        // Only the caller whose delete lands consumes the token.
        let deleted = client
            .fluent()
            .delete()
            .from(collections::PENDING_AUTHORIZATIONS)
            .document_id(state)
            .precondition(FirestoreWritePrecondition::Exists(true))
            .execute()
            .await;
        if let Err(e) = deleted {
            tracing::warn!(error = %e, "Pending authorization already consumed");
            return Ok(None);
        }

        if pending.is_expired(now) {
            return Ok(None);
        }
        Ok(Some(pending.user_id))
    }

    async fn purge_expired_pending(&self, now: DateTime<Utc>) -> Result<usize, AppError> {
        let client = self.get_client()?;
        let cutoff = format_utc_rfc3339(now);
        let expired: Vec<PendingAuthorization> = client
            .fluent()
            .select()
            .from(collections::PENDING_AUTHORIZATIONS)
            .filter(move |q| q.field("expires_at").less_than_or_equal(cutoff.clone()))
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        for pending in &expired {
            client
                .fluent()
                .delete()
                .from(collections::PENDING_AUTHORIZATIONS)
                .document_id(&pending.state)
                .execute()
                .await
                .map_err(|e| AppError::Database(e.to_string()))?;
        }
        Ok(expired.len())
    }
}

// ─── Activity Operations ─────────────────────────────────────────

#[async_trait]
impl ActivityStore for FirestoreDb {
    async fn save_activity(&self, activity: &Activity) -> Result<bool, AppError> {
        let _: () = self
            .get_client()?
            .fluent()
            .update()
            .in_col(collections::ACTIVITIES)
            .document_id(activity.document_id())
            .object(activity)
            .execute()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;
        Ok(true)
    }

    async fn get_activity(
        &self,
        user_id: u64,
        provider_activity_id: u64,
    ) -> Result<Option<Activity>, AppError> {
        self.get_client()?
            .fluent()
            .select()
            .by_id_in(collections::ACTIVITIES)
            .obj()
            .one(&crate::models::activity::activity_document_id(
                user_id,
                provider_activity_id,
            ))
            .await
            .map_err(|e| AppError::Database(e.to_string()))
    }

    /// Type and date filters run in Firestore. Distance ordering needs a
    /// composite index, so that order is applied after the fetch.
    async fn query_activities(
        &self,
        user_id: u64,
        filters: &ActivityFilters,
    ) -> Result<Vec<Activity>, AppError> {
        let activity_type = filters.activity_type.clone();
        let date_from = filters.date_from.map(format_utc_rfc3339);
        let date_to = filters.date_to.map(format_utc_rfc3339);

        let query = self
            .get_client()?
            .fluent()
            .select()
            .from(collections::ACTIVITIES)
            .filter(move |q| {
                q.for_all([
                    q.field("user_id").eq(user_id),
                    activity_type
                        .clone()
                        .and_then(|t| q.field("activity_type").eq(t)),
                    date_from
                        .clone()
                        .and_then(|d| q.field("start_time").greater_than_or_equal(d)),
                    date_to
                        .clone()
                        .and_then(|d| q.field("start_time").less_than_or_equal(d)),
                ])
            });

        let query = match filters.order {
            ActivityOrder::Newest => {
                query.order_by([("start_time", FirestoreQueryDirection::Descending)])
            }
            ActivityOrder::Oldest => {
                query.order_by([("start_time", FirestoreQueryDirection::Ascending)])
            }
            ActivityOrder::Longest => query,
        };

        let query = match filters.limit {
            Some(limit) if filters.order != ActivityOrder::Longest => query.limit(limit as u32),
            _ => query,
        };

        let activities: Vec<Activity> = query
            .obj()
            .query()
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(filters.apply(activities))
    }
}
