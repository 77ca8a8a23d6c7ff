// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API routes for authenticated users.

use crate::error::{AppError, Result};
use crate::middleware::auth::AuthUser;
use crate::models::{Activity, ActivityFilters, ActivityOrder, ActivityStats, ConnectionStatus};
use crate::time_utils::parse_rfc3339;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Extension, Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use validator::Validate;

const DEFAULT_ACTIVITY_LIMIT: usize = 50;

/// API routes (require authentication via JWT).
/// The auth middleware is applied in routes/mod.rs for these routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/connection", get(get_connection))
        .route("/api/sync", post(sync_now))
        .route("/api/activities", get(get_activities))
        .route("/api/activities/{id}", get(get_activity))
        .route("/api/stats", get(get_stats))
        .route("/api/athlete/stats", get(get_athlete_stats))
        .route("/api/disconnect", post(disconnect))
}

// ─── Connection ──────────────────────────────────────────────

async fn get_connection(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ConnectionStatus>> {
    Ok(Json(
        state
            .integration_service
            .connection_status(user.user_id)
            .await?,
    ))
}

#[derive(Serialize)]
pub struct DisconnectResponse {
    pub success: bool,
}

async fn disconnect(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<DisconnectResponse>> {
    let success = state
        .integration_service
        .disconnect_user(user.user_id)
        .await?;
    Ok(Json(DisconnectResponse { success }))
}

// ─── Sync ────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
struct SyncParams {
    #[validate(range(min = 1, max = 365))]
    days_back: Option<i64>,
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub synced: usize,
}

/// Manual "sync now".
async fn sync_now(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<SyncParams>,
) -> Result<Json<SyncResponse>> {
    params
        .validate()
        .map_err(|e| AppError::BadRequest(e.to_string()))?;
    let days_back = params.days_back.unwrap_or(state.config.sync_days_back);

    tracing::info!(user_id = user.user_id, days_back, "Manual sync requested");

    let synced = state
        .integration_service
        .sync_user_activities(user.user_id, days_back)
        .await?;
    Ok(Json(SyncResponse { synced }))
}

// ─── Activities ──────────────────────────────────────────────

#[derive(Debug, Deserialize, Validate)]
struct ActivitiesQuery {
    /// Filter by activity type (Run, Ride, ...)
    #[serde(rename = "type")]
    #[validate(length(min = 1, max = 64))]
    activity_type: Option<String>,
    /// Inclusive lower bound (RFC3339)
    from: Option<String>,
    /// Inclusive upper bound (RFC3339)
    to: Option<String>,
    order: Option<ActivityOrder>,
    #[validate(range(min = 1, max = 500))]
    limit: Option<usize>,
}

fn parse_bound(name: &str, raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(|value| {
        parse_rfc3339(value).ok_or_else(|| {
            AppError::BadRequest(format!("Invalid '{}' parameter. Expected RFC3339", name))
        })
    })
    .transpose()
}

impl ActivitiesQuery {
    fn into_filters(self, default_limit: Option<usize>) -> Result<ActivityFilters> {
        self.validate()
            .map_err(|e| AppError::BadRequest(e.to_string()))?;

        let date_from = parse_bound("from", self.from.as_deref())?;
        let date_to = parse_bound("to", self.to.as_deref())?;
        if let (Some(from), Some(to)) = (date_from, date_to) {
            if from > to {
                return Err(AppError::BadRequest(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }

        Ok(ActivityFilters {
            activity_type: self.activity_type,
            date_from,
            date_to,
            order: self.order.unwrap_or_default(),
            limit: self.limit.or(default_limit),
        })
    }
}

#[derive(Serialize)]
pub struct ActivitiesResponse {
    pub activities: Vec<Activity>,
    pub count: usize,
}

async fn get_activities(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivitiesResponse>> {
    let filters = params.into_filters(Some(DEFAULT_ACTIVITY_LIMIT))?;
    let activities = state
        .integration_service
        .get_user_activities(user.user_id, &filters)
        .await?;
    Ok(Json(ActivitiesResponse {
        count: activities.len(),
        activities,
    }))
}

#[derive(Serialize)]
pub struct ActivityDetailResponse {
    pub activity: Option<Activity>,
    /// Live Strava payload
    pub details: serde_json::Value,
}

async fn get_activity(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Path(activity_id): Path<u64>,
) -> Result<Json<ActivityDetailResponse>> {
    let service = &state.integration_service;
    let details = service
        .get_activity_details(user.user_id, activity_id)
        .await?;
    let activity = service
        .get_stored_activity(user.user_id, activity_id)
        .await?;
    Ok(Json(ActivityDetailResponse { activity, details }))
}

/// Stats over the same filters as `/api/activities`, without the default limit.
async fn get_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    Query(params): Query<ActivitiesQuery>,
) -> Result<Json<ActivityStats>> {
    let filters = params.into_filters(None)?;
    Ok(Json(
        state
            .integration_service
            .activity_stats(user.user_id, &filters)
            .await?,
    ))
}

async fn get_athlete_stats(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<serde_json::Value>> {
    Ok(Json(
        state
            .integration_service
            .athlete_stats(user.user_id)
            .await?,
    ))
}
