// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava push subscription: handshake and event ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::db::IntegrationStore;
use crate::error::AppError;
use crate::services::oauth::OAuthClient;
use crate::services::sync::SyncEngine;

pub const SUBSCRIBE_MODE: &str = "subscribe";

/// Strava webhook verification query params.
#[derive(Debug, Default, Deserialize)]
pub struct VerifyParams {
    #[serde(rename = "hub.mode", default)]
    pub mode: Option<String>,
    #[serde(rename = "hub.challenge", default)]
    pub challenge: Option<String>,
    #[serde(rename = "hub.verify_token", default)]
    pub verify_token: Option<String>,
}

/// Strava webhook event payload.
///
/// Only `object_type` is required. Other fields that are missing or have the
/// wrong type are `None`, and events lacking what their action needs are
/// ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// "activity" or "athlete"
    pub object_type: String,
    #[serde(default)]
    pub object_id: Option<u64>,
    /// "create", "update", "delete"
    #[serde(default)]
    pub aspect_type: Option<String>,
    /// Strava athlete ID
    #[serde(default)]
    pub owner_id: Option<u64>,
    #[serde(default)]
    pub subscription_id: Option<u64>,
    #[serde(default)]
    pub event_time: Option<i64>,
    /// For athlete events, contains {"authorized": "false"} on deauthorization
    #[serde(default)]
    pub updates: Option<HashMap<String, serde_json::Value>>,
}

/// What an event asks us to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookAction {
    SyncActivity { athlete_id: u64, activity_id: u64 },
    Deauthorize { athlete_id: u64 },
    Ignore,
}

impl WebhookEvent {
    /// Strava sends: object_type="athlete", aspect_type="update", updates={"authorized": "false"}
    pub fn is_deauthorization(&self) -> bool {
        self.object_type == "athlete"
            && self
                .updates
                .as_ref()
                .and_then(|u| u.get("authorized"))
                .is_some_and(|v| v == false || v == "false")
    }

    pub fn action(&self) -> WebhookAction {
        match (self.object_type.as_str(), self.aspect_type.as_deref()) {
            ("activity", Some("create" | "update")) => match (self.owner_id, self.object_id) {
                (Some(athlete_id), Some(activity_id)) => WebhookAction::SyncActivity {
                    athlete_id,
                    activity_id,
                },
                _ => WebhookAction::Ignore,
            },
            ("athlete", _) if self.is_deauthorization() => self
                .owner_id
                .map_or(WebhookAction::Ignore, |athlete_id| WebhookAction::Deauthorize {
                    athlete_id,
                }),
            _ => WebhookAction::Ignore,
        }
    }

    pub fn aspect(&self) -> &str {
        self.aspect_type.as_deref().unwrap_or_default()
    }

    /// Build an event from a JSON object, reading each field on its own.
    fn from_payload(object_type: &str, payload: &serde_json::Map<String, serde_json::Value>) -> Self {
        Self {
            object_type: object_type.to_string(),
            object_id: payload.get("object_id").and_then(lenient_id),
            aspect_type: payload
                .get("aspect_type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            owner_id: payload.get("owner_id").and_then(lenient_id),
            subscription_id: payload.get("subscription_id").and_then(lenient_id),
            event_time: payload.get("event_time").and_then(|v| v.as_i64()),
            updates: payload
                .get("updates")
                .and_then(|v| v.as_object())
                .map(|m| m.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
        }
    }
}

/// Numeric IDs, also accepted as decimal strings.
fn lenient_id(value: &serde_json::Value) -> Option<u64> {
    value
        .as_u64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
}

#[derive(Clone)]
pub struct WebhookHandler {
    sync: SyncEngine,
    oauth: OAuthClient,
    integrations: Arc<dyn IntegrationStore>,
    verify_token: String,
}

impl WebhookHandler {
    pub fn new(sync: SyncEngine, verify_token: String) -> Self {
        let oauth = sync.oauth().clone();
        Self {
            integrations: oauth.integration_store(),
            oauth,
            sync,
            verify_token,
        }
    }

    /// Subscription handshake. Returns the challenge to echo back.
    pub fn verify(&self, params: &VerifyParams) -> Result<String, AppError> {
        if params.mode.as_deref() != Some(SUBSCRIBE_MODE) {
            tracing::warn!(mode = ?params.mode, "Webhook verification failed: bad mode");
            return Err(AppError::InvalidMode);
        }

        let presented = params.verify_token.as_deref().unwrap_or_default();
        if !bool::from(presented.as_bytes().ct_eq(self.verify_token.as_bytes())) {
            tracing::warn!("Webhook verification failed: invalid token");
            return Err(AppError::InvalidToken);
        }

        tracing::info!("Webhook subscription verified");
        Ok(params.challenge.clone().unwrap_or_default())
    }

    /// Validate a raw event body.
    pub fn parse_event(body: &[u8]) -> Result<WebhookEvent, AppError> {
        let payload: serde_json::Value = serde_json::from_slice(body)
            .map_err(|e| AppError::InvalidEvent(format!("malformed JSON: {}", e)))?;

        let Some(payload) = payload.as_object() else {
            return Err(AppError::InvalidEvent("event is not an object".to_string()));
        };
        let Some(object_type) = payload.get("object_type").and_then(|v| v.as_str()) else {
            return Err(AppError::InvalidEvent("missing object_type".to_string()));
        };

        Ok(WebhookEvent::from_payload(object_type, payload))
    }

    /// Process an event in the background; the caller has already acked.
    pub fn dispatch(&self, event: WebhookEvent) -> tokio::task::JoinHandle<()> {
        let handler = self.clone();
        tokio::spawn(async move { handler.ingest(&event).await })
    }

    /// Apply an event. Failures are logged, never returned.
    pub async fn ingest(&self, event: &WebhookEvent) {
        tracing::info!(
            object_type = %event.object_type,
            aspect_type = event.aspect(),
            object_id = ?event.object_id,
            athlete_id = ?event.owner_id,
            "Processing webhook event"
        );

        match event.action() {
            WebhookAction::SyncActivity {
                athlete_id,
                activity_id,
            } => {
                let Some(user_id) = self.resolve_user(athlete_id).await else {
                    return;
                };
                if let Err(e) = self.sync.sync_one_activity(user_id, activity_id).await {
                    tracing::warn!(
                        user_id,
                        activity_id,
                        error = %e,
                        "Webhook activity sync failed"
                    );
                }
            }
            WebhookAction::Deauthorize { athlete_id } => {
                let Some(user_id) = self.resolve_user(athlete_id).await else {
                    return;
                };
                match self.oauth.disconnect(user_id).await {
                    Ok(_) => tracing::info!(user_id, athlete_id, "Athlete deauthorized"),
                    Err(e) => {
                        tracing::warn!(user_id, error = %e, "Failed to disconnect deauthorized user")
                    }
                }
            }
            WebhookAction::Ignore => {
                tracing::debug!(
                    object_type = %event.object_type,
                    aspect_type = event.aspect(),
                    "Ignoring webhook event"
                );
            }
        }
    }

    async fn resolve_user(&self, athlete_id: u64) -> Option<u64> {
        match self.integrations.find_active_by_athlete(athlete_id).await {
            Ok(Some(integration)) => Some(integration.user_id),
            Ok(None) => {
                tracing::info!(athlete_id, "Webhook event for unknown athlete");
                None
            }
            Err(e) => {
                tracing::warn!(athlete_id, error = %e, "Failed to look up athlete");
                None
            }
        }
    }
}
