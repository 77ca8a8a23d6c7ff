// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Webhook routes for Strava events.

use crate::error::Result;
use crate::services::webhook::{VerifyParams, WebhookHandler};
use crate::AppState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;

/// Webhook routes.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/webhook", get(verify).post(handle_event))
}

/// Verification response.
#[derive(Serialize)]
pub struct VerifyResponse {
    #[serde(rename = "hub.challenge")]
    challenge: String,
}

#[derive(Serialize)]
pub struct EventAck {
    status: &'static str,
}

/// Verify webhook subscription (GET).
async fn verify(
    State(state): State<Arc<AppState>>,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyResponse>> {
    let challenge = state.webhook_handler.verify(&params)?;
    Ok(Json(VerifyResponse { challenge }))
}

/// Handle incoming webhook events (POST).
///
/// Strava expects an answer within two seconds, so the event is acked as
/// soon as it parses and processed on a background task.
async fn handle_event(State(state): State<Arc<AppState>>, body: Bytes) -> Result<Json<EventAck>> {
    let event = WebhookHandler::parse_event(&body).map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook event");
        e
    })?;

    tracing::info!(
        object_type = %event.object_type,
        aspect_type = event.aspect(),
        object_id = ?event.object_id,
        athlete_id = ?event.owner_id,
        "Webhook event received"
    );

    state.webhook_handler.dispatch(event);

    Ok(Json(EventAck {
        status: "EVENT_RECEIVED",
    }))
}
