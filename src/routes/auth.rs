// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Strava OAuth connection routes.

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Extension, Router,
};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::Result;
use crate::middleware::auth::AuthUser;
use crate::AppState;

/// Shown to the user after a successful connection.
pub const CONNECTED_MESSAGE: &str = "Successfully connected to Strava!";

/// Callback route. Strava redirects the browser here, so it is public; the
/// `state` token ties it back to the user who started the flow.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/strava/callback", get(auth_callback))
}

/// Routes that need a logged-in user.
pub fn protected_routes() -> Router<Arc<AppState>> {
    Router::new().route("/auth/strava", get(auth_start))
}

/// 302 redirect.
fn found(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

/// Start OAuth flow - redirect to Strava authorization.
async fn auth_start(
    State(state): State<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Response> {
    let url = state
        .integration_service
        .start_connect(user.user_id)
        .await?;
    Ok(found(&url))
}

/// OAuth callback query parameters.
#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// Frontend URL carrying the outcome of the callback.
pub fn frontend_redirect_url(
    frontend_url: &str,
    message: &str,
    success: bool,
    count: Option<usize>,
) -> String {
    let separator = if frontend_url.contains('?') { '&' } else { '?' };
    let mut url = format!(
        "{}{}strava_message={}&strava_type={}",
        frontend_url,
        separator,
        urlencoding::encode(message),
        if success { "success" } else { "error" }
    );
    if let Some(count) = count {
        url.push_str(&format!("&count={}", count));
    }
    url
}

/// Handle the Strava redirect and send the user back to the frontend.
async fn auth_callback(
    State(state): State<Arc<AppState>>,
    Query(params): Query<CallbackParams>,
) -> Response {
    let outcome = state
        .integration_service
        .connect(
            params.code.as_deref(),
            params.state.as_deref(),
            params.error.as_deref(),
        )
        .await;

    let frontend_url = &state.config.frontend_url;
    match outcome {
        Ok(outcome) => found(&frontend_redirect_url(
            frontend_url,
            CONNECTED_MESSAGE,
            true,
            outcome.synced,
        )),
        Err(e) => {
            tracing::warn!(error = %e, "Strava connection failed");
            found(&frontend_redirect_url(
                frontend_url,
                &e.user_message(),
                false,
                None,
            ))
        }
    }
}
