// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! API authentication, redirect and CORS tests.
//!
//! These tests verify that:
//! 1. Protected routes reject requests without valid tokens
//! 2. Sessions are accepted from either the bearer header or the cookie
//! 3. The OAuth routes redirect with 302
//! 4. CORS preflight requests return correct headers

use axum::{
    body::Body,
    http::{header, Request, Response, StatusCode},
};
use chrono::Duration;
use coach_sync::middleware::auth::{create_jwt, SESSION_COOKIE, SESSION_TTL_SECS};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, ResponseTemplate};

mod common;
use common::{access_token_for, activity_json, mount_activity_list, mount_token_exchange, TestHarness};

fn session_for(h: &TestHarness, user_id: u64) -> String {
    create_jwt(user_id, &h.state.config.jwt_signing_key, SESSION_TTL_SECS).unwrap()
}

async fn send(h: &TestHarness, request: Request<Body>) -> Response<Body> {
    h.router().oneshot(request).await.unwrap()
}

async fn authed_get(h: &TestHarness, user_id: u64, uri: &str) -> Response<Body> {
    send(
        h,
        Request::builder()
            .method("GET")
            .uri(uri)
            .header(header::AUTHORIZATION, format!("Bearer {}", session_for(h, user_id)))
            .body(Body::empty())
            .unwrap(),
    )
    .await
}

async fn json_body(response: Response<Body>) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn location(response: &Response<Body>) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .expect("redirect has a Location")
        .to_str()
        .unwrap()
        .to_string()
}

// ═══════════════════════════════════════════════════════════════════════════
// SESSION AUTH
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_protected_route_without_token() {
    let h = TestHarness::new().await;

    for uri in ["/api/connection", "/api/activities", "/api/stats", "/auth/strava"] {
        let response = send(
            &h,
            Request::builder().method("GET").uri(uri).body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED, "{}", uri);
    }
}

#[tokio::test]
async fn test_protected_route_with_invalid_token() {
    let h = TestHarness::new().await;

    let response = send(
        &h,
        Request::builder()
            .method("GET")
            .uri("/api/connection")
            .header(header::AUTHORIZATION, "Bearer invalid.token.here")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_protected_route_with_bearer_token() {
    let h = TestHarness::new().await;

    let response = authed_get(&h, 7, "/api/connection").await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["connected"], false);
}

#[tokio::test]
async fn test_protected_route_with_cookie() {
    let h = TestHarness::new().await;
    h.seed_integration(7, 4242, Duration::hours(6)).await;

    let response = send(
        &h,
        Request::builder()
            .method("GET")
            .uri("/api/connection")
            .header(header::COOKIE, format!("{}={}", SESSION_COOKIE, session_for(&h, 7)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["connected"], true);
    assert_eq!(json["athlete_id"], 4242);
    assert_eq!(json["athlete_name"], "Test Mentee");
}

#[tokio::test]
async fn test_security_headers_present() {
    let h = TestHarness::new().await;
    let response = authed_get(&h, 7, "/api/connection").await;

    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("x-frame-options").unwrap(), "DENY");
}

// ═══════════════════════════════════════════════════════════════════════════
// OAUTH REDIRECTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_connect_redirects_to_strava() {
    let h = TestHarness::new().await;

    let response = authed_get(&h, 7, "/auth/strava").await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let url = location(&response);
    assert!(url.starts_with(&format!("{}/oauth/authorize?client_id=test_client_id", h.server.uri())));
    assert!(url.contains("&state="));
    assert_eq!(h.db.pending_count().await, 1);
}

#[tokio::test]
async fn test_callback_success_redirects_with_count() {
    let h = TestHarness::new().await;
    mount_token_exchange(&h.server, "abc", 4242, "fresh", h.now() + Duration::hours(6)).await;
    mount_activity_list(&h.server, "fresh", vec![activity_json(1, 1), activity_json(2, 2)]).await;

    let state = h.issue_state(7).await;
    let response = send(
        &h,
        Request::builder()
            .method("GET")
            .uri(format!("/auth/strava/callback?code=abc&state={}", state))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "http://localhost:5173?strava_message=Successfully%20connected%20to%20Strava%21&strava_type=success&count=2"
    );
    assert!(h.active_integration(7).await.is_some());
}

#[tokio::test]
async fn test_callback_denied_redirects_with_error() {
    let h = TestHarness::new().await;
    let state = h.issue_state(7).await;

    let response = send(
        &h,
        Request::builder()
            .method("GET")
            .uri(format!("/auth/strava/callback?error=access_denied&state={}", state))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        location(&response),
        "http://localhost:5173?strava_message=Strava%20authorization%20denied%3A%20access_denied&strava_type=error"
    );
}

#[tokio::test]
async fn test_callback_bad_state_redirects_with_error() {
    let h = TestHarness::new().await;

    let response = send(
        &h,
        Request::builder()
            .method("GET")
            .uri("/auth/strava/callback?code=abc&state=forged")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::FOUND);
    let url = location(&response);
    assert!(url.contains("strava_message=Invalid%20authorization%20state"));
    assert!(url.ends_with("strava_type=error"));
}

// ═══════════════════════════════════════════════════════════════════════════
// API ENDPOINTS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_activities_endpoint_lists_synced_history() {
    let h = TestHarness::new().await;
    h.seed_integration(7, 4242, Duration::hours(6)).await;
    mount_activity_list(
        &h.server,
        &access_token_for(7),
        vec![activity_json(1, 3), activity_json(2, 1)],
    )
    .await;

    let response = send(
        &h,
        Request::builder()
            .method("POST")
            .uri("/api/sync?days_back=7")
            .header(header::AUTHORIZATION, format!("Bearer {}", session_for(&h, 7)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["synced"], 2);

    let response = authed_get(&h, 7, "/api/activities?type=Run&order=oldest&limit=1").await;
    assert_eq!(response.status(), StatusCode::OK);
    let json = json_body(response).await;
    assert_eq!(json["count"], 1);
    assert_eq!(json["activities"][0]["provider_activity_id"], 1);

    let response = authed_get(&h, 7, "/api/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["total_activities"], 2);
}

#[tokio::test]
async fn test_athlete_stats_endpoint() {
    let h = TestHarness::new().await;

    let response = authed_get(&h, 7, "/api/athlete/stats").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_connected");

    h.seed_integration(7, 4242, Duration::hours(6)).await;
    Mock::given(method("GET"))
        .and(path("/api/v3/athletes/4242/stats"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"ytd_run_totals": {"count": 12}})),
        )
        .mount(&h.server)
        .await;

    let response = authed_get(&h, 7, "/api/athlete/stats").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["ytd_run_totals"]["count"], 12);
}

#[tokio::test]
async fn test_sync_without_connection_is_not_found() {
    let h = TestHarness::new().await;

    let response = send(
        &h,
        Request::builder()
            .method("POST")
            .uri("/api/sync")
            .header(header::AUTHORIZATION, format!("Bearer {}", session_for(&h, 7)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json_body(response).await["error"], "not_connected");
}

#[tokio::test]
async fn test_query_validation() {
    let h = TestHarness::new().await;

    for uri in [
        "/api/activities?limit=0",
        "/api/activities?limit=501",
        "/api/activities?from=yesterday",
        "/api/activities?from=2026-03-01T00:00:00Z&to=2026-02-01T00:00:00Z",
        "/api/stats?to=not-a-date",
    ] {
        let response = authed_get(&h, 7, uri).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);
    }

    let response = send(
        &h,
        Request::builder()
            .method("POST")
            .uri("/api/sync?days_back=0")
            .header(header::AUTHORIZATION, format!("Bearer {}", session_for(&h, 7)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_disconnect_endpoint() {
    let h = TestHarness::new().await;
    h.seed_integration(7, 4242, Duration::hours(6)).await;

    let response = send(
        &h,
        Request::builder()
            .method("POST")
            .uri("/api/disconnect")
            .header(header::AUTHORIZATION, format!("Bearer {}", session_for(&h, 7)))
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["success"], true);
    assert!(h.active_integration(7).await.is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// PUBLIC / CORS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_cors_preflight() {
    let h = TestHarness::new().await;

    let response = send(
        &h,
        Request::builder()
            .method("OPTIONS")
            .uri("/api/activities")
            .header(header::ORIGIN, "http://localhost:5173")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "http://localhost:5173"
    );
    assert!(response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_METHODS));
}

#[tokio::test]
async fn test_cors_rejects_foreign_origin() {
    let h = TestHarness::new().await;

    let response = send(
        &h,
        Request::builder()
            .method("OPTIONS")
            .uri("/api/activities")
            .header(header::ORIGIN, "https://evil.example.com")
            .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
            .body(Body::empty())
            .unwrap(),
    )
    .await;

    assert!(!response
        .headers()
        .contains_key(header::ACCESS_CONTROL_ALLOW_ORIGIN));
}

#[tokio::test]
async fn test_public_route_no_auth_required() {
    let h = TestHarness::new().await;

    let response = send(
        &h,
        Request::builder().method("GET").uri("/health").body(Body::empty()).unwrap(),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");
}
