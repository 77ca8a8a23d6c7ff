// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Firestore integration tests.
//!
//! These tests require the Firestore emulator to be running and
//! `FIRESTORE_EMULATOR_HOST` to point at it. Without it they are skipped.

use chrono::{DateTime, Duration, TimeZone, Utc};
use coach_sync::db::{ActivityStore, IntegrationStore, PendingAuthorizationStore};
use coach_sync::models::{
    Activity, ActivityFilters, ActivityOrder, Integration, IntegrationStatus, PendingAuthorization,
    TokenUpdate,
};
use coach_sync::error::AppError;

mod common;
use common::test_db;

/// Generate a unique user ID for test isolation.
fn unique_user_id() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos() as u64
        % 1_000_000_000_000
}

fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

fn integration(id: &str, user_id: u64, athlete_id: u64) -> Integration {
    Integration {
        id: id.to_string(),
        user_id,
        provider_athlete_id: athlete_id,
        access_token: format!("access-{}", id),
        refresh_token: format!("refresh-{}", id),
        token_expires_at: base_time() + Duration::hours(6),
        profile_snapshot: r#"{"firstname":"Test","lastname":"Mentee"}"#.to_string(),
        last_sync_at: None,
        status: IntegrationStatus::Active,
        created_at: base_time(),
        updated_at: base_time(),
    }
}

fn activity(user_id: u64, id: u64, activity_type: &str, days_ago: i64, distance: f64) -> Activity {
    Activity {
        user_id,
        provider_activity_id: id,
        activity_type: activity_type.to_string(),
        name: format!("Activity {}", id),
        start_time: base_time() - Duration::days(days_ago),
        distance,
        moving_time: 1800,
        elevation_gain: 10.0,
        average_speed: 3.0,
        max_speed: 4.0,
        average_heartrate: 0.0,
        max_heartrate: 0.0,
        average_cadence: 0.0,
        average_power: 0.0,
        kilojoules: 0.0,
        pace: 5.5,
        raw_payload: format!(r#"{{"id":{}}}"#, id),
        synced_at: base_time(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// INTEGRATIONS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_activate_replaces_previous_integration() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let first = format!("fs-{}-a", user_id);
    let second = format!("fs-{}-b", user_id);

    assert_eq!(
        db.activate_integration(&integration(&first, user_id, user_id + 1))
            .await
            .unwrap(),
        0
    );
    assert_eq!(
        db.activate_integration(&integration(&second, user_id, user_id + 1))
            .await
            .unwrap(),
        1
    );

    let active = db.find_active(user_id).await.unwrap().unwrap();
    assert_eq!(active.id, second);

    let by_athlete = db.find_active_by_athlete(user_id + 1).await.unwrap().unwrap();
    assert_eq!(by_athlete.user_id, user_id);

    let history = db.list_integrations(user_id).await.unwrap();
    assert_eq!(history.len(), 2);
    assert_eq!(history.iter().filter(|i| i.is_active()).count(), 1);
}

#[tokio::test]
async fn test_record_sync_and_deactivate() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    db.activate_integration(&integration(&format!("fs-{}", user_id), user_id, user_id + 1))
        .await
        .unwrap();

    let synced = base_time() + Duration::minutes(5);
    db.record_sync(user_id, synced).await.unwrap();
    assert_eq!(
        db.find_active(user_id).await.unwrap().unwrap().last_sync_at,
        Some(synced)
    );
    assert!(db.list_active_user_ids().await.unwrap().contains(&user_id));

    assert_eq!(db.deactivate_user(user_id, synced).await.unwrap(), 1);
    assert_eq!(db.deactivate_user(user_id, synced).await.unwrap(), 0);
    assert!(db.find_active(user_id).await.unwrap().is_none());
    assert!(!db.list_active_user_ids().await.unwrap().contains(&user_id));
}

#[tokio::test]
async fn test_concurrent_activations_leave_one_active() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let one = integration(&format!("fs-{}-one", user_id), user_id, user_id + 1);
    let two = integration(&format!("fs-{}-two", user_id), user_id, user_id + 1);

    let (a, b) = tokio::join!(db.activate_integration(&one), db.activate_integration(&two));
    assert!(a.is_ok() || b.is_ok(), "at least one activation commits");

    let history = db.list_integrations(user_id).await.unwrap();
    assert_eq!(history.iter().filter(|i| i.is_active()).count(), 1);
}

#[tokio::test]
async fn test_update_tokens_touches_only_token_fields() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let id = format!("fs-{}-tokens", user_id);
    db.activate_integration(&integration(&id, user_id, user_id + 1))
        .await
        .unwrap();

    let synced = base_time() + Duration::minutes(5);
    db.record_sync(user_id, synced).await.unwrap();

    let tokens = TokenUpdate {
        access_token: "rotated".to_string(),
        refresh_token: "rotated-refresh".to_string(),
        token_expires_at: base_time() + Duration::hours(12),
        updated_at: base_time() + Duration::minutes(6),
    };
    db.update_tokens(&id, &tokens).await.unwrap();

    let stored = db.find_active(user_id).await.unwrap().unwrap();
    assert_eq!(stored.access_token, "rotated");
    assert_eq!(stored.refresh_token, "rotated-refresh");
    assert_eq!(stored.last_sync_at, Some(synced));

    // A later sync stamp leaves the rotated tokens alone.
    db.record_sync(user_id, synced + Duration::minutes(1)).await.unwrap();
    assert_eq!(
        db.find_active(user_id).await.unwrap().unwrap().access_token,
        "rotated"
    );

    db.deactivate_user(user_id, synced).await.unwrap();
    assert!(matches!(
        db.update_tokens(&id, &tokens).await,
        Err(AppError::NotConnected)
    ));
    assert!(db.find_active(user_id).await.unwrap().is_none());
}

// ═══════════════════════════════════════════════════════════════════════════
// PENDING AUTHORIZATIONS
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_pending_state_is_single_use() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let state = format!("state-{}", user_id);

    // Issued well after the other tests' clocks so their purges leave it alone.
    let issued = base_time() + Duration::days(1);
    db.put_pending(&PendingAuthorization::new(state.clone(), user_id, issued))
        .await
        .unwrap();

    let now = issued + Duration::minutes(1);
    assert_eq!(db.take_pending(&state, now).await.unwrap(), Some(user_id));
    assert_eq!(db.take_pending(&state, now).await.unwrap(), None);
}

#[tokio::test]
async fn test_expired_pending_state_is_rejected_and_purged() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();
    let state = format!("state-{}", user_id);

    db.put_pending(&PendingAuthorization::new(state.clone(), user_id, base_time()))
        .await
        .unwrap();

    let later = base_time() + Duration::minutes(11);
    assert!(db.purge_expired_pending(later).await.unwrap() >= 1);
    assert_eq!(db.take_pending(&state, later).await.unwrap(), None);
}

// ═══════════════════════════════════════════════════════════════════════════
// ACTIVITIES
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::test]
async fn test_activity_upsert_is_idempotent() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();

    let mut original = activity(user_id, 1, "Run", 1, 5000.0);
    assert!(db.save_activity(&original).await.unwrap());
    original.name = "Renamed".to_string();
    assert!(db.save_activity(&original).await.unwrap());

    let all = db
        .query_activities(user_id, &ActivityFilters::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 1);
    assert_eq!(db.get_activity(user_id, 1).await.unwrap().unwrap().name, "Renamed");
}

#[tokio::test]
async fn test_activity_query_filters() {
    require_emulator!();

    let db = test_db().await;
    let user_id = unique_user_id();

    for a in [
        activity(user_id, 1, "Run", 10, 5000.0),
        activity(user_id, 2, "Ride", 5, 40000.0),
        activity(user_id, 3, "Run", 3, 12000.0),
        activity(user_id, 4, "Run", 1, 3000.0),
    ] {
        db.save_activity(&a).await.unwrap();
    }

    let newest = db
        .query_activities(user_id, &ActivityFilters::default())
        .await
        .unwrap();
    let ids: Vec<u64> = newest.iter().map(|a| a.provider_activity_id).collect();
    assert_eq!(ids, vec![4, 3, 2, 1]);

    let runs_in_window = db
        .query_activities(
            user_id,
            &ActivityFilters {
                activity_type: Some("Run".to_string()),
                date_from: Some(base_time() - Duration::days(5)),
                date_to: Some(base_time() - Duration::days(1)),
                order: ActivityOrder::Oldest,
                limit: None,
            },
        )
        .await
        .unwrap();
    let ids: Vec<u64> = runs_in_window.iter().map(|a| a.provider_activity_id).collect();
    assert_eq!(ids, vec![3, 4]);

    let longest = db
        .query_activities(
            user_id,
            &ActivityFilters {
                order: ActivityOrder::Longest,
                limit: Some(2),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let ids: Vec<u64> = longest.iter().map(|a| a.provider_activity_id).collect();
    assert_eq!(ids, vec![2, 3]);
}
