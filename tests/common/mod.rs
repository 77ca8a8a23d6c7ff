// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

use chrono::{DateTime, Duration, TimeZone, Utc};
use coach_sync::clock::MockClock;
use coach_sync::config::Config;
use coach_sync::db::{ActivityStore, FirestoreDb, IntegrationStore, MemoryDb, Storage};
use coach_sync::models::{Integration, IntegrationStatus};
use coach_sync::routes::create_router;
use coach_sync::services::{IntegrationService, OAuthClient, SyncEngine};
use coach_sync::AppState;
use serde_json::{json, Value};
use std::sync::Arc;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Check if emulator is available via environment variable.
#[allow(dead_code)]
pub fn emulator_available() -> bool {
    std::env::var("FIRESTORE_EMULATOR_HOST").is_ok()
}

/// Skip test with message if emulator not available.
#[macro_export]
macro_rules! require_emulator {
    () => {
        if !crate::common::emulator_available() {
            eprintln!("⚠️  Skipping: FIRESTORE_EMULATOR_HOST not set");
            return;
        }
    };
}

/// Create a test database connection.
#[allow(dead_code)]
pub async fn test_db() -> FirestoreDb {
    FirestoreDb::new("test-project")
        .await
        .expect("Failed to connect to Firestore emulator")
}

/// Fixed "now" every harness clock starts at.
#[allow(dead_code)]
pub fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
}

/// Config pointing all Strava traffic at the mock server.
#[allow(dead_code)]
pub fn test_config(server: &MockServer) -> Config {
    let mut config = Config::test_default();
    config.strava_oauth_url = format!("{}/oauth", server.uri());
    config.strava_api_url = format!("{}/api/v3", server.uri());
    config
}

/// In-memory stores, a mock Strava, and a mock clock wired into a full `AppState`.
#[allow(dead_code)]
pub struct TestHarness {
    pub server: MockServer,
    pub clock: Arc<MockClock>,
    pub db: Arc<MemoryDb>,
    pub state: Arc<AppState>,
}

#[allow(dead_code)]
impl TestHarness {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    /// Use `activities` instead of the in-memory activity store.
    pub async fn with_activity_store(activities: Arc<dyn ActivityStore>) -> Self {
        Self::build(Some(activities)).await
    }

    async fn build(activities: Option<Arc<dyn ActivityStore>>) -> Self {
        let server = MockServer::start().await;
        let clock = Arc::new(MockClock::new(start_time()));
        let db = Arc::new(MemoryDb::new());

        let mut storage = Storage::from_memory(db.clone());
        if let Some(activities) = activities {
            storage.activities = activities;
        }

        let state = Arc::new(
            AppState::build(test_config(&server), storage, clock.clone())
                .expect("Failed to build app state"),
        );

        Self {
            server,
            clock,
            db,
            state,
        }
    }

    pub fn router(&self) -> axum::Router {
        create_router(self.state.clone())
    }

    pub fn service(&self) -> &IntegrationService {
        &self.state.integration_service
    }

    pub fn sync(&self) -> &SyncEngine {
        self.state.integration_service.sync_engine()
    }

    pub fn oauth(&self) -> &OAuthClient {
        self.sync().oauth()
    }

    pub fn now(&self) -> DateTime<Utc> {
        use coach_sync::clock::Clock;
        self.clock.now()
    }

    /// Store an active integration whose token expires `expires_in` from now.
    pub async fn seed_integration(
        &self,
        user_id: u64,
        athlete_id: u64,
        expires_in: Duration,
    ) -> Integration {
        let now = self.now();
        let integration = Integration {
            id: format!("seed-{}-{}", user_id, athlete_id),
            user_id,
            provider_athlete_id: athlete_id,
            access_token: access_token_for(user_id),
            refresh_token: format!("refresh-{}", user_id),
            token_expires_at: now + expires_in,
            profile_snapshot: json!({"id": athlete_id, "firstname": "Test", "lastname": "Mentee"})
                .to_string(),
            last_sync_at: None,
            status: IntegrationStatus::Active,
            created_at: now,
            updated_at: now,
        };
        self.db
            .activate_integration(&integration)
            .await
            .expect("Failed to seed integration");
        integration
    }

    pub async fn active_integration(&self, user_id: u64) -> Option<Integration> {
        self.db.find_active(user_id).await.unwrap()
    }

    /// Run the authorize step for `user_id` and return the issued state.
    pub async fn issue_state(&self, user_id: u64) -> String {
        let url = self
            .oauth()
            .build_authorization_url(user_id)
            .await
            .expect("Failed to build authorization URL");
        state_from_url(&url)
    }
}

#[allow(dead_code)]
pub fn access_token_for(user_id: u64) -> String {
    format!("access-{}", user_id)
}

#[allow(dead_code)]
pub fn state_from_url(url: &str) -> String {
    url.split("state=")
        .nth(1)
        .expect("URL has no state")
        .split('&')
        .next()
        .unwrap()
        .to_string()
}

/// A Strava summary activity `days_ago` days before `start_time()`.
#[allow(dead_code)]
pub fn activity_json(id: u64, days_ago: i64) -> Value {
    let start = start_time() - Duration::days(days_ago);
    json!({
        "id": id,
        "name": format!("Run {}", id),
        "type": "Run",
        "sport_type": "Run",
        "start_date": start.to_rfc3339(),
        "distance": 5000.0 + id as f64,
        "moving_time": 1500,
        "total_elevation_gain": 42.0,
        "average_speed": 3.0,
        "max_speed": 4.2,
        "average_heartrate": 150.0,
        "max_heartrate": 172.0
    })
}

/// Mount the code-exchange response for `code`.
#[allow(dead_code)]
pub async fn mount_token_exchange(
    server: &MockServer,
    code: &str,
    athlete_id: u64,
    access_token: &str,
    expires_at: DateTime<Utc>,
) {
    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains(format!("code={}", code)))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "access_token": access_token,
            "refresh_token": format!("refresh-for-{}", access_token),
            "expires_at": expires_at.timestamp(),
            "expires_in": 21600,
            "athlete": {"id": athlete_id, "firstname": "Ada", "lastname": "Lovelace"}
        })))
        .mount(server)
        .await;
}

/// Mount the activity list for requests bearing `access_token`.
#[allow(dead_code)]
pub async fn mount_activity_list(server: &MockServer, access_token: &str, activities: Vec<Value>) {
    Mock::given(method("GET"))
        .and(path("/api/v3/athlete/activities"))
        .and(header("authorization", format!("Bearer {}", access_token).as_str()))
        .respond_with(ResponseTemplate::new(200).set_body_json(Value::Array(activities)))
        .mount(server)
        .await;
}
