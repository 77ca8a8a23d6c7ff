// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Per-user Strava connection records.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// How long an OAuth `state` token stays redeemable.
pub const PENDING_AUTHORIZATION_TTL_SECS: i64 = 10 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationStatus {
    Active,
    Inactive,
}

impl IntegrationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationStatus::Active => "active",
            IntegrationStatus::Inactive => "inactive",
        }
    }
}

/// Stored OAuth credentials linking a platform user to a Strava athlete.
///
/// Stored at: `integrations/{id}`
///
/// A user has at most one `Active` record. Reconnecting marks the previous
/// one `Inactive`; records are never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: String,
    /// Platform user that owns the connection
    pub user_id: u64,
    /// Strava athlete ID (webhook `owner_id`)
    pub provider_athlete_id: u64,
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    /// Athlete JSON as returned by the token exchange
    pub profile_snapshot: String,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub status: IntegrationStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Integration {
    pub fn is_active(&self) -> bool {
        self.status == IntegrationStatus::Active
    }

    /// Parse the stored athlete snapshot. Unparseable snapshots yield `None`.
    pub fn profile(&self) -> Option<AthleteProfile> {
        serde_json::from_str(&self.profile_snapshot).ok()
    }
}

/// Fields written by a token refresh. Nothing else on the record changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenUpdate {
    pub access_token: String,
    pub refresh_token: String,
    pub token_expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TokenUpdate {
    pub fn apply_to(&self, integration: &mut Integration) {
        integration.access_token = self.access_token.clone();
        integration.refresh_token = self.refresh_token.clone();
        integration.token_expires_at = self.token_expires_at;
        integration.updated_at = self.updated_at;
    }
}

/// The subset of the Strava athlete object we read back.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AthleteProfile {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub firstname: Option<String>,
    #[serde(default)]
    pub lastname: Option<String>,
    /// Profile picture URL
    #[serde(default)]
    pub profile: Option<String>,
}

impl AthleteProfile {
    pub fn display_name(&self) -> Option<String> {
        let parts: Vec<&str> = [self.firstname.as_deref(), self.lastname.as_deref()]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(" "))
        }
    }
}

/// Outstanding OAuth `state` awaiting its callback.
///
/// Stored at: `pending_authorizations/{state}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub state: String,
    pub user_id: u64,
    #[serde(with = "crate::time_utils::rfc3339_secs")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "crate::time_utils::rfc3339_secs")]
    pub expires_at: DateTime<Utc>,
}

impl PendingAuthorization {
    pub fn new(state: String, user_id: u64, now: DateTime<Utc>) -> Self {
        Self {
            state,
            user_id,
            created_at: now,
            expires_at: now + Duration::seconds(PENDING_AUTHORIZATION_TTL_SECS),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// Connection summary shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub athlete_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub athlete_id: Option<u64>,
    pub last_sync_at: Option<DateTime<Utc>>,
}

impl ConnectionStatus {
    pub fn disconnected() -> Self {
        Self {
            connected: false,
            athlete_name: None,
            athlete_id: None,
            last_sync_at: None,
        }
    }

    pub fn from_integration(integration: &Integration) -> Self {
        Self {
            connected: true,
            athlete_name: integration.profile().and_then(|p| p.display_name()),
            athlete_id: Some(integration.provider_athlete_id),
            last_sync_at: integration.last_sync_at,
        }
    }
}
