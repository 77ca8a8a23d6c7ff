// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Normalized activity model for storage and API.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Stored activity record.
///
/// Stored at: `activities/{user_id}_{provider_activity_id}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Activity {
    /// Platform user that owns the activity
    pub user_id: u64,
    /// Strava activity ID
    pub provider_activity_id: u64,
    /// Activity type (Run, Ride, Swim, ...)
    pub activity_type: String,
    pub name: String,
    #[serde(with = "crate::time_utils::rfc3339_secs")]
    pub start_time: DateTime<Utc>,
    /// Distance in meters
    pub distance: f64,
    /// Moving time in seconds
    pub moving_time: u64,
    /// Total elevation gain in meters
    pub elevation_gain: f64,
    /// m/s
    pub average_speed: f64,
    /// m/s
    pub max_speed: f64,
    pub average_heartrate: f64,
    pub max_heartrate: f64,
    pub average_cadence: f64,
    /// Watts
    pub average_power: f64,
    pub kilojoules: f64,
    /// Minutes per kilometer, 0 when the activity has no speed
    pub pace: f64,
    /// Full Strava JSON payload
    pub raw_payload: String,
    pub synced_at: DateTime<Utc>,
}

impl Activity {
    pub fn document_id(&self) -> String {
        activity_document_id(self.user_id, self.provider_activity_id)
    }

    /// Parse the stored payload. Returns `None` if it is not valid JSON.
    pub fn raw(&self) -> Option<serde_json::Value> {
        serde_json::from_str(&self.raw_payload).ok()
    }
}

pub fn activity_document_id(user_id: u64, provider_activity_id: u64) -> String {
    format!("{}_{}", user_id, provider_activity_id)
}

/// Pace in minutes per kilometer from an average speed in m/s.
pub fn pace_from_speed(average_speed: f64) -> f64 {
    if average_speed > 0.0 {
        1000.0 / (average_speed * 60.0)
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityOrder {
    /// Most recent first
    #[default]
    Newest,
    Oldest,
    /// Longest distance first
    Longest,
}

/// Query filters for a user's activities. Date bounds are inclusive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActivityFilters {
    pub activity_type: Option<String>,
    pub date_from: Option<DateTime<Utc>>,
    pub date_to: Option<DateTime<Utc>>,
    pub order: ActivityOrder,
    pub limit: Option<usize>,
}

impl ActivityFilters {
    pub fn matches(&self, activity: &Activity) -> bool {
        if let Some(activity_type) = &self.activity_type {
            if &activity.activity_type != activity_type {
                return false;
            }
        }
        if let Some(from) = self.date_from {
            if activity.start_time < from {
                return false;
            }
        }
        if let Some(to) = self.date_to {
            if activity.start_time > to {
                return false;
            }
        }
        true
    }

    /// Filter, order and truncate a set of activities.
    pub fn apply(&self, activities: impl IntoIterator<Item = Activity>) -> Vec<Activity> {
        let mut selected: Vec<Activity> =
            activities.into_iter().filter(|a| self.matches(a)).collect();
        self.sort(&mut selected);
        if let Some(limit) = self.limit {
            selected.truncate(limit);
        }
        selected
    }

    pub fn sort(&self, activities: &mut [Activity]) {
        match self.order {
            ActivityOrder::Newest => activities.sort_by(|a, b| {
                b.start_time
                    .cmp(&a.start_time)
                    .then(b.provider_activity_id.cmp(&a.provider_activity_id))
            }),
            ActivityOrder::Oldest => activities.sort_by(|a, b| {
                a.start_time
                    .cmp(&b.start_time)
                    .then(a.provider_activity_id.cmp(&b.provider_activity_id))
            }),
            ActivityOrder::Longest => activities.sort_by(|a, b| {
                b.distance
                    .total_cmp(&a.distance)
                    .then(b.start_time.cmp(&a.start_time))
            }),
        }
    }
}
