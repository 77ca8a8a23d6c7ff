// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Aggregate statistics over a user's activities.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::models::Activity;

/// Totals computed from a filtered activity query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub total_activities: u32,
    /// Meters
    pub total_distance: f64,
    /// Seconds
    pub total_moving_time: u64,
    /// Mean pace (min/km) over activities that have a pace
    pub average_pace: f64,

    /// Activity count per type
    #[serde(default)]
    pub activities_by_type: HashMap<String, u32>,
    /// Distance per type (meters)
    #[serde(default)]
    pub distance_by_type: HashMap<String, f64>,
    /// Activity count per month ("YYYY-MM" format)
    #[serde(default)]
    pub activities_by_month: HashMap<String, u32>,

    #[serde(skip)]
    pace_sum: f64,
    #[serde(skip)]
    pace_samples: u32,
}

impl ActivityStats {
    pub fn from_activities<'a>(activities: impl IntoIterator<Item = &'a Activity>) -> Self {
        let mut stats = Self::default();
        for activity in activities {
            stats.add_activity(activity);
        }
        stats
    }

    pub fn add_activity(&mut self, activity: &Activity) {
        self.total_activities += 1;
        self.total_distance += activity.distance;
        self.total_moving_time += activity.moving_time;

        if activity.pace > 0.0 {
            self.pace_sum += activity.pace;
            self.pace_samples += 1;
            self.average_pace = self.pace_sum / f64::from(self.pace_samples);
        }

        *self
            .activities_by_type
            .entry(activity.activity_type.clone())
            .or_insert(0) += 1;
        *self
            .distance_by_type
            .entry(activity.activity_type.clone())
            .or_insert(0.0) += activity.distance;

        let month_key = activity.start_time.format("%Y-%m").to_string();
        *self.activities_by_month.entry(month_key).or_insert(0) += 1;
    }
}
