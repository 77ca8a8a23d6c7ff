// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Periodic "sync all active users" loop.

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AppError;
use crate::services::sync::{SyncEngine, SyncSummary};

pub struct SyncScheduler {
    sync: SyncEngine,
    interval: Duration,
    days_back: i64,
}

impl SyncScheduler {
    pub fn new(sync: SyncEngine, interval: Duration, days_back: i64) -> Self {
        Self {
            sync,
            interval,
            days_back,
        }
    }

    pub async fn run_once(&self) -> Result<SyncSummary, AppError> {
        self.sync.sync_all_active_users(self.days_back).await
    }

    /// Run forever on a background task. The first run happens one interval
    /// after start.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;

            tracing::info!(
                interval_secs = self.interval.as_secs(),
                days_back = self.days_back,
                "Scheduled sync started"
            );

            loop {
                ticker.tick().await;
                if let Err(e) = self.run_once().await {
                    tracing::error!(error = %e, "Scheduled sync failed");
                }
            }
        })
    }
}
