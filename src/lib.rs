// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Coach-Sync: Strava integration for the coach/mentee training platform
//!
//! This crate connects mentee accounts to Strava over OAuth, keeps their
//! tokens fresh, and mirrors their activities into a local store through
//! on-demand, scheduled, and webhook-driven syncs.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod time_utils;

use std::time::Duration;

use clock::SharedClock;
use config::Config;
use db::Storage;
use error::AppError;
use services::{
    IntegrationService, OAuthClient, StravaClient, SyncEngine, SyncScheduler, WebhookHandler,
};

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub storage: Storage,
    pub integration_service: IntegrationService,
    pub webhook_handler: WebhookHandler,
}

impl AppState {
    /// Wire every component against the given stores and clock.
    pub fn build(config: Config, storage: Storage, clock: SharedClock) -> Result<Self, AppError> {
        let client = StravaClient::from_config(&config)?;

        let oauth = OAuthClient::new(
            client,
            storage.integrations.clone(),
            storage.pending.clone(),
            clock,
            config.redirect_uri(),
        );

        let sync = SyncEngine::new(oauth, storage.activities.clone())
            .with_user_delay(Duration::from_millis(config.sync_user_delay_ms));

        let webhook_handler = WebhookHandler::new(sync.clone(), config.webhook_verify_token.clone());
        let integration_service =
            IntegrationService::new(sync, storage.activities.clone(), config.sync_days_back);

        Ok(Self {
            config,
            storage,
            integration_service,
            webhook_handler,
        })
    }

    /// Periodic sync over every active user, per config.
    pub fn scheduler(&self) -> SyncScheduler {
        SyncScheduler::new(
            self.integration_service.sync_engine().clone(),
            Duration::from_secs(self.config.sync_interval_secs),
            self.config.scheduled_sync_days_back,
        )
    }
}
